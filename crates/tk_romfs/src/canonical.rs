//! Canonical resource names.
//!
//! The same logical file is stored under slightly different names across
//! releases (`RSDB/Tag.Product.100.rstbl.byml.zs` vs
//! `RSDB/Tag.Product.110.rstbl.byml.zs`). Canonicalization strips the romfs
//! root, the on-disk compression extension and the product release number so
//! every release maps the file to one key. What was stripped is reported in
//! [`RomfsFileAttributes`].

use crate::error::{Error, Result};
use camino::Utf8Path;

bitflags::bitflags! {
    /// Encoding hints recovered while canonicalizing a path.
    ///
    /// The raw bits are written into the pack lookup string table, so the
    /// values must stay stable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
    pub struct RomfsFileAttributes: u8 {
        /// The file was stored with a `.zs` (zstd) extension.
        const HAS_ZS_EXTENSION = 1 << 0;
        /// The file was stored with a `.mc` extension (unsupported codec).
        const HAS_MC_EXTENSION = 1 << 1;
        /// The file name carried a `.Product.<release>.` segment.
        const IS_PRODUCT_FILE = 1 << 2;
    }
}

const PRODUCT_SEGMENT: &str = ".Product.";

/// Derive the canonical name of `path` relative to the romfs `root`.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use tk_romfs::{canonicalize, RomfsFileAttributes};
///
/// let (name, attributes) = canonicalize(
///     Utf8Path::new("/dump/RSDB/Tag.Product.110.rstbl.byml.zs"),
///     Utf8Path::new("/dump"),
/// )
/// .unwrap();
///
/// assert_eq!(name, "RSDB/Tag.Product.rstbl.byml");
/// assert!(attributes.contains(RomfsFileAttributes::HAS_ZS_EXTENSION));
/// ```
pub fn canonicalize(path: &Utf8Path, root: &Utf8Path) -> Result<(String, RomfsFileAttributes)> {
    let relative = path.strip_prefix(root).map_err(|_| Error::OutsideRoot {
        path: path.to_path_buf(),
        root: root.to_path_buf(),
    })?;

    Ok(canonicalize_relative(relative.as_str()))
}

/// Canonicalize an already root-relative path.
pub fn canonicalize_relative(relative: &str) -> (String, RomfsFileAttributes) {
    let mut attributes = RomfsFileAttributes::empty();
    let normalized = relative.replace('\\', "/");
    let mut canonical = normalized.trim_start_matches('/').to_string();

    if canonical.ends_with(".zs") {
        attributes |= RomfsFileAttributes::HAS_ZS_EXTENSION;
        canonical.truncate(canonical.len() - 3);
    } else if canonical.ends_with(".mc") {
        attributes |= RomfsFileAttributes::HAS_MC_EXTENSION;
        canonical.truncate(canonical.len() - 3);
    }

    if let Some(stripped) = strip_product_release(&canonical) {
        attributes |= RomfsFileAttributes::IS_PRODUCT_FILE;
        canonical = stripped;
    }

    (canonical, attributes)
}

/// Remove the release digits from a `Name.Product.<digits>.ext` file name.
fn strip_product_release(canonical: &str) -> Option<String> {
    let file_start = canonical.rfind('/').map_or(0, |idx| idx + 1);
    let file_name = &canonical[file_start..];

    let segment = file_name.find(PRODUCT_SEGMENT)?;
    let release_start = file_start + segment + PRODUCT_SEGMENT.len();
    let rest = &canonical[release_start..];

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 || rest.as_bytes().get(digits) != Some(&b'.') {
        return None;
    }

    let mut result = String::with_capacity(canonical.len() - digits - 1);
    result.push_str(&canonical[..release_start]);
    result.push_str(&rest[digits + 1..]);
    Some(result)
}
