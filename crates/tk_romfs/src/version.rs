//! Romfs release number lookup.

use crate::error::{Error, Result};
use camino::Utf8Path;

/// Version reported when a dump's version metadata cannot be read.
pub const DEFAULT_ROMFS_VERSION: i32 = 100;

/// Read the release number of the romfs dump at `root`.
///
/// The number is the third line of `System/RegionLangMask.txt`.
pub fn romfs_version(root: &Utf8Path) -> Result<i32> {
    let path = root.join("System").join("RegionLangMask.txt");
    let contents = std::fs::read_to_string(path.as_std_path())?;

    contents
        .lines()
        .nth(2)
        .and_then(|line| line.trim().parse::<i32>().ok())
        .ok_or(Error::InvalidVersion(path))
}

/// Like [`romfs_version`], falling back to [`DEFAULT_ROMFS_VERSION`].
pub fn romfs_version_or_default(root: &Utf8Path) -> i32 {
    match romfs_version(root) {
        Ok(version) => version,
        Err(e) => {
            tracing::warn!(
                "Failed to read romfs version of '{}', using {}: {}",
                root,
                DEFAULT_ROMFS_VERSION,
                e
            );
            DEFAULT_ROMFS_VERSION
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::fs;
    use tempfile::tempdir;

    fn write_mask(root: &Utf8Path, contents: &str) {
        let system = root.join("System");
        fs::create_dir_all(&system).unwrap();
        fs::write(system.join("RegionLangMask.txt"), contents).unwrap();
    }

    #[test]
    fn test_reads_third_line() {
        let dir = tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        write_mask(&root, "JPja,USen\n0\n121\n");

        assert_eq!(romfs_version(&root).unwrap(), 121);
        assert_eq!(romfs_version_or_default(&root), 121);
    }

    #[test]
    fn test_invalid_metadata() {
        let dir = tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        write_mask(&root, "JPja\nnot-a-number\n");

        assert!(matches!(romfs_version(&root), Err(Error::InvalidVersion(_))));
        assert_eq!(romfs_version_or_default(&root), DEFAULT_ROMFS_VERSION);
    }

    #[test]
    fn test_missing_metadata() {
        let dir = tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        assert!(matches!(romfs_version(&root), Err(Error::Io(_))));
        assert_eq!(romfs_version_or_default(&root), DEFAULT_ROMFS_VERSION);
    }
}
