//! Owning pack resolution for every packed resource.
//!
//! Every file under `<root>/Pack` is a SARC whose entries live in the global
//! resource namespace. The same resource usually ships in several packs and
//! moves between packs across versions. For each resource this generator
//! picks one owning pack (its "parent") so the merger can find a base copy
//! without scanning every archive:
//!
//! 1. A pack that held the resource in every supplied version wins; the
//!    first such pack in discovery order breaks ties.
//! 2. Several packs that held the resource in exactly the same versions are
//!    ambiguous. The first is used provisionally and the resource is added to
//!    the `missing` report.
//! 3. Otherwise the first pack is used. When more than one pack was seen the
//!    resource is reported as needing explicit versioning.
//!
//! # Binary format (`PackFileLookup.pkcache`)
//!
//! ```text
//! uint32 magic ("PKCH")  int32 resourceCount
//! int32 stringTableOffset (16 + resourceCount * 8)  uint32 parentCount
//! resourceCount * { uint16 sectionKey  uint32 pathHash  uint16 parentIndex }
//! parentCount * { utf8 path  0x00  uint8 attributes }
//! ```
//!
//! Resources are sorted by canonical path. `sectionKey` is the first byte of
//! the path shifted left by 8 or'ed with its last byte.

use crate::binary::{to_i32, write_count};
use crate::error::{Error, Result};
use crate::generator::{sealed, CancellationToken, Generator, SingleTag};
use crate::walker::{list_files, load_dictionaries, read_resource, versioned_roots};
use byteorder::{WriteBytesExt, LE};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::{IndexMap, IndexSet};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::Write;
use tk_romfs::hash::name_hash32;
use tk_romfs::{canonicalize, RomfsFileAttributes, Sarc, Zstd};

/// "PKCH" read as a little-endian `u32`.
pub const PACK_LOOKUP_MAGIC: u32 = 0x4843_4B50;

const PACK_DIR: &str = "Pack";

/// A pack file that contains a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PackParent {
    /// Canonical path of the pack.
    pub path: String,
    pub attributes: RomfsFileAttributes,
}

/// Candidate packs of one resource, in discovery order, with the versions
/// each pack contained it in.
pub type ParentCandidates = IndexMap<PackParent, Vec<i32>>;

/// Outcome of [`resolve_parent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentResolution<'a> {
    /// The pack held the resource in every version.
    Covered(&'a PackParent),
    /// The only pack that ever held the resource.
    Single(&'a PackParent),
    /// Several packs held the resource in the same versions.
    Ambiguous(&'a PackParent),
    /// Packs held the resource in different versions and none in all.
    VersioningRequired(&'a PackParent),
}

impl<'a> ParentResolution<'a> {
    pub fn parent(&self) -> &'a PackParent {
        match *self {
            Self::Covered(parent)
            | Self::Single(parent)
            | Self::Ambiguous(parent)
            | Self::VersioningRequired(parent) => parent,
        }
    }
}

/// Pick the owning pack of a resource. Returns `None` without candidates.
pub fn resolve_parent(
    candidates: &ParentCandidates,
    version_count: usize,
) -> Option<ParentResolution<'_>> {
    let (first, first_versions) = candidates.first()?;

    if let Some((covered, _)) = candidates
        .iter()
        .find(|(_, versions)| versions.len() == version_count)
    {
        return Some(ParentResolution::Covered(covered));
    }

    if candidates.len() == 1 {
        return Some(ParentResolution::Single(first));
    }

    if candidates.values().all(|versions| versions == first_versions) {
        Some(ParentResolution::Ambiguous(first))
    } else {
        Some(ParentResolution::VersioningRequired(first))
    }
}

/// Bucket key of a canonical path: first byte << 8 | last byte.
pub fn section_key(path: &str) -> u16 {
    match (path.as_bytes().first(), path.as_bytes().last()) {
        (Some(&first), Some(&last)) => (u16::from(first) << 8) | u16::from(last),
        _ => 0,
    }
}

/// Track `hash` in its section. A repeated hash is logged and the row is
/// still written; returns whether the hash was new to the section.
fn record_section_hash(
    buckets: &mut HashMap<u16, HashSet<u32>>,
    key: u16,
    hash: u32,
    resource: &str,
) -> bool {
    let unique = buckets.entry(key).or_default().insert(hash);
    if !unique {
        tracing::warn!(
            "Hash collision in section {:#06x} for '{}' ({:#010x})",
            key,
            resource,
            hash
        );
    }
    unique
}

/// Builds `PackFileLookup.pkcache`.
#[derive(Debug, Default)]
pub struct PackFileLookupGenerator {
    version_count: usize,
    candidates: BTreeMap<String, ParentCandidates>,
    parents: BTreeMap<String, PackParent>,
    missing: BTreeSet<String>,
    versioning_required: BTreeSet<String>,
}

/// One candidate pack in the debug snapshot.
#[derive(Debug, Serialize)]
pub struct CandidateReport<'a> {
    pub parent: &'a str,
    pub attributes: RomfsFileAttributes,
    pub versions: &'a [i32],
}

/// Debug view of [`PackFileLookupGenerator`]: the unresolved resources.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackLookupSnapshot<'a> {
    pub version_count: usize,
    pub missing: BTreeMap<&'a str, Vec<CandidateReport<'a>>>,
    pub versioning_required: BTreeMap<&'a str, Vec<CandidateReport<'a>>>,
}

impl PackFileLookupGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolved parent of every resource, sorted by canonical path.
    pub fn parents(&self) -> &BTreeMap<String, PackParent> {
        &self.parents
    }

    /// Resources whose candidates were present in identical versions.
    pub fn missing(&self) -> &BTreeSet<String> {
        &self.missing
    }

    /// Resources that moved between packs without a full-coverage pack.
    pub fn versioning_required(&self) -> &BTreeSet<String> {
        &self.versioning_required
    }

    pub fn candidates(&self, resource: &str) -> Option<&ParentCandidates> {
        self.candidates.get(resource)
    }

    /// Record one root's presence of `entries` in `parent`.
    ///
    /// Roots may share a version number, so every root adds its own entry.
    fn add_pack(&mut self, parent: PackParent, entries: Vec<String>, version: i32) {
        for entry in entries {
            self.candidates
                .entry(entry)
                .or_default()
                .entry(parent.clone())
                .or_default()
                .push(version);
        }
    }

    fn resolve(&mut self) {
        self.parents.clear();
        self.missing.clear();
        self.versioning_required.clear();

        for (resource, candidates) in &self.candidates {
            let Some(resolution) = resolve_parent(candidates, self.version_count) else {
                continue;
            };

            match resolution {
                ParentResolution::Ambiguous(parent) => {
                    tracing::warn!(
                        "Ambiguous parent for '{}': {} packs in the same versions, using '{}'",
                        resource,
                        candidates.len(),
                        parent.path
                    );
                    self.missing.insert(resource.clone());
                }
                ParentResolution::VersioningRequired(parent) => {
                    tracing::warn!(
                        "Versioning required: '{}' (using '{}')",
                        resource,
                        parent.path
                    );
                    self.versioning_required.insert(resource.clone());
                }
                ParentResolution::Covered(_) | ParentResolution::Single(_) => {}
            }

            self.parents
                .insert(resource.clone(), resolution.parent().clone());
        }
    }

    fn report<'a>(
        &'a self,
        resources: &'a BTreeSet<String>,
    ) -> BTreeMap<&'a str, Vec<CandidateReport<'a>>> {
        resources
            .iter()
            .filter_map(|resource| {
                let candidates = self.candidates.get(resource)?;
                let report = candidates
                    .iter()
                    .map(|(parent, versions)| CandidateReport {
                        parent: &parent.path,
                        attributes: parent.attributes,
                        versions,
                    })
                    .collect();
                Some((resource.as_str(), report))
            })
            .collect()
    }
}

/// Open one pack file and list its entries.
///
/// Files that are not containers, or that fail to decompress or parse, are
/// skipped.
fn read_pack(
    root: &Utf8Path,
    path: &Utf8Path,
    zstd: &Zstd,
) -> Result<Option<(PackParent, Vec<String>)>> {
    let (canonical, attributes) = canonicalize(path, root)?;
    if attributes.contains(RomfsFileAttributes::HAS_MC_EXTENSION) {
        return Ok(None);
    }

    let entries = read_resource(path, zstd).and_then(|data| {
        if !Sarc::is_sarc(&data) {
            return Ok(None);
        }
        let sarc = Sarc::parse(&data)?;
        Ok(Some(
            sarc.iter()
                .map(|entry| entry.name.to_string())
                .collect::<Vec<_>>(),
        ))
    });

    match entries {
        Ok(Some(entries)) => Ok(Some((
            PackParent {
                path: canonical,
                attributes,
            },
            entries,
        ))),
        Ok(None) => {
            tracing::debug!("Skipping non-container file '{}'", path);
            Ok(None)
        }
        Err(Error::Romfs(e)) => {
            tracing::warn!("Skipping unreadable pack '{}': {}", path, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

impl sealed::Sealed for PackFileLookupGenerator {}

impl Generator for PackFileLookupGenerator {
    type Tag = SingleTag;
    type Snapshot<'a> = PackLookupSnapshot<'a>;

    const NAME: &'static str = "PackFileLookupGenerator";
    const FILE_NAME: &'static str = "PackFile{tag}.pkcache";
    const COMPRESSED: bool = true;
    const TAGS: &'static [SingleTag] = &[SingleTag("Lookup")];

    fn generate(&mut self, roots: &[Utf8PathBuf], cancel: &CancellationToken) -> Result<()> {
        self.version_count = roots.len();

        for (root, version) in versioned_roots(roots) {
            cancel.check()?;
            let Some(zstd) = load_dictionaries(root, Self::NAME)? else {
                continue;
            };

            let files = list_files(&root.join(PACK_DIR))?;
            let packs = files
                .par_iter()
                .map(|path| read_pack(root, path, &zstd))
                .collect::<Result<Vec<_>>>()?;

            let mut pack_count = 0;
            for (parent, entries) in packs.into_iter().flatten() {
                pack_count += 1;
                self.add_pack(parent, entries, version);
            }

            tracing::info!(
                "{}: processed version {} ({} packs, {} resources so far)",
                Self::NAME,
                version,
                pack_count,
                self.candidates.len()
            );
        }

        self.resolve();
        tracing::info!(
            "{}: resolved {} resources ({} ambiguous, {} need versioning)",
            Self::NAME,
            self.parents.len(),
            self.missing.len(),
            self.versioning_required.len()
        );
        Ok(())
    }

    fn snapshot(&self) -> PackLookupSnapshot<'_> {
        PackLookupSnapshot {
            version_count: self.version_count,
            missing: self.report(&self.missing),
            versioning_required: self.report(&self.versioning_required),
        }
    }

    fn write_binary<W: Write>(&self, out: &mut W, _tag: SingleTag) -> Result<()> {
        // First pass: parent table in first-use order.
        let mut parents: IndexSet<&PackParent> = IndexSet::new();
        let mut rows = Vec::with_capacity(self.parents.len());
        for (resource, parent) in &self.parents {
            let (index, _) = parents.insert_full(parent);
            rows.push((resource.as_str(), index));
        }
        if parents.len() > usize::from(u16::MAX) {
            return Err(Error::TooManyPackParents(parents.len()));
        }

        let string_table_offset = rows
            .len()
            .checked_mul(8)
            .and_then(|size| size.checked_add(16))
            .unwrap_or(usize::MAX);

        out.write_u32::<LE>(PACK_LOOKUP_MAGIC)?;
        write_count(out, rows.len())?;
        out.write_i32::<LE>(to_i32(string_table_offset)?)?;
        out.write_u32::<LE>(parents.len() as u32)?;

        let mut buckets: HashMap<u16, HashSet<u32>> = HashMap::new();
        for (resource, parent_index) in rows {
            let key = section_key(resource);
            let hash = name_hash32(resource);
            record_section_hash(&mut buckets, key, hash, resource);

            out.write_u16::<LE>(key)?;
            out.write_u32::<LE>(hash)?;
            out.write_u16::<LE>(parent_index as u16)?;
        }

        for parent in parents {
            out.write_all(parent.path.as_bytes())?;
            out.write_u8(0)?;
            out.write_u8(parent.attributes.bits())?;
        }

        Ok(())
    }
}
