//! Per-resource content checksums across versions.
//!
//! For every canonical resource of every version the generator records the
//! decompressed size and content hash. Records are delta encoded: a version
//! only adds a record when `(size, hash)` differs from the previous record of
//! the same resource, so a resource that never changes costs exactly one
//! record.
//!
//! # Binary format (`Checksums.bpclt`)
//!
//! ```text
//! "PCLT"  int32 baseVersion  int32 resourceCount
//! resourceCount * {
//!     uint64 pathHash  int32 recordCount
//!     recordCount * { int32 version  int32 size  uint64 hash }
//! }
//! ```

use crate::binary::{write_count, PCLT_MAGIC};
use crate::error::Result;
use crate::generator::{sealed, CancellationToken, Generator, SingleTag};
use crate::walker::{load_dictionaries, versioned_roots, ArchiveWalker};
use byteorder::{WriteBytesExt, LE};
use camino::Utf8PathBuf;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use tk_romfs::hash::{content_hash, name_hash};

/// Resources that are never written to the checksum table.
pub const IGNORED_RESOURCES: &[&str] = &[
    "System/Resource/ResourceSizeTable.Product.rsizetable",
    "Pack/ZsDic.pack",
];

/// One observation of a resource in one version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecksumEntry {
    pub version: i32,
    pub size: i32,
    pub hash: u64,
}

impl ChecksumEntry {
    pub fn new(version: i32, data: &[u8]) -> Self {
        Self {
            version,
            size: i32::try_from(data.len()).unwrap_or(i32::MAX),
            hash: content_hash(data),
        }
    }
}

/// Append `entry` unless it matches the last record. Returns whether the
/// entry was stored.
pub fn append_delta(entries: &mut Vec<ChecksumEntry>, entry: ChecksumEntry) -> bool {
    let unchanged = entries
        .last()
        .is_some_and(|last| last.size == entry.size && last.hash == entry.hash);
    if !unchanged {
        entries.push(entry);
    }
    !unchanged
}

/// Builds `Checksums.bpclt`.
#[derive(Debug, Default)]
pub struct ChecksumGenerator {
    base_version: Option<i32>,
    checksums: BTreeMap<String, Vec<ChecksumEntry>>,
}

/// Debug view of [`ChecksumGenerator`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecksumSnapshot<'a> {
    pub base_version: i32,
    pub checksums: &'a BTreeMap<String, Vec<ChecksumEntry>>,
}

impl ChecksumGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Version of the first processed root, or `-1` if none was processed.
    pub fn base_version(&self) -> i32 {
        self.base_version.unwrap_or(-1)
    }

    pub fn checksums(&self) -> &BTreeMap<String, Vec<ChecksumEntry>> {
        &self.checksums
    }
}

impl sealed::Sealed for ChecksumGenerator {}

impl Generator for ChecksumGenerator {
    type Tag = SingleTag;
    type Snapshot<'a> = ChecksumSnapshot<'a>;

    const NAME: &'static str = "ChecksumGenerator";
    const FILE_NAME: &'static str = "{tag}.bpclt";
    const TAGS: &'static [SingleTag] = &[SingleTag("Checksums")];

    fn generate(&mut self, roots: &[Utf8PathBuf], cancel: &CancellationToken) -> Result<()> {
        for (root, version) in versioned_roots(roots) {
            cancel.check()?;
            let Some(zstd) = load_dictionaries(root, Self::NAME)? else {
                continue;
            };
            self.base_version.get_or_insert(version);

            let observations = Mutex::new(Vec::new());
            let walker = ArchiveWalker::new(root, &zstd, cancel);
            walker.walk(root, &|name, data| {
                let entry = ChecksumEntry::new(version, data);
                observations
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push((name.to_string(), entry));
            })?;

            // Walk order depends on scheduling; a name seen several times in
            // one root must produce the same records on every run.
            let mut observations = observations
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner);
            observations.sort_unstable_by(|(a, x), (b, y)| {
                a.cmp(b)
                    .then(x.size.cmp(&y.size))
                    .then(x.hash.cmp(&y.hash))
            });

            let mut recorded = 0;
            for (name, entry) in observations {
                if append_delta(self.checksums.entry(name).or_default(), entry) {
                    recorded += 1;
                }
            }

            tracing::info!(
                "{}: processed version {} from '{}' ({} new records)",
                Self::NAME,
                version,
                root,
                recorded
            );
        }

        Ok(())
    }

    fn snapshot(&self) -> ChecksumSnapshot<'_> {
        ChecksumSnapshot {
            base_version: self.base_version(),
            checksums: &self.checksums,
        }
    }

    fn write_binary<W: Write>(&self, out: &mut W, _tag: SingleTag) -> Result<()> {
        let resources: Vec<_> = self
            .checksums
            .iter()
            .filter(|(name, _)| !IGNORED_RESOURCES.contains(&name.as_str()))
            .collect();

        out.write_all(&PCLT_MAGIC)?;
        out.write_i32::<LE>(self.base_version())?;
        write_count(out, resources.len())?;

        for (name, entries) in resources {
            out.write_u64::<LE>(name_hash(name))?;
            write_count(out, entries.len())?;
            for entry in entries {
                out.write_i32::<LE>(entry.version)?;
                out.write_i32::<LE>(entry.size)?;
                out.write_u64::<LE>(entry.hash)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{roots, RomfsFixture};
    use byteorder::ReadBytesExt;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::io::{Cursor, Read};

    struct Decoded {
        base_version: i32,
        resources: HashMap<u64, Vec<(i32, i32, u64)>>,
    }

    fn decode(data: &[u8]) -> Decoded {
        let mut cursor = Cursor::new(data);
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic).unwrap();
        assert_eq!(&magic, b"PCLT");

        let base_version = cursor.read_i32::<LE>().unwrap();
        let count = cursor.read_i32::<LE>().unwrap();
        let mut resources = HashMap::new();
        for _ in 0..count {
            let hash = cursor.read_u64::<LE>().unwrap();
            let records = cursor.read_i32::<LE>().unwrap();
            let records = (0..records)
                .map(|_| {
                    (
                        cursor.read_i32::<LE>().unwrap(),
                        cursor.read_i32::<LE>().unwrap(),
                        cursor.read_u64::<LE>().unwrap(),
                    )
                })
                .collect();
            resources.insert(hash, records);
        }
        assert_eq!(cursor.position() as usize, data.len());
        Decoded {
            base_version,
            resources,
        }
    }

    fn generate(fixtures: &[&RomfsFixture]) -> (ChecksumGenerator, Decoded) {
        let mut generator = ChecksumGenerator::new();
        generator
            .generate(&roots(fixtures), &CancellationToken::new())
            .unwrap();
        let mut out = Vec::new();
        generator
            .write_binary(&mut out, SingleTag("Checksums"))
            .unwrap();
        let decoded = decode(&out);
        (generator, decoded)
    }

    #[test]
    fn test_identical_resource_has_one_record() {
        let fixtures: Vec<_> = [100, 110, 120].map(RomfsFixture::new).into();
        for fixture in &fixtures {
            fixture.write("A/f.bin", b"same");
        }

        let (_, decoded) = generate(&fixtures.iter().collect::<Vec<_>>());
        assert_eq!(decoded.base_version, 100);
        let records = &decoded.resources[&name_hash("A/f.bin")];
        assert_eq!(records, &vec![(100, 4, content_hash(b"same"))]);
    }

    #[test]
    fn test_changed_resource_records_each_change() {
        let v1 = RomfsFixture::new(100);
        let v2 = RomfsFixture::new(110);
        let v3 = RomfsFixture::new(120);
        v1.write("A/f.bin", b"one");
        v2.write("A/f.bin", b"two!");
        v3.write("A/f.bin", b"one");

        // Input order is not version order; roots are processed ascending.
        let (generator, decoded) = generate(&[&v3, &v1, &v2]);
        let versions: Vec<_> = decoded.resources[&name_hash("A/f.bin")]
            .iter()
            .map(|(version, _, _)| *version)
            .collect();
        assert_eq!(versions, vec![100, 110, 120]);
        assert_eq!(generator.base_version(), 100);
    }

    #[test]
    fn test_compressed_and_nested_resources_are_hashed_decompressed() {
        let fixture = RomfsFixture::new(100);
        let pack = tk_romfs::SarcWriter::new()
            .with_file("Actor/Link.bgyml", b"link".to_vec())
            .to_binary()
            .unwrap();
        fixture.write_compressed("Pack/Actor/Link.pack.zs", &pack);

        let (generator, _) = generate(&[&fixture]);
        let records = &generator.checksums()["Actor/Link.bgyml"];
        assert_eq!(records[0].hash, content_hash(b"link"));
        assert_eq!(
            generator.checksums()["Pack/Actor/Link.pack"][0].hash,
            content_hash(&pack)
        );
    }

    #[test]
    fn test_dictionary_compressed_resources_are_hashed_decompressed() {
        let v1 = RomfsFixture::new(100);
        let v2 = RomfsFixture::new(110);
        let pack = tk_romfs::SarcWriter::new()
            .with_file("Actor/Enemy_001.bgyml", b"Life=120 Attack=7".to_vec())
            .to_binary()
            .unwrap();
        v1.write_dictionary_compressed("Pack/Actor/Enemy_001.pack.zs", &pack);
        v1.write_dictionary_compressed("Actor/Enemy_001.bgyml.zs", b"Life=120 Attack=7");
        v2.write_dictionary_compressed("Actor/Enemy_001.bgyml.zs", b"Life=140 Attack=7");

        let (generator, decoded) = generate(&[&v1, &v2]);
        assert_eq!(
            generator.checksums()["Pack/Actor/Enemy_001.pack"][0].hash,
            content_hash(&pack)
        );
        assert_eq!(
            decoded.resources[&name_hash("Actor/Enemy_001.bgyml")],
            vec![
                (100, 17, content_hash(b"Life=120 Attack=7")),
                (110, 17, content_hash(b"Life=140 Attack=7")),
            ]
        );
    }

    #[test]
    fn test_same_name_in_one_root_is_recorded_in_stable_order() {
        let fixture = RomfsFixture::new(100);
        for (pack, contents) in [
            ("A", b"first".as_slice()),
            ("B", b"second!".as_slice()),
            ("C", b"first".as_slice()),
        ] {
            let sarc = tk_romfs::SarcWriter::new()
                .with_file("Shared/f.bin", contents.to_vec())
                .to_binary()
                .unwrap();
            fixture.write_compressed(&format!("Pack/{}.pack.zs", pack), &sarc);
        }

        let expected = {
            let mut records = vec![
                ChecksumEntry::new(100, b"first"),
                ChecksumEntry::new(100, b"second!"),
            ];
            records.sort_by_key(|entry| (entry.size, entry.hash));
            records
        };
        for _ in 0..4 {
            let (generator, _) = generate(&[&fixture]);
            assert_eq!(generator.checksums()["Shared/f.bin"], expected);
        }
    }

    #[test]
    fn test_ignored_resources_are_not_written() {
        let fixture = RomfsFixture::new(100);
        fixture.write(
            "System/Resource/ResourceSizeTable.Product.100.rsizetable.zs",
            &tk_romfs::zstd::compress(b"rstb", 3).unwrap(),
        );

        let (generator, decoded) = generate(&[&fixture]);
        assert!(generator
            .checksums()
            .contains_key("System/Resource/ResourceSizeTable.Product.rsizetable"));
        for ignored in IGNORED_RESOURCES {
            assert!(!decoded.resources.contains_key(&name_hash(ignored)));
        }
    }

    #[test]
    fn test_roots_without_dictionaries_are_skipped() {
        let fixture = RomfsFixture::without_dictionaries(100);
        fixture.write("A/f.bin", b"data");

        let (generator, decoded) = generate(&[&fixture]);
        assert_eq!(generator.base_version(), -1);
        assert_eq!(decoded.base_version, -1);
        assert!(decoded.resources.is_empty());
    }

    proptest! {
        #[test]
        fn test_delta_encoding_invariant(observations in prop::collection::vec((0i32..4, 0u64..3), 0..32)) {
            let mut entries = Vec::new();
            for (version, (size, hash)) in observations.iter().enumerate() {
                append_delta(&mut entries, ChecksumEntry { version: version as i32, size: *size, hash: *hash });
            }

            for pair in entries.windows(2) {
                prop_assert!(pair[0].version < pair[1].version);
                prop_assert!((pair[0].size, pair[0].hash) != (pair[1].size, pair[1].hash));
            }
            prop_assert_eq!(entries.is_empty(), observations.is_empty());
        }
    }
}
