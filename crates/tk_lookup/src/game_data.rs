//! Row index tables of the game data list.
//!
//! Every version ships one game data tree under `GameData/`. Its `Data` map
//! holds named tables of rows, each row identified by its `Hash` field. The
//! generator records, per version, where every row sits inside its table so
//! that the merger can address rows by hash instead of by position.
//!
//! Versions whose game data file name matches the previous version's are
//! skipped: the file did not change.
//!
//! # Binary format (`GameDataIndex.bpclt`)
//!
//! ```text
//! "PCLT"  int32 versionCount
//! versionCount * {
//!     int32 version
//!     "_STD"  int32 tableCount
//!     tableCount * { "_TBL"  uint64 tableNameHash  int32 entryCount
//!                    entryCount * { uint32 keyHash  int32 rowIndex } }
//!     "64BT"  "_TBL"  int32 entryCount
//!     entryCount * { uint64 keyHash  int32 rowIndex }
//! }
//! ```

use crate::binary::{to_i32, write_count, PCLT_MAGIC};
use crate::error::{Error, Result};
use crate::generator::{sealed, CancellationToken, Generator, SingleTag};
use crate::walker::{load_dictionaries, read_resource, versioned_roots};
use byteorder::{WriteBytesExt, LE};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use tk_romfs::hash::name_hash;
use tk_romfs::Byml;

/// Table whose rows are keyed by 64-bit hashes.
pub const BOOL64_TABLE_NAME: &str = "Bool64bitKey";

const GAME_DATA_DIR: &str = "GameData";
const GAME_DATA_EXTENSION: &str = ".byml.zs";

/// Row positions of one version of the game data list.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDataHashTable {
    /// Table name hash -> row hash -> row index.
    pub lookup_tables: IndexMap<u64, IndexMap<u32, i32>>,
    /// Row hash -> row index of the `Bool64bitKey` table.
    pub bool64_table: IndexMap<u64, i32>,
}

impl GameDataHashTable {
    /// Index the `Data` tables of a parsed game data tree.
    ///
    /// Rows without a usable `Hash` field are skipped with a warning.
    pub fn from_tree(tree: &Byml) -> Result<Self> {
        let data = tree
            .get("Data")
            .and_then(Byml::as_map)
            .ok_or_else(|| Error::InvalidGameData("missing 'Data' map".to_string()))?;

        let mut table = Self::default();
        for (name, rows) in data {
            let rows = rows.as_array().ok_or_else(|| {
                Error::InvalidGameData(format!("table '{}' is not an array", name))
            })?;

            if name == BOOL64_TABLE_NAME {
                for (index, row) in rows.iter().enumerate() {
                    match row.get("Hash").and_then(Byml::as_u64) {
                        Some(hash) => {
                            table.bool64_table.insert(hash, to_i32(index)?);
                        }
                        None => warn_missing_hash(name, index),
                    }
                }
                continue;
            }

            let entries = table.lookup_tables.entry(name_hash(name)).or_default();
            for (index, row) in rows.iter().enumerate() {
                match row.get("Hash").and_then(Byml::as_u32) {
                    Some(hash) => {
                        entries.insert(hash, to_i32(index)?);
                    }
                    None => warn_missing_hash(name, index),
                }
            }
        }

        Ok(table)
    }
}

fn warn_missing_hash(table: &str, index: usize) {
    tracing::warn!(
        "Skipping row {} of game data table '{}': missing 'Hash'",
        index,
        table
    );
}

/// First `*.byml.zs` file, by name, directly inside `<root>/GameData`.
fn find_game_data(root: &Utf8Path) -> Result<Option<Utf8PathBuf>> {
    let dir = root.join(GAME_DATA_DIR);
    if !dir.as_std_path().is_dir() {
        return Ok(None);
    }

    let mut candidates = Vec::new();
    for entry in dir.read_dir_utf8()? {
        let entry = entry?;
        if entry.file_type()?.is_file() && entry.file_name().ends_with(GAME_DATA_EXTENSION) {
            candidates.push(entry.into_path());
        }
    }
    candidates.sort();
    Ok(candidates.into_iter().next())
}

/// Builds `GameDataIndex.bpclt`.
#[derive(Debug, Default)]
pub struct GameDataIndexGenerator {
    tables: BTreeMap<i32, GameDataHashTable>,
}

impl GameDataIndexGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash tables keyed by version.
    pub fn tables(&self) -> &BTreeMap<i32, GameDataHashTable> {
        &self.tables
    }
}

impl sealed::Sealed for GameDataIndexGenerator {}

impl Generator for GameDataIndexGenerator {
    type Tag = SingleTag;
    type Snapshot<'a> = &'a BTreeMap<i32, GameDataHashTable>;

    const NAME: &'static str = "GameDataIndexGenerator";
    const FILE_NAME: &'static str = "GameData{tag}.bpclt";
    const TAGS: &'static [SingleTag] = &[SingleTag("Index")];

    fn generate(&mut self, roots: &[Utf8PathBuf], cancel: &CancellationToken) -> Result<()> {
        let mut previous: Option<String> = None;

        for (root, version) in versioned_roots(roots) {
            cancel.check()?;
            let Some(zstd) = load_dictionaries(root, Self::NAME)? else {
                continue;
            };
            let Some(path) = find_game_data(root)? else {
                tracing::warn!("{}: no game data found in '{}'", Self::NAME, root);
                continue;
            };

            let file_name = path.file_name().unwrap_or_default().to_string();
            if previous.as_deref() == Some(file_name.as_str()) {
                tracing::debug!(
                    "{}: '{}' unchanged in version {}, skipping",
                    Self::NAME,
                    file_name,
                    version
                );
                continue;
            }

            let tree = Byml::from_binary(&read_resource(&path, &zstd)?)?;
            let table = GameDataHashTable::from_tree(&tree)?;
            tracing::info!(
                "{}: processed version {} ({} tables, {} 64-bit keys)",
                Self::NAME,
                version,
                table.lookup_tables.len(),
                table.bool64_table.len()
            );

            self.tables.insert(version, table);
            previous = Some(file_name);
        }

        Ok(())
    }

    fn snapshot(&self) -> Self::Snapshot<'_> {
        &self.tables
    }

    fn write_binary<W: Write>(&self, out: &mut W, _tag: SingleTag) -> Result<()> {
        out.write_all(&PCLT_MAGIC)?;
        write_count(out, self.tables.len())?;

        for (version, table) in &self.tables {
            out.write_i32::<LE>(*version)?;

            out.write_all(b"_STD")?;
            write_count(out, table.lookup_tables.len())?;
            for (name_hash, entries) in &table.lookup_tables {
                out.write_all(b"_TBL")?;
                out.write_u64::<LE>(*name_hash)?;
                write_count(out, entries.len())?;
                for (hash, index) in entries {
                    out.write_u32::<LE>(*hash)?;
                    out.write_i32::<LE>(*index)?;
                }
            }

            out.write_all(b"64BT")?;
            out.write_all(b"_TBL")?;
            write_count(out, table.bool64_table.len())?;
            for (hash, index) in &table.bool64_table {
                out.write_u64::<LE>(*hash)?;
                out.write_i32::<LE>(*index)?;
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
    use std::io::{Cursor, Read};

    fn row(hash: Byml) -> Byml {
        [
            ("Hash".to_string(), hash),
            ("DefaultValue".to_string(), Byml::Bool(false)),
        ]
        .into_iter()
        .collect()
    }

    fn game_data(bool_rows: Vec<Byml>) -> Byml {
        let data: Byml = [
            ("Bool".to_string(), Byml::Array(bool_rows)),
            (
                BOOL64_TABLE_NAME.to_string(),
                Byml::Array(vec![row(Byml::U64(0x1122_3344_5566_7788))]),
            ),
        ]
        .into_iter()
        .collect();
        [("Data".to_string(), data)].into_iter().collect()
    }

    fn read_marker(cursor: &mut Cursor<&[u8]>) -> [u8; 4] {
        let mut marker = [0u8; 4];
        cursor.read_exact(&mut marker).unwrap();
        marker
    }

    #[test]
    fn test_rows_indexed_by_position() {
        let tree = game_data(vec![
            row(Byml::U32(5)),
            [("Other".to_string(), Byml::I32(1))].into_iter().collect(),
            row(Byml::I32(9)),
        ]);

        let table = GameDataHashTable::from_tree(&tree).unwrap();
        let bools = &table.lookup_tables[&name_hash("Bool")];
        assert_eq!(bools.get(&5), Some(&0));
        assert_eq!(bools.get(&9), Some(&2));
        assert_eq!(bools.len(), 2);
        assert_eq!(table.bool64_table.get(&0x1122_3344_5566_7788), Some(&0));
        assert!(!table.lookup_tables.contains_key(&name_hash(BOOL64_TABLE_NAME)));
    }

    #[test]
    fn test_repeated_hash_keeps_position_and_takes_later_index() {
        let tree = game_data(vec![
            row(Byml::U32(5)),
            row(Byml::U32(7)),
            row(Byml::U32(5)),
        ]);

        let table = GameDataHashTable::from_tree(&tree).unwrap();
        let bools: Vec<_> = table.lookup_tables[&name_hash("Bool")]
            .iter()
            .map(|(hash, index)| (*hash, *index))
            .collect();
        assert_eq!(bools, vec![(5, 2), (7, 1)]);
    }

    #[test]
    fn test_missing_data_map_is_an_error() {
        let tree: Byml = [("Other".to_string(), Byml::Null)].into_iter().collect();
        assert!(matches!(
            GameDataHashTable::from_tree(&tree),
            Err(Error::InvalidGameData(_))
        ));
    }

    #[test]
    fn test_unchanged_game_data_file_is_skipped() {
        let v1 = RomfsFixture::new(100);
        let v2 = RomfsFixture::new(110);
        let v3 = RomfsFixture::new(120);
        v1.write_byml(
            "GameData/GameDataList.Product.100.byml.zs",
            &game_data(vec![row(Byml::U32(1))]),
        );
        v2.write_byml(
            "GameData/GameDataList.Product.100.byml.zs",
            &game_data(vec![row(Byml::U32(1))]),
        );
        v3.write_byml(
            "GameData/GameDataList.Product.120.byml.zs",
            &game_data(vec![row(Byml::U32(2)), row(Byml::U32(1))]),
        );

        let mut generator = GameDataIndexGenerator::new();
        generator
            .generate(&roots(&[&v1, &v2, &v3]), &CancellationToken::new())
            .unwrap();
        assert_eq!(
            generator.tables().keys().copied().collect::<Vec<_>>(),
            vec![100, 120]
        );

        let mut out = Vec::new();
        generator.write_binary(&mut out, SingleTag("Index")).unwrap();

        let mut cursor = Cursor::new(&out[..]);
        assert_eq!(&read_marker(&mut cursor), b"PCLT");
        assert_eq!(cursor.read_i32::<LE>().unwrap(), 2);

        let mut versions = Vec::new();
        for _ in 0..2 {
            versions.push(cursor.read_i32::<LE>().unwrap());
            assert_eq!(&read_marker(&mut cursor), b"_STD");
            assert_eq!(cursor.read_i32::<LE>().unwrap(), 1);
            assert_eq!(&read_marker(&mut cursor), b"_TBL");
            assert_eq!(cursor.read_u64::<LE>().unwrap(), name_hash("Bool"));
            let entries = cursor.read_i32::<LE>().unwrap();
            let rows: Vec<_> = (0..entries)
                .map(|_| {
                    (
                        cursor.read_u32::<LE>().unwrap(),
                        cursor.read_i32::<LE>().unwrap(),
                    )
                })
                .collect();
            if versions.len() == 2 {
                assert_eq!(rows, vec![(2, 0), (1, 1)]);
            }
            assert_eq!(&read_marker(&mut cursor), b"64BT");
            assert_eq!(&read_marker(&mut cursor), b"_TBL");
            assert_eq!(cursor.read_i32::<LE>().unwrap(), 1);
            assert_eq!(cursor.read_u64::<LE>().unwrap(), 0x1122_3344_5566_7788);
            assert_eq!(cursor.read_i32::<LE>().unwrap(), 0);
        }
        assert_eq!(versions, vec![100, 120]);
        assert_eq!(cursor.position() as usize, out.len());
    }
}
