//! Cross-version row cache of the resource databases (`RSDB/*.rstbl.byml`).
//!
//! Each RSDB table is an array of rows. Rows are matched across versions by
//! an identity field that depends on the table; tables without a known
//! identity field are ignored. For every row the generator keeps one entry
//! per distinct consecutive value, then drops rows that never changed.
//!
//! Two outputs share the model:
//!
//! ```text
//! RsdbIndex.bpcc
//!   int32 tableCount
//!   tableCount * { uint64 tableNameHash  int32 rowCount
//!                  rowCount * { uint64 rowIdHash  int32 ordinalIndex } }
//!
//! RsdbCache.bpcc (tables without retained rows are omitted)
//!   int32 tableCount
//!   tableCount * { uint64 tableNameHash  int32 rowCount
//!                  rowCount * { uint64 rowIdHash  int32 entryCount
//!                               entryCount * { int32 version  int32 size  byml row } } }
//! ```
//!
//! The index lists rows in the order of the first version in which the
//! table was seen; rows added by later versions are not indexed.

use crate::binary::{to_i32, write_count};
use crate::error::{Error, Result};
use crate::generator::{sealed, CancellationToken, Generator};
use crate::walker::{list_files, load_dictionaries, read_resource, versioned_roots};
use byteorder::{WriteBytesExt, LE};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::{IndexMap, IndexSet};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::Write;
use tk_romfs::hash::name_hash;
use tk_romfs::{canonicalize, Byml, Zstd};
use xxhash_rust::xxh3::Xxh3;

const RSDB_DIR: &str = "RSDB";
const RSDB_PREFIX: &str = "RSDB/";
const RSDB_SUFFIX: &str = ".Product.rstbl.byml";

/// Tables identified by their `__RowId` field.
const ROW_ID_TABLES: &[&str] = &[
    "ActorInfo",
    "AttachmentActorInfo",
    "Challenge",
    "EnhancementMaterialInfo",
    "EventPlayEnvSetting",
    "EventSetting",
    "GameActorInfo",
    "GameAnalyzedEventInfo",
    "GameEventBaseSetting",
    "GameEventMetadata",
    "LoadingTips",
    "Location",
    "LocatorData",
    "PouchActorInfo",
    "XLinkPropertyTable",
    "XLinkPropertyTableList",
];

/// How rows of a table are identified across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowIdentity {
    /// A 32-bit `NameHash` field, used as is.
    NameHash,
    /// A string field, hashed with [`name_hash`].
    Field(&'static str),
}

impl RowIdentity {
    /// Identity of the table with the given canonical name, if it is cached.
    pub fn for_table(canonical: &str) -> Option<Self> {
        let table = canonical
            .strip_prefix(RSDB_PREFIX)?
            .strip_suffix(RSDB_SUFFIX)?;

        match table {
            "GameSafetySetting" => Some(Self::NameHash),
            "RumbleCall" | "UIScreen" => Some(Self::Field("Name")),
            "TagDef" => Some(Self::Field("FullTagId")),
            table if ROW_ID_TABLES.contains(&table) => Some(Self::Field("__RowId")),
            _ => None,
        }
    }

    /// Identity hash of `row`, or `None` if the identity field is missing.
    pub fn row_id(self, row: &Byml) -> Option<u64> {
        match self {
            Self::NameHash => row.get("NameHash").and_then(Byml::as_u32).map(u64::from),
            Self::Field(field) => row.get(field).and_then(Byml::as_str).map(name_hash),
        }
    }
}

/// Hash of a row's field count and full structure.
pub fn structural_hash(row: &Byml) -> u64 {
    let mut hasher = Xxh3::new();
    row.len().hash(&mut hasher);
    row.hash(&mut hasher);
    hasher.finish()
}

/// One distinct value of a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RsdbRowEntry {
    pub version: i32,
    pub field_count: usize,
    pub hash: u64,
    pub row: Byml,
}

impl RsdbRowEntry {
    pub fn new(version: i32, row: Byml) -> Self {
        Self {
            version,
            field_count: row.len(),
            hash: structural_hash(&row),
            row,
        }
    }
}

/// Consolidated rows of one RSDB table.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RsdbTable {
    /// Canonical name of the table file.
    pub name: String,
    /// Row ids in the order of the first version the table was seen in.
    pub index_mapping: IndexSet<u64>,
    pub is_index_mapping_filled: bool,
    pub rows: IndexMap<u64, Vec<RsdbRowEntry>>,
}

impl RsdbTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add one version of a row. Returns whether a new entry was stored.
    ///
    /// Fails when the entry has the content hash of the previous entry but a
    /// different value; the identity scheme cannot be trusted for this table
    /// then.
    pub fn merge(&mut self, row_id: u64, entry: RsdbRowEntry) -> Result<bool> {
        if !self.is_index_mapping_filled {
            self.index_mapping.insert(row_id);
        }

        let entries = self.rows.entry(row_id).or_default();
        if let Some(last) = entries.last() {
            if last.row == entry.row {
                return Ok(false);
            }
            if last.hash == entry.hash && last.field_count == entry.field_count {
                return Err(Error::RsdbHashCollision {
                    table: self.name.clone(),
                    row_id,
                });
            }
        }

        entries.push(entry);
        Ok(true)
    }

    /// Drop rows with a single value across all versions.
    pub fn prune(&mut self) {
        self.rows.retain(|_, entries| entries.len() >= 2);
    }
}

/// Outputs of [`RsdbCacheGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RsdbTag {
    Cache,
    Index,
}

impl fmt::Display for RsdbTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => f.write_str("Cache"),
            Self::Index => f.write_str("Index"),
        }
    }
}

/// Rows of one table file, parsed but not yet merged.
struct ParsedTable {
    name: String,
    identity: RowIdentity,
    rows: Vec<Byml>,
}

fn parse_table(root: &Utf8Path, path: &Utf8Path, zstd: &Zstd) -> Result<Option<ParsedTable>> {
    let (name, _) = canonicalize(path, root)?;
    let Some(identity) = RowIdentity::for_table(&name) else {
        tracing::trace!("Ignoring RSDB table '{}' without a row identity", name);
        return Ok(None);
    };

    let tree = Byml::from_binary(&read_resource(path, zstd)?)?;
    match tree {
        Byml::Array(rows) => Ok(Some(ParsedTable {
            name,
            identity,
            rows,
        })),
        other => {
            tracing::warn!(
                "Skipping RSDB table '{}': expected an array of rows, found {:?}",
                name,
                other.node_type()
            );
            Ok(None)
        }
    }
}

/// Builds `RsdbCache.bpcc` and `RsdbIndex.bpcc`.
#[derive(Debug, Default)]
pub struct RsdbCacheGenerator {
    tables: IndexMap<u64, RsdbTable>,
}

impl RsdbCacheGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables keyed by the hash of their canonical name, in first-seen order.
    pub fn tables(&self) -> &IndexMap<u64, RsdbTable> {
        &self.tables
    }

    fn merge_table(&mut self, parsed: ParsedTable, version: i32) -> Result<usize> {
        let table = self
            .tables
            .entry(name_hash(&parsed.name))
            .or_insert_with(|| RsdbTable::new(parsed.name.as_str()));

        let mut stored = 0;
        for (index, row) in parsed.rows.into_iter().enumerate() {
            let Some(row_id) = parsed.identity.row_id(&row) else {
                tracing::warn!(
                    "Skipping row {} of '{}': missing identity field {:?}",
                    index,
                    parsed.name,
                    parsed.identity
                );
                continue;
            };
            if table.merge(row_id, RsdbRowEntry::new(version, row))? {
                stored += 1;
            }
        }

        table.is_index_mapping_filled = true;
        Ok(stored)
    }
}

impl sealed::Sealed for RsdbCacheGenerator {}

impl Generator for RsdbCacheGenerator {
    type Tag = RsdbTag;
    type Snapshot<'a> = &'a IndexMap<u64, RsdbTable>;

    const NAME: &'static str = "RsdbCacheGenerator";
    const FILE_NAME: &'static str = "Rsdb{tag}.bpcc";
    const TAGS: &'static [RsdbTag] = &[RsdbTag::Cache, RsdbTag::Index];

    fn generate(&mut self, roots: &[Utf8PathBuf], cancel: &CancellationToken) -> Result<()> {
        for (root, version) in versioned_roots(roots) {
            cancel.check()?;
            let Some(zstd) = load_dictionaries(root, Self::NAME)? else {
                continue;
            };

            let files = list_files(&root.join(RSDB_DIR))?;
            let parsed = files
                .par_iter()
                .map(|path| parse_table(root, path, &zstd))
                .collect::<Result<Vec<_>>>()?;

            let mut stored = 0;
            for table in parsed.into_iter().flatten() {
                stored += self.merge_table(table, version)?;
            }

            tracing::info!(
                "{}: processed version {} ({} new row entries)",
                Self::NAME,
                version,
                stored
            );
        }

        for table in self.tables.values_mut() {
            table.prune();
        }

        tracing::info!(
            "{}: {} tables, {} changed rows",
            Self::NAME,
            self.tables.len(),
            self.tables
                .values()
                .map(|table| table.rows.len())
                .sum::<usize>()
        );
        Ok(())
    }

    fn snapshot(&self) -> Self::Snapshot<'_> {
        &self.tables
    }

    fn write_binary<W: Write>(&self, out: &mut W, tag: RsdbTag) -> Result<()> {
        match tag {
            RsdbTag::Index => {
                write_count(out, self.tables.len())?;
                for (name_hash, table) in &self.tables {
                    out.write_u64::<LE>(*name_hash)?;
                    write_count(out, table.index_mapping.len())?;
                    for (ordinal, row_id) in table.index_mapping.iter().enumerate() {
                        out.write_u64::<LE>(*row_id)?;
                        out.write_i32::<LE>(to_i32(ordinal)?)?;
                    }
                }
            }
            RsdbTag::Cache => {
                let tables: Vec<_> = self
                    .tables
                    .iter()
                    .filter(|(_, table)| !table.rows.is_empty())
                    .collect();

                write_count(out, tables.len())?;
                for (name_hash, table) in tables {
                    out.write_u64::<LE>(*name_hash)?;
                    write_count(out, table.rows.len())?;
                    for (row_id, entries) in &table.rows {
                        out.write_u64::<LE>(*row_id)?;
                        write_count(out, entries.len())?;
                        for entry in entries {
                            let data = entry.row.to_binary()?;
                            out.write_i32::<LE>(entry.version)?;
                            write_count(out, data.len())?;
                            out.write_all(&data)?;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
