//! SARC archive reading and writing.
//!
//! A SARC bundles named files into one blob: a fixed header, an `SFAT` table
//! of nodes sorted by name hash, an `SFNT` table of null-terminated names and
//! finally the (aligned) file data. Only the little-endian layout used by the
//! Switch releases is supported.

use crate::error::{Error, Result};
use binrw::{binrw, BinRead, BinWrite};
use std::collections::BTreeMap;
use std::io::{Cursor, Seek, SeekFrom, Write};

const FORMAT: &str = "SARC";
const BOM_LITTLE_ENDIAN: u16 = 0xFEFF;
const SARC_VERSION: u16 = 0x0100;
const DEFAULT_HASH_KEY: u32 = 0x65;
const DEFAULT_ALIGNMENT: usize = 8;
const NAME_PRESENT_FLAG: u32 = 0xFF00_0000;
const NAME_OFFSET_MASK: u32 = 0x00FF_FFFF;

#[binrw]
#[brw(little, magic = b"SARC")]
#[derive(Debug, Clone, Copy)]
struct SarcHeader {
    header_size: u16,
    bom: u16,
    file_size: u32,
    data_offset: u32,
    #[brw(pad_after = 2)]
    version: u16,
}

#[binrw]
#[brw(little, magic = b"SFAT")]
#[derive(Debug, Clone, Copy)]
struct SfatHeader {
    header_size: u16,
    node_count: u16,
    hash_key: u32,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy)]
struct SfatNode {
    name_hash: u32,
    attributes: u32,
    data_start: u32,
    data_end: u32,
}

#[binrw]
#[brw(little, magic = b"SFNT")]
#[derive(Debug, Clone, Copy)]
struct SfntHeader {
    #[brw(pad_after = 2)]
    header_size: u16,
}

const SARC_HEADER_SIZE: usize = 0x14;
const SFAT_HEADER_SIZE: usize = 0x0C;
const SFAT_NODE_SIZE: usize = 0x10;
const SFNT_HEADER_SIZE: usize = 0x08;

/// Hash a file name the way the SFAT node table does.
pub fn sarc_name_hash(name: &str, key: u32) -> u32 {
    name.bytes().fold(0u32, |hash, byte| {
        hash.wrapping_mul(key).wrapping_add(byte as i8 as i32 as u32)
    })
}

/// A named file inside a [`Sarc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SarcEntry<'a> {
    pub name: &'a str,
    pub data: &'a [u8],
}

/// A parsed SARC archive borrowing its entries from the source buffer.
#[derive(Debug, Clone)]
pub struct Sarc<'a> {
    hash_key: u32,
    entries: Vec<SarcEntry<'a>>,
}

impl<'a> Sarc<'a> {
    pub const MAGIC: [u8; 4] = *b"SARC";

    /// Whether `data` starts with the SARC magic.
    pub fn is_sarc(data: &[u8]) -> bool {
        data.starts_with(&Self::MAGIC)
    }

    /// Parse an archive. Entry names and data borrow from `data`.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if !Self::is_sarc(data) {
            return Err(Error::InvalidMagic {
                format: FORMAT,
                found: data.iter().take(4).copied().collect(),
            });
        }

        let mut reader = Cursor::new(data);
        let header = SarcHeader::read(&mut reader)?;

        if header.bom != BOM_LITTLE_ENDIAN {
            return Err(Error::UnsupportedByteOrder {
                format: FORMAT,
                bom: header.bom,
            });
        }
        if header.version != SARC_VERSION {
            return Err(Error::malformed(
                FORMAT,
                format!("unsupported version {:#06x}", header.version),
            ));
        }
        if header.file_size as usize > data.len() {
            return Err(Error::truncated(FORMAT, data.len()));
        }

        let sfat_offset = header.header_size as u64;
        reader.seek(SeekFrom::Start(sfat_offset))?;
        let sfat = SfatHeader::read(&mut reader)?;

        reader.seek(SeekFrom::Start(sfat_offset + sfat.header_size as u64))?;
        let nodes = (0..sfat.node_count)
            .map(|_| SfatNode::read(&mut reader))
            .collect::<binrw::BinResult<Vec<_>>>()?;

        let sfnt_offset = reader.position();
        let sfnt = SfntHeader::read(&mut reader)?;
        let names_offset = (sfnt_offset + sfnt.header_size as u64) as usize;
        let data_offset = header.data_offset as usize;

        let entries = nodes
            .iter()
            .map(|node| {
                let name = read_node_name(data, names_offset, node)?;
                let start = data_offset + node.data_start as usize;
                let end = data_offset + node.data_end as usize;
                if start > end {
                    return Err(Error::malformed(
                        FORMAT,
                        format!("entry '{name}' ends before it starts"),
                    ));
                }
                let file_data = data
                    .get(start..end)
                    .ok_or_else(|| Error::truncated(FORMAT, end))?;

                Ok(SarcEntry {
                    name,
                    data: file_data,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            hash_key: sfat.hash_key,
            entries,
        })
    }

    /// The multiplier used for SFAT name hashes.
    pub fn hash_key(&self) -> u32 {
        self.hash_key
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in node table order.
    pub fn iter(&self) -> impl Iterator<Item = SarcEntry<'a>> + '_ {
        self.entries.iter().copied()
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&'a [u8]> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.data)
    }
}

fn read_node_name<'a>(data: &'a [u8], names_offset: usize, node: &SfatNode) -> Result<&'a str> {
    if node.attributes & NAME_PRESENT_FLAG == 0 {
        return Err(Error::malformed(
            FORMAT,
            format!("entry {:#010x} has no name", node.name_hash),
        ));
    }

    let start = names_offset + (node.attributes & NAME_OFFSET_MASK) as usize * 4;
    let tail = data
        .get(start..)
        .ok_or_else(|| Error::truncated(FORMAT, start))?;
    let len = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::truncated(FORMAT, data.len()))?;

    std::str::from_utf8(&tail[..len])
        .map_err(|e| Error::malformed(FORMAT, format!("entry name is not UTF-8: {e}")))
}

/// Builds little-endian SARC archives.
///
/// # Example
///
/// ```
/// use tk_romfs::{Sarc, SarcWriter};
///
/// let bytes = SarcWriter::new()
///     .with_file("Actor/Test.bgyml", b"data".to_vec())
///     .to_binary()
///     .unwrap();
///
/// let sarc = Sarc::parse(&bytes).unwrap();
/// assert_eq!(sarc.get("Actor/Test.bgyml"), Some(&b"data"[..]));
/// ```
#[derive(Debug, Clone)]
pub struct SarcWriter {
    files: BTreeMap<String, Vec<u8>>,
    alignment: usize,
    hash_key: u32,
}

impl Default for SarcWriter {
    fn default() -> Self {
        Self {
            files: BTreeMap::new(),
            alignment: DEFAULT_ALIGNMENT,
            hash_key: DEFAULT_HASH_KEY,
        }
    }
}

impl SarcWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the alignment of every file's data (must be a power of two).
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment.max(1).next_power_of_two();
        self
    }

    /// Add a file, replacing any existing file with the same name.
    pub fn with_file(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.add_file(name, data);
        self
    }

    /// Add a file, replacing any existing file with the same name.
    pub fn add_file(&mut self, name: impl Into<String>, data: Vec<u8>) {
        self.files.insert(name.into(), data);
    }

    /// Serialize the archive.
    pub fn to_binary(&self) -> Result<Vec<u8>> {
        let mut nodes: Vec<(u32, &str, &[u8])> = self
            .files
            .iter()
            .map(|(name, data)| (sarc_name_hash(name, self.hash_key), name.as_str(), &data[..]))
            .collect();
        nodes.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

        let mut names = Vec::new();
        let mut name_offsets = Vec::with_capacity(nodes.len());
        for (_, name, _) in &nodes {
            name_offsets.push(names.len());
            names.extend_from_slice(name.as_bytes());
            names.push(0);
            names.resize(align(names.len(), 4), 0);
        }

        let tables_size = SARC_HEADER_SIZE
            + SFAT_HEADER_SIZE
            + nodes.len() * SFAT_NODE_SIZE
            + SFNT_HEADER_SIZE
            + names.len();
        let data_offset = align(tables_size, self.alignment);

        let mut data_ranges = Vec::with_capacity(nodes.len());
        let mut data_len = 0usize;
        for (_, _, data) in &nodes {
            let start = align(data_len, self.alignment);
            data_ranges.push((start, start + data.len()));
            data_len = start + data.len();
        }

        let file_size = data_offset + data_len;
        let node_count = u16::try_from(nodes.len())
            .map_err(|_| Error::malformed(FORMAT, "too many files for one archive"))?;

        let mut writer = Cursor::new(Vec::with_capacity(file_size));
        SarcHeader {
            header_size: SARC_HEADER_SIZE as u16,
            bom: BOM_LITTLE_ENDIAN,
            file_size: to_u32(file_size)?,
            data_offset: to_u32(data_offset)?,
            version: SARC_VERSION,
        }
        .write(&mut writer)?;

        SfatHeader {
            header_size: SFAT_HEADER_SIZE as u16,
            node_count,
            hash_key: self.hash_key,
        }
        .write(&mut writer)?;

        let mut previous_hash = None;
        let mut collision_index = 0u32;
        for ((hash, _, _), (name_offset, (start, end))) in nodes
            .iter()
            .zip(name_offsets.iter().zip(data_ranges.iter()))
        {
            collision_index = if previous_hash == Some(*hash) {
                collision_index + 1
            } else {
                1
            };
            previous_hash = Some(*hash);

            SfatNode {
                name_hash: *hash,
                attributes: (collision_index << 24) | (*name_offset / 4) as u32,
                data_start: to_u32(*start)?,
                data_end: to_u32(*end)?,
            }
            .write(&mut writer)?;
        }

        SfntHeader {
            header_size: SFNT_HEADER_SIZE as u16,
        }
        .write(&mut writer)?;
        writer.write_all(&names)?;

        let mut output = writer.into_inner();
        output.resize(data_offset, 0);
        for ((_, _, data), (start, _)) in nodes.iter().zip(data_ranges.iter()) {
            output.resize(data_offset + start, 0);
            output.extend_from_slice(data);
        }

        Ok(output)
    }
}

fn align(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::malformed(FORMAT, "archive exceeds 4 GiB"))
}
