use super::{Byml, NodeType};
use crate::error::{Error, Result};
use byteorder::{ByteOrder, BE, LE};
use std::collections::BTreeMap;
use std::marker::PhantomData;

const FORMAT: &str = "BYML";
const MAX_DEPTH: usize = 256;

pub(super) fn read(data: &[u8]) -> Result<Byml> {
    match data {
        [b'Y', b'B', ..] => Reader::<LE>::new(data)?.read_root(),
        [b'B', b'Y', ..] => Reader::<BE>::new(data)?.read_root(),
        [_, _, ..] => Err(Error::InvalidMagic {
            format: FORMAT,
            found: data[..2].to_vec(),
        }),
        _ => Err(Error::truncated(FORMAT, 0)),
    }
}

struct Reader<'a, E> {
    data: &'a [u8],
    keys: Vec<String>,
    strings: Vec<String>,
    root: u32,
    _order: PhantomData<E>,
}

impl<'a, E: ByteOrder> Reader<'a, E> {
    fn new(data: &'a [u8]) -> Result<Self> {
        let version = E::read_u16(slice(data, 2, 2)?);
        if !(2..=7).contains(&version) {
            return Err(Error::malformed(
                FORMAT,
                format!("unsupported version {version}"),
            ));
        }

        let mut reader = Self {
            data,
            keys: Vec::new(),
            strings: Vec::new(),
            root: 0,
            _order: PhantomData,
        };
        let keys_offset = reader.u32_at(4)?;
        let strings_offset = reader.u32_at(8)?;
        reader.root = reader.u32_at(12)?;
        reader.keys = reader.string_table(keys_offset)?;
        reader.strings = reader.string_table(strings_offset)?;
        Ok(reader)
    }

    fn read_root(&self) -> Result<Byml> {
        if self.root == 0 {
            return Ok(Byml::Null);
        }
        self.container(self.root as usize, 0)
    }

    fn u32_at(&self, offset: usize) -> Result<u32> {
        Ok(E::read_u32(slice(self.data, offset, 4)?))
    }

    fn u64_at(&self, offset: usize) -> Result<u64> {
        Ok(E::read_u64(slice(self.data, offset, 8)?))
    }

    fn u8_at(&self, offset: usize) -> Result<u8> {
        self.data
            .get(offset)
            .copied()
            .ok_or_else(|| Error::truncated(FORMAT, offset))
    }

    /// Container header: type byte followed by a 24-bit element count.
    fn header(&self, offset: usize) -> Result<(u8, usize)> {
        let node_type = self.u8_at(offset)?;
        let count = E::read_u24(slice(self.data, offset + 1, 3)?) as usize;
        Ok((node_type, count))
    }

    fn string_table(&self, offset: u32) -> Result<Vec<String>> {
        if offset == 0 {
            return Ok(Vec::new());
        }
        let offset = offset as usize;
        let (node_type, count) = self.header(offset)?;
        if node_type != NodeType::StringTable as u8 {
            return Err(Error::malformed(
                FORMAT,
                format!("expected string table at {offset:#x}, found type {node_type:#04x}"),
            ));
        }

        (0..count)
            .map(|index| {
                let start = offset + self.u32_at(offset + 4 + index * 4)? as usize;
                let tail = self
                    .data
                    .get(start..)
                    .ok_or_else(|| Error::truncated(FORMAT, start))?;
                let len = tail
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or_else(|| Error::truncated(FORMAT, start))?;
                String::from_utf8(tail[..len].to_vec())
                    .map_err(|_| Error::malformed(FORMAT, format!("invalid UTF-8 at {start:#x}")))
            })
            .collect()
    }

    fn container(&self, offset: usize, depth: usize) -> Result<Byml> {
        if depth > MAX_DEPTH {
            return Err(Error::malformed(FORMAT, "container nesting is too deep"));
        }
        let (node_type, count) = self.header(offset)?;
        match NodeType::from_u8(node_type) {
            Some(NodeType::Array) => {
                let types = slice(self.data, offset + 4, count)?;
                let values = offset + 4 + align4(count);
                let mut array = Vec::with_capacity(count);
                for (index, &child) in types.iter().enumerate() {
                    let value = self.u32_at(values + index * 4)?;
                    array.push(self.node(child, value, depth)?);
                }
                Ok(Byml::Array(array))
            }
            Some(NodeType::Map) => {
                let mut map = BTreeMap::new();
                for index in 0..count {
                    let entry = offset + 4 + index * 8;
                    let key_index = E::read_u24(slice(self.data, entry, 3)?) as usize;
                    let child = self.u8_at(entry + 3)?;
                    let value = self.u32_at(entry + 4)?;
                    let key = self.keys.get(key_index).ok_or_else(|| {
                        Error::malformed(FORMAT, format!("key index {key_index} out of range"))
                    })?;
                    map.insert(key.clone(), self.node(child, value, depth)?);
                }
                Ok(Byml::Map(map))
            }
            Some(NodeType::HashMap32) => {
                let types = offset + 4 + count * 8;
                let mut map = BTreeMap::new();
                for index in 0..count {
                    let entry = offset + 4 + index * 8;
                    let hash = self.u32_at(entry)?;
                    let value = self.u32_at(entry + 4)?;
                    let child = self.u8_at(types + index)?;
                    map.insert(hash, self.node(child, value, depth)?);
                }
                Ok(Byml::HashMap32(map))
            }
            Some(NodeType::HashMap64) => {
                let types = offset + 4 + count * 12;
                let mut map = BTreeMap::new();
                for index in 0..count {
                    let entry = offset + 4 + index * 12;
                    let hash = self.u64_at(entry)?;
                    let value = self.u32_at(entry + 8)?;
                    let child = self.u8_at(types + index)?;
                    map.insert(hash, self.node(child, value, depth)?);
                }
                Ok(Byml::HashMap64(map))
            }
            _ => Err(Error::malformed(
                FORMAT,
                format!("expected container at {offset:#x}, found type {node_type:#04x}"),
            )),
        }
    }

    fn node(&self, node_type: u8, value: u32, depth: usize) -> Result<Byml> {
        let offset = value as usize;
        let node_type = NodeType::from_u8(node_type).ok_or_else(|| {
            Error::malformed(FORMAT, format!("unknown node type {node_type:#04x}"))
        })?;
        Ok(match node_type {
            NodeType::Null => Byml::Null,
            NodeType::Bool => Byml::Bool(value != 0),
            NodeType::I32 => Byml::I32(value as i32),
            NodeType::F32 => Byml::F32(f32::from_bits(value)),
            NodeType::U32 => Byml::U32(value),
            NodeType::I64 => Byml::I64(self.u64_at(offset)? as i64),
            NodeType::U64 => Byml::U64(self.u64_at(offset)?),
            NodeType::F64 => Byml::F64(f64::from_bits(self.u64_at(offset)?)),
            NodeType::String => Byml::String(
                self.strings
                    .get(offset)
                    .cloned()
                    .ok_or_else(|| {
                        Error::malformed(FORMAT, format!("string index {value} out of range"))
                    })?,
            ),
            NodeType::Binary => {
                let size = self.u32_at(offset)? as usize;
                Byml::Binary(slice(self.data, offset + 4, size)?.to_vec())
            }
            NodeType::File => {
                let size = self.u32_at(offset)? as usize;
                let alignment = self.u32_at(offset + 4)?;
                Byml::File {
                    data: slice(self.data, offset + 8, size)?.to_vec(),
                    alignment,
                }
            }
            NodeType::Array | NodeType::Map | NodeType::HashMap32 | NodeType::HashMap64 => {
                self.container(offset, depth + 1)?
            }
            NodeType::StringTable => {
                return Err(Error::malformed(FORMAT, "string table used as a value"))
            }
        })
    }
}

fn slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| Error::truncated(FORMAT, offset))
}

fn align4(value: usize) -> usize {
    (value + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_big_endian_array() {
        let data = [
            b'B', b'Y', 0x00, 0x02, // magic, version
            0, 0, 0, 0, // keys
            0, 0, 0, 0, // strings
            0, 0, 0, 0x10, // root
            0xC0, 0, 0, 1, // array, one element
            0xD1, 0, 0, 0, // i32 + padding
            0, 0, 0, 0x2A,
        ];
        assert_eq!(read(&data).unwrap(), Byml::Array(vec![Byml::I32(42)]));
    }

    #[test]
    fn test_read_empty_document() {
        let data = [b'Y', b'B', 7, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(read(&data).unwrap(), Byml::Null);
    }

    #[test]
    fn test_rejects_bad_magic() {
        assert!(matches!(
            read(b"XXXX"),
            Err(Error::InvalidMagic { format: "BYML", .. })
        ));
    }

    #[test]
    fn test_rejects_unsupported_version() {
        let data = [b'Y', b'B', 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(read(&data), Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_truncated_root() {
        let data = [b'Y', b'B', 7, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x10, 0, 0, 0, 0xC0];
        assert!(matches!(read(&data), Err(Error::Truncated { .. })));
    }
}
