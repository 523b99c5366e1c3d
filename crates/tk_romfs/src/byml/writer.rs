use super::{Byml, NodeType};
use crate::error::{Error, Result};
use byteorder::{ByteOrder, WriteBytesExt, LE};
use std::collections::{BTreeSet, HashMap};

const FORMAT: &str = "BYML";
const MAX_COUNT: usize = 0x00FF_FFFF;

pub(super) fn write(root: &Byml, version: u16) -> Result<Vec<u8>> {
    let mut keys = BTreeSet::new();
    let mut strings = BTreeSet::new();
    collect(root, &mut keys, &mut strings);

    let mut writer = Writer {
        buf: Vec::new(),
        keys: index(&keys),
        strings: index(&strings),
    };
    writer.buf.extend_from_slice(b"YB");
    writer.buf.write_u16::<LE>(version)?;
    writer.buf.extend_from_slice(&[0; 12]);

    if !keys.is_empty() {
        let offset = writer.string_table(&keys)?;
        writer.patch(4, offset);
    }
    if !strings.is_empty() {
        let offset = writer.string_table(&strings)?;
        writer.patch(8, offset);
    }

    match root {
        Byml::Null => {}
        node if node.node_type().is_container() => {
            let offset = writer.container(node)?;
            writer.patch(12, offset);
        }
        other => {
            return Err(Error::malformed(
                FORMAT,
                format!("root must be a container, found {:?}", other.node_type()),
            ))
        }
    }

    Ok(writer.buf)
}

fn collect<'a>(node: &'a Byml, keys: &mut BTreeSet<&'a str>, strings: &mut BTreeSet<&'a str>) {
    match node {
        Byml::String(value) => {
            strings.insert(value.as_str());
        }
        Byml::Array(items) => items.iter().for_each(|item| collect(item, keys, strings)),
        Byml::Map(map) => {
            for (key, item) in map {
                keys.insert(key.as_str());
                collect(item, keys, strings);
            }
        }
        Byml::HashMap32(map) => map.values().for_each(|item| collect(item, keys, strings)),
        Byml::HashMap64(map) => map.values().for_each(|item| collect(item, keys, strings)),
        _ => {}
    }
}

fn index<'a>(table: &BTreeSet<&'a str>) -> HashMap<&'a str, u32> {
    table
        .iter()
        .enumerate()
        .map(|(index, value)| (*value, index as u32))
        .collect()
}

struct Writer<'a> {
    buf: Vec<u8>,
    keys: HashMap<&'a str, u32>,
    strings: HashMap<&'a str, u32>,
}

impl<'a> Writer<'a> {
    fn position(&self) -> Result<u32> {
        u32::try_from(self.buf.len())
            .map_err(|_| Error::malformed(FORMAT, "document exceeds the 32-bit offset range"))
    }

    fn align(&mut self, alignment: usize) {
        let padded = (self.buf.len() + alignment - 1) & !(alignment - 1);
        self.buf.resize(padded, 0);
    }

    fn patch(&mut self, at: usize, value: u32) {
        LE::write_u32(&mut self.buf[at..at + 4], value);
    }

    fn header(&mut self, node_type: NodeType, count: usize) -> Result<()> {
        if count > MAX_COUNT {
            return Err(Error::malformed(
                FORMAT,
                format!("{node_type:?} has too many entries ({count})"),
            ));
        }
        self.buf.push(node_type as u8);
        self.buf.write_u24::<LE>(count as u32)?;
        Ok(())
    }

    fn string_table(&mut self, table: &BTreeSet<&str>) -> Result<u32> {
        self.align(4);
        let start = self.buf.len();
        let offset = self.position()?;
        self.header(NodeType::StringTable, table.len())?;

        let slots = self.buf.len();
        self.buf.resize(slots + (table.len() + 1) * 4, 0);
        for (index, value) in table.iter().enumerate() {
            let relative = (self.buf.len() - start) as u32;
            self.patch(slots + index * 4, relative);
            self.buf.extend_from_slice(value.as_bytes());
            self.buf.push(0);
        }
        let end = (self.buf.len() - start) as u32;
        self.patch(slots + table.len() * 4, end);
        Ok(offset)
    }

    fn container(&mut self, node: &'a Byml) -> Result<u32> {
        self.align(4);
        let offset = self.position()?;
        self.header(node.node_type(), node.len())?;

        match node {
            Byml::Array(items) => {
                self.buf.extend(items.iter().map(|item| item.node_type() as u8));
                self.align(4);
                let slots = self.buf.len();
                self.buf.resize(slots + items.len() * 4, 0);
                for (index, item) in items.iter().enumerate() {
                    let value = self.value(item)?;
                    self.patch(slots + index * 4, value);
                }
            }
            Byml::Map(map) => {
                let slots = self.buf.len();
                for (key, item) in map {
                    let key_index = self.keys.get(key.as_str()).copied().ok_or_else(|| {
                        Error::malformed(FORMAT, format!("key '{key}' missing from key table"))
                    })?;
                    self.buf.write_u24::<LE>(key_index)?;
                    self.buf.push(item.node_type() as u8);
                    self.buf.write_u32::<LE>(0)?;
                }
                for (index, item) in map.values().enumerate() {
                    let value = self.value(item)?;
                    self.patch(slots + index * 8 + 4, value);
                }
            }
            Byml::HashMap32(map) => {
                let slots = self.buf.len();
                for hash in map.keys() {
                    self.buf.write_u32::<LE>(*hash)?;
                    self.buf.write_u32::<LE>(0)?;
                }
                self.buf.extend(map.values().map(|item| item.node_type() as u8));
                self.align(4);
                for (index, item) in map.values().enumerate() {
                    let value = self.value(item)?;
                    self.patch(slots + index * 8 + 4, value);
                }
            }
            Byml::HashMap64(map) => {
                let slots = self.buf.len();
                for hash in map.keys() {
                    self.buf.write_u64::<LE>(*hash)?;
                    self.buf.write_u32::<LE>(0)?;
                }
                self.buf.extend(map.values().map(|item| item.node_type() as u8));
                self.align(4);
                for (index, item) in map.values().enumerate() {
                    let value = self.value(item)?;
                    self.patch(slots + index * 12 + 8, value);
                }
            }
            other => {
                return Err(Error::malformed(
                    FORMAT,
                    format!("{:?} is not a container", other.node_type()),
                ))
            }
        }

        Ok(offset)
    }

    /// Encode a node into its 32-bit value slot, writing out-of-line data
    /// to the end of the buffer.
    fn value(&mut self, node: &'a Byml) -> Result<u32> {
        Ok(match node {
            Byml::Null => 0,
            Byml::Bool(value) => u32::from(*value),
            Byml::I32(value) => *value as u32,
            Byml::F32(value) => value.to_bits(),
            Byml::U32(value) => *value,
            Byml::String(value) => self.strings.get(value.as_str()).copied().ok_or_else(|| {
                Error::malformed(FORMAT, format!("string '{value}' missing from string table"))
            })?,
            Byml::I64(value) => self.long(*value as u64)?,
            Byml::U64(value) => self.long(*value)?,
            Byml::F64(value) => self.long(value.to_bits())?,
            Byml::Binary(data) => {
                self.align(4);
                let offset = self.position()?;
                self.buf.write_u32::<LE>(data.len() as u32)?;
                self.buf.extend_from_slice(data);
                offset
            }
            Byml::File { data, alignment } => {
                self.align(4);
                let offset = self.position()?;
                self.buf.write_u32::<LE>(data.len() as u32)?;
                self.buf.write_u32::<LE>(*alignment)?;
                self.buf.extend_from_slice(data);
                offset
            }
            Byml::Array(_) | Byml::Map(_) | Byml::HashMap32(_) | Byml::HashMap64(_) => {
                self.container(node)?
            }
        })
    }

    fn long(&mut self, value: u64) -> Result<u32> {
        self.align(8);
        let offset = self.position()?;
        self.buf.write_u64::<LE>(value)?;
        Ok(offset)
    }
}
