//! BYML structured binary trees.
//!
//! BYML documents hold a tree of maps, arrays and scalars. Map keys and string
//! values are interned into two sorted string tables; containers and 64-bit
//! scalars are referenced by offset, everything else is stored inline in a
//! 32-bit slot.
//!
//! [`Byml`] compares and hashes structurally. Floats compare by bit pattern,
//! so two trees are equal exactly when they would serialize to the same
//! document.

mod reader;
mod writer;

use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// Version written by [`Byml::to_binary`].
pub const DEFAULT_VERSION: u16 = 7;

/// Node type codes as stored in the binary format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeType {
    HashMap32 = 0x20,
    HashMap64 = 0x21,
    String = 0xA0,
    Binary = 0xA1,
    File = 0xA2,
    Array = 0xC0,
    Map = 0xC1,
    StringTable = 0xC2,
    Bool = 0xD0,
    I32 = 0xD1,
    F32 = 0xD2,
    U32 = 0xD3,
    I64 = 0xD4,
    U64 = 0xD5,
    F64 = 0xD6,
    Null = 0xFF,
}

impl NodeType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x20 => Self::HashMap32,
            0x21 => Self::HashMap64,
            0xA0 => Self::String,
            0xA1 => Self::Binary,
            0xA2 => Self::File,
            0xC0 => Self::Array,
            0xC1 => Self::Map,
            0xC2 => Self::StringTable,
            0xD0 => Self::Bool,
            0xD1 => Self::I32,
            0xD2 => Self::F32,
            0xD3 => Self::U32,
            0xD4 => Self::I64,
            0xD5 => Self::U64,
            0xD6 => Self::F64,
            0xFF => Self::Null,
            _ => return None,
        })
    }

    /// Containers are stored by offset and carry a type + count header.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            Self::Array | Self::Map | Self::HashMap32 | Self::HashMap64
        )
    }
}

/// A BYML node.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Byml {
    Null,
    Bool(bool),
    I32(i32),
    F32(f32),
    U32(u32),
    I64(i64),
    U64(u64),
    F64(f64),
    String(String),
    Binary(Vec<u8>),
    File { data: Vec<u8>, alignment: u32 },
    Array(Vec<Byml>),
    Map(BTreeMap<String, Byml>),
    HashMap32(BTreeMap<u32, Byml>),
    HashMap64(BTreeMap<u64, Byml>),
}

impl Byml {
    /// Parse a document in either byte order.
    pub fn from_binary(data: &[u8]) -> Result<Self> {
        reader::read(data)
    }

    /// Serialize as a little-endian version 7 document.
    pub fn to_binary(&self) -> Result<Vec<u8>> {
        writer::write(self, DEFAULT_VERSION)
    }

    /// Serialize as a little-endian document with an explicit version.
    pub fn to_binary_version(&self, version: u16) -> Result<Vec<u8>> {
        writer::write(self, version)
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Null => NodeType::Null,
            Self::Bool(_) => NodeType::Bool,
            Self::I32(_) => NodeType::I32,
            Self::F32(_) => NodeType::F32,
            Self::U32(_) => NodeType::U32,
            Self::I64(_) => NodeType::I64,
            Self::U64(_) => NodeType::U64,
            Self::F64(_) => NodeType::F64,
            Self::String(_) => NodeType::String,
            Self::Binary(_) => NodeType::Binary,
            Self::File { .. } => NodeType::File,
            Self::Array(_) => NodeType::Array,
            Self::Map(_) => NodeType::Map,
            Self::HashMap32(_) => NodeType::HashMap32,
            Self::HashMap64(_) => NodeType::HashMap64,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Byml>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Byml]> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Any integer node whose value fits in a `u32`. Signed 32-bit values
    /// are reinterpreted bit for bit.
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Self::U32(value) => Some(value),
            Self::I32(value) => Some(value as u32),
            Self::U64(value) => u32::try_from(value).ok(),
            Self::I64(value) => u32::try_from(value).ok(),
            _ => None,
        }
    }

    /// Any integer node whose value fits in a `u64`. Signed 64-bit values
    /// are reinterpreted bit for bit.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::U64(value) => Some(value),
            Self::I64(value) => Some(value as u64),
            Self::U32(value) => Some(value as u64),
            Self::I32(value) => u64::try_from(value).ok(),
            _ => None,
        }
    }

    /// Look up a key of a string-keyed map.
    pub fn get(&self, key: &str) -> Option<&Byml> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Number of children of a container, `0` for scalars.
    pub fn len(&self) -> usize {
        match self {
            Self::Array(array) => array.len(),
            Self::Map(map) => map.len(),
            Self::HashMap32(map) => map.len(),
            Self::HashMap64(map) => map.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PartialEq for Byml {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::I32(a), Self::I32(b)) => a == b,
            (Self::F32(a), Self::F32(b)) => a.to_bits() == b.to_bits(),
            (Self::U32(a), Self::U32(b)) => a == b,
            (Self::I64(a), Self::I64(b)) => a == b,
            (Self::U64(a), Self::U64(b)) => a == b,
            (Self::F64(a), Self::F64(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Binary(a), Self::Binary(b)) => a == b,
            (
                Self::File {
                    data: a,
                    alignment: align_a,
                },
                Self::File {
                    data: b,
                    alignment: align_b,
                },
            ) => align_a == align_b && a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::HashMap32(a), Self::HashMap32(b)) => a == b,
            (Self::HashMap64(a), Self::HashMap64(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Byml {}

impl Hash for Byml {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.node_type() as u8).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(value) => value.hash(state),
            Self::I32(value) => value.hash(state),
            Self::F32(value) => value.to_bits().hash(state),
            Self::U32(value) => value.hash(state),
            Self::I64(value) => value.hash(state),
            Self::U64(value) => value.hash(state),
            Self::F64(value) => value.to_bits().hash(state),
            Self::String(value) => value.hash(state),
            Self::Binary(data) => data.hash(state),
            Self::File { data, alignment } => {
                data.hash(state);
                alignment.hash(state);
            }
            Self::Array(array) => array.hash(state),
            Self::Map(map) => map.hash(state),
            Self::HashMap32(map) => map.hash(state),
            Self::HashMap64(map) => map.hash(state),
        }
    }
}

impl From<&str> for Byml {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Byml {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl FromIterator<(String, Byml)> for Byml {
    fn from_iter<T: IntoIterator<Item = (String, Byml)>>(iter: T) -> Self {
        Self::Map(iter.into_iter().collect())
    }
}

impl FromIterator<Byml> for Byml {
    fn from_iter<T: IntoIterator<Item = Byml>>(iter: T) -> Self {
        Self::Array(iter.into_iter().collect())
    }
}
