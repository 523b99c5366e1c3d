//! Zstd decompression with the game's shared dictionaries.
//!
//! Almost every `.zs` file in a dump is compressed against one of the
//! dictionaries stored in `Pack/ZsDic.pack.zs`. The dictionary pack itself is
//! a plain zstd frame holding a SARC of `*.zsdic` files. Each frame header
//! names the dictionary it needs by id, so a [`Zstd`] context keeps every
//! dictionary of one release indexed by id.

use crate::error::{Error, Result};
use crate::sarc::Sarc;
use byteorder::{ByteOrder, LE};
use camino::Utf8Path;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use zstd::dict::DDict;
use zstd::zstd_safe::DCtx;

/// Magic bytes at the start of every zstd frame.
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Magic bytes at the start of a formatted zstd dictionary.
const DICTIONARY_MAGIC: [u8; 4] = [0x37, 0xA4, 0x30, 0xEC];

const DICTIONARY_EXTENSION: &str = ".zsdic";

/// Fields of a zstd frame header that matter for decompression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Decompressed size, when the frame declares it.
    pub content_size: Option<u64>,
    /// Id of the dictionary the frame was compressed with (`0` for none).
    pub dictionary_id: u32,
}

/// Whether `data` starts with a zstd frame.
pub fn is_compressed(data: &[u8]) -> bool {
    data.starts_with(&ZSTD_MAGIC)
}

/// Parse the header of the zstd frame at the start of `data`.
pub fn frame_header(data: &[u8]) -> Result<FrameHeader> {
    if !is_compressed(data) {
        return Err(Error::InvalidMagic {
            format: "zstd",
            found: data.iter().take(4).copied().collect(),
        });
    }

    let descriptor = *data.get(4).ok_or_else(|| Error::truncated("zstd", 4))?;
    let content_size_flag = descriptor >> 6;
    let single_segment = descriptor & 0x20 != 0;
    let dictionary_id_flag = descriptor & 0x03;

    let mut offset = 5;
    if !single_segment {
        // Window descriptor
        offset += 1;
    }

    let dictionary_id_size = [0usize, 1, 2, 4][dictionary_id_flag as usize];
    let dictionary_id = read_le(data, offset, dictionary_id_size)? as u32;
    offset += dictionary_id_size;

    let content_size_size = match content_size_flag {
        0 if single_segment => 1,
        0 => 0,
        1 => 2,
        2 => 4,
        _ => 8,
    };
    let content_size = match content_size_size {
        0 => None,
        2 => Some(read_le(data, offset, 2)? + 256),
        size => Some(read_le(data, offset, size)?),
    };

    Ok(FrameHeader {
        content_size,
        dictionary_id,
    })
}

/// Decompressed size declared by the zstd frame at the start of `data`.
pub fn decompressed_size(data: &[u8]) -> Result<usize> {
    frame_header(data)?
        .content_size
        .map(|size| size as usize)
        .ok_or(Error::UnknownContentSize)
}

/// Id declared by a formatted dictionary, `None` for raw-content dictionaries.
pub fn dictionary_id(dictionary: &[u8]) -> Option<u32> {
    if !dictionary.starts_with(&DICTIONARY_MAGIC) || dictionary.len() < 8 {
        return None;
    }
    Some(LE::read_u32(&dictionary[4..8]))
}

fn read_le(data: &[u8], offset: usize, size: usize) -> Result<u64> {
    if size == 0 {
        return Ok(0);
    }
    let bytes = data
        .get(offset..offset + size)
        .ok_or_else(|| Error::truncated("zstd", offset))?;
    Ok(LE::read_uint(bytes, size))
}

/// Compress `data` into a single zstd frame without a dictionary.
pub fn compress(data: &[u8], level: i32) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut encoder = zstd::Encoder::new(&mut out, level)?;
    encoder.include_contentsize(true)?;
    encoder.set_pledged_src_size(Some(data.len() as u64))?;
    encoder.write_all(data)?;
    encoder.finish()?;
    Ok(out)
}

/// Zstd codec context holding the dictionaries of one romfs release.
///
/// Dictionaries are digested once when loaded and shared by every
/// decompression afterwards.
#[derive(Default)]
pub struct Zstd {
    dictionaries: HashMap<u32, DDict<'static>>,
}

impl fmt::Debug for Zstd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.dictionaries.keys().collect();
        ids.sort();
        f.debug_struct("Zstd").field("dictionaries", &ids).finish()
    }
}

impl Zstd {
    /// A context without dictionaries; only plain frames can be decompressed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the dictionaries from a `ZsDic.pack.zs` file, replacing any
    /// previously loaded set. Returns the number of dictionaries loaded.
    pub fn load_dictionaries(&mut self, path: &Utf8Path) -> Result<usize> {
        let data = std::fs::read(path.as_std_path())?;
        self.load_dictionary_pack(&data)
    }

    /// Load the dictionaries from the bytes of a dictionary pack.
    pub fn load_dictionary_pack(&mut self, data: &[u8]) -> Result<usize> {
        let decompressed;
        let pack = if is_compressed(data) {
            decompressed = Self::new().decompress(data)?;
            &decompressed[..]
        } else {
            data
        };

        let sarc = Sarc::parse(pack)?;
        let mut dictionaries = HashMap::new();
        for entry in sarc.iter() {
            if !entry.name.ends_with(DICTIONARY_EXTENSION) {
                continue;
            }

            match prepare_dictionary(entry.data) {
                Some((id, dictionary)) => {
                    tracing::trace!("Loaded zstd dictionary '{}' (id {})", entry.name, id);
                    dictionaries.insert(id, dictionary);
                }
                None => {
                    tracing::warn!("Ignoring invalid zstd dictionary '{}'", entry.name);
                }
            }
        }

        self.dictionaries = dictionaries;
        Ok(self.dictionaries.len())
    }

    /// Register a single formatted dictionary. Returns its id, or `None` when
    /// the dictionary has no id or zstd rejects it.
    pub fn add_dictionary(&mut self, dictionary: &[u8]) -> Option<u32> {
        let (id, dictionary) = prepare_dictionary(dictionary)?;
        self.dictionaries.insert(id, dictionary);
        Some(id)
    }

    pub fn dictionary_count(&self) -> usize {
        self.dictionaries.len()
    }

    /// Decompress a single zstd frame, picking the dictionary named in its
    /// header.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let header = frame_header(data)?;

        if header.dictionary_id == 0 {
            return Ok(match header.content_size {
                Some(size) => zstd::bulk::decompress(data, size as usize)?,
                None => zstd::decode_all(data)?,
            });
        }

        let dictionary = self
            .dictionaries
            .get(&header.dictionary_id)
            .ok_or(Error::MissingDictionary(header.dictionary_id))?;
        let capacity = header.content_size.ok_or(Error::UnknownContentSize)? as usize;

        let mut out = Vec::with_capacity(capacity);
        DCtx::create()
            .decompress_using_ddict(&mut out, data, dictionary)
            .map_err(|code| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    zstd::zstd_safe::get_error_name(code),
                )
            })?;
        Ok(out)
    }
}

/// Digest a formatted dictionary once so every frame can reuse it.
fn prepare_dictionary(dictionary: &[u8]) -> Option<(u32, DDict<'static>)> {
    let id = dictionary_id(dictionary)?;
    let prepared = DDict::try_create(dictionary)?;
    Some((id, prepared))
}
