//! Error types for romfs parsing.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading romfs files.
#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem I/O failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A fixed-layout header could not be read or written.
    #[error("Binary layout error: {0}")]
    Binary(#[from] binrw::Error),

    /// The data does not start with the expected magic bytes.
    #[error("Invalid {format} magic: {found:02x?}")]
    InvalidMagic {
        format: &'static str,
        found: Vec<u8>,
    },

    /// Only little-endian containers are supported.
    #[error("Unsupported {format} byte order mark: {bom:#06x}")]
    UnsupportedByteOrder { format: &'static str, bom: u16 },

    /// An offset or length points outside the buffer.
    #[error("{format} data is truncated at offset {offset:#x}")]
    Truncated { format: &'static str, offset: usize },

    /// The data is structurally invalid.
    #[error("Malformed {format} data: {reason}")]
    Malformed {
        format: &'static str,
        reason: String,
    },

    /// A zstd frame references a dictionary that was never loaded.
    #[error("Missing zstd dictionary with id {0}")]
    MissingDictionary(u32),

    /// A zstd frame header does not declare its decompressed size.
    #[error("Zstd frame does not declare a content size")]
    UnknownContentSize,

    /// The path is not located below the romfs root it was resolved against.
    #[error("Path '{path}' is not inside romfs root '{root}'")]
    OutsideRoot {
        path: Utf8PathBuf,
        root: Utf8PathBuf,
    },

    /// The romfs version metadata is missing or unreadable.
    #[error("Invalid romfs version metadata in '{0}'")]
    InvalidVersion(Utf8PathBuf),
}

impl Error {
    pub(crate) fn truncated(format: &'static str, offset: usize) -> Self {
        Self::Truncated { format, offset }
    }

    pub(crate) fn malformed(format: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            format,
            reason: reason.into(),
        }
    }
}
