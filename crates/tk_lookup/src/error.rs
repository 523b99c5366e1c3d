//! Error types for lookup table generation.
//!
//! All fallible functions in this crate return [`Result<T>`], which uses [`Error`]
//! as the error type. Romfs parsing errors, `std::io::Error` and `serde_json::Error`
//! are converted via `From` impls.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while generating lookup tables.
#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem I/O failed (reading romfs files, writing outputs).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize a debug snapshot.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A romfs file could not be decompressed or parsed.
    #[error("Romfs error: {0}")]
    Romfs(#[from] tk_romfs::Error),

    /// Fewer version roots were supplied than a run needs.
    #[error("At least {required} game dump folders are required, found {found}")]
    NotEnoughVersionRoots { found: usize, required: usize },

    /// A game data tree does not have the expected shape.
    #[error("Invalid game data: {0}")]
    InvalidGameData(String),

    /// Two structurally different rows of an RSDB table share a content hash.
    #[error("Hash collision in RSDB table '{table}' for row {row_id:#018x}")]
    RsdbHashCollision { table: String, row_id: u64 },

    /// The pack lookup parent table does not fit its 16-bit index.
    #[error("Too many distinct pack parents: {0}")]
    TooManyPackParents(usize),

    /// The run was cancelled.
    #[error("Generation was cancelled")]
    Cancelled,

    /// A generator failed; wraps the underlying error with the generator name.
    #[error("{name} failed: {source}")]
    Generator {
        name: &'static str,
        #[source]
        source: Box<Error>,
    },
}
