//! Cross-version lookup tables for extracted game romfs dumps.
//!
//! Given several full dumps of the game filesystem, one per release, this
//! crate reconciles the same logical resources across releases and encodes
//! what changed into compact binary tables consumed by a mod merger:
//!
//! - [`ChecksumGenerator`]: delta-encoded size and content hash of every
//!   resource, including resources nested inside archives.
//! - [`GameDataIndexGenerator`]: per-release row positions of the game data
//!   list tables.
//! - [`PackFileLookupGenerator`]: the owning pack of every packed resource.
//! - [`RsdbCacheGenerator`]: the changed rows of the resource databases.
//!
//! # Example
//!
//! ```no_run
//! use camino::Utf8PathBuf;
//! use tk_lookup::{generate_all, CancellationToken, OutputStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let roots = vec![
//!     Utf8PathBuf::from("/dumps/1.0.0/romfs"),
//!     Utf8PathBuf::from("/dumps/1.1.0/romfs"),
//!     Utf8PathBuf::from("/dumps/1.2.0/romfs"),
//! ];
//!
//! let reports = generate_all(&roots, &OutputStore::new("output"), &CancellationToken::new())?;
//! for report in reports {
//!     println!("{}: {:?}", report.name, report.outputs);
//! }
//! # Ok(())
//! # }
//! ```

mod binary;
pub mod checksum;
pub mod error;
pub mod game_data;
pub mod generator;
pub mod output;
pub mod pack_lookup;
pub mod rsdb;
pub mod run;
pub mod walker;

#[cfg(test)]
mod test_support;

pub use checksum::ChecksumGenerator;
pub use error::{Error, Result};
pub use game_data::GameDataIndexGenerator;
pub use generator::{CancellationToken, Generator};
pub use output::OutputStore;
pub use pack_lookup::PackFileLookupGenerator;
pub use rsdb::RsdbCacheGenerator;
pub use run::{generate_all, GeneratorReport, MIN_VERSION_ROOTS};
