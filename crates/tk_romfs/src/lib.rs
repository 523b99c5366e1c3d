//! Romfs primitives shared by the lookup table generators.
//!
//! A romfs dump is a fully extracted game filesystem for one release of the
//! game. This crate provides the pieces needed to read one:
//!
//! - [`canonical`]: turn an absolute file path into the version independent
//!   canonical name used as a cross-version identity key.
//! - [`version`]: read the release number of a dump.
//! - [`zstd`]: the shared-dictionary zstd codec used by almost every file.
//! - [`sarc`]: the archive container format.
//! - [`byml`]: the structured binary tree format used by game data files.
//! - [`hash`]: the name and content hashes written into lookup tables.

pub mod byml;
pub mod canonical;
pub mod error;
pub mod hash;
pub mod sarc;
pub mod version;
pub mod zstd;

pub use byml::Byml;
pub use canonical::{canonicalize, RomfsFileAttributes};
pub use error::{Error, Result};
pub use sarc::{Sarc, SarcWriter};
pub use version::{romfs_version, romfs_version_or_default, DEFAULT_ROMFS_VERSION};
pub use zstd::Zstd;

/// Location of the zstd dictionary pack relative to a romfs root.
pub const ZSDIC_PACK_PATH: &str = "Pack/ZsDic.pack.zs";
