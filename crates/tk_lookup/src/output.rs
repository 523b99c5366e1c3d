//! Output sink for generator results.
//!
//! For every generator the [`OutputStore`] writes a pretty-printed JSON debug
//! snapshot named `{generator}.debug.json` and one binary per tag named by
//! the generator's file name template. Generators flagged as compressed are
//! written as a zstd frame with a `.zs` suffix.
//!
//! Debug snapshots are best effort: a failure is logged and never fails the
//! run.

use crate::error::Result;
use crate::generator::Generator;
use camino::{Utf8Path, Utf8PathBuf};

/// Suffix appended to compressed outputs.
pub const COMPRESSED_SUFFIX: &str = ".zs";

const COMPRESSION_LEVEL: i32 = 19;

/// Writes generator outputs into one directory.
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: Utf8PathBuf,
    compression: bool,
}

impl OutputStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            compression: true,
        }
    }

    /// Enable or disable compression of generators that request it.
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Path of the binary written for `tag`.
    pub fn binary_path<G: Generator>(&self, tag: G::Tag) -> Utf8PathBuf {
        let mut file_name = G::file_name(tag);
        if G::COMPRESSED && self.compression {
            file_name.push_str(COMPRESSED_SUFFIX);
        }
        self.root.join(file_name)
    }

    pub fn debug_path<G: Generator>(&self) -> Utf8PathBuf {
        self.root.join(format!("{}.debug.json", G::NAME))
    }

    /// Write the debug snapshot and every binary of `generator`. Returns the
    /// binaries written.
    pub fn write<G: Generator>(&self, generator: &G) -> Result<Vec<Utf8PathBuf>> {
        std::fs::create_dir_all(self.root.as_std_path())?;
        self.write_debug_snapshot(generator);

        G::TAGS
            .iter()
            .map(|tag| self.write_binary(generator, *tag))
            .collect()
    }

    /// Write `{generator}.debug.json`, logging instead of failing.
    pub fn write_debug_snapshot<G: Generator>(&self, generator: &G) {
        let path = self.debug_path::<G>();
        let result = serde_json::to_string_pretty(&generator.snapshot())
            .map_err(crate::Error::from)
            .and_then(|json| Ok(std::fs::write(path.as_std_path(), json)?));

        match result {
            Ok(()) => tracing::debug!("{}: wrote debug snapshot '{}'", G::NAME, path),
            Err(e) => tracing::warn!("{}: failed to write debug snapshot: {}", G::NAME, e),
        }
    }

    fn write_binary<G: Generator>(&self, generator: &G, tag: G::Tag) -> Result<Utf8PathBuf> {
        let path = self.binary_path::<G>(tag);

        let mut data = Vec::new();
        generator.write_binary(&mut data, tag)?;
        if G::COMPRESSED && self.compression {
            data = tk_romfs::zstd::compress(&data, COMPRESSION_LEVEL)?;
        }
        std::fs::write(path.as_std_path(), &data)?;

        tracing::info!("{}: wrote '{}' ({} bytes)", G::NAME, path, data.len());
        Ok(path)
    }
}
