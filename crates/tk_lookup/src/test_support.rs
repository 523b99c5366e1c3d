//! Romfs dump fixtures for generator tests.

use camino::{Utf8Path, Utf8PathBuf};
use std::sync::OnceLock;
use tempfile::TempDir;
use tk_romfs::{Byml, SarcWriter, ZSDIC_PACK_PATH};

pub struct RomfsFixture {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl RomfsFixture {
    /// A dump with version metadata and a dictionary pack holding
    /// [`dictionary`] as `zs.zsdic`.
    pub fn new(version: i32) -> Self {
        let fixture = Self::without_dictionaries(version);
        let pack = SarcWriter::new()
            .with_file("zs.zsdic", dictionary().to_vec())
            .to_binary()
            .unwrap();
        fixture.write_compressed(ZSDIC_PACK_PATH, &pack);
        fixture
    }

    pub fn without_dictionaries(version: i32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let fixture = Self { _dir: dir, root };
        fixture.write(
            "System/RegionLangMask.txt",
            format!("Mask\nRegion\n{}\n", version).as_bytes(),
        );
        fixture
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn write(&self, relative: &str, data: &[u8]) {
        let path = self.root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    pub fn write_compressed(&self, relative: &str, data: &[u8]) {
        self.write(relative, &tk_romfs::zstd::compress(data, 3).unwrap());
    }

    /// Write `data` as a frame compressed against the fixture dictionary,
    /// the way nearly every file of a real dump is stored.
    pub fn write_dictionary_compressed(&self, relative: &str, data: &[u8]) {
        self.write(relative, &compress_with_dictionary(data));
    }

    pub fn write_byml(&self, relative: &str, document: &Byml) {
        self.write_compressed(relative, &document.to_binary().unwrap());
    }
}

pub fn roots(fixtures: &[&RomfsFixture]) -> Vec<Utf8PathBuf> {
    fixtures
        .iter()
        .map(|fixture| fixture.root().to_path_buf())
        .collect()
}

/// Dictionary shared by every fixture, trained once per test binary.
pub fn dictionary() -> &'static [u8] {
    static DICTIONARY: OnceLock<Vec<u8>> = OnceLock::new();
    DICTIONARY.get_or_init(|| {
        let samples: Vec<Vec<u8>> = (0..1024u32)
            .map(|i| {
                format!(
                    "Actor/Enemy_{:03}.engine__actor__ActorParam.bgyml Life={} Attack={} Weapon_{}",
                    i % 97,
                    i * 13 % 700,
                    i * 7 % 90,
                    i % 23
                )
                .into_bytes()
            })
            .collect();
        zstd::dict::from_samples(&samples, 2048).unwrap()
    })
}

pub fn compress_with_dictionary(data: &[u8]) -> Vec<u8> {
    zstd::bulk::Compressor::with_dictionary(3, dictionary())
        .unwrap()
        .compress(data)
        .unwrap()
}
