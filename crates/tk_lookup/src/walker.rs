//! Archive walking over a romfs root.
//!
//! [`ArchiveWalker`] visits every resource reachable below a directory of a
//! romfs dump, including resources nested inside SARC containers. Each visited
//! node is handed to the caller as `(canonical name, decompressed bytes)`:
//!
//! - files are canonicalized against the romfs root;
//! - zstd frames are decompressed with the dump's shared dictionaries;
//! - SARC payloads are opened and their entries visited recursively. Entries
//!   of a `.pack` container keep their own name, entries of any other
//!   container are named `container/entry`.
//!
//! Sibling directories and files are walked in parallel, so the visitor must
//! synchronize any shared state it mutates.

use crate::error::{Error, Result};
use crate::generator::CancellationToken;
use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use tk_romfs::{canonicalize, RomfsFileAttributes, Sarc, Zstd, ZSDIC_PACK_PATH};
use walkdir::WalkDir;

/// Extension of containers whose entries share the global namespace.
const PASS_THROUGH_EXTENSION: &str = ".pack";

/// Recursive walker over the files and nested containers of one romfs root.
pub struct ArchiveWalker<'a> {
    root: &'a Utf8Path,
    zstd: &'a Zstd,
    cancel: &'a CancellationToken,
}

impl<'a> ArchiveWalker<'a> {
    pub fn new(root: &'a Utf8Path, zstd: &'a Zstd, cancel: &'a CancellationToken) -> Self {
        Self { root, zstd, cancel }
    }

    /// Visit every node below `dir`.
    ///
    /// Symbolic links are followed; dangling links are skipped with a warning.
    /// Files stored with the unsupported `.mc` compression are skipped.
    /// Files that fail to decompress or parse are skipped with a warning;
    /// I/O failures and cancellation abort the walk.
    pub fn walk<F>(&self, dir: &Utf8Path, visit: &F) -> Result<()>
    where
        F: Fn(&str, &[u8]) + Sync,
    {
        self.cancel.check()?;

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(dir.as_std_path())? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let is_dir = if file_type.is_symlink() {
                match std::fs::metadata(entry.path()) {
                    Ok(target) => target.is_dir(),
                    Err(e) => {
                        tracing::warn!(
                            "Skipping broken link '{}': {}",
                            entry.path().display(),
                            e
                        );
                        continue;
                    }
                }
            } else {
                file_type.is_dir()
            };
            match Utf8PathBuf::from_path_buf(entry.path()) {
                Ok(path) => entries.push((path, is_dir)),
                Err(path) => {
                    tracing::warn!("Skipping non-UTF-8 path: {}", path.display());
                }
            }
        }

        entries.par_iter().try_for_each(|(path, is_dir)| {
            if *is_dir {
                self.walk(path, visit)
            } else {
                self.walk_file(path, visit)
            }
        })
    }

    fn walk_file<F>(&self, path: &Utf8Path, visit: &F) -> Result<()>
    where
        F: Fn(&str, &[u8]) + Sync,
    {
        let (canonical, attributes) = canonicalize(path, self.root)?;
        if attributes.contains(RomfsFileAttributes::HAS_MC_EXTENSION) {
            tracing::trace!("Skipping mc-compressed file '{}'", canonical);
            return Ok(());
        }

        let data = std::fs::read(path.as_std_path())?;
        match self.walk_node(&canonical, &data, visit) {
            Err(Error::Romfs(e)) => {
                tracing::warn!("Skipping unreadable file '{}': {}", path, e);
                Ok(())
            }
            result => result,
        }
    }

    fn walk_node<F>(&self, name: &str, data: &[u8], visit: &F) -> Result<()>
    where
        F: Fn(&str, &[u8]) + Sync,
    {
        let decompressed;
        let data = if tk_romfs::zstd::is_compressed(data) {
            decompressed = self.zstd.decompress(data)?;
            &decompressed[..]
        } else {
            data
        };

        visit(name, data);

        if !Sarc::is_sarc(data) {
            return Ok(());
        }

        let sarc = Sarc::parse(data)?;
        let pass_through = name.ends_with(PASS_THROUGH_EXTENSION);
        for entry in sarc.iter() {
            let child = if pass_through {
                entry.name.to_string()
            } else {
                format!("{}/{}", name, entry.name)
            };
            self.walk_node(&child, entry.data, visit)?;
        }

        Ok(())
    }
}

/// Load the shared zstd dictionaries of a romfs root.
///
/// Returns `Ok(None)` with a warning when the root has no dictionary pack;
/// the calling generator skips such roots.
pub fn load_dictionaries(root: &Utf8Path, generator: &str) -> Result<Option<Zstd>> {
    let path = root.join(ZSDIC_PACK_PATH);
    if !path.as_std_path().is_file() {
        tracing::warn!(
            "{}: skipping '{}', {} not found",
            generator,
            root,
            ZSDIC_PACK_PATH
        );
        return Ok(None);
    }

    let mut zstd = Zstd::new();
    let count = zstd.load_dictionaries(&path)?;
    tracing::debug!("{}: loaded {} zstd dictionaries from '{}'", generator, count, path);
    Ok(Some(zstd))
}

/// Read a file and decompress it if it is a zstd frame.
pub fn read_resource(path: &Utf8Path, zstd: &Zstd) -> Result<Vec<u8>> {
    let data = std::fs::read(path.as_std_path())?;
    if tk_romfs::zstd::is_compressed(&data) {
        Ok(zstd.decompress(&data)?)
    } else {
        Ok(data)
    }
}

/// All regular files below `dir`, depth first with siblings sorted by name.
///
/// A missing directory yields an empty list.
pub fn list_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    if !dir.as_std_path().is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir.as_std_path())
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        match Utf8PathBuf::from_path_buf(entry.into_path()) {
            Ok(path) => files.push(path),
            Err(path) => tracing::warn!("Skipping non-UTF-8 path: {}", path.display()),
        }
    }
    Ok(files)
}

/// Pair every root with its romfs version, in ascending version order.
///
/// Roots sharing a version keep their input order.
pub fn versioned_roots(roots: &[Utf8PathBuf]) -> Vec<(&Utf8Path, i32)> {
    let mut versioned: Vec<_> = roots
        .iter()
        .map(|root| (root.as_path(), tk_romfs::romfs_version_or_default(root)))
        .collect();
    versioned.sort_by_key(|(_, version)| *version);
    versioned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RomfsFixture;
    use std::sync::Mutex;
    use tk_romfs::SarcWriter;

    fn visited(fixture: &RomfsFixture) -> Vec<(String, usize)> {
        let zstd = Zstd::new();
        let cancel = CancellationToken::new();
        let walker = ArchiveWalker::new(fixture.root(), &zstd, &cancel);
        let names = Mutex::new(Vec::new());
        walker
            .walk(fixture.root(), &|name, data| {
                names.lock().unwrap().push((name.to_string(), data.len()));
            })
            .unwrap();
        let mut names = names.into_inner().unwrap();
        names.sort();
        names
    }

    #[test]
    fn test_walk_flattens_pack_and_nests_other_containers() {
        let fixture = RomfsFixture::new(100);
        let pack = SarcWriter::new()
            .with_file("Actor/Link.bgyml", b"link".to_vec())
            .to_binary()
            .unwrap();
        let nested = SarcWriter::new()
            .with_file("inner.bin", b"inner".to_vec())
            .to_binary()
            .unwrap();
        fixture.write_compressed("Pack/Actor/Link.pack.zs", &pack);
        fixture.write("Model/Link.bfres.sarc", &nested);
        fixture.write("Data/plain.txt", b"plain");
        fixture.write("Data/skipped.txt.mc", b"mc");

        let names: Vec<_> = visited(&fixture)
            .into_iter()
            .map(|(name, _)| name)
            .collect();

        assert!(names.contains(&"Pack/Actor/Link.pack".to_string()));
        assert!(names.contains(&"Actor/Link.bgyml".to_string()));
        assert!(names.contains(&"Model/Link.bfres.sarc".to_string()));
        assert!(names.contains(&"Model/Link.bfres.sarc/inner.bin".to_string()));
        assert!(names.contains(&"Data/plain.txt".to_string()));
        assert!(!names.iter().any(|name| name.starts_with("Data/skipped")));
    }

    #[test]
    fn test_walk_yields_decompressed_bytes() {
        let fixture = RomfsFixture::new(100);
        fixture.write_compressed("Data/file.bin.zs", &[7u8; 64]);

        let visited = visited(&fixture);
        assert!(visited.contains(&("Data/file.bin".to_string(), 64)));
    }

    #[test]
    fn test_walk_decompresses_with_dump_dictionaries() {
        let fixture = RomfsFixture::new(100);
        let pack = SarcWriter::new()
            .with_file("Actor/Enemy_007.bgyml", b"Life=300 Weapon_4".to_vec())
            .to_binary()
            .unwrap();
        fixture.write_dictionary_compressed("Pack/Actor/Enemy_007.pack.zs", &pack);
        fixture.write_dictionary_compressed("Actor/Enemy_007.engine__actor__ActorParam.bgyml.zs", b"Life=300");

        let zstd = load_dictionaries(fixture.root(), "Test").unwrap().unwrap();
        assert_eq!(zstd.dictionary_count(), 1);

        let cancel = CancellationToken::new();
        let walker = ArchiveWalker::new(fixture.root(), &zstd, &cancel);
        let seen = Mutex::new(Vec::new());
        walker
            .walk(&fixture.root().join("Pack"), &|name, data| {
                seen.lock().unwrap().push((name.to_string(), data.to_vec()));
            })
            .unwrap();
        walker
            .walk(&fixture.root().join("Actor"), &|name, data| {
                seen.lock().unwrap().push((name.to_string(), data.to_vec()));
            })
            .unwrap();

        let seen = seen.into_inner().unwrap();
        assert!(seen.contains(&("Pack/Actor/Enemy_007.pack".to_string(), pack.clone())));
        assert!(seen.contains(&(
            "Actor/Enemy_007.bgyml".to_string(),
            b"Life=300 Weapon_4".to_vec()
        )));
        assert!(seen.contains(&(
            "Actor/Enemy_007.engine__actor__ActorParam.bgyml".to_string(),
            b"Life=300".to_vec()
        )));

        // Without the dump's dictionaries the frames are unreadable and skipped.
        let names: Vec<_> = visited(&fixture).into_iter().map(|(name, _)| name).collect();
        assert!(!names.contains(&"Actor/Enemy_007.bgyml".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_follows_symlinked_directories() {
        let fixture = RomfsFixture::new(100);
        let shared = tempfile::tempdir().unwrap();
        std::fs::write(shared.path().join("linked.bin"), b"linked").unwrap();
        std::os::unix::fs::symlink(shared.path(), fixture.root().join("Linked").as_std_path())
            .unwrap();
        std::os::unix::fs::symlink(
            fixture.root().join("Nowhere").as_std_path(),
            fixture.root().join("Dangling").as_std_path(),
        )
        .unwrap();

        let visited = visited(&fixture);
        assert!(visited.contains(&("Linked/linked.bin".to_string(), 6)));
        assert!(!visited.iter().any(|(name, _)| name.starts_with("Dangling")));
    }

    #[test]
    fn test_walk_stops_when_cancelled() {
        let fixture = RomfsFixture::new(100);
        let zstd = Zstd::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let walker = ArchiveWalker::new(fixture.root(), &zstd, &cancel);
        let result = walker.walk(fixture.root(), &|_, _| {});
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_missing_dictionary_pack_skips_root() {
        let fixture = RomfsFixture::without_dictionaries(100);
        assert!(load_dictionaries(fixture.root(), "Test").unwrap().is_none());

        let fixture = RomfsFixture::new(100);
        assert!(load_dictionaries(fixture.root(), "Test").unwrap().is_some());
    }

    #[test]
    fn test_versioned_roots_sorted() {
        let newer = RomfsFixture::new(120);
        let older = RomfsFixture::new(110);
        let roots = vec![newer.root().to_path_buf(), older.root().to_path_buf()];

        let versions: Vec<_> = versioned_roots(&roots)
            .into_iter()
            .map(|(_, version)| version)
            .collect();
        assert_eq!(versions, vec![110, 120]);
    }

    #[test]
    fn test_list_files_sorted() {
        let fixture = RomfsFixture::new(100);
        fixture.write("RSDB/b.txt", b"b");
        fixture.write("RSDB/a.txt", b"a");

        let files = list_files(&fixture.root().join("RSDB")).unwrap();
        let names: Vec<_> = files.iter().filter_map(|f| f.file_name()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert!(list_files(&fixture.root().join("Missing")).unwrap().is_empty());
    }
}
