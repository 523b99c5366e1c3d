//! Concurrent execution of all generators.

use crate::checksum::ChecksumGenerator;
use crate::error::{Error, Result};
use crate::game_data::GameDataIndexGenerator;
use crate::generator::{CancellationToken, Generator};
use crate::output::OutputStore;
use crate::pack_lookup::PackFileLookupGenerator;
use crate::rsdb::RsdbCacheGenerator;
use camino::Utf8PathBuf;
use std::time::{Duration, Instant};

/// Fewest version roots a run accepts.
pub const MIN_VERSION_ROOTS: usize = 3;

/// Result of one successful generator.
#[derive(Debug, Clone)]
pub struct GeneratorReport {
    pub name: &'static str,
    /// Binary outputs written.
    pub outputs: Vec<Utf8PathBuf>,
    pub elapsed: Duration,
}

/// Run all four generators over `roots` and write their outputs to `store`.
///
/// Each generator runs on its own thread. A failing generator does not stop
/// the others; once all have finished the first failure (in generator order)
/// is returned, wrapped in [`Error::Generator`].
pub fn generate_all(
    roots: &[Utf8PathBuf],
    store: &OutputStore,
    cancel: &CancellationToken,
) -> Result<Vec<GeneratorReport>> {
    if roots.len() < MIN_VERSION_ROOTS {
        return Err(Error::NotEnoughVersionRoots {
            found: roots.len(),
            required: MIN_VERSION_ROOTS,
        });
    }

    tracing::info!(
        "Generating lookup tables from {} game dumps into '{}'",
        roots.len(),
        store.root()
    );

    let results = std::thread::scope(|scope| {
        let handles = [
            scope.spawn(|| run(ChecksumGenerator::new(), roots, store, cancel)),
            scope.spawn(|| run(GameDataIndexGenerator::new(), roots, store, cancel)),
            scope.spawn(|| run(PackFileLookupGenerator::new(), roots, store, cancel)),
            scope.spawn(|| run(RsdbCacheGenerator::new(), roots, store, cancel)),
        ];

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect::<Vec<_>>()
    });

    results.into_iter().collect()
}

/// Generate and write a single generator.
pub fn run<G: Generator>(
    mut generator: G,
    roots: &[Utf8PathBuf],
    store: &OutputStore,
    cancel: &CancellationToken,
) -> Result<GeneratorReport> {
    let started = Instant::now();
    tracing::info!("{}: starting", G::NAME);

    match generator
        .generate(roots, cancel)
        .and_then(|()| store.write(&generator))
    {
        Ok(outputs) => {
            let elapsed = started.elapsed();
            tracing::info!("{}: finished in {:.2?}", G::NAME, elapsed);
            Ok(GeneratorReport {
                name: G::NAME,
                outputs,
                elapsed,
            })
        }
        Err(e) => {
            tracing::error!("{}: {}", G::NAME, e);
            Err(Error::Generator {
                name: G::NAME,
                source: Box::new(e),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{roots, RomfsFixture};
    use tk_romfs::SarcWriter;

    #[test]
    fn test_requires_three_roots() {
        let dir = tempfile::tempdir().unwrap();
        let output = Utf8PathBuf::from_path_buf(dir.path().join("output")).unwrap();
        let v1 = RomfsFixture::new(100);
        let v2 = RomfsFixture::new(110);

        let result = generate_all(
            &roots(&[&v1, &v2]),
            &OutputStore::new(output.clone()),
            &CancellationToken::new(),
        );
        assert!(matches!(
            result,
            Err(Error::NotEnoughVersionRoots {
                found: 2,
                required: 3
            })
        ));
        assert!(!output.exists());
    }

    #[test]
    fn test_generate_all_writes_every_output() {
        let fixtures: Vec<_> = [100, 110, 120].map(RomfsFixture::new).into();
        for fixture in &fixtures {
            let pack = SarcWriter::new()
                .with_file("Actor/Link.bgyml", b"link".to_vec())
                .to_binary()
                .unwrap();
            fixture.write_compressed("Pack/Actor/Link.pack.zs", &pack);
        }

        let dir = tempfile::tempdir().unwrap();
        let output = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let reports = generate_all(
            &roots(&fixtures.iter().collect::<Vec<_>>()),
            &OutputStore::new(output.clone()),
            &CancellationToken::new(),
        )
        .unwrap();

        let names: Vec<_> = reports.iter().map(|report| report.name).collect();
        assert_eq!(
            names,
            vec![
                "ChecksumGenerator",
                "GameDataIndexGenerator",
                "PackFileLookupGenerator",
                "RsdbCacheGenerator"
            ]
        );
        for file in [
            "Checksums.bpclt",
            "GameDataIndex.bpclt",
            "PackFileLookup.pkcache.zs",
            "RsdbCache.bpcc",
            "RsdbIndex.bpcc",
            "ChecksumGenerator.debug.json",
            "PackFileLookupGenerator.debug.json",
        ] {
            assert!(output.join(file).is_file(), "missing {}", file);
        }
    }

    #[test]
    fn test_cancelled_run_reports_generator() {
        let fixtures: Vec<_> = [100, 110, 120].map(RomfsFixture::new).into();
        let dir = tempfile::tempdir().unwrap();
        let output = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = generate_all(
            &roots(&fixtures.iter().collect::<Vec<_>>()),
            &OutputStore::new(output),
            &cancel,
        );
        match result {
            Err(Error::Generator { name, source }) => {
                assert_eq!(name, "ChecksumGenerator");
                assert!(matches!(*source, Error::Cancelled));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
