mod common;

use common::{canon, open_store, CanonLevel};
use depgraph::{Config, DependencyGraph, GraphError, OpenMode, PackageLoader, Result};
use std::path::Path;
use tempfile::tempdir;

const DATASET: &str = "\
Package: shell
Version: 1.0
Architecture: amd64
Depends: readline (>= 8.0), locale-data:any
Recommends: completions

Package: readline
Version: 8.2
Architecture: amd64
Depends: tinfo

Package: readline
Version: 8.2
Architecture: arm64
Depends: tinfo

Package: tinfo
Version: 6.4
Architecture: all

Package: locale-data
Version: 2.38
Architecture: all

Package: completions
Version: 1.0
Architecture: all
";

fn reopen(path: &Path) -> Result<DependencyGraph> {
    DependencyGraph::open(
        path,
        OpenMode::Load,
        Config {
            memory_limit: 0,
            chunk_bytes: 4096,
            max_device_vector_bytes: 256 * 1024,
        },
    )
}

#[test]
fn counts_and_queries_survive_reopen() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let store = dir.path().join("store");

    let before: Vec<CanonLevel>;
    let counts_before: (usize, usize, usize);
    {
        let mut graph = open_store(&store, usize::MAX)?;
        PackageLoader::new(&mut graph).load_str(DATASET)?;
        graph.flush()?;
        before = canon(&graph.query_dependencies("shell", "", "", 3, false)?);
        counts_before = (
            graph.package_count(),
            graph.version_count(),
            graph.dependency_count(),
        );
        graph.close()?;
    }

    let graph = reopen(&store)?;
    assert_eq!(
        (
            graph.package_count(),
            graph.version_count(),
            graph.dependency_count(),
        ),
        counts_before
    );
    // Distinct names and distinct (version, architecture) pairs.
    assert_eq!(graph.package_count(), 5);
    assert_eq!(graph.version_count(), 6);

    let after = canon(&graph.query_dependencies("shell", "", "", 3, false)?);
    assert_eq!(before, after);

    for name in ["shell", "readline", "tinfo", "locale-data", "completions"] {
        let package = graph.get_package(name).expect("persisted package");
        assert_eq!(package.name()?, name);
        assert!(!package.versions().is_empty());
    }
    assert_eq!(graph.get_package("readline").expect("readline").versions().len(), 2);
    Ok(())
}

#[test]
fn reloading_the_same_dataset_adds_nothing() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let store = dir.path().join("store");
    {
        let mut graph = open_store(&store, 0)?;
        PackageLoader::new(&mut graph).load_str(DATASET)?;
        graph.close()?;
    }
    let mut graph = reopen(&store)?;
    let counts = (
        graph.package_count(),
        graph.version_count(),
        graph.dependency_count(),
    );
    PackageLoader::new(&mut graph).load_str(DATASET)?;
    graph.flush()?;
    // Packages and versions de-duplicate; the duplicate versions carry no
    // new dependency runs either.
    assert_eq!(
        (
            graph.package_count(),
            graph.version_count(),
            graph.dependency_count(),
        ),
        counts
    );
    Ok(())
}

#[test]
fn corrupted_component_magic_is_refused() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let store = dir.path().join("store");
    {
        let mut graph = open_store(&store, 0)?;
        PackageLoader::new(&mut graph).load_str(DATASET)?;
        graph.close()?;
    }
    let path = store.join("packages.dat");
    let mut bytes = std::fs::read(&path).expect("read");
    bytes[..8].copy_from_slice(b"NOTMAGIC");
    std::fs::write(&path, bytes).expect("write");

    let err = reopen(&store).unwrap_err();
    assert!(matches!(err, GraphError::OpenFailed(_)));
    Ok(())
}

#[test]
fn device_snapshot_works_on_a_reopened_store() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let store = dir.path().join("store");
    {
        let mut graph = open_store(&store, 0)?;
        PackageLoader::new(&mut graph).load_str(DATASET)?;
        graph.close()?;
    }
    let mut graph = reopen(&store)?;
    graph.sync_to_device()?;
    let on_disk = canon(&graph.query_dependencies("shell", "", "", 2, false)?);
    let on_device = canon(&graph.query_dependencies("shell", "", "", 2, true)?);
    assert_eq!(on_disk, on_device);
    Ok(())
}
