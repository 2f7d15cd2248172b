#![cfg(test)]

use super::*;
use crate::types::{DEFAULT_ARCHITECTURES, DEFAULT_DEPENDENCY_TYPES};
use std::path::Path;
use tempfile::tempdir;

fn open(dir: &Path, mode: OpenMode) -> Result<DiskGraph> {
    DiskGraph::open(
        dir,
        mode,
        DEFAULT_ARCHITECTURES,
        DEFAULT_DEPENDENCY_TYPES,
        4096,
    )
}

fn staged_buffer() -> BufferGraph {
    // a -> b -> c, all native; b also carries a Recommends edge to c.
    let mut buffer = BufferGraph::new();
    let (a, _) = buffer.create_package("a");
    let (b, _) = buffer.create_package("b");
    let (c, _) = buffer.create_package("c");
    let (av, _) = buffer.create_version(a, "1.0", 0);
    let (bv, _) = buffer.create_version(b, "1.0", 0);
    buffer.create_version(c, "1.0", 0);
    buffer.create_dependency(av, b, "", 0, 0, 0);
    buffer.create_dependency(bv, c, ">= 1.0", 0, 0, 0);
    buffer.create_dependency(bv, c, "", 0, 2, 0);
    buffer
}

#[test]
fn create_package_is_idempotent() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let mut disk = open(&dir.path().join("store"), OpenMode::Create)?;
    let (pid, inserted) = disk.create_package("curl")?;
    assert!(inserted);
    let (again, inserted) = disk.create_package("curl")?;
    assert!(!inserted);
    assert_eq!(pid, again);
    assert_eq!(disk.package_count(), 1);
    Ok(())
}

#[test]
fn create_version_deduplicates_across_the_chain() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let mut disk = open(&dir.path().join("store"), OpenMode::Create)?;
    let (pid, _) = disk.create_package("curl")?;
    let (v1, inserted) = disk.create_version(pid, "8.5.0", 0, 0, 0)?;
    assert!(inserted);
    disk.attach_versions(pid, v1, 1)?;

    // A second range; the duplicate must be found through the first node.
    let (v2, inserted) = disk.create_version(pid, "8.6.0", 0, 0, 0)?;
    assert!(inserted);
    disk.attach_versions(pid, v2, 1)?;
    let (dup, inserted) = disk.create_version(pid, "8.5.0", 0, 0, 0)?;
    assert!(!inserted);
    assert_eq!(dup, v1);

    let (other_arch, inserted) = disk.create_version(pid, "8.5.0", 1, 0, 0)?;
    assert!(inserted);
    assert_ne!(other_arch, v1);
    Ok(())
}

#[test]
fn ingest_keeps_dependency_runs_contiguous() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let mut disk = open(&dir.path().join("store"), OpenMode::Create)?;
    disk.ingest(&staged_buffer())?;

    assert_eq!(disk.package_count(), 3);
    assert_eq!(disk.version_count(), 3);
    assert_eq!(disk.dependency_count(), 3);

    for vid in 0..disk.version_count() as u32 {
        let record = disk.version_record(vid);
        let begin = record.dependency_id_begin;
        for did in begin..begin + record.dependency_count as u32 {
            assert_eq!(disk.dependency_record(did).from_version_id, vid);
        }
    }
    Ok(())
}

#[test]
fn second_ingest_chains_a_new_version_range() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let mut disk = open(&dir.path().join("store"), OpenMode::Create)?;
    disk.ingest(&staged_buffer())?;

    let mut second = BufferGraph::new();
    let (a, _) = second.create_package("a");
    second.create_version(a, "2.0", 0);
    // Already persisted; must not create a version or a list node.
    second.create_version(a, "1.0", 0);
    disk.ingest(&second)?;

    assert_eq!(disk.version_count(), 4);
    let package = disk.get_package("a").expect("package a");
    let versions = package.versions();
    assert_eq!(versions.len(), 2);
    // Newest range first.
    assert_eq!(versions[0].version()?, "2.0");
    assert_eq!(versions[1].version()?, "1.0");
    Ok(())
}

#[test]
fn reopen_roundtrip_preserves_counts_and_lookups() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let store = dir.path().join("store");
    {
        let mut disk = open(&store, OpenMode::Create)?;
        disk.ingest(&staged_buffer())?;
        disk.sync()?;
    }
    let disk = open(&store, OpenMode::Load)?;
    assert_eq!(disk.package_count(), 3);
    assert_eq!(disk.version_count(), 3);
    assert_eq!(disk.dependency_count(), 3);
    assert_eq!(disk.architecture_count(), DEFAULT_ARCHITECTURES.len());
    assert_eq!(
        disk.dependency_type_count(),
        DEFAULT_DEPENDENCY_TYPES.len()
    );

    let package = disk.get_package("b").expect("package b");
    assert_eq!(package.name()?, "b");
    let versions = package.versions();
    assert_eq!(versions.len(), 1);
    let deps = versions[0].dependencies();
    assert_eq!(deps.len(), 2);
    assert_eq!(deps[0].to_package().name()?, "c");
    assert_eq!(deps[0].version_constraint()?, ">= 1.0");
    assert_eq!(deps[1].dependency_type()?, "Recommends");
    assert!(disk.get_package("zsh").is_none());
    Ok(())
}

#[test]
fn unsynced_appends_are_dropped_on_reopen() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let store = dir.path().join("store");
    {
        let mut disk = open(&store, OpenMode::Create)?;
        disk.ingest(&staged_buffer())?;
        disk.sync()?;
        // Appended after the last control sync: recoverable but
        // conservative, so a reopen must not see it.
        disk.create_package("straggler")?;
    }
    let disk = open(&store, OpenMode::Load)?;
    assert_eq!(disk.package_count(), 3);
    assert!(disk.get_package("straggler").is_none());
    Ok(())
}

#[test]
fn load_of_missing_store_fails() {
    let dir = tempdir().expect("tempdir");
    let err = open(&dir.path().join("nowhere"), OpenMode::Load).unwrap_err();
    assert!(matches!(err, GraphError::OpenFailed(_)));
}

#[test]
fn partially_created_store_is_refused() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let store = dir.path().join("store");
    {
        let mut disk = open(&store, OpenMode::Create)?;
        disk.sync()?;
    }
    // One component file vanishes; LoadOrCreate would recreate only that
    // file, which must be detected as an inconsistent store.
    std::fs::remove_file(store.join("versions.dat")).expect("remove");
    let err = open(&store, OpenMode::LoadOrCreate).unwrap_err();
    assert!(matches!(err, GraphError::OpenFailed(_)));
    Ok(())
}

#[test]
fn symbols_persist_and_stay_idempotent() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let store = dir.path().join("store");
    {
        let mut disk = open(&store, OpenMode::Create)?;
        let amd64 = disk.add_architecture("amd64")?;
        assert_eq!(disk.add_architecture("amd64")?, amd64);
        disk.sync()?;
    }
    let mut disk = open(&store, OpenMode::Load)?;
    let amd64 = disk
        .architecture_id("amd64")
        .expect("amd64 persisted");
    assert_eq!(disk.add_architecture("amd64")?, amd64);
    assert_eq!(disk.architecture_id("native"), Some(0));
    Ok(())
}
