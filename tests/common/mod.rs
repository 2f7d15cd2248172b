#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::Path;

use depgraph::{Config, DependencyGraph, DependencyItem, DependencyResult, OpenMode, Result};

/// Owned, order-free form of one level: the direct-dependency set plus the
/// sorted multiset of alternative groups (each a set). Two backends agree
/// exactly when their canonical results are equal.
pub type CanonItem = (String, String, String, String);
pub type CanonLevel = (BTreeSet<CanonItem>, Vec<BTreeSet<CanonItem>>);

pub fn item(name: &str, dependency_type: &str, constraint: &str, arch: &str) -> CanonItem {
    (
        name.to_owned(),
        dependency_type.to_owned(),
        constraint.to_owned(),
        arch.to_owned(),
    )
}

pub fn canon_item(item: &DependencyItem<'_>) -> CanonItem {
    (
        item.package_name.to_owned(),
        item.dependency_type.to_owned(),
        item.version_constraint.to_owned(),
        item.architecture_constraint.to_owned(),
    )
}

pub fn canon(result: &DependencyResult<'_>) -> Vec<CanonLevel> {
    result
        .iter()
        .map(|level| {
            let direct: BTreeSet<CanonItem> =
                level.direct_dependencies.iter().map(canon_item).collect();
            assert_eq!(
                direct.len(),
                level.direct_dependencies.len(),
                "direct dependencies must already be de-duplicated per level"
            );
            let mut groups: Vec<BTreeSet<CanonItem>> = level
                .or_dependencies
                .iter()
                .map(|group| group.iter().map(canon_item).collect())
                .collect();
            groups.sort();
            (direct, groups)
        })
        .collect()
}

pub fn open_store(path: &Path, memory_limit: usize) -> Result<DependencyGraph> {
    DependencyGraph::open(
        path,
        OpenMode::Create,
        Config {
            memory_limit,
            chunk_bytes: 4096,
            max_device_vector_bytes: 256 * 1024,
        },
    )
}
