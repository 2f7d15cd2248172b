use std::mem::size_of;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::disk::DiskGraph;
use crate::error::{GraphError, Result};
use crate::model::{DependencyItem, DependencyLevel, DependencyResult};
use crate::query::{ArchRules, DiskSource, QuerySource};
use crate::types::{
    ArchitectureId, DependencyId, DependencyTypeId, GroupId, PackageId, VersionId,
};

struct DevicePackage {
    version_id_begin: VersionId,
    version_count: u16,
}

struct DeviceVersion {
    dependency_id_begin: u32,
    dependency_count: u16,
    architecture: ArchitectureId,
}

struct DeviceEdge {
    original_dependency_id: DependencyId,
    to_package_id: PackageId,
    architecture_constraint: ArchitectureId,
    dependency_type: DependencyTypeId,
    group: GroupId,
}

/// Compact snapshot of the persistent graph laid out for a parallel
/// frontier expander: CSR-style package → version → edge arrays with a
/// dense device version-id space (host version-list chains are not
/// contiguous, so ids are remapped at build time).
///
/// A query runs one data-parallel step per level: workers expand the
/// current frontier's edges, apply the architecture rule and a visited
/// mark, append next-frontier ids and touched dependency ids through
/// atomic counters, and the host rebuilds the level's items from the
/// original dependency ids. Visited marks are a monotonically increasing
/// generation, so no clear pass runs between queries.
pub struct DeviceGraph {
    packages: Vec<DevicePackage>,
    versions: Vec<DeviceVersion>,
    edges: Vec<DeviceEdge>,
    to_device_version_id: Vec<VersionId>,
    visited: Vec<AtomicU32>,
    mark: AtomicU32,
    next: Vec<AtomicU32>,
    touched: Vec<AtomicU32>,
    capacity: usize,
    depends: Option<DependencyTypeId>,
    rules: ArchRules,
}

impl DeviceGraph {
    /// Builds a fresh snapshot; building again after an ingest replaces
    /// the previous snapshot wholesale.
    pub fn build(disk: &DiskGraph, max_device_vector_bytes: usize) -> Result<Self> {
        let capacity = max_device_vector_bytes / size_of::<VersionId>();
        if capacity == 0 {
            return Err(GraphError::Usage(
                "max_device_vector_bytes too small for a single frontier entry".into(),
            ));
        }

        let mut packages = Vec::with_capacity(disk.package_count());
        let mut versions = Vec::with_capacity(disk.version_count());
        let mut edges = Vec::with_capacity(disk.dependency_count());
        let mut to_device_version_id = vec![0 as VersionId; disk.version_count()];
        let mut chain = Vec::new();

        for pid in 0..disk.package_count() as PackageId {
            chain.clear();
            disk.collect_package_versions(pid, &mut chain);
            let version_id_begin = versions.len() as VersionId;
            let version_count = u16::try_from(chain.len()).map_err(|_| {
                GraphError::Usage(format!(
                    "package id {pid} owns more versions than the device layout supports"
                ))
            })?;
            for &host_vid in &chain {
                let record = disk.version_record(host_vid);
                to_device_version_id[host_vid as usize] = versions.len() as VersionId;
                versions.push(DeviceVersion {
                    dependency_id_begin: edges.len() as u32,
                    dependency_count: record.dependency_count,
                    architecture: record.architecture,
                });
                let begin = record.dependency_id_begin;
                for did in begin..begin + record.dependency_count as u32 {
                    let dep = disk.dependency_record(did);
                    edges.push(DeviceEdge {
                        original_dependency_id: did,
                        to_package_id: dep.to_package_id,
                        architecture_constraint: dep.architecture_constraint,
                        dependency_type: dep.dependency_type,
                        group: dep.group,
                    });
                }
            }
            packages.push(DevicePackage {
                version_id_begin,
                version_count,
            });
        }

        let visited = (0..versions.len()).map(|_| AtomicU32::new(0)).collect();
        let next = (0..capacity).map(|_| AtomicU32::new(0)).collect();
        let touched = (0..capacity).map(|_| AtomicU32::new(0)).collect();
        let source = DiskSource::new(disk);
        debug!(
            packages = packages.len(),
            versions = versions.len(),
            edges = edges.len(),
            capacity,
            "device.build"
        );
        Ok(Self {
            packages,
            versions,
            edges,
            to_device_version_id,
            visited,
            mark: AtomicU32::new(0),
            next,
            touched,
            capacity,
            depends: source.dependency_type_id("Depends"),
            rules: ArchRules::resolve(&source),
        })
    }

    /// Expands `frontier` (host version ids) to `depth` levels. The
    /// result's per-level direct sets and alternative-group multisets
    /// match the sequential backends; ordering within a level may not.
    pub fn query<'g>(
        &self,
        disk: &'g DiskGraph,
        frontier: &[VersionId],
        depth: usize,
    ) -> Result<DependencyResult<'g>> {
        let source = DiskSource::new(disk);
        let mut result: DependencyResult<'g> =
            (0..depth).map(|_| DependencyLevel::default()).collect();

        let mark = self.mark.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let mut current: Vec<VersionId> = Vec::with_capacity(frontier.len());
        for &host_vid in frontier {
            if host_vid as usize >= self.to_device_version_id.len() {
                return Err(GraphError::Usage(
                    "device snapshot is stale; rebuild it after ingesting".into(),
                ));
            }
            let device_vid = self.to_device_version_id[host_vid as usize];
            self.visited[device_vid as usize].store(mark, Ordering::Relaxed);
            current.push(device_vid);
        }

        for level in 0..depth {
            if current.is_empty() {
                break;
            }
            let next_len = AtomicUsize::new(0);
            let touched_len = AtomicUsize::new(0);
            let expand_next = level + 1 < depth;

            current.par_iter().try_for_each(|&device_vid| {
                self.expand_version(device_vid, mark, expand_next, &next_len, &touched_len)
            })?;

            let touched_count = touched_len.load(Ordering::Relaxed);
            self.rebuild_level(&source, &mut result[level], touched_count)?;

            let next_count = next_len.load(Ordering::Relaxed);
            current.clear();
            current.extend((0..next_count).map(|i| self.next[i].load(Ordering::Relaxed)));
        }
        Ok(result)
    }

    /// One worker's share of a level step: report every outgoing edge and
    /// claim unvisited, architecture-matching target versions.
    fn expand_version(
        &self,
        device_vid: VersionId,
        mark: u32,
        expand_next: bool,
        next_len: &AtomicUsize,
        touched_len: &AtomicUsize,
    ) -> Result<()> {
        let version = &self.versions[device_vid as usize];
        let begin = version.dependency_id_begin as usize;
        for edge in &self.edges[begin..begin + version.dependency_count as usize] {
            let slot = touched_len.fetch_add(1, Ordering::Relaxed);
            if slot >= self.capacity {
                return Err(GraphError::Usage(
                    "device dependency buffer exceeded max_device_vector_bytes".into(),
                ));
            }
            self.touched[slot].store(edge.original_dependency_id, Ordering::Relaxed);

            if !expand_next || edge.group != 0 || Some(edge.dependency_type) != self.depends {
                continue;
            }
            let package = &self.packages[edge.to_package_id as usize];
            let target_begin = package.version_id_begin;
            for candidate in target_begin..target_begin + package.version_count as u32 {
                let candidate_arch = self.versions[candidate as usize].architecture;
                if !self.rules.matches(
                    edge.architecture_constraint,
                    candidate_arch,
                    version.architecture,
                ) {
                    continue;
                }
                if self.visited[candidate as usize].swap(mark, Ordering::Relaxed) == mark {
                    continue;
                }
                let slot = next_len.fetch_add(1, Ordering::Relaxed);
                if slot >= self.capacity {
                    return Err(GraphError::Usage(
                        "device frontier buffer exceeded max_device_vector_bytes".into(),
                    ));
                }
                self.next[slot].store(candidate, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Rebuilds one level from the touched dependency ids by consulting
    /// the host-side store: direct items de-duplicate into one set,
    /// alternative groups key on `(origin version, group index)`.
    fn rebuild_level<'g>(
        &self,
        source: &DiskSource<'g>,
        level: &mut DependencyLevel<'g>,
        touched_count: usize,
    ) -> Result<()> {
        let mut seen_direct: FxHashSet<DependencyItem<'g>> = FxHashSet::default();
        let mut group_index: FxHashMap<(VersionId, GroupId), usize> = FxHashMap::default();
        let mut groups: Vec<(Vec<DependencyItem<'g>>, FxHashSet<DependencyItem<'g>>)> = Vec::new();

        for i in 0..touched_count {
            let did = self.touched[i].load(Ordering::Relaxed);
            let edge = source.edge(did)?;
            let from_version_id = source.edge_origin(did);
            let item = DependencyItem {
                package_name: source.package_name(edge.to_package_id)?,
                dependency_type: source.dependency_type_symbol(edge.dependency_type)?,
                version_constraint: edge.version_constraint,
                architecture_constraint: source.architecture_symbol(edge.architecture_constraint)?,
            };
            if edge.group == 0 {
                if seen_direct.insert(item) {
                    level.direct_dependencies.push(item);
                }
            } else {
                let slot = *group_index
                    .entry((from_version_id, edge.group))
                    .or_insert_with(|| {
                        groups.push((Vec::new(), FxHashSet::default()));
                        groups.len() - 1
                    });
                let (members, seen) = &mut groups[slot];
                if seen.insert(item) {
                    members.push(item);
                }
            }
        }
        level
            .or_dependencies
            .extend(groups.into_iter().map(|(members, _)| members));
        Ok(())
    }
}
