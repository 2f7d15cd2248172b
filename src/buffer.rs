use std::mem::size_of;

use rustc_hash::FxHashMap;

use crate::types::{ArchitectureId, DependencyId, DependencyTypeId, GroupId, PackageId, VersionId};

#[derive(Debug)]
pub(crate) struct BufferPackage {
    pub name: String,
    pub version_ids: Vec<VersionId>,
}

#[derive(Debug)]
pub(crate) struct BufferVersion {
    pub version: String,
    pub architecture: ArchitectureId,
    pub dependency_ids: Vec<DependencyId>,
}

#[derive(Debug)]
pub(crate) struct BufferDependency {
    pub from_version_id: VersionId,
    pub to_package_id: PackageId,
    pub version_constraint: String,
    pub architecture_constraint: ArchitectureId,
    pub dependency_type: DependencyTypeId,
    pub group: GroupId,
}

/// In-memory staging graph. Writers land here; a flush ingests the whole
/// buffer into the persistent store and clears it. Packages de-duplicate
/// by name and versions by `(version, architecture)`; dependency edges are
/// always appended (the parser emits duplicates, collapsed at query time).
#[derive(Default)]
pub struct BufferGraph {
    pub(crate) packages: Vec<BufferPackage>,
    pub(crate) versions: Vec<BufferVersion>,
    pub(crate) dependencies: Vec<BufferDependency>,
    name_to_package: FxHashMap<String, PackageId>,
}

impl BufferGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn package_count(&self) -> usize {
        self.packages.len()
    }

    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn package_id(&self, name: &str) -> Option<PackageId> {
        self.name_to_package.get(name).copied()
    }

    pub fn create_package(&mut self, name: &str) -> (PackageId, bool) {
        if let Some(&pid) = self.name_to_package.get(name) {
            return (pid, false);
        }
        let pid = self.packages.len() as PackageId;
        self.name_to_package.insert(name.to_owned(), pid);
        self.packages.push(BufferPackage {
            name: name.to_owned(),
            version_ids: Vec::new(),
        });
        (pid, true)
    }

    pub fn create_version(
        &mut self,
        pid: PackageId,
        version: &str,
        architecture: ArchitectureId,
    ) -> (VersionId, bool) {
        let package = &self.packages[pid as usize];
        for &vid in &package.version_ids {
            let node = &self.versions[vid as usize];
            if node.version == version && node.architecture == architecture {
                return (vid, false);
            }
        }
        let vid = self.versions.len() as VersionId;
        self.packages[pid as usize].version_ids.push(vid);
        self.versions.push(BufferVersion {
            version: version.to_owned(),
            architecture,
            dependency_ids: Vec::new(),
        });
        (vid, true)
    }

    pub fn create_dependency(
        &mut self,
        from_version_id: VersionId,
        to_package_id: PackageId,
        version_constraint: &str,
        architecture_constraint: ArchitectureId,
        dependency_type: DependencyTypeId,
        group: GroupId,
    ) -> (DependencyId, bool) {
        let did = self.dependencies.len() as DependencyId;
        self.versions[from_version_id as usize]
            .dependency_ids
            .push(did);
        self.dependencies.push(BufferDependency {
            from_version_id,
            to_package_id,
            version_constraint: version_constraint.to_owned(),
            architecture_constraint,
            dependency_type,
            group,
        });
        (did, true)
    }

    pub fn clear(&mut self) {
        self.packages.clear();
        self.versions.clear();
        self.dependencies.clear();
        self.name_to_package.clear();
    }

    /// Structural memory estimate used as the flush trigger: owned string
    /// capacity, adjacency-list capacity, and hash-map bucket overhead.
    pub fn estimated_memory_usage(&self) -> usize {
        let mut total = size_of::<Self>();
        total += self.packages.capacity() * size_of::<BufferPackage>();
        for package in &self.packages {
            total += package.name.capacity();
            total += package.version_ids.capacity() * size_of::<VersionId>();
        }
        total += self.versions.capacity() * size_of::<BufferVersion>();
        for version in &self.versions {
            total += version.version.capacity();
            total += version.dependency_ids.capacity() * size_of::<DependencyId>();
        }
        total += self.dependencies.capacity() * size_of::<BufferDependency>();
        for dependency in &self.dependencies {
            total += dependency.version_constraint.capacity();
        }
        total += self.name_to_package.capacity()
            * (size_of::<(String, PackageId)>() + size_of::<u64>());
        for name in self.name_to_package.keys() {
            total += name.capacity();
        }
        total
    }
}
