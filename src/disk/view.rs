use crate::disk::records::{DependencyRecord, PackageRecord, VersionRecord};
use crate::disk::DiskGraph;
use crate::error::Result;
use crate::types::{ArchitectureId, DependencyId, DependencyTypeId, GroupId, PackageId, VersionId};

/// Read-only view of a persisted package. Holds the owning graph and
/// materializes children on demand; lifetimes stop a view from outliving
/// any mutation of the store.
#[derive(Clone, Copy)]
pub struct PackageRef<'g> {
    graph: &'g DiskGraph,
    id: PackageId,
    record: PackageRecord,
}

impl<'g> PackageRef<'g> {
    pub(crate) fn new(graph: &'g DiskGraph, id: PackageId) -> Self {
        Self {
            graph,
            id,
            record: graph.package_record(id),
        }
    }

    pub fn id(&self) -> PackageId {
        self.id
    }

    pub fn name(&self) -> Result<&'g str> {
        self.graph.strings().get(self.record.name)
    }

    /// Every version of the package, across all ingests (newest range
    /// first).
    pub fn versions(&self) -> Vec<VersionRef<'g>> {
        let mut vids = Vec::new();
        self.graph.collect_package_versions(self.id, &mut vids);
        vids.into_iter()
            .map(|vid| VersionRef::new(self.graph, vid))
            .collect()
    }
}

#[derive(Clone, Copy)]
pub struct VersionRef<'g> {
    graph: &'g DiskGraph,
    id: VersionId,
    record: VersionRecord,
}

impl<'g> VersionRef<'g> {
    pub(crate) fn new(graph: &'g DiskGraph, id: VersionId) -> Self {
        Self {
            graph,
            id,
            record: graph.version_record(id),
        }
    }

    pub fn id(&self) -> VersionId {
        self.id
    }

    pub fn version(&self) -> Result<&'g str> {
        self.graph.strings().get(self.record.version)
    }

    pub fn architecture_id(&self) -> ArchitectureId {
        self.record.architecture
    }

    pub fn architecture(&self) -> Result<&'g str> {
        self.graph.architecture_symbol(self.record.architecture)
    }

    pub fn dependencies(&self) -> Vec<DependencyRef<'g>> {
        let begin = self.record.dependency_id_begin;
        (begin..begin + self.record.dependency_count as u32)
            .map(|did| DependencyRef::new(self.graph, did))
            .collect()
    }
}

#[derive(Clone, Copy)]
pub struct DependencyRef<'g> {
    graph: &'g DiskGraph,
    id: DependencyId,
    record: DependencyRecord,
}

impl<'g> DependencyRef<'g> {
    pub(crate) fn new(graph: &'g DiskGraph, id: DependencyId) -> Self {
        Self {
            graph,
            id,
            record: graph.dependency_record(id),
        }
    }

    pub fn id(&self) -> DependencyId {
        self.id
    }

    pub fn from_version(&self) -> VersionRef<'g> {
        VersionRef::new(self.graph, self.record.from_version_id)
    }

    pub fn to_package(&self) -> PackageRef<'g> {
        PackageRef::new(self.graph, self.record.to_package_id)
    }

    pub fn version_constraint(&self) -> Result<&'g str> {
        self.graph.strings().get(self.record.version_constraint)
    }

    pub fn architecture_constraint(&self) -> Result<&'g str> {
        self.graph
            .architecture_symbol(self.record.architecture_constraint)
    }

    pub fn dependency_type_id(&self) -> DependencyTypeId {
        self.record.dependency_type
    }

    pub fn dependency_type(&self) -> Result<&'g str> {
        self.graph
            .dependency_type_symbol(self.record.dependency_type)
    }

    pub fn group(&self) -> GroupId {
        self.record.group
    }
}
