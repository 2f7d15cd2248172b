use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::buffer::BufferGraph;
use crate::disk::DiskGraph;
use crate::error::Result;
use crate::model::{DependencyGroup, DependencyItem, DependencyLevel, DependencyResult};
use crate::storage::SymbolTable;
use crate::types::{ArchitectureId, DependencyId, DependencyTypeId, GroupId, PackageId, VersionId};

/// The fields of one dependency edge a backend exposes to the expansion
/// engine. Strings borrow the backend.
pub(crate) struct EdgeData<'g> {
    pub to_package_id: PackageId,
    pub version_constraint: &'g str,
    pub architecture_constraint: ArchitectureId,
    pub dependency_type: DependencyTypeId,
    pub group: GroupId,
}

/// Read access a backend must provide for bounded-depth expansion. The
/// staging buffer and the persistent store implement this; the device
/// backend runs its own frontier step and reuses [`DiskSource`] only to
/// rebuild items.
pub(crate) trait QuerySource<'g> {
    fn package_id(&self, name: &str) -> Option<PackageId>;
    fn package_name(&self, pid: PackageId) -> Result<&'g str>;
    fn package_versions(&self, pid: PackageId, out: &mut Vec<VersionId>);
    fn version_string(&self, vid: VersionId) -> Result<&'g str>;
    fn version_architecture(&self, vid: VersionId) -> ArchitectureId;
    fn version_edges(&self, vid: VersionId, out: &mut Vec<DependencyId>);
    fn edge(&self, did: DependencyId) -> Result<EdgeData<'g>>;
    fn architecture_symbol(&self, id: ArchitectureId) -> Result<&'g str>;
    fn architecture_id(&self, symbol: &str) -> Option<ArchitectureId>;
    fn dependency_type_symbol(&self, id: DependencyTypeId) -> Result<&'g str>;
    fn dependency_type_id(&self, symbol: &str) -> Option<DependencyTypeId>;
}

/// Architecture ids with query-level meaning, resolved once per query.
#[derive(Clone, Copy)]
pub(crate) struct ArchRules {
    native: Option<ArchitectureId>,
    any: Option<ArchitectureId>,
    all: Option<ArchitectureId>,
}

impl ArchRules {
    pub(crate) fn resolve<'g, S: QuerySource<'g>>(source: &S) -> Self {
        Self {
            native: source.architecture_id("native"),
            any: source.architecture_id("any"),
            all: source.architecture_id("all"),
        }
    }

    /// `native` matches the origin's architecture or an `all` candidate;
    /// `any` matches everything; any other constraint matches literally.
    pub(crate) fn matches(
        &self,
        constraint: ArchitectureId,
        candidate: ArchitectureId,
        origin: ArchitectureId,
    ) -> bool {
        if Some(constraint) == self.native {
            candidate == origin || Some(candidate) == self.all
        } else if Some(constraint) == self.any {
            true
        } else {
            candidate == constraint
        }
    }
}

/// All versions of `name` passing the optional filters; an empty filter
/// string means "don't filter". Unknown packages yield an empty frontier.
pub(crate) fn initial_frontier<'g, S: QuerySource<'g>>(
    source: &S,
    name: &str,
    version: &str,
    architecture: &str,
) -> Result<Vec<VersionId>> {
    let mut frontier = Vec::new();
    let Some(pid) = source.package_id(name) else {
        return Ok(frontier);
    };
    let mut vids = Vec::new();
    source.package_versions(pid, &mut vids);
    for vid in vids {
        if !version.is_empty() && source.version_string(vid)? != version {
            continue;
        }
        if !architecture.is_empty()
            && source.architecture_symbol(source.version_architecture(vid))? != architecture
        {
            continue;
        }
        frontier.push(vid);
    }
    Ok(frontier)
}

/// Bounded-depth dependency expansion, identical in shape for every
/// backend. Every edge of a frontier version is reported at its level
/// (duplicates collapse within the level's direct set and within each
/// alternative group); only `Depends` edges outside alternative groups
/// grow the next frontier, filtered by the architecture rule.
pub(crate) fn expand<'g, S: QuerySource<'g>>(
    source: &S,
    frontier: &[VersionId],
    depth: usize,
) -> Result<DependencyResult<'g>> {
    let mut result: DependencyResult<'g> =
        (0..depth).map(|_| DependencyLevel::default()).collect();
    let rules = ArchRules::resolve(source);
    let depends = source.dependency_type_id("Depends");

    let mut visited: FxHashSet<VersionId> = frontier.iter().copied().collect();
    let mut frontier: Vec<VersionId> = frontier.to_vec();
    let mut edge_ids: Vec<DependencyId> = Vec::new();
    let mut candidates: Vec<VersionId> = Vec::new();

    for level in 0..depth {
        if frontier.is_empty() {
            break;
        }
        let mut seen_direct: FxHashSet<DependencyItem<'g>> = FxHashSet::default();
        let mut next: Vec<VersionId> = Vec::new();

        for &vid in &frontier {
            let origin_arch = source.version_architecture(vid);
            let mut groups: SmallVec<[DependencyGroup<'g>; 4]> = SmallVec::new();
            let mut seen_groups: SmallVec<[FxHashSet<DependencyItem<'g>>; 4]> = SmallVec::new();

            edge_ids.clear();
            source.version_edges(vid, &mut edge_ids);
            for &did in &edge_ids {
                let edge = source.edge(did)?;
                let item = DependencyItem {
                    package_name: source.package_name(edge.to_package_id)?,
                    dependency_type: source.dependency_type_symbol(edge.dependency_type)?,
                    version_constraint: edge.version_constraint,
                    architecture_constraint: source
                        .architecture_symbol(edge.architecture_constraint)?,
                };
                if edge.group == 0 {
                    if seen_direct.insert(item) {
                        result[level].direct_dependencies.push(item);
                    }
                } else {
                    let index = edge.group as usize - 1;
                    while groups.len() <= index {
                        groups.push(Vec::new());
                        seen_groups.push(FxHashSet::default());
                    }
                    if seen_groups[index].insert(item) {
                        groups[index].push(item);
                    }
                }

                if level + 1 < depth && edge.group == 0 && Some(edge.dependency_type) == depends {
                    candidates.clear();
                    source.package_versions(edge.to_package_id, &mut candidates);
                    for &candidate in &candidates {
                        if visited.contains(&candidate) {
                            continue;
                        }
                        let candidate_arch = source.version_architecture(candidate);
                        if rules.matches(edge.architecture_constraint, candidate_arch, origin_arch)
                        {
                            visited.insert(candidate);
                            next.push(candidate);
                        }
                    }
                }
            }

            for group in groups {
                if !group.is_empty() {
                    result[level].or_dependencies.push(group);
                }
            }
        }
        frontier = next;
    }
    Ok(result)
}

/// Expansion source over the persistent store.
pub(crate) struct DiskSource<'g> {
    graph: &'g DiskGraph,
}

impl<'g> DiskSource<'g> {
    pub(crate) fn new(graph: &'g DiskGraph) -> Self {
        Self { graph }
    }

    /// The version an edge leaves from; the device backend needs it to
    /// key alternative groups when rebuilding a level.
    pub(crate) fn edge_origin(&self, did: DependencyId) -> VersionId {
        self.graph.dependency_record(did).from_version_id
    }
}

impl<'g> QuerySource<'g> for DiskSource<'g> {
    fn package_id(&self, name: &str) -> Option<PackageId> {
        self.graph.package_id(name)
    }

    fn package_name(&self, pid: PackageId) -> Result<&'g str> {
        self.graph.strings().get(self.graph.package_record(pid).name)
    }

    fn package_versions(&self, pid: PackageId, out: &mut Vec<VersionId>) {
        self.graph.collect_package_versions(pid, out);
    }

    fn version_string(&self, vid: VersionId) -> Result<&'g str> {
        self.graph
            .strings()
            .get(self.graph.version_record(vid).version)
    }

    fn version_architecture(&self, vid: VersionId) -> ArchitectureId {
        self.graph.version_record(vid).architecture
    }

    fn version_edges(&self, vid: VersionId, out: &mut Vec<DependencyId>) {
        let record = self.graph.version_record(vid);
        let begin = record.dependency_id_begin;
        out.extend(begin..begin + record.dependency_count as u32);
    }

    fn edge(&self, did: DependencyId) -> Result<EdgeData<'g>> {
        let record = self.graph.dependency_record(did);
        Ok(EdgeData {
            to_package_id: record.to_package_id,
            version_constraint: self.graph.strings().get(record.version_constraint)?,
            architecture_constraint: record.architecture_constraint,
            dependency_type: record.dependency_type,
            group: record.group,
        })
    }

    fn architecture_symbol(&self, id: ArchitectureId) -> Result<&'g str> {
        self.graph.architecture_symbol(id)
    }

    fn architecture_id(&self, symbol: &str) -> Option<ArchitectureId> {
        self.graph.architecture_id(symbol)
    }

    fn dependency_type_symbol(&self, id: DependencyTypeId) -> Result<&'g str> {
        self.graph.dependency_type_symbol(id)
    }

    fn dependency_type_id(&self, symbol: &str) -> Option<DependencyTypeId> {
        self.graph.dependency_type_id(symbol)
    }
}

/// Expansion source over the staging buffer. Symbols still live in the
/// persistent store's tables; the buffer only holds their ids.
pub(crate) struct BufferSource<'g> {
    buffer: &'g BufferGraph,
    architectures: &'g SymbolTable,
    dependency_types: &'g SymbolTable,
}

impl<'g> BufferSource<'g> {
    pub(crate) fn new(
        buffer: &'g BufferGraph,
        architectures: &'g SymbolTable,
        dependency_types: &'g SymbolTable,
    ) -> Self {
        Self {
            buffer,
            architectures,
            dependency_types,
        }
    }
}

impl<'g> QuerySource<'g> for BufferSource<'g> {
    fn package_id(&self, name: &str) -> Option<PackageId> {
        self.buffer.package_id(name)
    }

    fn package_name(&self, pid: PackageId) -> Result<&'g str> {
        Ok(self.buffer.packages[pid as usize].name.as_str())
    }

    fn package_versions(&self, pid: PackageId, out: &mut Vec<VersionId>) {
        out.extend_from_slice(&self.buffer.packages[pid as usize].version_ids);
    }

    fn version_string(&self, vid: VersionId) -> Result<&'g str> {
        Ok(self.buffer.versions[vid as usize].version.as_str())
    }

    fn version_architecture(&self, vid: VersionId) -> ArchitectureId {
        self.buffer.versions[vid as usize].architecture
    }

    fn version_edges(&self, vid: VersionId, out: &mut Vec<DependencyId>) {
        out.extend_from_slice(&self.buffer.versions[vid as usize].dependency_ids);
    }

    fn edge(&self, did: DependencyId) -> Result<EdgeData<'g>> {
        let record = &self.buffer.dependencies[did as usize];
        Ok(EdgeData {
            to_package_id: record.to_package_id,
            version_constraint: record.version_constraint.as_str(),
            architecture_constraint: record.architecture_constraint,
            dependency_type: record.dependency_type,
            group: record.group,
        })
    }

    fn architecture_symbol(&self, id: ArchitectureId) -> Result<&'g str> {
        self.architectures.get(id)
    }

    fn architecture_id(&self, symbol: &str) -> Option<ArchitectureId> {
        self.architectures.id(symbol)
    }

    fn dependency_type_symbol(&self, id: DependencyTypeId) -> Result<&'g str> {
        self.dependency_types.get(id)
    }

    fn dependency_type_id(&self, symbol: &str) -> Option<DependencyTypeId> {
        self.dependency_types.id(symbol)
    }
}
