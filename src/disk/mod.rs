mod records;
#[cfg(test)]
mod tests;
mod view;

pub use view::{DependencyRef, PackageRef, VersionRef};

pub(crate) use records::{
    Control, DependencyRecord, PackageRecord, VersionListRecord, VersionRecord, CONTROL_BYTES,
    CONTROL_MAGIC,
};

use std::path::Path;

use tracing::{debug, trace};

use crate::buffer::BufferGraph;
use crate::error::{GraphError, Result};
use crate::storage::{DiskVec, HandleMap, StringPool, SymbolTable};
use crate::types::{
    ArchitectureId, DependencyId, DependencyTypeId, GroupId, OpenCode, OpenMode, PackageId,
    SymbolId, VersionId, VersionListId, SMALL_CHUNK_BYTES, VERSION_LIST_END,
};

/// Columnar persistent graph: a directory of eight mmap-backed files tied
/// together by the control record in `.meta`.
///
/// The store is strictly append-only; records are never rewritten or
/// shortened, and all ids are dense and stable. On load, the control
/// record's counts are authoritative: entries a crash left beyond them are
/// treated as nonexistent and overwritten by the next append.
///
/// Open mode controls whether missing files may be created; a store opened
/// with `Load` is still writable.
pub struct DiskGraph {
    control: DiskVec<u8>,
    architectures: SymbolTable,
    dependency_types: SymbolTable,
    packages: DiskVec<PackageRecord>,
    versions: DiskVec<VersionRecord>,
    dependencies: DiskVec<DependencyRecord>,
    version_lists: DiskVec<VersionListRecord>,
    strings: StringPool,
    name_to_package: HandleMap<PackageId>,
}

impl std::fmt::Debug for DiskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskGraph").finish_non_exhaustive()
    }
}

impl DiskGraph {
    pub fn open(
        directory: &Path,
        mode: OpenMode,
        architectures: &[&str],
        dependency_types: &[&str],
        chunk_bytes: usize,
    ) -> Result<Self> {
        if mode != OpenMode::Load {
            std::fs::create_dir_all(directory)
                .map_err(|e| GraphError::OpenFailed(format!("{}: {e}", directory.display())))?;
        }

        let mut codes: Vec<OpenCode> = Vec::with_capacity(8);
        let (control, code) = DiskVec::open(&directory.join(".meta"), mode, SMALL_CHUNK_BYTES)?;
        codes.push(code);
        let (architectures, code) = SymbolTable::open(
            &directory.join("architectures.dat"),
            mode,
            architectures,
            SMALL_CHUNK_BYTES,
        )?;
        codes.push(code);
        let (dependency_types, code) = SymbolTable::open(
            &directory.join("dependency-types.dat"),
            mode,
            dependency_types,
            SMALL_CHUNK_BYTES,
        )?;
        codes.push(code);
        let (packages, code) = DiskVec::open(&directory.join("packages.dat"), mode, chunk_bytes)?;
        codes.push(code);
        let (versions, code) = DiskVec::open(&directory.join("versions.dat"), mode, chunk_bytes)?;
        codes.push(code);
        let (dependencies, code) =
            DiskVec::open(&directory.join("dependencies.dat"), mode, chunk_bytes)?;
        codes.push(code);
        let (version_lists, code) =
            DiskVec::open(&directory.join("version-lists.dat"), mode, chunk_bytes)?;
        codes.push(code);
        let (strings, code) =
            StringPool::open(&directory.join("string-pool.dat"), mode, chunk_bytes)?;
        codes.push(code);

        if codes.iter().any(|&c| c != codes[0]) {
            return Err(GraphError::OpenFailed(format!(
                "{}: store files disagree on load/create state",
                directory.display()
            )));
        }

        let mut graph = Self {
            control,
            architectures,
            dependency_types,
            packages,
            versions,
            dependencies,
            version_lists,
            strings,
            name_to_package: HandleMap::new(),
        };

        match codes[0] {
            OpenCode::Created => {
                graph.control.resize(CONTROL_BYTES)?;
                graph.write_control();
            }
            OpenCode::Loaded => {
                graph.recover()?;
            }
        }
        debug!(
            directory = %directory.display(),
            code = ?codes[0],
            packages = graph.package_count(),
            versions = graph.version_count(),
            dependencies = graph.dependency_count(),
            "disk.open"
        );
        Ok(graph)
    }

    /// Reconciles file contents against the control record after a load.
    /// Counts claimed by control are authoritative; longer vectors are
    /// truncated, shorter ones are corruption.
    fn recover(&mut self) -> Result<()> {
        if self.control.len() < CONTROL_BYTES {
            return Err(GraphError::Corruption(
                "control file shorter than a control record".into(),
            ));
        }
        let control = Control::decode(self.control.as_slice())?;

        self.architectures
            .truncate(control.architecture_count as usize)?;
        self.dependency_types
            .truncate(control.dependency_type_count as usize)?;

        let claims = [
            (control.package_count as usize, self.packages.len(), "packages"),
            (control.version_count as usize, self.versions.len(), "versions"),
            (
                control.dependency_count as usize,
                self.dependencies.len(),
                "dependencies",
            ),
            (
                control.version_list_count as usize,
                self.version_lists.len(),
                "version lists",
            ),
            (
                control.string_pool_size as usize,
                self.strings.len(),
                "string pool",
            ),
        ];
        for (claimed, actual, what) in claims {
            if claimed > actual {
                return Err(GraphError::Corruption(format!(
                    "control record claims {claimed} {what} but the file holds {actual}"
                )));
            }
        }
        self.packages.truncate(control.package_count as usize);
        self.versions.truncate(control.version_count as usize);
        self.dependencies
            .truncate(control.dependency_count as usize);
        self.version_lists
            .truncate(control.version_list_count as usize);
        self.strings.truncate(control.string_pool_size as usize);

        self.name_to_package.clear();
        for pid in 0..self.packages.len() {
            let record = self.packages.get(pid);
            self.name_to_package
                .insert(&self.strings, record.name, pid as PackageId);
        }
        Ok(())
    }

    fn write_control(&mut self) {
        let control = Control {
            magic: CONTROL_MAGIC,
            architecture_count: self.architectures.len() as u64,
            dependency_type_count: self.dependency_types.len() as u64,
            package_count: self.packages.len() as u64,
            version_count: self.versions.len() as u64,
            dependency_count: self.dependencies.len() as u64,
            version_list_count: self.version_lists.len() as u64,
            string_pool_size: self.strings.len() as u64,
        };
        control.encode(self.control.as_mut_slice());
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

    pub fn version_list_count(&self) -> usize {
        self.version_lists.len()
    }

    pub fn architecture_count(&self) -> usize {
        self.architectures.len()
    }

    pub fn dependency_type_count(&self) -> usize {
        self.dependency_types.len()
    }

    pub fn add_architecture(&mut self, symbol: &str) -> Result<ArchitectureId> {
        self.architectures.add(symbol)
    }

    pub fn add_dependency_type(&mut self, symbol: &str) -> Result<DependencyTypeId> {
        self.dependency_types.add(symbol)
    }

    pub fn architecture_symbol(&self, id: ArchitectureId) -> Result<&str> {
        self.architectures.get(id)
    }

    pub fn dependency_type_symbol(&self, id: DependencyTypeId) -> Result<&str> {
        self.dependency_types.get(id)
    }

    pub fn architecture_id(&self, symbol: &str) -> Option<SymbolId> {
        self.architectures.id(symbol)
    }

    pub fn dependency_type_id(&self, symbol: &str) -> Option<SymbolId> {
        self.dependency_types.id(symbol)
    }

    pub fn package_id(&self, name: &str) -> Option<PackageId> {
        self.name_to_package.get(&self.strings, name)
    }

    /// Never errors on a missing name; absent packages are `None`.
    pub fn get_package(&self, name: &str) -> Option<PackageRef<'_>> {
        self.package_id(name).map(|pid| self.package(pid))
    }

    pub fn package(&self, pid: PackageId) -> PackageRef<'_> {
        PackageRef::new(self, pid)
    }

    pub fn version(&self, vid: VersionId) -> VersionRef<'_> {
        VersionRef::new(self, vid)
    }

    pub fn dependency(&self, did: DependencyId) -> DependencyRef<'_> {
        DependencyRef::new(self, did)
    }

    pub(crate) fn package_record(&self, pid: PackageId) -> PackageRecord {
        self.packages.get(pid as usize)
    }

    pub(crate) fn version_record(&self, vid: VersionId) -> VersionRecord {
        self.versions.get(vid as usize)
    }

    pub(crate) fn dependency_record(&self, did: DependencyId) -> DependencyRecord {
        self.dependencies.get(did as usize)
    }

    pub(crate) fn version_list_record(&self, vlid: VersionListId) -> VersionListRecord {
        self.version_lists.get(vlid as usize)
    }

    pub(crate) fn strings(&self) -> &StringPool {
        &self.strings
    }

    pub(crate) fn architectures(&self) -> &SymbolTable {
        &self.architectures
    }

    pub(crate) fn dependency_types(&self) -> &SymbolTable {
        &self.dependency_types
    }

    /// Appends every version id owned by `pid`, walking the whole chain
    /// (newest range first).
    pub(crate) fn collect_package_versions(&self, pid: PackageId, out: &mut Vec<VersionId>) {
        let mut vlid = self.package_record(pid).version_list_id;
        while vlid != VERSION_LIST_END {
            let node = self.version_list_record(vlid);
            let begin = node.version_id_begin;
            out.extend(begin..begin + node.version_count as u32);
            vlid = node.next_version_list_id;
        }
    }

    /// Idempotent by package name.
    pub fn create_package(&mut self, name: &str) -> Result<(PackageId, bool)> {
        if let Some(pid) = self.name_to_package.get(&self.strings, name) {
            return Ok((pid, false));
        }
        let handle = self.strings.add(name)?;
        let pid = self.packages.len() as PackageId;
        self.packages.push(&PackageRecord {
            name: handle,
            version_list_id: VERSION_LIST_END,
        })?;
        self.name_to_package.insert(&self.strings, handle, pid);
        Ok((pid, true))
    }

    /// Idempotent by `(version, architecture)` within the package; the
    /// dependency run `[dependency_id_begin, dependency_id_begin +
    /// dependency_count)` is recorded verbatim and must already be
    /// reserved by the caller (the ingest protocol guarantees it).
    pub fn create_version(
        &mut self,
        pid: PackageId,
        version: &str,
        architecture: ArchitectureId,
        dependency_id_begin: DependencyId,
        dependency_count: u16,
    ) -> Result<(VersionId, bool)> {
        if let Some(vid) = self.find_version(pid, version, architecture)? {
            return Ok((vid, false));
        }
        let handle = self.strings.add(version)?;
        let vid = self.versions.len() as VersionId;
        self.versions.push(&VersionRecord {
            version: handle,
            architecture,
            dependency_count,
            dependency_id_begin,
        })?;
        Ok((vid, true))
    }

    fn find_version(
        &self,
        pid: PackageId,
        version: &str,
        architecture: ArchitectureId,
    ) -> Result<Option<VersionId>> {
        let mut vlid = self.package_record(pid).version_list_id;
        while vlid != VERSION_LIST_END {
            let node = self.version_list_record(vlid);
            for vid in node.version_id_begin..node.version_id_begin + node.version_count as u32 {
                let record = self.version_record(vid);
                if record.architecture == architecture && self.strings.get(record.version)? == version
                {
                    return Ok(Some(vid));
                }
            }
            vlid = node.next_version_list_id;
        }
        Ok(None)
    }

    /// Always appends; duplicate edges are a query-time concern.
    pub fn create_dependency(
        &mut self,
        from_version_id: VersionId,
        to_package_id: PackageId,
        version_constraint: &str,
        architecture_constraint: ArchitectureId,
        dependency_type: DependencyTypeId,
        group: GroupId,
    ) -> Result<(DependencyId, bool)> {
        let handle = self.strings.add(version_constraint)?;
        let did = self.dependencies.len() as DependencyId;
        self.dependencies.push(&DependencyRecord {
            from_version_id,
            to_package_id,
            version_constraint: handle,
            architecture_constraint,
            dependency_type,
            group,
        })?;
        Ok((did, true))
    }

    /// Prepends a new contiguous version range to the package's chain.
    pub fn attach_versions(
        &mut self,
        pid: PackageId,
        version_id_begin: VersionId,
        version_count: u16,
    ) -> Result<()> {
        if version_count == 0 {
            return Ok(());
        }
        let mut record = self.package_record(pid);
        let vlid = self.version_lists.len() as VersionListId;
        self.version_lists.push(&VersionListRecord {
            version_count,
            version_id_begin,
            next_version_list_id: record.version_list_id,
        })?;
        record.version_list_id = vlid;
        self.packages.set(pid as usize, &record);
        Ok(())
    }

    /// Converts the staging buffer's contents into stable on-disk records,
    /// de-duplicating packages and versions against what is already
    /// persisted. Each package that gains versions gets one new
    /// version-list node.
    pub fn ingest(&mut self, buffer: &BufferGraph) -> Result<()> {
        for bpackage in &buffer.packages {
            let version_id_begin = self.versions.len() as VersionId;
            let mut version_count: u16 = 0;
            let (pid, _) = self.create_package(&bpackage.name)?;

            for &bvid in &bpackage.version_ids {
                let bversion = &buffer.versions[bvid as usize];
                let dependency_id_begin = self.dependencies.len() as DependencyId;
                let dependency_count =
                    u16::try_from(bversion.dependency_ids.len()).map_err(|_| {
                        GraphError::Usage(format!(
                            "version {:?} of {:?} declares more than {} dependencies",
                            bversion.version,
                            bpackage.name,
                            u16::MAX
                        ))
                    })?;
                let (vid, inserted) = self.create_version(
                    pid,
                    &bversion.version,
                    bversion.architecture,
                    dependency_id_begin,
                    dependency_count,
                )?;
                if !inserted {
                    continue;
                }
                version_count = version_count.checked_add(1).ok_or_else(|| {
                    GraphError::Usage(format!(
                        "package {:?} gains more than {} versions in one ingest",
                        bpackage.name,
                        u16::MAX
                    ))
                })?;

                for &bdid in &bversion.dependency_ids {
                    let bdep = &buffer.dependencies[bdid as usize];
                    let target = &buffer.packages[bdep.to_package_id as usize];
                    let (target_pid, _) = self.create_package(&target.name)?;
                    self.create_dependency(
                        vid,
                        target_pid,
                        &bdep.version_constraint,
                        bdep.architecture_constraint,
                        bdep.dependency_type,
                        bdep.group,
                    )?;
                }
            }
            if version_count > 0 {
                self.attach_versions(pid, version_id_begin, version_count)?;
            }
            trace!(
                package = %bpackage.name,
                new_versions = version_count,
                "disk.ingest.package"
            );
        }
        debug!(
            packages = self.package_count(),
            versions = self.version_count(),
            dependencies = self.dependency_count(),
            "disk.ingest"
        );
        Ok(())
    }

    /// Writes the control record from the current counts and flushes all
    /// dirty pages. A crash before `sync` leaves the store recoverable:
    /// the control record simply claims less than the files hold.
    pub fn sync(&mut self) -> Result<()> {
        self.write_control();
        self.control.sync()?;
        self.architectures.sync()?;
        self.dependency_types.sync()?;
        self.packages.sync()?;
        self.versions.sync()?;
        self.dependencies.sync()?;
        self.version_lists.sync()?;
        self.strings.sync()?;
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.sync()
    }
}
