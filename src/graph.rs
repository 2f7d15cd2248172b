use std::path::Path;

use tracing::{debug, info};

use crate::buffer::BufferGraph;
use crate::device::DeviceGraph;
use crate::disk::{DiskGraph, PackageRef};
use crate::error::{GraphError, Result};
use crate::model::DependencyResult;
use crate::query::{expand, initial_frontier, BufferSource, DiskSource};
use crate::storage::MAX_STRING_BYTES;
use crate::types::{
    ArchitectureId, DependencyId, DependencyTypeId, GroupId, OpenMode, PackageId, VersionId,
    DEFAULT_ARCHITECTURES, DEFAULT_CHUNK_BYTES, DEFAULT_DEPENDENCY_TYPES, DEFAULT_MAX_DEVICE_VECTOR_BYTES,
    DEFAULT_MEMORY_LIMIT,
};

#[derive(Debug, Clone)]
pub struct Config {
    /// Staging-buffer size that triggers a flush to the persistent store.
    pub memory_limit: usize,
    /// Growth granularity of the mmap-backed files.
    pub chunk_bytes: usize,
    /// Bound on each of the device backend's working vectors.
    pub max_device_vector_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            max_device_vector_bytes: DEFAULT_MAX_DEVICE_VECTOR_BYTES,
        }
    }
}

/// The two-tier dependency graph: writes stage into an in-memory buffer
/// and flush into the mmap-backed store once the buffer's estimated
/// memory crosses `memory_limit`; reads expand against the persistent
/// store, an optional device snapshot of it, or (as an oracle) the
/// staging buffer itself.
///
/// Single-writer: callers must not interleave mutation with outstanding
/// query results or views, which borrow the graph.
pub struct DependencyGraph {
    buffer: BufferGraph,
    disk: DiskGraph,
    device: Option<DeviceGraph>,
    config: Config,
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph").finish_non_exhaustive()
    }
}

impl DependencyGraph {
    pub fn open(directory: &Path, mode: OpenMode, config: Config) -> Result<Self> {
        let disk = DiskGraph::open(
            directory,
            mode,
            DEFAULT_ARCHITECTURES,
            DEFAULT_DEPENDENCY_TYPES,
            config.chunk_bytes,
        )?;
        Ok(Self {
            buffer: BufferGraph::new(),
            disk,
            device: None,
            config,
        })
    }

    pub fn open_default(directory: &Path) -> Result<Self> {
        Self::open(directory, OpenMode::LoadOrCreate, Config::default())
    }

    pub fn memory_limit(&self) -> usize {
        self.config.memory_limit
    }

    pub fn estimated_memory_usage(&self) -> usize {
        self.buffer.estimated_memory_usage()
    }

    pub fn add_architecture(&mut self, symbol: &str) -> Result<ArchitectureId> {
        check_length("architecture", symbol)?;
        self.disk.add_architecture(symbol)
    }

    pub fn add_dependency_type(&mut self, symbol: &str) -> Result<DependencyTypeId> {
        check_length("dependency type", symbol)?;
        self.disk.add_dependency_type(symbol)
    }

    pub fn create_package(&mut self, name: &str) -> Result<(PackageId, bool)> {
        check_length("package name", name)?;
        Ok(self.buffer.create_package(name))
    }

    pub fn create_version(
        &mut self,
        pid: PackageId,
        version: &str,
        architecture: ArchitectureId,
    ) -> Result<(VersionId, bool)> {
        check_length("version", version)?;
        Ok(self.buffer.create_version(pid, version, architecture))
    }

    pub fn create_dependency(
        &mut self,
        from_version_id: VersionId,
        to_package_id: PackageId,
        version_constraint: &str,
        architecture_constraint: ArchitectureId,
        dependency_type: DependencyTypeId,
        group: GroupId,
    ) -> Result<(DependencyId, bool)> {
        check_length("version constraint", version_constraint)?;
        Ok(self.buffer.create_dependency(
            from_version_id,
            to_package_id,
            version_constraint,
            architecture_constraint,
            dependency_type,
            group,
        ))
    }

    /// Ingests the staging buffer into the persistent store, clears it,
    /// and syncs. A no-op when nothing is staged. Any device snapshot
    /// goes stale; rebuild it with [`sync_to_device`](Self::sync_to_device).
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        debug!(
            buffered_packages = self.buffer.package_count(),
            buffered_versions = self.buffer.version_count(),
            buffered_dependencies = self.buffer.dependency_count(),
            estimated_bytes = self.buffer.estimated_memory_usage(),
            "graph.flush"
        );
        self.disk.ingest(&self.buffer)?;
        self.buffer.clear();
        self.disk.sync()
    }

    /// Flushes when the buffer's estimate has reached the memory limit;
    /// returns whether a flush ran.
    pub fn flush_if_over_limit(&mut self) -> Result<bool> {
        if self.buffer.estimated_memory_usage() < self.config.memory_limit {
            return Ok(false);
        }
        self.flush()?;
        Ok(true)
    }

    /// Rebuilds the device snapshot from the persistent store. Idempotent;
    /// prior device buffers are released.
    pub fn sync_to_device(&mut self) -> Result<()> {
        self.device = Some(DeviceGraph::build(
            &self.disk,
            self.config.max_device_vector_bytes,
        )?);
        info!(
            packages = self.disk.package_count(),
            versions = self.disk.version_count(),
            "graph.sync_to_device"
        );
        Ok(())
    }

    pub fn free_device(&mut self) {
        self.device = None;
    }

    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    /// Bounded-depth expansion against the persistent store (or its
    /// device snapshot). Staged-but-unflushed writes are not visible;
    /// flush first. Empty `version`/`architecture` filters match all
    /// versions of the package.
    pub fn query_dependencies(
        &self,
        name: &str,
        version: &str,
        architecture: &str,
        depth: usize,
        use_device: bool,
    ) -> Result<DependencyResult<'_>> {
        let source = DiskSource::new(&self.disk);
        let frontier = initial_frontier(&source, name, version, architecture)?;
        if use_device {
            let device = self.device.as_ref().ok_or_else(|| {
                GraphError::Usage(
                    "device snapshot not built; call sync_to_device before querying with use_device"
                        .into(),
                )
            })?;
            device.query(&self.disk, &frontier, depth)
        } else {
            expand(&source, &frontier, depth)
        }
    }

    /// Same expansion over the staging buffer only. Used as the oracle in
    /// cross-backend equivalence checks.
    pub fn query_dependencies_on_buffer(
        &self,
        name: &str,
        version: &str,
        architecture: &str,
        depth: usize,
    ) -> Result<DependencyResult<'_>> {
        let source = BufferSource::new(
            &self.buffer,
            self.disk.architectures(),
            self.disk.dependency_types(),
        );
        let frontier = initial_frontier(&source, name, version, architecture)?;
        expand(&source, &frontier, depth)
    }

    pub fn get_package(&self, name: &str) -> Option<PackageRef<'_>> {
        self.disk.get_package(name)
    }

    pub fn disk(&self) -> &DiskGraph {
        &self.disk
    }

    pub fn package_count(&self) -> usize {
        self.disk.package_count()
    }

    pub fn version_count(&self) -> usize {
        self.disk.version_count()
    }

    pub fn dependency_count(&self) -> usize {
        self.disk.dependency_count()
    }

    pub fn buffer_package_count(&self) -> usize {
        self.buffer.package_count()
    }

    pub fn buffer_version_count(&self) -> usize {
        self.buffer.version_count()
    }

    pub fn buffer_dependency_count(&self) -> usize {
        self.buffer.dependency_count()
    }

    pub fn sync(&mut self) -> Result<()> {
        self.disk.sync()
    }

    /// Flushes anything still staged, then syncs and unmaps.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.disk.close()
    }
}

fn check_length(what: &str, value: &str) -> Result<()> {
    if value.len() > MAX_STRING_BYTES {
        return Err(GraphError::Usage(format!(
            "{what} of {} bytes exceeds the {MAX_STRING_BYTES}-byte limit",
            value.len()
        )));
    }
    Ok(())
}
