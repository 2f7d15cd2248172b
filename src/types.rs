pub type PackageId = u32;
pub type VersionId = u32;
pub type DependencyId = u32;
pub type VersionListId = u32;

pub type ArchitectureId = u8;
pub type DependencyTypeId = u8;
pub type GroupId = u8;
pub type SymbolId = u8;

/// Sentinel terminating a package's version-list chain.
pub const VERSION_LIST_END: VersionListId = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Load,
    Create,
    LoadOrCreate,
}

/// How an `open` actually completed. Failures are reported as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenCode {
    Loaded,
    Created,
}

pub const KIB: usize = 1024;
pub const MIB: usize = 1024 * KIB;
pub const GIB: usize = 1024 * MIB;

pub const DEFAULT_CHUNK_BYTES: usize = MIB;
pub const SMALL_CHUNK_BYTES: usize = 256;
pub const DEFAULT_MEMORY_LIMIT: usize = GIB;
pub const DEFAULT_MAX_DEVICE_VECTOR_BYTES: usize = 64 * MIB;

/// Architectures seeded into a fresh store. The first three carry meaning
/// for dependency expansion; anything else is data-defined.
pub const DEFAULT_ARCHITECTURES: &[&str] = &["native", "any", "all"];

/// Dependency-type symbols seeded into a fresh store. Only `Depends`
/// participates in transitive expansion.
pub const DEFAULT_DEPENDENCY_TYPES: &[&str] = &[
    "Depends",
    "Pre-Depends",
    "Recommends",
    "Suggests",
    "Breaks",
    "Conflicts",
    "Provides",
    "Replaces",
    "Enhances",
];
