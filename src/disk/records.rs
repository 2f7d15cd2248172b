use crate::error::{GraphError, Result};
use crate::storage::{Record, StringHandle};
use crate::types::{
    ArchitectureId, DependencyTypeId, GroupId, PackageId, VersionId, VersionListId,
};

pub const CONTROL_MAGIC: u64 = 0x4850_5247_4b53_4944; // "DISKGRPH"
pub const CONTROL_BYTES: usize = 64;

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes(buf[at..at + 2].try_into().expect("2 bytes"))
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(buf[at..at + 4].try_into().expect("4 bytes"))
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(buf[at..at + 8].try_into().expect("8 bytes"))
}

/// `packages.dat` entry: interned name plus the head of the version-list
/// chain (`VERSION_LIST_END` while the package has no attached versions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: StringHandle,
    pub version_list_id: VersionListId,
}

impl Record for PackageRecord {
    const SIZE: usize = 9;

    fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.name.offset.to_le_bytes());
        buf[4] = self.name.length;
        buf[5..9].copy_from_slice(&self.version_list_id.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            name: StringHandle {
                offset: read_u32(buf, 0),
                length: buf[4],
            },
            version_list_id: read_u32(buf, 5),
        }
    }
}

/// `versions.dat` entry. The version's dependency edges occupy the
/// contiguous run `[dependency_id_begin, dependency_id_begin + dependency_count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRecord {
    pub version: StringHandle,
    pub architecture: ArchitectureId,
    pub dependency_count: u16,
    pub dependency_id_begin: u32,
}

impl Record for VersionRecord {
    const SIZE: usize = 12;

    fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.version.offset.to_le_bytes());
        buf[4] = self.version.length;
        buf[5] = self.architecture;
        buf[6..8].copy_from_slice(&self.dependency_count.to_le_bytes());
        buf[8..12].copy_from_slice(&self.dependency_id_begin.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            version: StringHandle {
                offset: read_u32(buf, 0),
                length: buf[4],
            },
            architecture: buf[5],
            dependency_count: read_u16(buf, 6),
            dependency_id_begin: read_u32(buf, 8),
        }
    }
}

/// `dependencies.dat` entry. The constraint string is stored verbatim and
/// never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyRecord {
    pub from_version_id: VersionId,
    pub to_package_id: PackageId,
    pub version_constraint: StringHandle,
    pub architecture_constraint: ArchitectureId,
    pub dependency_type: DependencyTypeId,
    pub group: GroupId,
}

impl Record for DependencyRecord {
    const SIZE: usize = 16;

    fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.from_version_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.to_package_id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.version_constraint.offset.to_le_bytes());
        buf[12] = self.version_constraint.length;
        buf[13] = self.architecture_constraint;
        buf[14] = self.dependency_type;
        buf[15] = self.group;
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            from_version_id: read_u32(buf, 0),
            to_package_id: read_u32(buf, 4),
            version_constraint: StringHandle {
                offset: read_u32(buf, 8),
                length: buf[12],
            },
            architecture_constraint: buf[13],
            dependency_type: buf[14],
            group: buf[15],
        }
    }
}

/// `version-lists.dat` entry: one contiguous version range appended by a
/// single ingest, linked newest-first into the owning package's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionListRecord {
    pub version_count: u16,
    pub version_id_begin: VersionId,
    pub next_version_list_id: VersionListId,
}

impl Record for VersionListRecord {
    const SIZE: usize = 10;

    fn encode(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.version_count.to_le_bytes());
        buf[2..6].copy_from_slice(&self.version_id_begin.to_le_bytes());
        buf[6..10].copy_from_slice(&self.next_version_list_id.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            version_count: read_u16(buf, 0),
            version_id_begin: read_u32(buf, 2),
            next_version_list_id: read_u32(buf, 6),
        }
    }
}

/// Payload of `.meta`: eight little-endian u64 words. Counts are the
/// authoritative sizes on load; vectors longer than their count carry
/// unclaimed entries that the next append overwrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Control {
    pub magic: u64,
    pub architecture_count: u64,
    pub dependency_type_count: u64,
    pub package_count: u64,
    pub version_count: u64,
    pub dependency_count: u64,
    pub version_list_count: u64,
    pub string_pool_size: u64,
}

impl Control {
    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.magic.to_le_bytes());
        buf[8..16].copy_from_slice(&self.architecture_count.to_le_bytes());
        buf[16..24].copy_from_slice(&self.dependency_type_count.to_le_bytes());
        buf[24..32].copy_from_slice(&self.package_count.to_le_bytes());
        buf[32..40].copy_from_slice(&self.version_count.to_le_bytes());
        buf[40..48].copy_from_slice(&self.dependency_count.to_le_bytes());
        buf[48..56].copy_from_slice(&self.version_list_count.to_le_bytes());
        buf[56..64].copy_from_slice(&self.string_pool_size.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < CONTROL_BYTES {
            return Err(GraphError::Corruption(
                "control record shorter than 64 bytes".into(),
            ));
        }
        let control = Self {
            magic: read_u64(buf, 0),
            architecture_count: read_u64(buf, 8),
            dependency_type_count: read_u64(buf, 16),
            package_count: read_u64(buf, 24),
            version_count: read_u64(buf, 32),
            dependency_count: read_u64(buf, 40),
            version_list_count: read_u64(buf, 48),
            string_pool_size: read_u64(buf, 56),
        };
        if control.magic != CONTROL_MAGIC {
            return Err(GraphError::Corruption("control record magic mismatch".into()));
        }
        Ok(control)
    }
}
