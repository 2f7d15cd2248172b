use std::path::Path;

use crate::error::{GraphError, Result};
use crate::storage::disk_vec::DiskVec;
use crate::types::{OpenCode, OpenMode};

/// Compact reference into a [`StringPool`]. The 8-bit length caps every
/// stored string at 255 bytes; longer inputs are a usage error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringHandle {
    pub offset: u32,
    pub length: u8,
}

pub const MAX_STRING_BYTES: usize = u8::MAX as usize;

/// Append-only byte arena over a [`DiskVec<u8>`].
///
/// The null-terminated variant writes a trailing `\0` after each string
/// (not counted in the handle length) so a symbol table can recover its
/// entries in insertion order by scanning the pool.
pub struct StringPool {
    bytes: DiskVec<u8>,
    null_terminated: bool,
}

impl StringPool {
    pub fn open(path: &Path, mode: OpenMode, chunk_bytes: usize) -> Result<(Self, OpenCode)> {
        let (bytes, code) = DiskVec::open(path, mode, chunk_bytes)?;
        Ok((
            Self {
                bytes,
                null_terminated: false,
            },
            code,
        ))
    }

    pub fn open_null_terminated(
        path: &Path,
        mode: OpenMode,
        chunk_bytes: usize,
    ) -> Result<(Self, OpenCode)> {
        let (bytes, code) = DiskVec::open(path, mode, chunk_bytes)?;
        Ok((
            Self {
                bytes,
                null_terminated: true,
            },
            code,
        ))
    }

    /// Total bytes stored, terminators included.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn add(&mut self, value: &str) -> Result<StringHandle> {
        if value.len() > MAX_STRING_BYTES {
            return Err(GraphError::Usage(format!(
                "string of {} bytes exceeds the {MAX_STRING_BYTES}-byte limit",
                value.len()
            )));
        }
        let offset = self.bytes.len();
        if offset + value.len() > u32::MAX as usize {
            return Err(GraphError::Usage(
                "string pool exceeds 4 GiB of addressable bytes".into(),
            ));
        }
        self.bytes.extend_from_slice(value.as_bytes())?;
        if self.null_terminated {
            self.bytes.extend_from_slice(&[0])?;
        }
        Ok(StringHandle {
            offset: offset as u32,
            length: value.len() as u8,
        })
    }

    pub fn get(&self, handle: StringHandle) -> Result<&str> {
        std::str::from_utf8(self.raw(handle)).map_err(|_| {
            GraphError::Corruption(format!(
                "string pool bytes at offset {} are not valid UTF-8",
                handle.offset
            ))
        })
    }

    /// Raw bytes for hashing and equality; the handle must be in bounds.
    pub fn raw(&self, handle: StringHandle) -> &[u8] {
        let start = handle.offset as usize;
        let end = start + handle.length as usize;
        &self.bytes.as_slice()[start..end]
    }

    /// Recovers handles from a null-terminated pool in insertion order.
    /// A malformed tail (no terminator, or a run longer than a handle can
    /// express) ends the scan; the caller reconciles against the control
    /// record and truncates.
    pub fn scan_terminated(&self) -> Vec<StringHandle> {
        debug_assert!(self.null_terminated);
        let bytes = self.bytes.as_slice();
        let mut handles = Vec::new();
        let mut start = 0usize;
        while start < bytes.len() {
            let Some(rel) = bytes[start..].iter().position(|&b| b == 0) else {
                break;
            };
            if rel > MAX_STRING_BYTES {
                break;
            }
            handles.push(StringHandle {
                offset: start as u32,
                length: rel as u8,
            });
            start += rel + 1;
        }
        handles
    }

    /// Drops all bytes beyond `len` (conservative-recovery truncation).
    pub fn truncate(&mut self, len: usize) {
        self.bytes.truncate(len);
    }

    pub fn sync(&mut self) -> Result<()> {
        self.bytes.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn add_get_roundtrip() -> Result<()> {
        let dir = tempdir().expect("tempdir");
        let (mut pool, _) = StringPool::open(&dir.path().join("pool.dat"), OpenMode::Create, 256)?;
        let a = pool.add("libssl3")?;
        let b = pool.add("2.36-9+deb12u4")?;
        assert_eq!(pool.get(a)?, "libssl3");
        assert_eq!(pool.get(b)?, "2.36-9+deb12u4");
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 7);
        Ok(())
    }

    #[test]
    fn rejects_overlong_string() -> Result<()> {
        let dir = tempdir().expect("tempdir");
        let (mut pool, _) = StringPool::open(&dir.path().join("pool.dat"), OpenMode::Create, 256)?;
        let long = "x".repeat(256);
        let err = pool.add(&long).unwrap_err();
        assert!(matches!(err, GraphError::Usage(_)));
        assert!(pool.is_empty());
        Ok(())
    }

    #[test]
    fn null_terminated_scan_recovers_order() -> Result<()> {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("symbols.dat");
        let (mut pool, _) = StringPool::open_null_terminated(&path, OpenMode::Create, 256)?;
        pool.add("native")?;
        pool.add("any")?;
        pool.add("all")?;
        pool.sync()?;
        drop(pool);

        let (pool, _) = StringPool::open_null_terminated(&path, OpenMode::Load, 256)?;
        let handles = pool.scan_terminated();
        let symbols: Vec<&str> = handles
            .iter()
            .map(|&h| pool.get(h))
            .collect::<Result<_>>()?;
        assert_eq!(symbols, ["native", "any", "all"]);
        Ok(())
    }
}
