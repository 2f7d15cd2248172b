use std::fs::{File, OpenOptions};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use tracing::trace;

use crate::error::{GraphError, Result};
use crate::types::{OpenCode, OpenMode};

pub const DISK_VEC_MAGIC: u64 = 0x5443_4556_4b53_4944; // "DISKVECT"
pub const HEADER_BYTES: usize = 24;

const MAGIC_RANGE: std::ops::Range<usize> = 0..8;
const ELEMENT_SIZE_RANGE: std::ops::Range<usize> = 8..16;
const SIZE_RANGE: std::ops::Range<usize> = 16..24;

/// Fixed-size record stored in a [`DiskVec`]. Encoding is explicit and
/// little-endian; records never hold pointers.
pub trait Record: Copy {
    const SIZE: usize;

    fn encode(&self, buf: &mut [u8]);
    fn decode(buf: &[u8]) -> Self;
}

impl Record for u8 {
    const SIZE: usize = 1;

    fn encode(&self, buf: &mut [u8]) {
        buf[0] = *self;
    }

    fn decode(buf: &[u8]) -> Self {
        buf[0]
    }
}

/// Memory-mapped growable array of fixed-size records.
///
/// File layout: `[24-byte header | element 0..size]`, padded to a multiple
/// of `chunk_bytes`. The header records the magic, the element size, and
/// the logical length; a `Load` refuses any file whose magic or element
/// size does not match.
#[derive(Debug)]
pub struct DiskVec<T: Record> {
    file: File,
    map: Option<MmapMut>,
    path: PathBuf,
    chunk_bytes: usize,
    _marker: PhantomData<T>,
}

impl<T: Record> DiskVec<T> {
    pub fn open(path: &Path, mode: OpenMode, chunk_bytes: usize) -> Result<(Self, OpenCode)> {
        debug_assert!(chunk_bytes >= HEADER_BYTES);
        match mode {
            OpenMode::Load => {
                let vec = Self::load(path, chunk_bytes)?;
                Ok((vec, OpenCode::Loaded))
            }
            OpenMode::Create => {
                let vec = Self::create(path, chunk_bytes)?;
                Ok((vec, OpenCode::Created))
            }
            OpenMode::LoadOrCreate => match Self::load(path, chunk_bytes) {
                Ok(vec) => Ok((vec, OpenCode::Loaded)),
                Err(_) => {
                    let vec = Self::create(path, chunk_bytes)?;
                    Ok((vec, OpenCode::Created))
                }
            },
        }
    }

    fn load(path: &Path, chunk_bytes: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| GraphError::OpenFailed(format!("{}: {e}", path.display())))?;
        let file_len = file.metadata()?.len();
        if (file_len as usize) < HEADER_BYTES {
            return Err(GraphError::OpenFailed(format!(
                "{}: file shorter than header",
                path.display()
            )));
        }
        let map = unsafe { MmapMut::map_mut(&file) }
            .map_err(|e| GraphError::OpenFailed(format!("{}: mmap: {e}", path.display())))?;
        let vec = Self {
            file,
            map: Some(map),
            path: path.to_path_buf(),
            chunk_bytes,
            _marker: PhantomData,
        };
        if vec.header_magic() != DISK_VEC_MAGIC {
            return Err(GraphError::OpenFailed(format!(
                "{}: bad magic",
                path.display()
            )));
        }
        if vec.header_element_size() != T::SIZE as u64 {
            return Err(GraphError::OpenFailed(format!(
                "{}: element size {} does not match expected {}",
                path.display(),
                vec.header_element_size(),
                T::SIZE
            )));
        }
        let needed = HEADER_BYTES as u64 + vec.header_size() * T::SIZE as u64;
        if needed > file_len {
            return Err(GraphError::OpenFailed(format!(
                "{}: file shorter than recorded size",
                path.display()
            )));
        }
        Ok(vec)
    }

    fn create(path: &Path, chunk_bytes: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| GraphError::OpenFailed(format!("{}: {e}", parent.display())))?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| GraphError::OpenFailed(format!("{}: {e}", path.display())))?;
        file.set_len(chunk_bytes as u64)
            .map_err(|e| GraphError::OpenFailed(format!("{}: resize: {e}", path.display())))?;
        let map = unsafe { MmapMut::map_mut(&file) }
            .map_err(|e| GraphError::OpenFailed(format!("{}: mmap: {e}", path.display())))?;
        let mut vec = Self {
            file,
            map: Some(map),
            path: path.to_path_buf(),
            chunk_bytes,
            _marker: PhantomData,
        };
        vec.set_header_magic(DISK_VEC_MAGIC);
        vec.set_header_element_size(T::SIZE as u64);
        vec.set_header_size(0);
        Ok(vec)
    }

    fn data(&self) -> &MmapMut {
        self.map.as_ref().expect("disk vector is mapped")
    }

    fn data_mut(&mut self) -> &mut MmapMut {
        self.map.as_mut().expect("disk vector is mapped")
    }

    fn header_magic(&self) -> u64 {
        u64::from_le_bytes(self.data()[MAGIC_RANGE].try_into().expect("8 bytes"))
    }

    fn header_element_size(&self) -> u64 {
        u64::from_le_bytes(self.data()[ELEMENT_SIZE_RANGE].try_into().expect("8 bytes"))
    }

    fn header_size(&self) -> u64 {
        u64::from_le_bytes(self.data()[SIZE_RANGE].try_into().expect("8 bytes"))
    }

    fn set_header_magic(&mut self, value: u64) {
        self.data_mut()[MAGIC_RANGE].copy_from_slice(&value.to_le_bytes());
    }

    fn set_header_element_size(&mut self, value: u64) {
        self.data_mut()[ELEMENT_SIZE_RANGE].copy_from_slice(&value.to_le_bytes());
    }

    fn set_header_size(&mut self, value: u64) {
        self.data_mut()[SIZE_RANGE].copy_from_slice(&value.to_le_bytes());
    }

    pub fn len(&self) -> usize {
        self.header_size() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        (self.data().len() - HEADER_BYTES) / T::SIZE
    }

    /// Grows the backing file so at least `capacity` records fit. All byte
    /// borrows obtained before the call are invalidated by the remap, which
    /// the borrow checker enforces through `&mut self`.
    pub fn reserve(&mut self, capacity: usize) -> Result<()> {
        if capacity <= self.capacity() {
            return Ok(());
        }
        self.sync()?;
        // Unmap before resizing the file, then remap the grown file.
        self.map = None;
        let needed = HEADER_BYTES + capacity * T::SIZE;
        let chunks = needed.div_ceil(self.chunk_bytes);
        let new_len = (chunks * self.chunk_bytes) as u64;
        self.file.set_len(new_len)?;
        self.map = Some(unsafe { MmapMut::map_mut(&self.file) }?);
        trace!(path = %self.path.display(), bytes = new_len, "disk_vec.remap");
        Ok(())
    }

    pub fn get(&self, index: usize) -> T {
        assert!(index < self.len(), "disk vector index out of range");
        let off = HEADER_BYTES + index * T::SIZE;
        T::decode(&self.data()[off..off + T::SIZE])
    }

    pub fn set(&mut self, index: usize, value: &T) {
        assert!(index < self.len(), "disk vector index out of range");
        let off = HEADER_BYTES + index * T::SIZE;
        value.encode(&mut self.data_mut()[off..off + T::SIZE]);
    }

    pub fn push(&mut self, value: &T) -> Result<usize> {
        let index = self.len();
        self.reserve(index + 1)?;
        let off = HEADER_BYTES + index * T::SIZE;
        value.encode(&mut self.data_mut()[off..off + T::SIZE]);
        self.set_header_size(index as u64 + 1);
        Ok(index)
    }

    /// Grows (zero-filling the tail) or shrinks to exactly `len` records.
    pub fn resize(&mut self, len: usize) -> Result<()> {
        let old = self.len();
        if len > old {
            self.reserve(len)?;
            let start = HEADER_BYTES + old * T::SIZE;
            let end = HEADER_BYTES + len * T::SIZE;
            self.data_mut()[start..end].fill(0);
        }
        self.set_header_size(len as u64);
        Ok(())
    }

    /// Drops records beyond `len`. Used when the control record claims
    /// fewer entries than the file holds after a crash.
    pub fn truncate(&mut self, len: usize) {
        if len < self.len() {
            self.set_header_size(len as u64);
        }
    }

    pub fn sync(&mut self) -> Result<()> {
        if let Some(map) = self.map.as_ref() {
            map.flush()?;
        }
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.sync()
    }
}

impl DiskVec<u8> {
    pub fn as_slice(&self) -> &[u8] {
        let len = self.len();
        &self.data()[HEADER_BYTES..HEADER_BYTES + len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        let len = self.len();
        &mut self.data_mut()[HEADER_BYTES..HEADER_BYTES + len]
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<()> {
        let old = self.len();
        self.reserve(old + bytes.len())?;
        let start = HEADER_BYTES + old;
        self.data_mut()[start..start + bytes.len()].copy_from_slice(bytes);
        self.set_header_size((old + bytes.len()) as u64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Pair {
        a: u32,
        b: u16,
    }

    impl Record for Pair {
        const SIZE: usize = 6;

        fn encode(&self, buf: &mut [u8]) {
            buf[0..4].copy_from_slice(&self.a.to_le_bytes());
            buf[4..6].copy_from_slice(&self.b.to_le_bytes());
        }

        fn decode(buf: &[u8]) -> Self {
            Self {
                a: u32::from_le_bytes(buf[0..4].try_into().expect("4 bytes")),
                b: u16::from_le_bytes(buf[4..6].try_into().expect("2 bytes")),
            }
        }
    }

    #[test]
    fn create_push_reopen() -> Result<()> {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("pairs.dat");

        let (mut vec, code) = DiskVec::<Pair>::open(&path, OpenMode::Create, 256)?;
        assert_eq!(code, OpenCode::Created);
        for i in 0..100u32 {
            vec.push(&Pair { a: i, b: i as u16 })?;
        }
        assert_eq!(vec.len(), 100);
        vec.close()?;

        let (vec, code) = DiskVec::<Pair>::open(&path, OpenMode::Load, 256)?;
        assert_eq!(code, OpenCode::Loaded);
        assert_eq!(vec.len(), 100);
        assert_eq!(vec.get(42), Pair { a: 42, b: 42 });
        Ok(())
    }

    #[test]
    fn growth_crosses_chunks() -> Result<()> {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("grow.dat");
        let (mut vec, _) = DiskVec::<Pair>::open(&path, OpenMode::Create, 64)?;
        for i in 0..1000u32 {
            vec.push(&Pair { a: i, b: 7 })?;
        }
        assert_eq!(vec.len(), 1000);
        assert_eq!(vec.get(999).a, 999);
        let file_len = std::fs::metadata(&path).expect("metadata").len();
        assert_eq!(file_len % 64, 0);
        Ok(())
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("missing.dat");
        let err = DiskVec::<Pair>::open(&path, OpenMode::Load, 256).unwrap_err();
        assert!(matches!(err, GraphError::OpenFailed(_)));
    }

    #[test]
    fn load_rejects_element_size_mismatch() -> Result<()> {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("mismatch.dat");
        let (vec, _) = DiskVec::<Pair>::open(&path, OpenMode::Create, 256)?;
        vec.close()?;
        let err = DiskVec::<u8>::open(&path, OpenMode::Load, 256).unwrap_err();
        assert!(matches!(err, GraphError::OpenFailed(_)));
        Ok(())
    }

    #[test]
    fn load_or_create_recreates_corrupt_file() -> Result<()> {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("corrupt.dat");
        std::fs::write(&path, b"not a disk vector at all, but long enough..").expect("write");
        let (vec, code) = DiskVec::<Pair>::open(&path, OpenMode::LoadOrCreate, 256)?;
        assert_eq!(code, OpenCode::Created);
        assert_eq!(vec.len(), 0);
        Ok(())
    }

    #[test]
    fn resize_grows_zeroed_and_shrinks() -> Result<()> {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("resize.dat");
        let (mut vec, _) = DiskVec::<Pair>::open(&path, OpenMode::Create, 256)?;
        vec.push(&Pair { a: 1, b: 1 })?;
        vec.resize(4)?;
        assert_eq!(vec.len(), 4);
        assert_eq!(vec.get(3), Pair { a: 0, b: 0 });
        vec.resize(1)?;
        assert_eq!(vec.len(), 1);
        assert_eq!(vec.get(0), Pair { a: 1, b: 1 });
        Ok(())
    }

    #[test]
    fn byte_vector_slice_roundtrip() -> Result<()> {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("bytes.dat");
        let (mut vec, _) = DiskVec::<u8>::open(&path, OpenMode::Create, 256)?;
        vec.extend_from_slice(b"hello")?;
        vec.extend_from_slice(b" world")?;
        assert_eq!(vec.as_slice(), b"hello world");
        Ok(())
    }
}
