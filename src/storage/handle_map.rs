use std::hash::Hasher;

use rustc_hash::{FxHashMap, FxHasher};
use smallvec::SmallVec;

use crate::storage::string_pool::{StringHandle, StringPool};

/// Hash map keyed by interned strings, usable with either a borrowed
/// `&str` or a [`StringHandle`]. Hashing and equality go through the
/// owning [`StringPool`], so keys are never duplicated in memory; handle
/// equality fast-paths on identical `(offset, length)` pairs.
pub struct HandleMap<V> {
    buckets: FxHashMap<u64, SmallVec<[(StringHandle, V); 1]>>,
    len: usize,
}

fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(bytes);
    hasher.finish()
}

fn handles_equal(pool: &StringPool, a: StringHandle, b: StringHandle) -> bool {
    (a.offset == b.offset && a.length == b.length) || pool.raw(a) == pool.raw(b)
}

impl<V: Copy> HandleMap<V> {
    pub fn new() -> Self {
        Self {
            buckets: FxHashMap::default(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, pool: &StringPool, key: &str) -> Option<V> {
        let bucket = self.buckets.get(&hash_bytes(key.as_bytes()))?;
        bucket
            .iter()
            .find(|(handle, _)| pool.raw(*handle) == key.as_bytes())
            .map(|&(_, value)| value)
    }

    pub fn get_handle(&self, pool: &StringPool, key: StringHandle) -> Option<V> {
        let bucket = self.buckets.get(&hash_bytes(pool.raw(key)))?;
        bucket
            .iter()
            .find(|(handle, _)| handles_equal(pool, *handle, key))
            .map(|&(_, value)| value)
    }

    /// Inserts `key -> value` unless an equivalent key is already present.
    /// Returns whether the entry was inserted.
    pub fn insert(&mut self, pool: &StringPool, key: StringHandle, value: V) -> bool {
        let bucket = self.buckets.entry(hash_bytes(pool.raw(key))).or_default();
        if bucket
            .iter()
            .any(|(handle, _)| handles_equal(pool, *handle, key))
        {
            return false;
        }
        bucket.push((key, value));
        self.len += 1;
        true
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.len = 0;
    }
}

impl<V: Copy> Default for HandleMap<V> {
    fn default() -> Self {
        Self::new()
    }
}
