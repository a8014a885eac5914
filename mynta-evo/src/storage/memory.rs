//! In-memory storage backend.
//!
//! A `BTreeMap` behind an `RwLock` gives the ordered-key semantics the
//! order book depends on. Used in tests and as the reference semantics for
//! disk backends.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use crate::error::{StorageError, StorageResult};

use super::{BatchOp, KvSnapshot, KvStore, WriteBatch};

/// An in-memory ordered key-value store.
#[derive(Default)]
pub struct MemoryKvStore {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKvStore {
    /// An empty store.
    pub fn new() -> Self {
        MemoryKvStore::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.map.read().map(|map| map.len()).unwrap_or(0)
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn prefix_range(
    map: &BTreeMap<Vec<u8>, Vec<u8>>,
    prefix: &[u8],
) -> Vec<(Vec<u8>, Vec<u8>)> {
    map.range((Bound::Included(prefix.to_vec()), Bound::Unbounded))
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let map = self.map.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let mut map = self.map.write().map_err(|_| StorageError::LockPoisoned)?;
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        let mut map = self.map.write().map_err(|_| StorageError::LockPoisoned)?;
        map.remove(key);
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut map = self.map.write().map_err(|_| StorageError::LockPoisoned)?;
        for op in batch.ops() {
            match op {
                BatchOp::Put(key, value) => {
                    map.insert(key.clone(), value.clone());
                }
                BatchOp::Delete(key) => {
                    map.remove(key);
                }
            }
        }
        Ok(())
    }

    fn iter_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let map = self.map.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(prefix_range(&map, prefix))
    }

    fn snapshot(&self) -> StorageResult<Box<dyn KvSnapshot>> {
        let map = self.map.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(Box::new(MemorySnapshot { map: map.clone() }))
    }
}

struct MemorySnapshot {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl KvSnapshot for MemorySnapshot {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.map.get(key).cloned())
    }

    fn iter_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(prefix_range(&self.map, prefix))
    }
}
