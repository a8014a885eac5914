//! Storage abstraction for the service layer.
//!
//! One ordered byte-keyed store holds everything the layer persists:
//! masternode snapshots, locks, chainlocks and the order book. Writes that
//! belong to a single block transition go through one atomic batch.

pub mod memory;

use crate::error::StorageResult;

pub use memory::MemoryKvStore;

/// A single batched operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or overwrite a key.
    Put(Vec<u8>, Vec<u8>),
    /// Remove a key (absent keys are fine).
    Delete(Vec<u8>),
}

/// A set of writes applied atomically.
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// An empty batch.
    pub fn new() -> Self {
        WriteBatch::default()
    }

    /// Queues an insert.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put(key.into(), value.into()));
    }

    /// Queues a delete.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete(key.into()));
    }

    /// Whether the batch holds no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// The queued operations in order.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }
}

/// An ordered byte-keyed key-value store.
pub trait KvStore: Send + Sync {
    /// Reads a key.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Writes a key.
    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Deletes a key. Deleting an absent key is not an error.
    fn delete(&self, key: &[u8]) -> StorageResult<()>;

    /// Applies a batch atomically: either every op lands or none do.
    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()>;

    /// All `(key, value)` pairs whose key starts with `prefix`, in key
    /// order.
    fn iter_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// A consistent read-only view of the current contents.
    fn snapshot(&self) -> StorageResult<Box<dyn KvSnapshot>>;
}

/// A point-in-time read view of a [`KvStore`].
pub trait KvSnapshot: Send {
    /// Reads a key from the view.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Prefix scan over the view.
    fn iter_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// Builds a composite key from a short prefix and a payload.
pub fn make_key(prefix: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + payload.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(payload);
    key
}
