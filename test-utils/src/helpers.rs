//! Test helper functions.

use hashes::Hash;
use mynta::{BlockHash, Txid};

/// A short-tag block hash for tests.
pub fn block_hash(tag: u8) -> BlockHash {
    BlockHash::from_byte_array([tag; 32])
}

/// A short-tag txid for tests.
pub fn txid(tag: u8) -> Txid {
    Txid::from_byte_array([tag; 32])
}
