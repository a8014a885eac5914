// Mynta Core Rust Library
// Written for Mynta in 2026 by
//     The Mynta Core Developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! ChainLock.
//!
//! A quorum signature over `(height, block hash)`. A chainlocked block and
//! everything under it can never be reorganized away, whatever the
//! competing chainwork.

use hashes::{sha256d, Hash, HashEngine};

use crate::bls::BLSSignature;
use crate::consensus::{Encodable, HashWriter, VarInt};
use crate::hash_types::{BlockHash, QuorumSigningRequestId};

/// Prefix for the signing request id.
const CLSIG_REQUEST_ID_PREFIX: &str = "clsig_request";

/// A ChainLock message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainLock {
    /// The locked height.
    pub block_height: u32,
    /// The block hash at that height.
    pub block_hash: BlockHash,
    /// The recovered threshold signature.
    pub signature: BLSSignature,
}

impl_consensus_encoding!(ChainLock, block_height, block_hash, signature);

impl ChainLock {
    /// The signing request id: `sha256d("clsig_request" ‖ height)`.
    pub fn request_id(&self) -> QuorumSigningRequestId {
        request_id_for_height(self.block_height)
    }

    /// The message hash bound to the request is the block hash itself.
    pub fn message_hash(&self) -> [u8; 32] {
        self.block_hash.to_byte_array()
    }
}

/// The signing request id for a height, before any lock exists.
pub fn request_id_for_height(block_height: u32) -> QuorumSigningRequestId {
    let mut engine = sha256d::Hash::engine();
    VarInt(CLSIG_REQUEST_ID_PREFIX.len() as u64)
        .consensus_encode(&mut HashWriter(&mut engine))
        .expect("engines don't error");
    engine.input(CLSIG_REQUEST_ID_PREFIX.as_bytes());
    engine.input(&block_height.to_le_bytes());
    QuorumSigningRequestId::from_raw_hash(sha256d::Hash::from_engine(engine))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{deserialize, serialize};

    fn sample_lock() -> ChainLock {
        ChainLock {
            block_height: 84202,
            block_hash: BlockHash::from_byte_array([0xF4; 32]),
            signature: BLSSignature::from_bytes([0x0A; 96]),
        }
    }

    #[test]
    fn wire_layout_is_height_hash_signature() {
        let lock = sample_lock();
        let encoded = serialize(&lock);
        assert_eq!(encoded.len(), 4 + 32 + 96);
        assert_eq!(&encoded[..4], &84202u32.to_le_bytes());
        let decoded: ChainLock = deserialize(&encoded).unwrap();
        assert_eq!(decoded, lock);
    }

    #[test]
    fn request_id_depends_only_on_height() {
        let lock = sample_lock();
        let mut other_hash = lock.clone();
        other_hash.block_hash = BlockHash::from_byte_array([0x55; 32]);
        assert_eq!(lock.request_id(), other_hash.request_id());

        let mut other_height = lock.clone();
        other_height.block_height += 1;
        assert_ne!(lock.request_id(), other_height.request_id());
    }

    #[test]
    fn message_hash_is_the_block_hash() {
        let lock = sample_lock();
        assert_eq!(lock.message_hash(), lock.block_hash.to_byte_array());
    }
}
