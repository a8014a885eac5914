// Mynta Core Rust Library
// Written for Mynta in 2026 by
//     The Mynta Core Developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! InstantSend lock.
//!
//! A quorum signature over a transaction's input set. Once a lock exists,
//! no other transaction spending any of those inputs will ever be signed by
//! an honest quorum, which is what makes the lock final.

use hashes::{sha256d, Hash, HashEngine};

use crate::bls::BLSSignature;
use crate::consensus::{Encodable, HashWriter, VarInt};
use crate::hash_types::{InstantLockHash, QuorumHash, QuorumSigningRequestId, Txid};
use crate::blockdata::transaction::OutPoint;

/// Prefix for the signing request id.
const ISLOCK_REQUEST_ID_PREFIX: &str = "islock_request";

/// An InstantSend lock message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstantLock {
    /// The locked inputs, in transaction order.
    pub inputs: Vec<OutPoint>,
    /// The transaction whose inputs are locked.
    pub txid: Txid,
    /// The quorum that produced the signature.
    pub quorum_hash: QuorumHash,
    /// The recovered threshold signature.
    pub signature: BLSSignature,
}

impl_consensus_encoding!(InstantLock, inputs, txid, quorum_hash, signature);

impl InstantLock {
    /// The identity of this lock message.
    pub fn hash(&self) -> InstantLockHash {
        let mut engine = sha256d::Hash::engine();
        self.consensus_encode(&mut HashWriter(&mut engine)).expect("engines don't error");
        InstantLockHash::from_raw_hash(sha256d::Hash::from_engine(engine))
    }

    /// The signing request id: `sha256d("islock_request" ‖ sorted inputs)`.
    ///
    /// Inputs are sorted so the id is independent of input order in the
    /// transaction; every peer derives the same session.
    pub fn request_id(&self) -> QuorumSigningRequestId {
        request_id_for_inputs(&self.inputs)
    }

    /// The message hash bound to the request: `sha256d(request_id ‖ txid)`.
    pub fn message_hash(&self) -> [u8; 32] {
        message_hash_for(self.request_id(), self.txid)
    }
}

/// The signing request id for an input set, before any lock exists.
pub fn request_id_for_inputs(inputs: &[OutPoint]) -> QuorumSigningRequestId {
    let mut sorted: Vec<OutPoint> = inputs.to_vec();
    sorted.sort_unstable();

    let mut engine = sha256d::Hash::engine();
    VarInt(ISLOCK_REQUEST_ID_PREFIX.len() as u64)
        .consensus_encode(&mut HashWriter(&mut engine))
        .expect("engines don't error");
    engine.input(ISLOCK_REQUEST_ID_PREFIX.as_bytes());
    for input in &sorted {
        input.consensus_encode(&mut HashWriter(&mut engine)).expect("engines don't error");
    }
    QuorumSigningRequestId::from_raw_hash(sha256d::Hash::from_engine(engine))
}

/// The message hash for a lock request over `txid`.
pub fn message_hash_for(request_id: QuorumSigningRequestId, txid: Txid) -> [u8; 32] {
    let mut engine = sha256d::Hash::engine();
    engine.input(&request_id.to_byte_array());
    engine.input(&txid.to_byte_array());
    sha256d::Hash::from_engine(engine).to_byte_array()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{deserialize, serialize};

    fn sample_lock() -> InstantLock {
        InstantLock {
            inputs: vec![
                OutPoint::new(Txid::from_byte_array([2; 32]), 1),
                OutPoint::new(Txid::from_byte_array([1; 32]), 0),
            ],
            txid: Txid::from_byte_array([9; 32]),
            quorum_hash: QuorumHash::from_byte_array([7; 32]),
            signature: BLSSignature::from_bytes([0; 96]),
        }
    }

    #[test]
    fn wire_roundtrip() {
        let lock = sample_lock();
        let encoded = serialize(&lock);
        // varint(2) + 2 outpoints + txid + quorum hash + signature
        assert_eq!(encoded.len(), 1 + 2 * 36 + 32 + 32 + 96);
        let decoded: InstantLock = deserialize(&encoded).unwrap();
        assert_eq!(decoded, lock);
    }

    #[test]
    fn request_id_is_input_order_independent() {
        let lock = sample_lock();
        let mut reordered = lock.clone();
        reordered.inputs.reverse();
        assert_eq!(lock.request_id(), reordered.request_id());
    }

    #[test]
    fn request_id_depends_on_the_input_set() {
        let lock = sample_lock();
        let mut different = lock.clone();
        different.inputs.pop();
        assert_ne!(lock.request_id(), different.request_id());
    }

    #[test]
    fn message_hash_binds_txid() {
        let lock = sample_lock();
        let mut other = lock.clone();
        other.txid = Txid::from_byte_array([8; 32]);
        assert_eq!(lock.request_id(), other.request_id());
        assert_ne!(lock.message_hash(), other.message_hash());
    }

    #[test]
    fn lock_hash_covers_the_signature() {
        let lock = sample_lock();
        let mut resigned = lock.clone();
        resigned.signature = BLSSignature::from_bytes([1; 96]);
        assert_ne!(lock.hash(), resigned.hash());
    }
}
