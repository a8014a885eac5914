//! InstantSend: quorum locks over transaction input sets.
//!
//! Once a lock exists for a transaction, its inputs can never be locked for
//! a different transaction, the mempool rejects conflicting spends, and
//! block validation treats a double-lock as a consensus failure. Locks
//! survive reorgs deliberately: the disconnected transaction's inputs stay
//! claimed so a replacement cannot sneak in without quorum collusion.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use hashes::Hash;
use mynta::consensus::{deserialize, serialize};
use mynta::ephemerealdata::instant_lock::{message_hash_for, request_id_for_inputs};
use mynta::llmq::build_sign_hash;
use mynta::{InstantLock, InstantLockHash, LLMQType, OutPoint, Transaction, Txid};
use tracing::{debug, info, warn};

use crate::error::{StorageError, ValidationError, ValidationResult};
use crate::quorum::QuorumManager;
use crate::signing::SigningManager;
use crate::storage::{make_key, KvStore, WriteBatch};
use crate::types::{topics, NetworkBus};

/// The quorum type that signs InstantSend locks.
pub const INSTANTSEND_QUORUM_TYPE: LLMQType = LLMQType::Llmqtype50_60;

/// The most inputs a lockable transaction may have.
pub const INSTANTSEND_MAX_INPUTS: usize = 32;

const DB_LOCK: &[u8] = b"islock:";
const DB_LOCK_INPUT: &[u8] = b"islock_in:";
const DB_LOCK_TX: &[u8] = b"islock_tx:";

#[derive(Default)]
struct LockStore {
    locks: BTreeMap<InstantLockHash, InstantLock>,
    input_locks: BTreeMap<OutPoint, InstantLockHash>,
    txid_index: BTreeMap<Txid, InstantLockHash>,
}

/// Manages InstantSend lock creation, verification and enforcement.
pub struct InstantSendManager {
    store: Arc<dyn KvStore>,
    signing: Arc<SigningManager>,
    quorums: Arc<QuorumManager>,
    net: Arc<dyn NetworkBus>,
    quorum_type: LLMQType,
    state: Mutex<LockStore>,
}

impl InstantSendManager {
    pub fn new(
        store: Arc<dyn KvStore>,
        signing: Arc<SigningManager>,
        quorums: Arc<QuorumManager>,
        net: Arc<dyn NetworkBus>,
    ) -> Self {
        Self::with_quorum_type(store, signing, quorums, net, INSTANTSEND_QUORUM_TYPE)
    }

    /// Like [`InstantSendManager::new`] with an explicit quorum type, used by
    /// regtest-sized deployments.
    pub fn with_quorum_type(
        store: Arc<dyn KvStore>,
        signing: Arc<SigningManager>,
        quorums: Arc<QuorumManager>,
        net: Arc<dyn NetworkBus>,
        quorum_type: LLMQType,
    ) -> Self {
        let manager = InstantSendManager {
            store,
            signing,
            quorums,
            net,
            quorum_type,
            state: Mutex::new(LockStore::default()),
        };
        if let Err(e) = manager.load_locks() {
            warn!("failed to load persisted instant locks: {}", e);
        }
        manager
    }

    fn load_locks(&self) -> ValidationResult<()> {
        let mut state = self.state.lock().expect("islock lock");
        for (_, bytes) in self.store.iter_prefix(DB_LOCK).map_err(ValidationError::Storage)? {
            let lock: InstantLock = deserialize(&bytes).map_err(|e| {
                ValidationError::Storage(StorageError::Corruption(e.to_string()))
            })?;
            let hash = lock.hash();
            for input in &lock.inputs {
                state.input_locks.insert(*input, hash);
            }
            state.txid_index.insert(lock.txid, hash);
            state.locks.insert(hash, lock);
        }
        if !state.locks.is_empty() {
            info!(count = state.locks.len(), "restored instant locks");
        }
        Ok(())
    }

    /// Whether a transaction may be locked at all: not coinbase, and at most
    /// [`INSTANTSEND_MAX_INPUTS`] inputs.
    pub fn is_eligible(&self, tx: &Transaction) -> bool {
        !tx.is_coinbase() && !tx.input.is_empty() && tx.input.len() <= INSTANTSEND_MAX_INPUTS
    }

    /// Whether any input of `tx` is already locked to a different txid.
    pub fn has_conflicting_lock(&self, tx: &Transaction) -> bool {
        let txid = tx.txid();
        let state = self.state.lock().expect("islock lock");
        tx.input.iter().any(|input| {
            state
                .input_locks
                .get(&input.previous_output)
                .and_then(|hash| state.locks.get(hash))
                .map(|lock| lock.txid != txid)
                .unwrap_or(false)
        })
    }

    /// Kicks off a signing session for an eligible transaction and, when the
    /// threshold is already met locally, assembles and broadcasts the lock.
    pub fn process_transaction(&self, tx: &Transaction) -> ValidationResult<()> {
        if !self.is_eligible(tx) || self.has_conflicting_lock(tx) {
            return Ok(());
        }
        let txid = tx.txid();
        {
            let state = self.state.lock().expect("islock lock");
            if state.txid_index.contains_key(&txid) {
                return Ok(());
            }
        }

        let inputs: Vec<OutPoint> =
            tx.input.iter().map(|input| input.previous_output).collect();
        let request_id = request_id_for_inputs(&inputs);
        let msg_hash = message_hash_for(request_id, txid);

        self.signing.async_sign(self.quorum_type, request_id, msg_hash)?;

        if let Some(recovered) =
            self.signing.try_recover(self.quorum_type, request_id, msg_hash)?
        {
            let lock = InstantLock {
                inputs,
                txid,
                quorum_hash: recovered.quorum_hash,
                signature: recovered.signature,
            };
            self.process_lock(&lock)?;
            self.net.broadcast(topics::INSTANT_LOCK, serialize(&lock));
        }
        Ok(())
    }

    /// Validates and stores a lock, ours or a peer's.
    pub fn process_lock(&self, lock: &InstantLock) -> ValidationResult<()> {
        if lock.inputs.is_empty() || lock.inputs.len() > INSTANTSEND_MAX_INPUTS {
            return Err(ValidationError::ProtocolMismatch(format!(
                "instant lock with {} inputs",
                lock.inputs.len()
            )));
        }

        let hash = lock.hash();
        {
            let state = self.state.lock().expect("islock lock");
            if state.locks.contains_key(&hash) {
                return Ok(());
            }
            if let Some(existing) = state.txid_index.get(&lock.txid) {
                if *existing != hash {
                    return Err(ValidationError::Conflict(format!(
                        "txid {} already locked by a different lock",
                        lock.txid
                    )));
                }
            }
            // Never replace an existing input claim.
            for input in &lock.inputs {
                if let Some(existing_hash) = state.input_locks.get(input) {
                    let existing = state.locks.get(existing_hash);
                    if existing.map(|l| l.txid != lock.txid).unwrap_or(true) {
                        warn!(%input, txid = %lock.txid, "conflicting instant lock rejected");
                        return Err(ValidationError::Conflict(format!(
                            "input {} already locked by a different transaction",
                            input
                        )));
                    }
                }
            }
        }

        if !self.verify_lock_signature(lock) {
            return Err(ValidationError::CryptoFailure(format!(
                "instant lock signature invalid for {}",
                lock.txid
            )));
        }

        let mut batch = WriteBatch::new();
        batch.put(make_key(DB_LOCK, &hash.to_byte_array()), serialize(lock));
        for input in &lock.inputs {
            batch.put(make_key(DB_LOCK_INPUT, &serialize(input)), hash.to_byte_array().to_vec());
        }
        batch.put(
            make_key(DB_LOCK_TX, &lock.txid.to_byte_array()),
            hash.to_byte_array().to_vec(),
        );
        self.store.write_batch(batch).map_err(ValidationError::Storage)?;

        let mut state = self.state.lock().expect("islock lock");
        for input in &lock.inputs {
            state.input_locks.insert(*input, hash);
        }
        state.txid_index.insert(lock.txid, hash);
        state.locks.insert(hash, lock.clone());
        info!(txid = %lock.txid, inputs = lock.inputs.len(), "instant lock stored");
        Ok(())
    }

    fn verify_lock_signature(&self, lock: &InstantLock) -> bool {
        let request_id = lock.request_id();

        // A lock we recovered ourselves carries its signer set in the
        // signing manager; trust that record when the bytes match.
        if let Some(recovered) = self.signing.get_recovered(&request_id) {
            if recovered.signature == lock.signature
                && recovered.msg_hash == lock.message_hash()
                && recovered.quorum_hash == lock.quorum_hash
            {
                return true;
            }
        }

        let Some(quorum) = self.quorums.get_quorum(self.quorum_type, &lock.quorum_hash) else {
            debug!(quorum = %lock.quorum_hash, "instant lock references unknown quorum");
            return false;
        };
        let sign_hash = build_sign_hash(
            self.quorum_type,
            lock.quorum_hash,
            request_id,
            &lock.message_hash(),
        );
        lock.signature
            .verify_insecure(&quorum.aggregated_public_key, &sign_hash.to_byte_array())
    }

    /// Mempool gate: a transaction spending a locked input is rejected
    /// unless it is the locked transaction itself.
    pub fn check_mempool_transaction(&self, tx: &Transaction) -> ValidationResult<()> {
        if self.has_conflicting_lock(tx) {
            return Err(ValidationError::Conflict(format!(
                "transaction {} spends instant-locked inputs",
                tx.txid()
            )));
        }
        Ok(())
    }

    /// Block gate: a block spending locked inputs under a different txid is
    /// invalid. The honest quorum never signs two locks over one input, so
    /// hitting this means adversarial propagation.
    pub fn check_block(&self, transactions: &[Transaction]) -> ValidationResult<()> {
        let state = self.state.lock().expect("islock lock");
        for tx in transactions {
            let txid = tx.txid();
            for input in &tx.input {
                if let Some(lock) = state
                    .input_locks
                    .get(&input.previous_output)
                    .and_then(|hash| state.locks.get(hash))
                {
                    if lock.txid != txid {
                        return Err(ValidationError::ConsensusReject(format!(
                            "block transaction {} spends input locked to {}",
                            txid, lock.txid
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Whether a transaction is instant-locked.
    pub fn is_locked(&self, txid: &Txid) -> bool {
        self.state.lock().expect("islock lock").txid_index.contains_key(txid)
    }

    /// The lock over a transaction, if any.
    pub fn lock_for_txid(&self, txid: &Txid) -> Option<InstantLock> {
        let state = self.state.lock().expect("islock lock");
        state.txid_index.get(txid).and_then(|hash| state.locks.get(hash)).cloned()
    }

    /// The lock claiming an input, if any.
    pub fn lock_for_input(&self, outpoint: &OutPoint) -> Option<InstantLock> {
        let state = self.state.lock().expect("islock lock");
        state.input_locks.get(outpoint).and_then(|hash| state.locks.get(hash)).cloned()
    }

    /// The lock hash claiming an input, if any.
    pub fn lock_hash_for_input(&self, outpoint: &OutPoint) -> Option<InstantLockHash> {
        self.state.lock().expect("islock lock").input_locks.get(outpoint).copied()
    }
}

#[cfg(test)]
#[path = "instantsend_test.rs"]
mod instantsend_test;
