//! ChainLocks: quorum signatures that freeze the chain.
//!
//! On every new tip the ChainLock quorum signs `(height, block hash)`. A
//! stored lock makes any reorg whose fork point lies below the locked height
//! invalid, regardless of chainwork, and a competing tip without a lock
//! loses to a locked one.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use hashes::Hash;
use mynta::consensus::{deserialize, serialize};
use mynta::ephemerealdata::chain_lock::request_id_for_height;
use mynta::llmq::build_sign_hash;
use mynta::{BlockHash, ChainLock, LLMQType};
use tracing::{debug, error, info, warn};

use crate::error::{StorageError, ValidationError, ValidationResult};
use crate::quorum::QuorumManager;
use crate::signing::SigningManager;
use crate::storage::{make_key, KvStore};
use crate::types::{topics, BlockIndex, BlockRef, NetworkBus};

/// The quorum type that signs ChainLocks.
pub const CHAINLOCK_QUORUM_TYPE: LLMQType = LLMQType::Llmqtype400_60;

/// ChainLocks are inert below this height.
pub const CHAINLOCK_ACTIVATION_HEIGHT: u32 = 1000;

const DB_CLSIG: &[u8] = b"clsig:";

#[derive(Default)]
struct ClState {
    by_height: BTreeMap<u32, ChainLock>,
    best: Option<ChainLock>,
    /// Locks whose block we have not seen yet, keyed by height.
    pending: BTreeMap<u32, Vec<ChainLock>>,
}

/// Manages ChainLock creation, validation and the fork-choice override.
pub struct ChainLockManager {
    store: Arc<dyn KvStore>,
    signing: Arc<SigningManager>,
    quorums: Arc<QuorumManager>,
    blocks: Arc<dyn BlockIndex>,
    net: Arc<dyn NetworkBus>,
    quorum_type: LLMQType,
    activation_height: u32,
    state: Mutex<ClState>,
}

impl ChainLockManager {
    pub fn new(
        store: Arc<dyn KvStore>,
        signing: Arc<SigningManager>,
        quorums: Arc<QuorumManager>,
        blocks: Arc<dyn BlockIndex>,
        net: Arc<dyn NetworkBus>,
    ) -> Self {
        Self::with_params(
            store,
            signing,
            quorums,
            blocks,
            net,
            CHAINLOCK_QUORUM_TYPE,
            CHAINLOCK_ACTIVATION_HEIGHT,
        )
    }

    /// Full-parameter constructor, used by regtest-sized deployments.
    pub fn with_params(
        store: Arc<dyn KvStore>,
        signing: Arc<SigningManager>,
        quorums: Arc<QuorumManager>,
        blocks: Arc<dyn BlockIndex>,
        net: Arc<dyn NetworkBus>,
        quorum_type: LLMQType,
        activation_height: u32,
    ) -> Self {
        let manager = ChainLockManager {
            store,
            signing,
            quorums,
            blocks,
            net,
            quorum_type,
            activation_height,
            state: Mutex::new(ClState::default()),
        };
        if let Err(e) = manager.load_locks() {
            warn!("failed to load persisted chainlocks: {}", e);
        }
        manager
    }

    fn load_locks(&self) -> ValidationResult<()> {
        let mut state = self.state.lock().expect("clsig lock");
        for (_, bytes) in self.store.iter_prefix(DB_CLSIG).map_err(ValidationError::Storage)? {
            let lock: ChainLock = deserialize(&bytes).map_err(|e| {
                ValidationError::Storage(StorageError::Corruption(e.to_string()))
            })?;
            if state
                .best
                .as_ref()
                .map(|best| lock.block_height > best.block_height)
                .unwrap_or(true)
            {
                state.best = Some(lock.clone());
            }
            state.by_height.insert(lock.block_height, lock);
        }
        if !state.by_height.is_empty() {
            info!(count = state.by_height.len(), "restored chainlocks");
        }
        Ok(())
    }

    /// Whether ChainLocks are live at `height`.
    pub fn is_active_at(&self, height: u32) -> bool {
        height >= self.activation_height
    }

    /// Reacts to a new tip: retries queued locks, then tries to sign the
    /// tip.
    pub fn updated_block_tip(&self, tip: &BlockRef) -> ValidationResult<()> {
        let retry: Vec<ChainLock> = {
            let mut state = self.state.lock().expect("clsig lock");
            let heights: Vec<u32> =
                state.pending.range(..=tip.height).map(|(height, _)| *height).collect();
            heights
                .into_iter()
                .filter_map(|height| state.pending.remove(&height))
                .flatten()
                .collect()
        };
        for lock in retry {
            if let Err(e) = self.process_chain_lock(&lock) {
                debug!(height = lock.block_height, "queued chainlock still rejected: {}", e);
            }
        }

        self.try_sign_tip(tip)
    }

    /// Starts (or completes) the signing session for the tip.
    pub fn try_sign_tip(&self, tip: &BlockRef) -> ValidationResult<()> {
        if !self.is_active_at(tip.height) {
            return Ok(());
        }
        {
            let state = self.state.lock().expect("clsig lock");
            if let Some(existing) = state.by_height.get(&tip.height) {
                if existing.block_hash == tip.hash {
                    return Ok(());
                }
            }
        }

        let request_id = request_id_for_height(tip.height);
        let msg_hash = tip.hash.to_byte_array();
        self.signing.async_sign(self.quorum_type, request_id, msg_hash)?;

        if let Some(recovered) =
            self.signing.try_recover(self.quorum_type, request_id, msg_hash)?
        {
            let lock = ChainLock {
                block_height: tip.height,
                block_hash: tip.hash,
                signature: recovered.signature,
            };
            self.process_chain_lock(&lock)?;
            self.net.broadcast(topics::CHAIN_LOCK, serialize(&lock));
        }
        Ok(())
    }

    /// Validates and stores a ChainLock, ours or a peer's.
    pub fn process_chain_lock(&self, lock: &ChainLock) -> ValidationResult<()> {
        if !self.is_active_at(lock.block_height) {
            return Err(ValidationError::ConsensusReject(format!(
                "chainlock below activation height at {}",
                lock.block_height
            )));
        }

        {
            let state = self.state.lock().expect("clsig lock");
            if let Some(existing) = state.by_height.get(&lock.block_height) {
                if existing.block_hash == lock.block_hash {
                    return Ok(());
                }
                // Two quorum signatures over different blocks at one height
                // mean quorum compromise. Keep the first, shout, drop the
                // second.
                error!(
                    height = lock.block_height,
                    stored = %existing.block_hash,
                    received = %lock.block_hash,
                    "conflicting chainlock"
                );
                return Err(ValidationError::Conflict(format!(
                    "chainlock conflict at height {}",
                    lock.block_height
                )));
            }
        }

        if self.blocks.block_by_hash(&lock.block_hash).is_none() {
            debug!(height = lock.block_height, "queueing chainlock for unknown block");
            let mut state = self.state.lock().expect("clsig lock");
            state.pending.entry(lock.block_height).or_default().push(lock.clone());
            return Ok(());
        }

        if !self.verify_chain_lock(lock) {
            return Err(ValidationError::CryptoFailure(format!(
                "chainlock signature invalid at height {}",
                lock.block_height
            )));
        }

        self.store
            .put(
                &make_key(DB_CLSIG, &lock.block_height.to_le_bytes()),
                &serialize(lock),
            )
            .map_err(ValidationError::Storage)?;

        let mut state = self.state.lock().expect("clsig lock");
        state.by_height.insert(lock.block_height, lock.clone());
        let improves = state
            .best
            .as_ref()
            .map(|best| lock.block_height > best.block_height)
            .unwrap_or(true);
        if improves {
            state.best = Some(lock.clone());
            info!(height = lock.block_height, hash = %lock.block_hash, "new best chainlock");
        }
        Ok(())
    }

    /// Verifies the quorum signature on a lock.
    pub fn verify_chain_lock(&self, lock: &ChainLock) -> bool {
        let request_id = lock.request_id();

        if let Some(recovered) = self.signing.get_recovered(&request_id) {
            if recovered.signature == lock.signature
                && recovered.msg_hash == lock.message_hash()
            {
                return true;
            }
        }

        let Some(quorum) =
            self.quorums.select_quorum_for_request(self.quorum_type, &request_id)
        else {
            debug!(height = lock.block_height, "no quorum to verify chainlock against");
            return false;
        };
        let sign_hash = build_sign_hash(
            self.quorum_type,
            quorum.quorum_hash,
            request_id,
            &lock.message_hash(),
        );
        lock.signature
            .verify_insecure(&quorum.aggregated_public_key, &sign_hash.to_byte_array())
    }

    /// The best (highest) stored lock.
    pub fn best_chain_lock(&self) -> Option<ChainLock> {
        self.state.lock().expect("clsig lock").best.clone()
    }

    /// The best locked height; 0 when no lock exists.
    pub fn best_chain_lock_height(&self) -> u32 {
        self.state
            .lock()
            .expect("clsig lock")
            .best
            .as_ref()
            .map(|lock| lock.block_height)
            .unwrap_or(0)
    }

    /// Whether a specific block hash is chainlocked.
    pub fn has_chain_lock(&self, block_hash: &BlockHash) -> bool {
        self.state
            .lock()
            .expect("clsig lock")
            .by_height
            .values()
            .any(|lock| lock.block_hash == *block_hash)
    }

    /// The hard fork-choice rule: a reorg whose fork point lies below the
    /// best locked height is forbidden, whatever its chainwork.
    pub fn can_reorg(&self, new_tip: &BlockRef, old_tip: &BlockRef) -> bool {
        let best = self.best_chain_lock_height();
        if best == 0 {
            return true;
        }
        let Some(fork) = self.blocks.last_common_ancestor(new_tip, old_tip) else {
            return true;
        };
        if fork.height < best {
            warn!(
                fork_height = fork.height,
                chainlock_height = best,
                "rejecting reorg below chainlocked height"
            );
            return false;
        }
        true
    }

    /// Tip preference between two candidates: the chainlocked one wins when
    /// exactly one is locked; `None` defers to chainwork.
    pub fn preferred_tip(&self, a: &BlockRef, b: &BlockRef) -> Option<BlockRef> {
        let a_locked = self.has_chain_lock(&a.hash);
        let b_locked = self.has_chain_lock(&b.hash);
        match (a_locked, b_locked) {
            (true, false) => Some(*a),
            (false, true) => Some(*b),
            _ => None,
        }
    }
}
