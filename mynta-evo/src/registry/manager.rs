//! The masternode list manager: snapshot cache, persistence, PoSe scoring.

use std::sync::{Arc, Mutex};

use hashes::Hash;
use indexmap::IndexMap;
use mynta::consensus::{deserialize, serialize};
use mynta::{BlockHash, OutPoint, ProTxHash, Transaction};
use tracing::{debug, info, warn};

use crate::error::{StorageError, ValidationError, ValidationResult};
use crate::storage::{make_key, KvStore};
use crate::types::{BlockIndex, BlockRef, CoinView};

use super::apply::apply_block;
use super::list::{MasternodeEntry, MasternodeList, NO_HEIGHT};
use super::{POSE_BAN_THRESHOLD, POSE_PENALTY_INCREMENT, SNAPSHOT_ANCHOR_INTERVAL};

/// Storage prefix for masternode list snapshots, keyed by block hash.
const DB_LIST_SNAPSHOT: &[u8] = b"dmn_S";

/// How many snapshots stay hot in memory.
const MAX_CACHED_LISTS: usize = 100;

/// How far back a cold reconstruction may walk before giving up. Anchors
/// are persisted every [`SNAPSHOT_ANCHOR_INTERVAL`] blocks, so this bound is
/// generous.
const MAX_REPLAY_DEPTH: u32 = 2 * 576;

struct ManagerState {
    /// Hot snapshots in insertion order; the front is evicted first.
    lists: IndexMap<BlockHash, Arc<MasternodeList>>,
    tip: Arc<MasternodeList>,
}

/// Owns the deterministic masternode registry.
///
/// All mutating entry points run on the validation thread; lookups may be
/// called from anywhere.
pub struct MasternodeListManager {
    store: Arc<dyn KvStore>,
    coins: Arc<dyn CoinView>,
    blocks: Arc<dyn BlockIndex>,
    state: Mutex<ManagerState>,
}

impl MasternodeListManager {
    /// Creates the manager, restoring the tip snapshot if one is persisted.
    pub fn new(
        store: Arc<dyn KvStore>,
        coins: Arc<dyn CoinView>,
        blocks: Arc<dyn BlockIndex>,
    ) -> Self {
        let mut tip = Arc::new(MasternodeList::default());
        if let Some(block) = blocks.tip() {
            if let Ok(Some(bytes)) =
                store.get(&make_key(DB_LIST_SNAPSHOT, &block.hash.to_byte_array()))
            {
                match deserialize::<MasternodeList>(&bytes) {
                    Ok(list) => {
                        info!(height = list.height(), "restored masternode list at tip");
                        tip = Arc::new(list);
                    }
                    Err(e) => warn!("discarding undecodable tip snapshot: {}", e),
                }
            }
        }
        let mut lists = IndexMap::new();
        lists.insert(tip.block_hash(), Arc::clone(&tip));
        MasternodeListManager {
            store,
            coins,
            blocks,
            state: Mutex::new(ManagerState { lists, tip }),
        }
    }

    /// Folds a connected block into the registry. Must be called in block
    /// order.
    pub fn process_block(
        &self,
        block: &BlockRef,
        transactions: &[Transaction],
    ) -> ValidationResult<()> {
        let prev = if block.height == 0 {
            Arc::new(MasternodeList::default())
        } else {
            let parent = self
                .blocks
                .ancestor(block, block.height - 1)
                .ok_or_else(|| ValidationError::NotFound("parent block".into()))?;
            self.list_for_block(&parent)?
        };

        let new_list =
            apply_block(&prev, block.hash, block.height, transactions, self.coins.as_ref())?;
        let new_list = Arc::new(new_list);

        self.persist(&new_list)?;

        let mut state = self.state.lock().expect("registry lock");
        Self::cache_insert(&mut state.lists, Arc::clone(&new_list));
        state.tip = new_list;
        Ok(())
    }

    /// Reverts a disconnected block. The resulting tip is the parent's
    /// snapshot, reconstructed if it fell out of every cache.
    pub fn undo_block(&self, block: &BlockRef) -> ValidationResult<()> {
        let prev = if block.height == 0 {
            Arc::new(MasternodeList::default())
        } else {
            let parent = self
                .blocks
                .ancestor(block, block.height - 1)
                .ok_or_else(|| ValidationError::NotFound("parent block".into()))?;
            self.list_for_block(&parent)?
        };

        // Non-anchor snapshots for the undone block are garbage now.
        if block.height % SNAPSHOT_ANCHOR_INTERVAL != 0 {
            self.store
                .delete(&make_key(DB_LIST_SNAPSHOT, &block.hash.to_byte_array()))
                .map_err(ValidationError::Storage)?;
        }

        let mut state = self.state.lock().expect("registry lock");
        state.lists.shift_remove(&block.hash);
        state.tip = prev;
        debug!(height = block.height, "masternode list rolled back");
        Ok(())
    }

    /// The snapshot at `block`: cache, then store, then replay from the
    /// nearest recoverable ancestor.
    pub fn list_for_block(&self, block: &BlockRef) -> ValidationResult<Arc<MasternodeList>> {
        {
            let state = self.state.lock().expect("registry lock");
            if let Some(list) = state.lists.get(&block.hash) {
                return Ok(Arc::clone(list));
            }
        }

        if let Some(list) = self.load(&block.hash)? {
            let list = Arc::new(list);
            let mut state = self.state.lock().expect("registry lock");
            Self::cache_insert(&mut state.lists, Arc::clone(&list));
            return Ok(list);
        }

        self.reconstruct(block)
    }

    /// The snapshot at the current tip.
    pub fn tip_list(&self) -> Arc<MasternodeList> {
        Arc::clone(&self.state.lock().expect("registry lock").tip)
    }

    /// Looks up a record in the tip snapshot.
    pub fn get(&self, pro_tx_hash: &ProTxHash) -> Option<MasternodeEntry> {
        self.tip_list().get(pro_tx_hash).cloned()
    }

    /// Whether a record exists in the tip snapshot.
    pub fn has(&self, pro_tx_hash: &ProTxHash) -> bool {
        self.get(pro_tx_hash).is_some()
    }

    /// Whether `outpoint` is some masternode's collateral at the tip.
    pub fn is_collateral(&self, outpoint: &OutPoint) -> bool {
        self.tip_list().by_collateral(outpoint).is_some()
    }

    /// The payee the coinbase of the block after `block` must pay, a pure
    /// function of the parent snapshot and the parent block hash.
    pub fn payee_for(&self, block: &BlockRef) -> ValidationResult<Option<ProTxHash>> {
        let list = self.list_for_block(block)?;
        Ok(list.payee(&block.hash).map(|entry| entry.pro_tx_hash))
    }

    /// Consensus check: the coinbase of the block after `parent` must pay
    /// the selected payee's payout script (or the operator's, when the
    /// operator takes the whole reward).
    pub fn check_coinbase_payee(
        &self,
        parent: &BlockRef,
        coinbase: &Transaction,
    ) -> ValidationResult<()> {
        let list = self.list_for_block(parent)?;
        let Some(winner) = list.payee(&parent.hash) else {
            return Ok(());
        };
        let script = winner.payout_script();
        if coinbase.output.iter().any(|output| &output.script_pubkey == script) {
            Ok(())
        } else {
            Err(ValidationError::ConsensusReject(format!(
                "coinbase does not pay masternode {}",
                winner.pro_tx_hash
            )))
        }
    }

    /// Adds PoSe penalty to a node, banning it when the score reaches the
    /// threshold. Called from signing-session timeout paths.
    pub fn bump_pose(&self, pro_tx_hash: &ProTxHash, delta: i32, height: u32) {
        self.mutate_tip_state(pro_tx_hash, |state| {
            if state.revocation_reason != 0 {
                return false;
            }
            state.pose_penalty = (state.pose_penalty + delta).min(POSE_BAN_THRESHOLD);
            if state.pose_penalty >= POSE_BAN_THRESHOLD && !state.is_banned() {
                state.pose_ban_height = height as i32;
                warn!(%pro_tx_hash, height, "masternode PoSe-banned");
            }
            true
        });
    }

    /// Default-increment PoSe bump.
    pub fn penalize(&self, pro_tx_hash: &ProTxHash, height: u32) {
        self.bump_pose(pro_tx_hash, POSE_PENALTY_INCREMENT, height);
    }

    /// Clears the PoSe score after a successful signing contribution,
    /// reviving a banned (but not revoked) node.
    pub fn note_signing_success(&self, pro_tx_hash: &ProTxHash, height: u32) {
        self.mutate_tip_state(pro_tx_hash, |state| {
            if state.revocation_reason != 0 {
                return false;
            }
            let was_banned = state.is_banned();
            state.pose_penalty = 0;
            if was_banned {
                state.pose_ban_height = NO_HEIGHT;
                state.pose_revived_height = height as i32;
                info!(%pro_tx_hash, height, "masternode revived by clean signing");
            }
            true
        });
    }

    fn mutate_tip_state(
        &self,
        pro_tx_hash: &ProTxHash,
        f: impl FnOnce(&mut super::list::MasternodeState) -> bool,
    ) {
        let mut state = self.state.lock().expect("registry lock");
        let Some(entry) = state.tip.get(pro_tx_hash) else {
            return;
        };
        let mut new_state = entry.state.clone();
        if !f(&mut new_state) {
            return;
        }
        match state.tip.update_mn(pro_tx_hash, new_state) {
            Ok(updated) => {
                let updated = Arc::new(updated);
                // PoSe state comes from signing callbacks, not block
                // content; replay cannot rebuild it, so the stored tip
                // snapshot must be overwritten here.
                if let Err(e) = self.persist(&updated) {
                    warn!("failed to persist pose update: {}", e);
                }
                state.lists.insert(updated.block_hash(), Arc::clone(&updated));
                state.tip = updated;
            }
            Err(e) => warn!("pose update failed: {}", e),
        }
    }

    fn cache_insert(lists: &mut IndexMap<BlockHash, Arc<MasternodeList>>, list: Arc<MasternodeList>) {
        lists.insert(list.block_hash(), list);
        while lists.len() > MAX_CACHED_LISTS {
            lists.shift_remove_index(0);
        }
    }

    fn persist(&self, list: &MasternodeList) -> ValidationResult<()> {
        // Anchors stay forever as replay bases; the tip snapshot is
        // overwritten as the chain advances (its predecessor is deleted on
        // the next connect unless it is an anchor).
        let key = make_key(DB_LIST_SNAPSHOT, &list.block_hash().to_byte_array());
        self.store.put(&key, &serialize(list)).map_err(ValidationError::Storage)?;

        if list.height() > 0 {
            let prev_height = list.height() - 1;
            if prev_height % SNAPSHOT_ANCHOR_INTERVAL != 0 {
                if let Some(parent) = self
                    .blocks
                    .ancestor(&BlockRef::new(list.block_hash(), list.height()), prev_height)
                {
                    self.store
                        .delete(&make_key(DB_LIST_SNAPSHOT, &parent.hash.to_byte_array()))
                        .map_err(ValidationError::Storage)?;
                }
            }
        }
        Ok(())
    }

    fn load(&self, block_hash: &BlockHash) -> ValidationResult<Option<MasternodeList>> {
        let key = make_key(DB_LIST_SNAPSHOT, &block_hash.to_byte_array());
        match self.store.get(&key).map_err(ValidationError::Storage)? {
            None => Ok(None),
            Some(bytes) => deserialize(&bytes)
                .map(Some)
                .map_err(|e| ValidationError::Storage(StorageError::Corruption(e.to_string()))),
        }
    }

    /// Walks back from `block` to the nearest cached or persisted ancestor
    /// snapshot, then replays forward.
    fn reconstruct(&self, block: &BlockRef) -> ValidationResult<Arc<MasternodeList>> {
        let mut pending: Vec<BlockRef> = Vec::new();
        let mut cursor = *block;
        let mut base: Option<Arc<MasternodeList>> = None;

        for _ in 0..MAX_REPLAY_DEPTH {
            pending.push(cursor);
            if cursor.height == 0 {
                base = Some(Arc::new(MasternodeList::default()));
                break;
            }
            let parent = self
                .blocks
                .ancestor(&cursor, cursor.height - 1)
                .ok_or_else(|| ValidationError::NotFound("ancestor block".into()))?;

            let cached = {
                let state = self.state.lock().expect("registry lock");
                state.lists.get(&parent.hash).cloned()
            };
            if let Some(list) = cached {
                base = Some(list);
                break;
            }
            if let Some(list) = self.load(&parent.hash)? {
                base = Some(Arc::new(list));
                break;
            }
            cursor = parent;
        }

        let mut list = base.ok_or_else(|| {
            ValidationError::NotFound("no snapshot anchor within replay range".into())
        })?;

        debug!(
            target_height = block.height,
            replay_blocks = pending.len(),
            "reconstructing masternode list"
        );

        for step in pending.into_iter().rev() {
            let transactions = self
                .blocks
                .block_transactions(&step.hash)
                .ok_or_else(|| ValidationError::NotFound("block transactions".into()))?;
            let next =
                apply_block(&list, step.hash, step.height, &transactions, self.coins.as_ref())?;
            list = Arc::new(next);
        }

        let mut state = self.state.lock().expect("registry lock");
        Self::cache_insert(&mut state.lists, Arc::clone(&list));
        Ok(list)
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod manager_test;
