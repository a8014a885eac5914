//! The deterministic masternode list: an immutable per-block snapshot.

use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;

use hashes::{sha256d, Hash, HashEngine};
use mynta::consensus::encode::{self, HashWriter, VarInt};
use mynta::consensus::{Decodable, Encodable};
use mynta::{BLSPublicKey, BlockHash, OutPoint, ProTxHash, PubkeyHash, ScoreHash, ScriptBuf};

use crate::error::{ValidationError, ValidationResult};

/// Sentinel for "never" in height fields.
pub const NO_HEIGHT: i32 = -1;

/// Mutable per-masternode state, changed by update transactions and PoSe
/// events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MasternodeState {
    pub registered_height: i32,
    pub last_paid_height: i32,
    pub pose_penalty: i32,
    pub pose_revived_height: i32,
    /// `-1` while not banned.
    pub pose_ban_height: i32,
    /// `0` while not revoked.
    pub revocation_reason: u16,
    pub owner_key_hash: PubkeyHash,
    pub operator_public_key: BLSPublicKey,
    pub voting_key_hash: PubkeyHash,
    pub service_address: SocketAddr,
    pub script_payout: ScriptBuf,
    /// May be empty.
    pub script_operator_payout: ScriptBuf,
}

impl MasternodeState {
    /// Whether the node is PoSe-banned.
    pub fn is_banned(&self) -> bool {
        self.pose_ban_height != NO_HEIGHT
    }
}

impl Encodable for MasternodeState {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        let mut len = 0;
        len += self.registered_height.consensus_encode(w)?;
        len += self.last_paid_height.consensus_encode(w)?;
        len += self.pose_penalty.consensus_encode(w)?;
        len += self.pose_revived_height.consensus_encode(w)?;
        len += self.pose_ban_height.consensus_encode(w)?;
        len += self.revocation_reason.consensus_encode(w)?;
        len += self.owner_key_hash.consensus_encode(w)?;
        len += self.operator_public_key.consensus_encode(w)?;
        len += self.voting_key_hash.consensus_encode(w)?;
        len += self.service_address.consensus_encode(w)?;
        len += self.script_payout.consensus_encode(w)?;
        len += self.script_operator_payout.consensus_encode(w)?;
        Ok(len)
    }
}

impl Decodable for MasternodeState {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, encode::Error> {
        Ok(MasternodeState {
            registered_height: Decodable::consensus_decode(r)?,
            last_paid_height: Decodable::consensus_decode(r)?,
            pose_penalty: Decodable::consensus_decode(r)?,
            pose_revived_height: Decodable::consensus_decode(r)?,
            pose_ban_height: Decodable::consensus_decode(r)?,
            revocation_reason: Decodable::consensus_decode(r)?,
            owner_key_hash: Decodable::consensus_decode(r)?,
            operator_public_key: Decodable::consensus_decode(r)?,
            voting_key_hash: Decodable::consensus_decode(r)?,
            service_address: Decodable::consensus_decode(r)?,
            script_payout: Decodable::consensus_decode(r)?,
            script_operator_payout: Decodable::consensus_decode(r)?,
        })
    }
}

/// A registered masternode: immutable registration data plus mutable state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MasternodeEntry {
    pub pro_tx_hash: ProTxHash,
    pub collateral_outpoint: OutPoint,
    /// Operator share of the reward, in basis points.
    pub operator_reward: u16,
    /// Monotonic id assigned at registration, unique across history.
    pub internal_id: u64,
    pub state: MasternodeState,
}

impl MasternodeEntry {
    /// Eligible for payment and quorum duty.
    pub fn is_valid(&self) -> bool {
        !self.state.is_banned() && self.state.revocation_reason == 0
    }

    /// The script the coinbase must pay when this node wins.
    pub fn payout_script(&self) -> &ScriptBuf {
        if self.operator_reward == 10000 && !self.state.script_operator_payout.is_empty() {
            &self.state.script_operator_payout
        } else {
            &self.state.script_payout
        }
    }

    /// Payment-ordering score for `block_hash`; the lowest score wins.
    pub fn calc_score(&self, block_hash: &BlockHash) -> ScoreHash {
        let mut engine = sha256d::Hash::engine();
        engine.input(&self.pro_tx_hash.to_byte_array());
        engine.input(&block_hash.to_byte_array());
        ScoreHash::from_raw_hash(sha256d::Hash::from_engine(engine))
    }
}

impl Encodable for MasternodeEntry {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        let mut len = 0;
        len += self.pro_tx_hash.consensus_encode(w)?;
        len += self.collateral_outpoint.consensus_encode(w)?;
        len += self.operator_reward.consensus_encode(w)?;
        len += self.internal_id.consensus_encode(w)?;
        len += self.state.consensus_encode(w)?;
        Ok(len)
    }
}

impl Decodable for MasternodeEntry {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, encode::Error> {
        Ok(MasternodeEntry {
            pro_tx_hash: Decodable::consensus_decode(r)?,
            collateral_outpoint: Decodable::consensus_decode(r)?,
            operator_reward: Decodable::consensus_decode(r)?,
            internal_id: Decodable::consensus_decode(r)?,
            state: Decodable::consensus_decode(r)?,
        })
    }
}

/// Compares two scores as 256-bit little-endian integers, the arithmetic
/// interpretation the payee rule is defined over.
pub fn score_cmp(a: &ScoreHash, b: &ScoreHash) -> std::cmp::Ordering {
    let a = a.to_byte_array();
    let b = b.to_byte_array();
    a.iter().rev().cmp(b.iter().rev())
}

/// The deterministic masternode list at one block.
///
/// Value-typed and immutable: every mutation returns a new list. Unique
/// properties (collateral, owner key, service address) are indexed by their
/// hash so conflicting registrations are rejected in `O(log n)`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct MasternodeList {
    block_hash: BlockHash,
    height: u32,
    total_registered_count: u64,
    masternodes: BTreeMap<ProTxHash, MasternodeEntry>,
    unique_property_map: BTreeMap<sha256d::Hash, ProTxHash>,
}

/// Hashes a unique property under a short domain string, so different
/// property kinds can never collide in the shared index.
fn unique_property_hash(domain: &str, value: &impl Encodable) -> sha256d::Hash {
    let mut engine = sha256d::Hash::engine();
    VarInt(domain.len() as u64)
        .consensus_encode(&mut HashWriter(&mut engine))
        .expect("engines don't error");
    engine.input(domain.as_bytes());
    value.consensus_encode(&mut HashWriter(&mut engine)).expect("engines don't error");
    sha256d::Hash::from_engine(engine)
}

impl MasternodeList {
    /// The empty list at a block.
    pub fn empty(block_hash: BlockHash, height: u32) -> Self {
        MasternodeList { block_hash, height, ..Default::default() }
    }

    /// Rebinds the same membership to a new block position; used as the
    /// starting point of a fold.
    pub fn at_block(&self, block_hash: BlockHash, height: u32) -> Self {
        let mut next = self.clone();
        next.block_hash = block_hash;
        next.height = height;
        next
    }

    pub fn block_hash(&self) -> BlockHash {
        self.block_hash
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Count of every record, including banned and revoked ones.
    pub fn all_count(&self) -> usize {
        self.masternodes.len()
    }

    /// Count of eligible records.
    pub fn valid_count(&self) -> usize {
        self.masternodes.values().filter(|mn| mn.is_valid()).count()
    }

    /// Total registrations ever folded into this lineage; the source of
    /// internal ids.
    pub fn total_registered_count(&self) -> u64 {
        self.total_registered_count
    }

    pub fn get(&self, pro_tx_hash: &ProTxHash) -> Option<&MasternodeEntry> {
        self.masternodes.get(pro_tx_hash)
    }

    pub fn has(&self, pro_tx_hash: &ProTxHash) -> bool {
        self.masternodes.contains_key(pro_tx_hash)
    }

    /// Looks up the record bound to a collateral outpoint.
    pub fn by_collateral(&self, outpoint: &OutPoint) -> Option<&MasternodeEntry> {
        let key = unique_property_hash("utxo", outpoint);
        self.unique_property_map.get(&key).and_then(|hash| self.masternodes.get(hash))
    }

    /// Looks up the record bound to a service address.
    pub fn by_service(&self, address: &SocketAddr) -> Option<&MasternodeEntry> {
        let key = unique_property_hash("addr", address);
        self.unique_property_map.get(&key).and_then(|hash| self.masternodes.get(hash))
    }

    /// Looks up the record bound to an owner key id.
    pub fn by_owner_key(&self, key_id: &PubkeyHash) -> Option<&MasternodeEntry> {
        let key = unique_property_hash("key", key_id);
        self.unique_property_map.get(&key).and_then(|hash| self.masternodes.get(hash))
    }

    /// Visits every record, optionally restricted to eligible ones.
    pub fn for_each<F: FnMut(&MasternodeEntry)>(&self, only_valid: bool, mut f: F) {
        for entry in self.masternodes.values() {
            if only_valid && !entry.is_valid() {
                continue;
            }
            f(entry);
        }
    }

    /// Iterates all records.
    pub fn iter(&self) -> impl Iterator<Item = &MasternodeEntry> {
        self.masternodes.values()
    }

    /// The masternode the coinbase of the block after `block_hash` must pay:
    /// the eligible record with the arithmetically lowest score, ties going
    /// to the lexicographically lower registration hash.
    pub fn payee(&self, block_hash: &BlockHash) -> Option<&MasternodeEntry> {
        self.masternodes
            .values()
            .filter(|mn| mn.is_valid())
            .min_by(|a, b| {
                score_cmp(&a.calc_score(block_hash), &b.calc_score(block_hash))
                    .then_with(|| a.pro_tx_hash.cmp(&b.pro_tx_hash))
            })
    }

    /// Adds a freshly registered masternode.
    pub fn add_mn(&self, entry: MasternodeEntry) -> ValidationResult<Self> {
        if self.masternodes.contains_key(&entry.pro_tx_hash) {
            return Err(ValidationError::ConsensusReject(format!(
                "duplicate proTxHash {}",
                entry.pro_tx_hash
            )));
        }
        let collateral_key = unique_property_hash("utxo", &entry.collateral_outpoint);
        let service_key = unique_property_hash("addr", &entry.state.service_address);
        let owner_key = unique_property_hash("key", &entry.state.owner_key_hash);
        for key in [&collateral_key, &service_key, &owner_key] {
            if self.unique_property_map.contains_key(key) {
                return Err(ValidationError::ConsensusReject(format!(
                    "duplicate unique property for {}",
                    entry.pro_tx_hash
                )));
            }
        }

        let mut next = self.clone();
        next.unique_property_map.insert(collateral_key, entry.pro_tx_hash);
        next.unique_property_map.insert(service_key, entry.pro_tx_hash);
        next.unique_property_map.insert(owner_key, entry.pro_tx_hash);
        next.total_registered_count += 1;
        next.masternodes.insert(entry.pro_tx_hash, entry);
        Ok(next)
    }

    /// Replaces the state of an existing masternode, keeping the unique
    /// index coherent when the service address moves.
    pub fn update_mn(
        &self,
        pro_tx_hash: &ProTxHash,
        new_state: MasternodeState,
    ) -> ValidationResult<Self> {
        let entry = self.masternodes.get(pro_tx_hash).ok_or_else(|| {
            ValidationError::NotFound(format!("masternode {}", pro_tx_hash))
        })?;

        let mut next = self.clone();
        if entry.state.service_address != new_state.service_address {
            let new_key = unique_property_hash("addr", &new_state.service_address);
            if let Some(existing) = self.unique_property_map.get(&new_key) {
                if existing != pro_tx_hash {
                    return Err(ValidationError::ConsensusReject(format!(
                        "service address of {} already used by {}",
                        pro_tx_hash, existing
                    )));
                }
            }
            let old_key = unique_property_hash("addr", &entry.state.service_address);
            next.unique_property_map.remove(&old_key);
            next.unique_property_map.insert(new_key, *pro_tx_hash);
        }

        let mut updated = entry.clone();
        updated.state = new_state;
        next.masternodes.insert(*pro_tx_hash, updated);
        Ok(next)
    }

    /// Deletes a masternode, e.g. when its collateral is spent.
    pub fn remove_mn(&self, pro_tx_hash: &ProTxHash) -> Self {
        let Some(entry) = self.masternodes.get(pro_tx_hash) else {
            return self.clone();
        };
        let mut next = self.clone();
        next.unique_property_map
            .remove(&unique_property_hash("utxo", &entry.collateral_outpoint));
        next.unique_property_map
            .remove(&unique_property_hash("addr", &entry.state.service_address));
        next.unique_property_map
            .remove(&unique_property_hash("key", &entry.state.owner_key_hash));
        next.masternodes.remove(pro_tx_hash);
        next
    }
}

impl Encodable for MasternodeList {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        let mut len = 0;
        len += self.block_hash.consensus_encode(w)?;
        len += self.height.consensus_encode(w)?;
        len += self.total_registered_count.consensus_encode(w)?;
        len += VarInt(self.masternodes.len() as u64).consensus_encode(w)?;
        for entry in self.masternodes.values() {
            len += entry.consensus_encode(w)?;
        }
        len += VarInt(self.unique_property_map.len() as u64).consensus_encode(w)?;
        for (property, pro_tx_hash) in &self.unique_property_map {
            len += property.consensus_encode(w)?;
            len += pro_tx_hash.consensus_encode(w)?;
        }
        Ok(len)
    }
}

impl Decodable for MasternodeList {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, encode::Error> {
        let block_hash = BlockHash::consensus_decode(r)?;
        let height = u32::consensus_decode(r)?;
        let total_registered_count = u64::consensus_decode(r)?;

        let count = VarInt::consensus_decode(r)?.0;
        let mut masternodes = BTreeMap::new();
        for _ in 0..count {
            let entry = MasternodeEntry::consensus_decode(r)?;
            masternodes.insert(entry.pro_tx_hash, entry);
        }

        let count = VarInt::consensus_decode(r)?.0;
        let mut unique_property_map = BTreeMap::new();
        for _ in 0..count {
            let property = sha256d::Hash::consensus_decode(r)?;
            let pro_tx_hash = ProTxHash::consensus_decode(r)?;
            unique_property_map.insert(property, pro_tx_hash);
        }

        Ok(MasternodeList {
            block_hash,
            height,
            total_registered_count,
            masternodes,
            unique_property_map,
        })
    }
}
