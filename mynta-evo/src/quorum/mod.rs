//! Quorum construction and selection.
//!
//! At every `dkg_interval` boundary a committee is drawn deterministically
//! from the masternode list: members are the lowest-scoring eligible nodes
//! under a per-block modifier, so every peer derives the same committee from
//! the same chain. The aggregated operator key of the valid members is the
//! quorum's verification key.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use hashes::{sha256d, Hash, HashEngine};
use mynta::bls::{aggregate_public_keys, BLSLazyPublicKey, BLSPublicKey};
use mynta::consensus::encode::{HashWriter, VarInt};
use mynta::consensus::Encodable;
use mynta::hash_types::{QuorumModifierHash, ScoreHash};
use mynta::{BlockHash, LLMQType, ProTxHash, QuorumHash, QuorumSigningRequestId};
use tracing::{debug, warn};

use crate::error::ValidationResult;
use crate::registry::{MasternodeList, MasternodeListManager};
use crate::types::{BlockIndex, BlockRef};

fn domain_engine(domain: &str) -> <sha256d::Hash as Hash>::Engine {
    let mut engine = sha256d::Hash::engine();
    VarInt(domain.len() as u64)
        .consensus_encode(&mut HashWriter(&mut engine))
        .expect("engines don't error");
    engine.input(domain.as_bytes());
    engine
}

/// The per-block modifier feeding member scores:
/// `sha256d("LLMQ_MODIFIER" ‖ type ‖ block_hash)`.
pub fn quorum_modifier(llmq_type: LLMQType, block_hash: &BlockHash) -> QuorumModifierHash {
    let mut engine = domain_engine("LLMQ_MODIFIER");
    engine.input(&[llmq_type as u8]);
    engine.input(&block_hash.to_byte_array());
    QuorumModifierHash::from_raw_hash(sha256d::Hash::from_engine(engine))
}

/// A member's selection score:
/// `sha256d("LLMQ_SCORE" ‖ modifier ‖ pro_tx_hash)`.
pub fn member_score(modifier: &QuorumModifierHash, pro_tx_hash: &ProTxHash) -> ScoreHash {
    let mut engine = domain_engine("LLMQ_SCORE");
    engine.input(&modifier.to_byte_array());
    engine.input(&pro_tx_hash.to_byte_array());
    ScoreHash::from_raw_hash(sha256d::Hash::from_engine(engine))
}

/// The deterministic identity of the quorum formed at a block:
/// `sha256d("LLMQ_QUORUM" ‖ type ‖ block_hash)`.
pub fn quorum_hash_for_block(llmq_type: LLMQType, block_hash: &BlockHash) -> QuorumHash {
    let mut engine = domain_engine("LLMQ_QUORUM");
    engine.input(&[llmq_type as u8]);
    engine.input(&block_hash.to_byte_array());
    QuorumHash::from_raw_hash(sha256d::Hash::from_engine(engine))
}

/// The score ranking active quorums for a signing request:
/// `sha256d("LLMQ_SELECT" ‖ quorum_hash ‖ request_id)`.
pub fn selection_score(
    quorum_hash: &QuorumHash,
    request_id: &QuorumSigningRequestId,
) -> ScoreHash {
    let mut engine = domain_engine("LLMQ_SELECT");
    engine.input(&quorum_hash.to_byte_array());
    engine.input(&request_id.to_byte_array());
    ScoreHash::from_raw_hash(sha256d::Hash::from_engine(engine))
}

/// A quorum member.
#[derive(Clone, Debug)]
pub struct QuorumMember {
    pub pro_tx_hash: ProTxHash,
    /// Operator key, decoded lazily: share verification is the hot path.
    pub operator_public_key: BLSLazyPublicKey,
    /// False when the stored key bytes do not decode to a usable G1 point.
    pub valid: bool,
}

/// A constructed quorum. Immutable after construction.
#[derive(Clone, Debug)]
pub struct Quorum {
    pub llmq_type: LLMQType,
    pub quorum_hash: QuorumHash,
    pub quorum_height: u32,
    /// Selected members, ascending by selection score.
    pub members: Vec<QuorumMember>,
    member_set: BTreeSet<ProTxHash>,
    /// Sum of the valid members' operator keys.
    pub aggregated_public_key: BLSPublicKey,
    pub valid_member_count: u32,
}

impl Quorum {
    /// A functioning quorum has at least `min_size` valid members.
    pub fn is_valid(&self) -> bool {
        self.valid_member_count >= self.llmq_type.params().min_size
    }

    /// The signing threshold given the current valid membership.
    pub fn threshold(&self) -> u32 {
        self.llmq_type.threshold_for(self.valid_member_count)
    }

    /// Whether `pro_tx_hash` sits on this quorum.
    pub fn is_member(&self, pro_tx_hash: &ProTxHash) -> bool {
        self.member_set.contains(pro_tx_hash)
    }

    /// The member record for `pro_tx_hash`.
    pub fn member(&self, pro_tx_hash: &ProTxHash) -> Option<&QuorumMember> {
        self.members.iter().find(|member| member.pro_tx_hash == *pro_tx_hash)
    }

    /// The position of a member in selection order.
    pub fn member_index(&self, pro_tx_hash: &ProTxHash) -> Option<usize> {
        self.members.iter().position(|member| member.pro_tx_hash == *pro_tx_hash)
    }

    /// The operator keys of all valid members.
    pub fn valid_member_keys(&self) -> Vec<BLSPublicKey> {
        self.members
            .iter()
            .filter(|member| member.valid)
            .map(|member| *member.operator_public_key.as_bytes())
            .collect()
    }

    /// Whether all selected members are valid; only then does the stored
    /// aggregated key verify a full recovery on its own.
    pub fn all_members_valid(&self) -> bool {
        self.valid_member_count as usize == self.members.len()
    }
}

/// Builds the quorum of `llmq_type` at `block` from the masternode list at
/// that block. Returns `None` when no eligible candidates exist.
pub fn build_quorum(
    llmq_type: LLMQType,
    block: &BlockRef,
    list: &MasternodeList,
) -> Option<Quorum> {
    let params = llmq_type.params();
    let modifier = quorum_modifier(llmq_type, &block.hash);

    let mut scored: Vec<(ScoreHash, ProTxHash, BLSPublicKey)> = Vec::new();
    list.for_each(true, |entry| {
        scored.push((
            member_score(&modifier, &entry.pro_tx_hash),
            entry.pro_tx_hash,
            entry.state.operator_public_key,
        ));
    });
    if scored.is_empty() {
        return None;
    }
    scored.sort();

    let mut members = Vec::with_capacity(params.size as usize);
    let mut member_set = BTreeSet::new();
    let mut valid_keys = Vec::new();
    for (_, pro_tx_hash, operator_key) in scored.into_iter().take(params.size as usize) {
        let operator_public_key = BLSLazyPublicKey::new(operator_key);
        let valid = operator_public_key.is_valid();
        if valid {
            valid_keys.push(operator_key);
        }
        member_set.insert(pro_tx_hash);
        members.push(QuorumMember { pro_tx_hash, operator_public_key, valid });
    }

    let aggregated_public_key = match aggregate_public_keys(&valid_keys) {
        Ok(key) => key,
        Err(_) => BLSPublicKey::default(),
    };

    Some(Quorum {
        llmq_type,
        quorum_hash: quorum_hash_for_block(llmq_type, &block.hash),
        quorum_height: block.height,
        valid_member_count: valid_keys.len() as u32,
        members,
        member_set,
        aggregated_public_key,
    })
}

#[derive(Default)]
struct QuorumCache {
    by_id: BTreeMap<(LLMQType, QuorumHash), Arc<Quorum>>,
    active: BTreeMap<LLMQType, Vec<Arc<Quorum>>>,
}

/// Maintains the active quorum set per type and answers selection queries.
pub struct QuorumManager {
    registry: Arc<MasternodeListManager>,
    blocks: Arc<dyn BlockIndex>,
    cache: Mutex<QuorumCache>,
}

impl QuorumManager {
    pub fn new(registry: Arc<MasternodeListManager>, blocks: Arc<dyn BlockIndex>) -> Self {
        QuorumManager { registry, blocks, cache: Mutex::new(QuorumCache::default()) }
    }

    /// Rebuilds the active quorum window for every type after a tip change.
    ///
    /// Quorums form only at `dkg_interval` boundaries; the most recent
    /// `signing_active_quorum_count` stay active.
    pub fn updated_block_tip(&self, tip: &BlockRef) -> ValidationResult<()> {
        for llmq_type in LLMQType::ALL {
            let params = llmq_type.params();
            let mut new_active = Vec::new();
            let mut quorum_height = tip.height - (tip.height % params.dkg_interval);

            for _ in 0..params.signing_active_quorum_count {
                let Some(block) = self.blocks.ancestor(tip, quorum_height) else {
                    break;
                };
                match self.build_quorum_at(llmq_type, &block)? {
                    Some(quorum) if quorum.is_valid() => new_active.push(quorum),
                    Some(quorum) => debug!(
                        "quorum {} at height {} below min size ({} valid)",
                        quorum.quorum_hash, quorum.quorum_height, quorum.valid_member_count
                    ),
                    None => {}
                }
                if quorum_height < params.dkg_interval {
                    break;
                }
                quorum_height -= params.dkg_interval;
            }

            let mut cache = self.cache.lock().expect("quorum lock");
            cache.active.insert(llmq_type, new_active);
        }
        Ok(())
    }

    /// Builds (or fetches) the quorum formed at `block`.
    pub fn build_quorum_at(
        &self,
        llmq_type: LLMQType,
        block: &BlockRef,
    ) -> ValidationResult<Option<Arc<Quorum>>> {
        let quorum_hash = quorum_hash_for_block(llmq_type, &block.hash);
        {
            let cache = self.cache.lock().expect("quorum lock");
            if let Some(quorum) = cache.by_id.get(&(llmq_type, quorum_hash)) {
                return Ok(Some(Arc::clone(quorum)));
            }
        }

        let list = self.registry.list_for_block(block)?;
        let Some(quorum) = build_quorum(llmq_type, block, &list) else {
            warn!(%llmq_type, height = block.height, "no candidates for quorum");
            return Ok(None);
        };
        let quorum = Arc::new(quorum);

        let mut cache = self.cache.lock().expect("quorum lock");
        cache.by_id.insert((llmq_type, quorum_hash), Arc::clone(&quorum));
        Ok(Some(quorum))
    }

    /// A cached quorum by identity.
    pub fn get_quorum(&self, llmq_type: LLMQType, quorum_hash: &QuorumHash) -> Option<Arc<Quorum>> {
        let cache = self.cache.lock().expect("quorum lock");
        cache.by_id.get(&(llmq_type, *quorum_hash)).cloned()
    }

    /// A cached quorum looked up by hash alone.
    pub fn quorum_by_hash(&self, quorum_hash: &QuorumHash) -> Option<Arc<Quorum>> {
        let cache = self.cache.lock().expect("quorum lock");
        cache
            .by_id
            .iter()
            .find(|((_, hash), _)| hash == quorum_hash)
            .map(|(_, quorum)| Arc::clone(quorum))
    }

    /// The active signing window for a type, most recent first.
    pub fn active_quorums(&self, llmq_type: LLMQType) -> Vec<Arc<Quorum>> {
        let cache = self.cache.lock().expect("quorum lock");
        cache.active.get(&llmq_type).cloned().unwrap_or_default()
    }

    /// Deterministically picks the active quorum responsible for a request.
    pub fn select_quorum_for_request(
        &self,
        llmq_type: LLMQType,
        request_id: &QuorumSigningRequestId,
    ) -> Option<Arc<Quorum>> {
        self.active_quorums(llmq_type)
            .into_iter()
            .filter(|quorum| quorum.is_valid())
            .min_by_key(|quorum| selection_score(&quorum.quorum_hash, request_id))
    }
}
