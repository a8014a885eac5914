//! Quorum signing sessions.
//!
//! Members of the selected quorum each sign the session's sign-hash with
//! their operator key; once a threshold of verified shares is in, the shares
//! aggregate into the recovered signature. No DKG: recovery is a straight
//! aggregation over the actual signer set, and verification records that
//! set. Swapping in Lagrange recovery would change nothing outside this
//! module.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hashes::Hash;
use mynta::bls::{aggregate_public_keys, aggregate_signatures};
use mynta::consensus::{encode, serialize, Decodable, Encodable};
use mynta::llmq::build_sign_hash;
use mynta::{
    BLSSecretKey, BLSSignature, LLMQType, ProTxHash, QuorumHash, QuorumSigningRequestId,
};
use tracing::{debug, info, warn};

use crate::error::{ValidationError, ValidationResult};
use crate::quorum::{Quorum, QuorumManager};
use crate::registry::MasternodeListManager;
use crate::types::{topics, NetworkBus};

/// Sessions older than this many blocks are dropped.
pub const SESSION_MAX_AGE_BLOCKS: u32 = 100;

/// Wall-clock bound on share collection before the session is abandoned and
/// non-contributors are PoSe-scored.
pub const SHARE_COLLECTION_TIMEOUT: Duration = Duration::from_secs(60);

/// A threshold-recovered signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveredSig {
    pub llmq_type: LLMQType,
    pub quorum_hash: QuorumHash,
    pub id: QuorumSigningRequestId,
    pub msg_hash: [u8; 32],
    pub signature: BLSSignature,
    /// The members whose shares were aggregated. Not part of the wire
    /// encoding; kept so partial-membership recoveries stay verifiable.
    pub signers: Vec<ProTxHash>,
}

impl RecoveredSig {
    /// Verifies this signature against its quorum.
    ///
    /// When every selected member was valid, the quorum's stored aggregated
    /// key is the right verification key. Otherwise the key is rebuilt from
    /// the recorded signer set.
    pub fn verify(&self, quorum: &Quorum) -> bool {
        let sign_hash = build_sign_hash(
            self.llmq_type,
            self.quorum_hash,
            self.id,
            &self.msg_hash,
        );
        if quorum.all_members_valid() && self.signers.is_empty() {
            return self
                .signature
                .verify_insecure(&quorum.aggregated_public_key, &sign_hash.to_byte_array());
        }
        let keys: Vec<_> = self
            .signers
            .iter()
            .filter_map(|pro_tx_hash| quorum.member(pro_tx_hash))
            .map(|member| *member.operator_public_key.as_bytes())
            .collect();
        if keys.len() != self.signers.len() {
            return false;
        }
        match aggregate_public_keys(&keys) {
            Ok(aggregated) => {
                self.signature.verify_insecure(&aggregated, &sign_hash.to_byte_array())
            }
            Err(_) => false,
        }
    }
}

impl Encodable for RecoveredSig {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        let mut len = 0;
        len += self.llmq_type.consensus_encode(w)?;
        len += self.quorum_hash.consensus_encode(w)?;
        len += self.id.consensus_encode(w)?;
        len += self.msg_hash.consensus_encode(w)?;
        len += self.signature.consensus_encode(w)?;
        Ok(len)
    }
}

/// A gossiped signature share.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigShareMessage {
    pub llmq_type: LLMQType,
    pub quorum_hash: QuorumHash,
    pub request_id: QuorumSigningRequestId,
    pub msg_hash: [u8; 32],
    pub pro_tx_hash: ProTxHash,
    pub share: BLSSignature,
}

impl Encodable for SigShareMessage {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        let mut len = 0;
        len += self.llmq_type.consensus_encode(w)?;
        len += self.quorum_hash.consensus_encode(w)?;
        len += self.request_id.consensus_encode(w)?;
        len += self.msg_hash.consensus_encode(w)?;
        len += self.pro_tx_hash.consensus_encode(w)?;
        len += self.share.consensus_encode(w)?;
        Ok(len)
    }
}

impl Decodable for SigShareMessage {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, encode::Error> {
        Ok(SigShareMessage {
            llmq_type: Decodable::consensus_decode(r)?,
            quorum_hash: Decodable::consensus_decode(r)?,
            request_id: Decodable::consensus_decode(r)?,
            msg_hash: Decodable::consensus_decode(r)?,
            pro_tx_hash: Decodable::consensus_decode(r)?,
            share: Decodable::consensus_decode(r)?,
        })
    }
}

/// Our own signing identity when this node runs a masternode.
pub struct SignerIdentity {
    pub pro_tx_hash: ProTxHash,
    pub operator_secret: BLSSecretKey,
}

struct SigningSession {
    llmq_type: LLMQType,
    quorum_hash: QuorumHash,
    msg_hash: [u8; 32],
    shares: BTreeMap<ProTxHash, BLSSignature>,
    started_height: u32,
    started_at: Instant,
}

#[derive(Default)]
struct SigningState {
    sessions: BTreeMap<QuorumSigningRequestId, SigningSession>,
    recovered: BTreeMap<QuorumSigningRequestId, RecoveredSig>,
    recovered_height: BTreeMap<QuorumSigningRequestId, u32>,
}

/// Collects shares and recovers threshold signatures.
pub struct SigningManager {
    registry: Arc<MasternodeListManager>,
    quorums: Arc<QuorumManager>,
    net: Arc<dyn NetworkBus>,
    identity: Mutex<Option<SignerIdentity>>,
    state: Mutex<SigningState>,
    share_timeout: Mutex<Duration>,
}

impl SigningManager {
    pub fn new(
        registry: Arc<MasternodeListManager>,
        quorums: Arc<QuorumManager>,
        net: Arc<dyn NetworkBus>,
    ) -> Self {
        SigningManager {
            registry,
            quorums,
            net,
            identity: Mutex::new(None),
            state: Mutex::new(SigningState::default()),
            share_timeout: Mutex::new(SHARE_COLLECTION_TIMEOUT),
        }
    }

    /// Installs this node's masternode identity.
    pub fn set_identity(&self, identity: SignerIdentity) {
        *self.identity.lock().expect("identity lock") = Some(identity);
    }

    /// Overrides the share-collection timeout.
    pub fn set_share_timeout(&self, timeout: Duration) {
        *self.share_timeout.lock().expect("timeout lock") = timeout;
    }

    /// Starts (or joins) the signing session for `(llmq_type, id, msg_hash)`.
    ///
    /// If this node is a valid member of the selected quorum, its share is
    /// computed, stored and broadcast. Idempotent. Returns whether a local
    /// share exists after the call.
    pub fn async_sign(
        &self,
        llmq_type: LLMQType,
        id: QuorumSigningRequestId,
        msg_hash: [u8; 32],
    ) -> ValidationResult<bool> {
        let Some(quorum) = self.quorums.select_quorum_for_request(llmq_type, &id) else {
            debug!(%llmq_type, "no active quorum to sign with");
            return Ok(false);
        };

        let share_message = {
            let identity = self.identity.lock().expect("identity lock");
            let Some(identity) = identity.as_ref() else {
                return Ok(false);
            };
            let Some(member) = quorum.member(&identity.pro_tx_hash) else {
                return Ok(false);
            };
            if !member.valid {
                return Ok(false);
            }
            let sign_hash = build_sign_hash(llmq_type, quorum.quorum_hash, id, &msg_hash);
            SigShareMessage {
                llmq_type,
                quorum_hash: quorum.quorum_hash,
                request_id: id,
                msg_hash,
                pro_tx_hash: identity.pro_tx_hash,
                share: identity.operator_secret.sign(&sign_hash.to_byte_array()),
            }
        };

        let current_height = self.registry.tip_list().height();
        {
            let mut state = self.state.lock().expect("signing lock");
            if state.recovered.contains_key(&id) {
                return Ok(true);
            }
            let session = state.sessions.entry(id).or_insert_with(|| SigningSession {
                llmq_type,
                quorum_hash: quorum.quorum_hash,
                msg_hash,
                shares: BTreeMap::new(),
                started_height: current_height,
                started_at: Instant::now(),
            });
            if session.msg_hash != msg_hash {
                return Err(ValidationError::Conflict(format!(
                    "request {} already open for a different message",
                    id
                )));
            }
            if let Some(existing) = session.shares.get(&share_message.pro_tx_hash) {
                if *existing == share_message.share {
                    return Ok(true);
                }
            }
            session.shares.insert(share_message.pro_tx_hash, share_message.share);
        }

        self.net.broadcast(topics::SIG_SHARE, serialize(&share_message));
        Ok(true)
    }

    /// Verifies and stores a share received from a peer.
    pub fn process_share(&self, message: &SigShareMessage) -> ValidationResult<()> {
        let quorum = self
            .quorums
            .get_quorum(message.llmq_type, &message.quorum_hash)
            .ok_or_else(|| {
                ValidationError::NotFound(format!("quorum {}", message.quorum_hash))
            })?;

        let member = quorum.member(&message.pro_tx_hash).ok_or_else(|| {
            ValidationError::ProtocolMismatch(format!(
                "{} is not a member of quorum {}",
                message.pro_tx_hash, message.quorum_hash
            ))
        })?;
        if !member.valid {
            return Err(ValidationError::ProtocolMismatch(format!(
                "share from invalid member {}",
                message.pro_tx_hash
            )));
        }

        let sign_hash = build_sign_hash(
            message.llmq_type,
            message.quorum_hash,
            message.request_id,
            &message.msg_hash,
        );
        if !message
            .share
            .verify_insecure(member.operator_public_key.as_bytes(), &sign_hash.to_byte_array())
        {
            return Err(ValidationError::CryptoFailure(format!(
                "bad share from {} for {}",
                message.pro_tx_hash, message.request_id
            )));
        }

        let current_height = self.registry.tip_list().height();
        let mut state = self.state.lock().expect("signing lock");
        let session =
            state.sessions.entry(message.request_id).or_insert_with(|| SigningSession {
                llmq_type: message.llmq_type,
                quorum_hash: message.quorum_hash,
                msg_hash: message.msg_hash,
                shares: BTreeMap::new(),
                started_height: current_height,
                started_at: Instant::now(),
            });
        if session.msg_hash != message.msg_hash || session.quorum_hash != message.quorum_hash {
            return Err(ValidationError::Conflict(format!(
                "share for {} disagrees with the open session",
                message.request_id
            )));
        }
        if let Some(existing) = session.shares.get(&message.pro_tx_hash) {
            if *existing != message.share {
                return Err(ValidationError::Conflict(format!(
                    "conflicting duplicate share from {}",
                    message.pro_tx_hash
                )));
            }
            return Ok(());
        }
        session.shares.insert(message.pro_tx_hash, message.share);
        Ok(())
    }

    /// Aggregates the session into a recovered signature once the threshold
    /// is met. The aggregate is verified against the actual signer set
    /// before it is released.
    pub fn try_recover(
        &self,
        llmq_type: LLMQType,
        id: QuorumSigningRequestId,
        msg_hash: [u8; 32],
    ) -> ValidationResult<Option<RecoveredSig>> {
        {
            let state = self.state.lock().expect("signing lock");
            if let Some(recovered) = state.recovered.get(&id) {
                return Ok(Some(recovered.clone()));
            }
        }

        let (quorum_hash, shares) = {
            let state = self.state.lock().expect("signing lock");
            let Some(session) = state.sessions.get(&id) else {
                return Ok(None);
            };
            if session.llmq_type != llmq_type || session.msg_hash != msg_hash {
                return Ok(None);
            }
            (session.quorum_hash, session.shares.clone())
        };

        let Some(quorum) = self.quorums.get_quorum(llmq_type, &quorum_hash) else {
            return Ok(None);
        };

        let member_shares: Vec<(ProTxHash, BLSSignature)> = shares
            .into_iter()
            .filter(|(pro_tx_hash, _)| {
                quorum.member(pro_tx_hash).map(|member| member.valid).unwrap_or(false)
            })
            .collect();
        if (member_shares.len() as u32) < quorum.threshold() {
            return Ok(None);
        }

        let signers: Vec<ProTxHash> =
            member_shares.iter().map(|(pro_tx_hash, _)| *pro_tx_hash).collect();
        let share_sigs: Vec<BLSSignature> =
            member_shares.iter().map(|(_, share)| *share).collect();
        let signature = aggregate_signatures(&share_sigs).map_err(|e| {
            ValidationError::CryptoFailure(format!("share aggregation failed: {}", e))
        })?;

        let recovered = RecoveredSig {
            llmq_type,
            quorum_hash,
            id,
            msg_hash,
            signature,
            signers,
        };
        if !recovered.verify(&quorum) {
            return Err(ValidationError::CryptoFailure(format!(
                "recovered signature for {} failed verification",
                id
            )));
        }

        // Contributors earn back a clean PoSe slate.
        let height = self.registry.tip_list().height();
        for pro_tx_hash in &recovered.signers {
            self.registry.note_signing_success(pro_tx_hash, height);
        }

        info!(%id, signers = recovered.signers.len(), "recovered threshold signature");
        let mut state = self.state.lock().expect("signing lock");
        state.sessions.remove(&id);
        state.recovered.insert(id, recovered.clone());
        state.recovered_height.insert(id, height);
        Ok(Some(recovered))
    }

    /// A previously recovered signature.
    pub fn get_recovered(&self, id: &QuorumSigningRequestId) -> Option<RecoveredSig> {
        self.state.lock().expect("signing lock").recovered.get(id).cloned()
    }

    /// Verifies a recovered signature received from a peer.
    pub fn verify_recovered(&self, recovered: &RecoveredSig) -> bool {
        match self.quorums.get_quorum(recovered.llmq_type, &recovered.quorum_hash) {
            Some(quorum) => recovered.verify(&quorum),
            None => false,
        }
    }

    /// Expires stale sessions and recovered signatures.
    ///
    /// A session that outlived the wall-clock timeout charges every valid
    /// quorum member that failed to contribute a share; that is the PoSe
    /// emit point for unresponsive operators.
    pub fn cleanup(&self, current_height: u32) {
        let timeout = *self.share_timeout.lock().expect("timeout lock");
        let mut timed_out: Vec<(QuorumSigningRequestId, LLMQType, QuorumHash, Vec<ProTxHash>)> =
            Vec::new();

        {
            let mut state = self.state.lock().expect("signing lock");
            let mut expired: Vec<QuorumSigningRequestId> = Vec::new();
            for (id, session) in &state.sessions {
                let too_old =
                    current_height.saturating_sub(session.started_height) > SESSION_MAX_AGE_BLOCKS;
                let too_slow = session.started_at.elapsed() >= timeout;
                if too_slow && !too_old {
                    timed_out.push((
                        *id,
                        session.llmq_type,
                        session.quorum_hash,
                        session.shares.keys().copied().collect(),
                    ));
                }
                if too_old || too_slow {
                    expired.push(*id);
                }
            }
            for id in expired {
                state.sessions.remove(&id);
            }

            let horizon = current_height.saturating_sub(SESSION_MAX_AGE_BLOCKS);
            let stale: Vec<QuorumSigningRequestId> = state
                .recovered_height
                .iter()
                .filter(|(_, height)| **height < horizon)
                .map(|(id, _)| *id)
                .collect();
            for id in stale {
                state.recovered.remove(&id);
                state.recovered_height.remove(&id);
            }
        }

        for (id, llmq_type, quorum_hash, contributors) in timed_out {
            let Some(quorum) = self.quorums.get_quorum(llmq_type, &quorum_hash) else {
                continue;
            };
            warn!(%id, "signing session timed out, scoring absent members");
            for member in &quorum.members {
                if member.valid && !contributors.contains(&member.pro_tx_hash) {
                    self.registry.penalize(&member.pro_tx_hash, current_height);
                }
            }
        }
    }
}
