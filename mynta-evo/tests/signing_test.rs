//! Signing session tests over a tiny real quorum.

use std::sync::Arc;
use std::time::Duration;

use hashes::Hash;
use mynta::llmq::build_sign_hash;
use mynta::{LLMQType, ProTxHash, QuorumSigningRequestId};

use mynta_evo::quorum::QuorumManager;
use mynta_evo::registry::{pro_tx_hash_for, MasternodeListManager};
use mynta_evo::signing::{RecoveredSig, SigShareMessage, SignerIdentity, SigningManager};
use mynta_evo::storage::MemoryKvStore;
use mynta_evo::types::{topics, BlockIndex, NetworkBus};
use mynta_test_utils::{block_hash, MockChain, MockCoinView, MockNetworkBus, TestMasternode};

const TEST_TYPE: LLMQType = LLMQType::LlmqtypeTest;

struct SigningHarness {
    registry: Arc<MasternodeListManager>,
    quorums: Arc<QuorumManager>,
    signing: SigningManager,
    net: Arc<MockNetworkBus>,
    nodes: Vec<TestMasternode>,
    member_hashes: Vec<ProTxHash>,
}

impl SigningHarness {
    /// Three masternodes, registered and folded into an active test quorum.
    fn new() -> Self {
        let store = Arc::new(MemoryKvStore::new());
        let coins = Arc::new(MockCoinView::new());
        let chain = Arc::new(MockChain::new());
        let registry = Arc::new(MasternodeListManager::new(
            store as Arc<dyn mynta_evo::storage::KvStore>,
            Arc::clone(&coins) as Arc<dyn mynta_evo::types::CoinView>,
            Arc::clone(&chain) as Arc<dyn BlockIndex>,
        ));

        for tag in 0u8..16 {
            let block = chain.extend(block_hash(0xD0 + tag), Vec::new());
            registry.process_block(&block, &[]).unwrap();
        }

        let nodes: Vec<TestMasternode> = (1u8..=3).map(TestMasternode::new).collect();
        for mn in &nodes {
            mn.fund_collateral(&coins);
        }
        let transactions: Vec<_> = nodes.iter().map(|mn| mn.register_transaction()).collect();
        let member_hashes: Vec<ProTxHash> = transactions.iter().map(pro_tx_hash_for).collect();
        let block = chain.extend(block_hash(0xC0), transactions.clone());
        registry.process_block(&block, &transactions).unwrap();

        let mut tip = block;
        let mut tag = 0x30u8;
        while tip.height % 24 != 0 {
            tip = chain.extend(block_hash(tag), Vec::new());
            registry.process_block(&tip, &[]).unwrap();
            tag += 1;
        }

        let quorums = Arc::new(QuorumManager::new(
            Arc::clone(&registry),
            Arc::clone(&chain) as Arc<dyn BlockIndex>,
        ));
        quorums.updated_block_tip(&tip).unwrap();

        let net = Arc::new(MockNetworkBus::new());
        let signing = SigningManager::new(
            Arc::clone(&registry),
            Arc::clone(&quorums),
            Arc::clone(&net) as Arc<dyn NetworkBus>,
        );

        SigningHarness { registry, quorums, signing, net, nodes, member_hashes }
    }

    fn identity_for(&self, index: usize) -> SignerIdentity {
        SignerIdentity {
            pro_tx_hash: self.member_hashes[index],
            operator_secret: mynta::BLSSecretKey::keygen(&[self.nodes[index].tag; 32]).unwrap(),
        }
    }

    /// A share computed as node `index` would compute it.
    fn share_from(
        &self,
        index: usize,
        id: QuorumSigningRequestId,
        msg_hash: [u8; 32],
    ) -> SigShareMessage {
        let quorum = self.quorums.select_quorum_for_request(TEST_TYPE, &id).unwrap();
        let sign_hash = build_sign_hash(TEST_TYPE, quorum.quorum_hash, id, &msg_hash);
        SigShareMessage {
            llmq_type: TEST_TYPE,
            quorum_hash: quorum.quorum_hash,
            request_id: id,
            msg_hash,
            pro_tx_hash: self.member_hashes[index],
            share: self.nodes[index].operator_secret.sign(&sign_hash.to_byte_array()),
        }
    }
}

fn request(tag: u8) -> (QuorumSigningRequestId, [u8; 32]) {
    (QuorumSigningRequestId::from_byte_array([tag; 32]), [tag ^ 0xFF; 32])
}

#[test]
fn full_session_recovers_and_verifies() {
    let harness = SigningHarness::new();
    harness.signing.set_identity(harness.identity_for(0));
    let (id, msg_hash) = request(1);

    // Our own share goes out on the wire.
    assert!(harness.signing.async_sign(TEST_TYPE, id, msg_hash).unwrap());
    assert_eq!(harness.net.sent(topics::SIG_SHARE).len(), 1);

    // One share is below the threshold of 2.
    assert!(harness.signing.try_recover(TEST_TYPE, id, msg_hash).unwrap().is_none());

    // A peer's share arrives.
    harness.signing.process_share(&harness.share_from(1, id, msg_hash)).unwrap();
    let recovered = harness
        .signing
        .try_recover(TEST_TYPE, id, msg_hash)
        .unwrap()
        .expect("threshold met");

    assert_eq!(recovered.id, id);
    assert_eq!(recovered.msg_hash, msg_hash);
    assert_eq!(recovered.signers.len(), 2);
    assert!(harness.signing.verify_recovered(&recovered));

    // Recovery is idempotent and cached.
    let again = harness.signing.try_recover(TEST_TYPE, id, msg_hash).unwrap().unwrap();
    assert_eq!(again, recovered);
    assert_eq!(harness.signing.get_recovered(&id), Some(recovered));
}

#[test]
fn async_sign_without_membership_is_a_noop() {
    let harness = SigningHarness::new();
    let (id, msg_hash) = request(2);

    // No identity at all.
    assert!(!harness.signing.async_sign(TEST_TYPE, id, msg_hash).unwrap());

    // An identity that is not on the quorum.
    harness.signing.set_identity(SignerIdentity {
        pro_tx_hash: ProTxHash::from_byte_array([0xEE; 32]),
        operator_secret: mynta::BLSSecretKey::keygen(&[0xEE; 32]).unwrap(),
    });
    assert!(!harness.signing.async_sign(TEST_TYPE, id, msg_hash).unwrap());
    assert!(harness.net.sent(topics::SIG_SHARE).is_empty());
}

#[test]
fn bad_shares_are_rejected() {
    let harness = SigningHarness::new();
    let (id, msg_hash) = request(3);

    // Signed by the right node over the wrong message.
    let mut wrong = harness.share_from(1, id, msg_hash);
    wrong.msg_hash = [0xAB; 32];
    assert!(harness.signing.process_share(&wrong).is_err());

    // Signed by a key that does not belong to the claimed member.
    let mut forged = harness.share_from(1, id, msg_hash);
    forged.pro_tx_hash = harness.member_hashes[2];
    assert!(harness.signing.process_share(&forged).is_err());

    // A non-member entirely.
    let mut outsider = harness.share_from(1, id, msg_hash);
    outsider.pro_tx_hash = ProTxHash::from_byte_array([0xEE; 32]);
    assert!(harness.signing.process_share(&outsider).is_err());
}

#[test]
fn conflicting_duplicate_share_is_rejected() {
    let harness = SigningHarness::new();
    let (id, msg_hash) = request(4);

    let share = harness.share_from(1, id, msg_hash);
    harness.signing.process_share(&share).unwrap();
    // The identical share again is fine.
    harness.signing.process_share(&share).unwrap();

    // The same member claiming a different signature is a conflict.
    let mut conflicting = share.clone();
    conflicting.share = harness.share_from(2, id, msg_hash).share;
    assert!(matches!(
        harness.signing.process_share(&conflicting),
        Err(mynta_evo::error::ValidationError::Conflict(_))
    ));
}

#[test]
fn recovered_signature_survives_share_order() {
    let harness = SigningHarness::new();
    let (id, msg_hash) = request(5);

    harness.signing.process_share(&harness.share_from(2, id, msg_hash)).unwrap();
    harness.signing.process_share(&harness.share_from(0, id, msg_hash)).unwrap();
    harness.signing.process_share(&harness.share_from(1, id, msg_hash)).unwrap();

    let recovered = harness.signing.try_recover(TEST_TYPE, id, msg_hash).unwrap().unwrap();
    assert_eq!(recovered.signers.len(), 3);
    assert!(harness.signing.verify_recovered(&recovered));
}

#[test]
fn timeout_scores_absent_members() {
    let harness = SigningHarness::new();
    harness.signing.set_share_timeout(Duration::from_secs(0));
    let (id, msg_hash) = request(6);

    // Only node 1 contributes before the timeout.
    harness.signing.process_share(&harness.share_from(1, id, msg_hash)).unwrap();
    let tip_height = harness.registry.tip_list().height();
    harness.signing.cleanup(tip_height);

    // The quorum had 3 members; the two silent ones were penalized.
    let quorum = harness.quorums.select_quorum_for_request(TEST_TYPE, &id).unwrap();
    let mut penalized = 0;
    for member in &quorum.members {
        let entry = harness.registry.get(&member.pro_tx_hash).unwrap();
        if entry.state.pose_penalty > 0 {
            penalized += 1;
            assert_eq!(entry.state.pose_penalty, mynta_evo::registry::POSE_PENALTY_INCREMENT);
        }
    }
    assert_eq!(penalized, 2);

    // The session is gone; a late recovery finds nothing.
    assert!(harness.signing.try_recover(TEST_TYPE, id, msg_hash).unwrap().is_none());
}

#[test]
fn wire_recovered_sig_without_signers_verifies_via_aggregated_key() {
    let harness = SigningHarness::new();
    let (id, msg_hash) = request(7);

    for index in 0..3 {
        harness.signing.process_share(&harness.share_from(index, id, msg_hash)).unwrap();
    }
    let recovered = harness.signing.try_recover(TEST_TYPE, id, msg_hash).unwrap().unwrap();

    // Strip the signer list, as a wire message would arrive.
    let wire = RecoveredSig { signers: Vec::new(), ..recovered };
    assert!(harness.signing.verify_recovered(&wire));
}
