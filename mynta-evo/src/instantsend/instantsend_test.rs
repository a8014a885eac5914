//! InstantSend lock tests over a tiny real quorum.

use std::sync::Arc;

use mynta::consensus::serialize;
use mynta::ephemerealdata::instant_lock::{message_hash_for, request_id_for_inputs};
use mynta::llmq::build_sign_hash;
use mynta::{InstantLock, LLMQType, OutPoint, Transaction};

use hashes::Hash;

use crate::instantsend::{InstantSendManager, INSTANTSEND_MAX_INPUTS};
use crate::quorum::QuorumManager;
use crate::registry::{pro_tx_hash_for, MasternodeListManager};
use crate::signing::{SignerIdentity, SigningManager};
use crate::storage::{KvStore, MemoryKvStore};
use crate::types::{topics, BlockIndex, NetworkBus};
use mynta_test_utils::{
    block_hash, spending_transaction, txid, MockChain, MockCoinView, MockNetworkBus,
    TestMasternode,
};

const TEST_TYPE: LLMQType = LLMQType::LlmqtypeTest;

struct IsHarness {
    store: Arc<MemoryKvStore>,
    signing: Arc<SigningManager>,
    quorums: Arc<QuorumManager>,
    net: Arc<MockNetworkBus>,
    manager: InstantSendManager,
    nodes: Vec<TestMasternode>,
}

impl IsHarness {
    fn new() -> Self {
        let store = Arc::new(MemoryKvStore::new());
        let coins = Arc::new(MockCoinView::new());
        let chain = Arc::new(MockChain::new());
        let registry = Arc::new(MasternodeListManager::new(
            Arc::clone(&store) as Arc<dyn KvStore>,
            Arc::clone(&coins) as Arc<dyn crate::types::CoinView>,
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
        let signing = Arc::new(SigningManager::new(
            Arc::clone(&registry),
            Arc::clone(&quorums),
            Arc::clone(&net) as Arc<dyn NetworkBus>,
        ));
        signing.set_identity(SignerIdentity {
            pro_tx_hash: pro_tx_hash_for(&nodes[0].register_transaction()),
            operator_secret: mynta::BLSSecretKey::keygen(&[nodes[0].tag; 32]).unwrap(),
        });

        let manager = InstantSendManager::with_quorum_type(
            Arc::clone(&store) as Arc<dyn KvStore>,
            Arc::clone(&signing),
            Arc::clone(&quorums),
            Arc::clone(&net) as Arc<dyn NetworkBus>,
            TEST_TYPE,
        );

        IsHarness { store, signing, quorums, net, manager, nodes }
    }

    /// Feeds the other members' shares for `tx` into the signing manager.
    fn gossip_peer_shares(&self, tx: &Transaction) {
        let inputs: Vec<OutPoint> = tx.input.iter().map(|i| i.previous_output).collect();
        let request_id = request_id_for_inputs(&inputs);
        let msg_hash = message_hash_for(request_id, tx.txid());
        let quorum = self.quorums.select_quorum_for_request(TEST_TYPE, &request_id).unwrap();
        let sign_hash = build_sign_hash(TEST_TYPE, quorum.quorum_hash, request_id, &msg_hash);

        for mn in &self.nodes[1..] {
            let message = crate::signing::SigShareMessage {
                llmq_type: TEST_TYPE,
                quorum_hash: quorum.quorum_hash,
                request_id,
                msg_hash,
                pro_tx_hash: pro_tx_hash_for(&mn.register_transaction()),
                share: mn.operator_secret.sign(&sign_hash.to_byte_array()),
            };
            self.signing.process_share(&message).unwrap();
        }
    }

    /// Builds a fully signed lock for `tx` directly from the member keys,
    /// the way a remote quorum would deliver it.
    fn full_lock(&self, tx: &Transaction) -> InstantLock {
        let inputs: Vec<OutPoint> = tx.input.iter().map(|i| i.previous_output).collect();
        let request_id = request_id_for_inputs(&inputs);
        let msg_hash = message_hash_for(request_id, tx.txid());
        let quorum = self.quorums.select_quorum_for_request(TEST_TYPE, &request_id).unwrap();
        let sign_hash = build_sign_hash(TEST_TYPE, quorum.quorum_hash, request_id, &msg_hash);

        let shares: Vec<_> = self
            .nodes
            .iter()
            .map(|mn| mn.operator_secret.sign(&sign_hash.to_byte_array()))
            .collect();
        InstantLock {
            inputs,
            txid: tx.txid(),
            quorum_hash: quorum.quorum_hash,
            signature: mynta::bls::aggregate_signatures(&shares).unwrap(),
        }
    }
}

#[test]
fn eligibility_boundary_at_max_inputs() {
    let harness = IsHarness::new();

    let inputs_32: Vec<OutPoint> =
        (0..INSTANTSEND_MAX_INPUTS as u32).map(|i| OutPoint::new(txid(0x20), i)).collect();
    assert!(harness.manager.is_eligible(&spending_transaction(1, &inputs_32)));

    let inputs_33: Vec<OutPoint> =
        (0..=INSTANTSEND_MAX_INPUTS as u32).map(|i| OutPoint::new(txid(0x20), i)).collect();
    assert!(!harness.manager.is_eligible(&spending_transaction(1, &inputs_33)));

    // Coinbase is never eligible.
    let mut coinbase = spending_transaction(1, &[OutPoint::null()]);
    coinbase.input[0].previous_output = OutPoint::null();
    assert!(!harness.manager.is_eligible(&coinbase));
}

#[test]
fn transaction_flow_produces_and_broadcasts_a_lock() {
    let harness = IsHarness::new();
    let u1 = OutPoint::new(txid(0x51), 0);
    let u2 = OutPoint::new(txid(0x52), 0);
    let tx = spending_transaction(0x0A, &[u1, u2]);

    // Our share alone is below the threshold; nothing is locked yet.
    harness.manager.process_transaction(&tx).unwrap();
    assert!(!harness.manager.is_locked(&tx.txid()));

    // Peer shares arrive; reprocessing recovers and stores the lock.
    harness.gossip_peer_shares(&tx);
    harness.manager.process_transaction(&tx).unwrap();

    assert!(harness.manager.is_locked(&tx.txid()));
    let lock = harness.manager.lock_for_txid(&tx.txid()).unwrap();
    assert_eq!(lock.inputs, vec![u1, u2]);
    assert_eq!(harness.net.sent(topics::INSTANT_LOCK).len(), 1);
    assert_eq!(
        harness.net.sent(topics::INSTANT_LOCK)[0],
        serialize(&lock)
    );
}

#[test]
fn conflicting_lock_is_rejected_and_state_unchanged() {
    // A locks [U1, U2]; a valid-looking lock for B over [U2, U3] must be
    // rejected as a conflict, leaving U3 unclaimed.
    let harness = IsHarness::new();
    let u1 = OutPoint::new(txid(0x61), 0);
    let u2 = OutPoint::new(txid(0x62), 0);
    let u3 = OutPoint::new(txid(0x63), 0);

    let tx_a = spending_transaction(0x0A, &[u1, u2]);
    let tx_b = spending_transaction(0x0B, &[u2, u3]);

    let lock_a = harness.full_lock(&tx_a);
    harness.manager.process_lock(&lock_a).unwrap();

    let lock_b = harness.full_lock(&tx_b);
    let result = harness.manager.process_lock(&lock_b);
    assert!(matches!(result, Err(crate::error::ValidationError::Conflict(_))));

    let hash_a = lock_a.hash();
    assert_eq!(harness.manager.lock_hash_for_input(&u1), Some(hash_a));
    assert_eq!(harness.manager.lock_hash_for_input(&u2), Some(hash_a));
    assert_eq!(harness.manager.lock_hash_for_input(&u3), None);
    assert!(!harness.manager.is_locked(&tx_b.txid()));
}

#[test]
fn tampered_lock_signature_is_rejected() {
    let harness = IsHarness::new();
    let tx = spending_transaction(0x0C, &[OutPoint::new(txid(0x71), 0)]);

    let mut lock = harness.full_lock(&tx);
    let mut bytes = *lock.signature.as_bytes();
    bytes[10] ^= 1;
    lock.signature = mynta::BLSSignature::from_bytes(bytes);

    assert!(matches!(
        harness.manager.process_lock(&lock),
        Err(crate::error::ValidationError::CryptoFailure(_))
    ));
    assert!(!harness.manager.is_locked(&tx.txid()));
}

#[test]
fn mempool_and_block_enforcement() {
    let harness = IsHarness::new();
    let u1 = OutPoint::new(txid(0x81), 0);
    let tx = spending_transaction(0x0D, &[u1]);

    harness.manager.process_lock(&harness.full_lock(&tx)).unwrap();

    // The locked transaction itself passes the mempool gate.
    harness.manager.check_mempool_transaction(&tx).unwrap();

    // A different spend of the same input does not.
    let rival = spending_transaction(0x0E, &[u1]);
    assert!(harness.manager.check_mempool_transaction(&rival).is_err());

    // And a block containing the rival is consensus-invalid.
    assert!(matches!(
        harness.manager.check_block(&[rival]),
        Err(crate::error::ValidationError::ConsensusReject(_))
    ));
    harness.manager.check_block(&[tx]).unwrap();
}

#[test]
fn locks_are_restored_from_storage() {
    let harness = IsHarness::new();
    let u1 = OutPoint::new(txid(0x91), 0);
    let tx = spending_transaction(0x0F, &[u1]);
    let lock = harness.full_lock(&tx);
    harness.manager.process_lock(&lock).unwrap();

    // A fresh manager over the same store sees the lock without re-gossip.
    let reloaded = InstantSendManager::with_quorum_type(
        Arc::clone(&harness.store) as Arc<dyn KvStore>,
        Arc::clone(&harness.signing),
        Arc::clone(&harness.quorums),
        Arc::new(MockNetworkBus::new()) as Arc<dyn NetworkBus>,
        TEST_TYPE,
    );
    assert!(reloaded.is_locked(&tx.txid()));
    assert_eq!(reloaded.lock_for_input(&u1).unwrap().hash(), lock.hash());
}

#[test]
fn duplicate_lock_is_idempotent() {
    let harness = IsHarness::new();
    let tx = spending_transaction(0x1F, &[OutPoint::new(txid(0xA1), 0)]);
    let lock = harness.full_lock(&tx);
    harness.manager.process_lock(&lock).unwrap();
    harness.manager.process_lock(&lock).unwrap();
    assert!(harness.manager.is_locked(&tx.txid()));
}
