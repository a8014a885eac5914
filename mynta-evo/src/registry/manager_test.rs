//! Masternode list manager tests.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use hashes::Hash;
use mynta::consensus::serialize;
use mynta::{BlockHash, ProTxHash};

use crate::registry::{
    pro_tx_hash_for, MasternodeListManager, POSE_BAN_THRESHOLD, POSE_PENALTY_INCREMENT,
};
use crate::storage::MemoryKvStore;
use crate::types::BlockIndex;
use mynta_test_utils::{
    block_hash, spending_transaction, MockChain, MockCoinView, TestMasternode,
};

struct Harness {
    store: Arc<MemoryKvStore>,
    coins: Arc<MockCoinView>,
    chain: Arc<MockChain>,
    manager: MasternodeListManager,
}

impl Harness {
    /// Builds a chain of 16 empty blocks first, so collaterals funded at
    /// genesis are mature for registrations in the next connected block.
    fn new() -> Self {
        let store = Arc::new(MemoryKvStore::new());
        let coins = Arc::new(MockCoinView::new());
        let chain = Arc::new(MockChain::new());
        let manager = MasternodeListManager::new(
            Arc::clone(&store) as Arc<dyn crate::storage::KvStore>,
            Arc::clone(&coins) as Arc<dyn crate::types::CoinView>,
            Arc::clone(&chain) as Arc<dyn BlockIndex>,
        );
        for tag in 0u8..16 {
            let block = chain.extend(block_hash(0xE0 + tag), Vec::new());
            manager.process_block(&block, &[]).unwrap();
        }
        Harness { store, coins, chain, manager }
    }

    fn connect(&self, tag: u8, transactions: Vec<mynta::Transaction>) -> crate::types::BlockRef {
        let block = self.chain.extend(block_hash(tag), transactions.clone());
        self.manager.process_block(&block, &transactions).unwrap();
        block
    }
}

#[test]
fn registrations_reach_the_tip_list() {
    let harness = Harness::new();
    let mn = TestMasternode::new(1);
    mn.fund_collateral(&harness.coins);

    let register = mn.register_transaction();
    let pro_tx_hash = pro_tx_hash_for(&register);
    harness.connect(10, vec![register]);

    assert!(harness.manager.has(&pro_tx_hash));
    assert!(harness.manager.is_collateral(&mn.collateral));
    assert_eq!(harness.manager.tip_list().valid_count(), 1);
}

#[test]
fn snapshot_undo_restores_previous_serialization() {
    // Register three nodes, then in one block revoke one and move another;
    // undoing that block must restore the earlier snapshot bit for bit.
    let harness = Harness::new();
    let nodes: Vec<TestMasternode> = (1u8..=3).map(TestMasternode::new).collect();
    for mn in &nodes {
        mn.fund_collateral(&harness.coins);
    }

    let registrations: Vec<_> = nodes.iter().map(|mn| mn.register_transaction()).collect();
    let hashes: Vec<ProTxHash> = registrations.iter().map(pro_tx_hash_for).collect();
    harness.connect(10, registrations);

    let before = serialize(harness.manager.tip_list().as_ref());

    let new_address: SocketAddr =
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(172, 16, 0, 9), 9999));
    let mutations = vec![
        nodes[0].revoke_transaction(hashes[0], 1),
        nodes[1].update_service_transaction(hashes[1], new_address),
    ];
    let block = harness.connect(11, mutations);

    assert!(!harness.manager.get(&hashes[0]).unwrap().is_valid());
    assert_eq!(
        harness.manager.get(&hashes[1]).unwrap().state.service_address,
        new_address
    );

    harness.chain.pop_tip();
    harness.manager.undo_block(&block).unwrap();

    let after = serialize(harness.manager.tip_list().as_ref());
    assert_eq!(before, after);
}

#[test]
fn payee_selection_matches_the_reference_vector() {
    // Two nodes whose proTxHashes are pinned to 0x11… and 0x22…; with the
    // block hash 0xaa…aa (and 0xbb…bb) the 0x11… node scores lower as a
    // little-endian 256-bit integer.
    let list = crate::registry::MasternodeList::empty(block_hash(0xAA), 5);
    let list = list.add_mn(test_entry_with_hash(0x11)).unwrap();
    let list = list.add_mn(test_entry_with_hash(0x22)).unwrap();

    let expected = ProTxHash::from_byte_array([0x11; 32]);
    assert_eq!(
        list.payee(&BlockHash::from_byte_array([0xAA; 32])).unwrap().pro_tx_hash,
        expected
    );
    assert_eq!(
        list.payee(&BlockHash::from_byte_array([0xBB; 32])).unwrap().pro_tx_hash,
        expected
    );

    // Both "peers" agree: an identical list built independently selects the
    // same payee.
    let peer_list = crate::registry::MasternodeList::empty(block_hash(0xAA), 5)
        .add_mn(test_entry_with_hash(0x11))
        .unwrap()
        .add_mn(test_entry_with_hash(0x22))
        .unwrap();
    assert_eq!(
        peer_list.payee(&BlockHash::from_byte_array([0xAA; 32])).unwrap().pro_tx_hash,
        expected
    );
}

fn test_entry_with_hash(tag: u8) -> crate::registry::MasternodeEntry {
    use mynta::{BLSPublicKey, OutPoint, PubkeyHash, ScriptBuf, Txid};

    crate::registry::MasternodeEntry {
        pro_tx_hash: ProTxHash::from_byte_array([tag; 32]),
        collateral_outpoint: OutPoint::new(Txid::from_byte_array([tag; 32]), 0),
        operator_reward: 0,
        internal_id: 0,
        state: crate::registry::MasternodeState {
            registered_height: 1,
            last_paid_height: 0,
            pose_penalty: 0,
            pose_revived_height: crate::registry::NO_HEIGHT,
            pose_ban_height: crate::registry::NO_HEIGHT,
            revocation_reason: 0,
            owner_key_hash: PubkeyHash::from_byte_array([tag; 20]),
            operator_public_key: BLSPublicKey::from_bytes([tag; 48]),
            voting_key_hash: PubkeyHash::from_byte_array([tag; 20]),
            service_address: SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::new(10, 2, 0, tag),
                9999,
            )),
            script_payout: ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array([tag; 20])),
            script_operator_payout: ScriptBuf::new(),
        },
    }
}

#[test]
fn coinbase_must_pay_the_winner() {
    let harness = Harness::new();
    let mn = TestMasternode::new(1);
    mn.fund_collateral(&harness.coins);

    let register = mn.register_transaction();
    harness.connect(10, vec![register]);
    let tip = harness.chain.tip().unwrap();

    let paying = mynta::Transaction {
        version: 2,
        lock_time: 0,
        input: vec![mynta::TxIn {
            previous_output: mynta::OutPoint::null(),
            script_sig: mynta::ScriptBuf::new(),
            sequence: 0xFFFF_FFFF,
        }],
        output: vec![mynta::TxOut { value: 500, script_pubkey: mn.payout_script() }],
        special_transaction_payload: None,
    };
    harness.manager.check_coinbase_payee(&tip, &paying).unwrap();

    let mut stingy = paying.clone();
    stingy.output[0].script_pubkey = mynta::ScriptBuf::from_bytes(vec![0x51]);
    assert!(harness.manager.check_coinbase_payee(&tip, &stingy).is_err());
}

#[test]
fn pose_score_boundary() {
    let harness = Harness::new();
    let mn = TestMasternode::new(1);
    mn.fund_collateral(&harness.coins);

    let register = mn.register_transaction();
    let pro_tx_hash = pro_tx_hash_for(&register);
    harness.connect(10, vec![register]);

    // 99 keeps the node eligible, one more bans it.
    harness.manager.bump_pose(&pro_tx_hash, POSE_BAN_THRESHOLD - 1, 11);
    assert!(harness.manager.get(&pro_tx_hash).unwrap().is_valid());
    assert_eq!(harness.manager.get(&pro_tx_hash).unwrap().state.pose_penalty, 99);

    harness.manager.bump_pose(&pro_tx_hash, 1, 11);
    let entry = harness.manager.get(&pro_tx_hash).unwrap();
    assert!(!entry.is_valid());
    assert_eq!(entry.state.pose_ban_height, 11);
}

#[test]
fn pose_penalty_caps_and_revival() {
    let harness = Harness::new();
    let mn = TestMasternode::new(1);
    mn.fund_collateral(&harness.coins);

    let register = mn.register_transaction();
    let pro_tx_hash = pro_tx_hash_for(&register);
    harness.connect(10, vec![register]);

    // Two default increments pass the threshold but the score caps there.
    harness.manager.penalize(&pro_tx_hash, 11);
    assert_eq!(
        harness.manager.get(&pro_tx_hash).unwrap().state.pose_penalty,
        POSE_PENALTY_INCREMENT
    );
    harness.manager.penalize(&pro_tx_hash, 11);
    let entry = harness.manager.get(&pro_tx_hash).unwrap();
    assert_eq!(entry.state.pose_penalty, POSE_BAN_THRESHOLD);
    assert!(!entry.is_valid());

    // A clean signing contribution revives it.
    harness.manager.note_signing_success(&pro_tx_hash, 12);
    let entry = harness.manager.get(&pro_tx_hash).unwrap();
    assert!(entry.is_valid());
    assert_eq!(entry.state.pose_penalty, 0);
    assert_eq!(entry.state.pose_revived_height, 12);
}

#[test]
fn pose_state_survives_restart() {
    // PoSe events arrive between blocks, so they must land in the stored
    // tip snapshot immediately; a fresh manager over the same store has to
    // see the ban, not the pre-bump state from the last connect.
    let harness = Harness::new();
    let mn = TestMasternode::new(1);
    mn.fund_collateral(&harness.coins);

    let register = mn.register_transaction();
    let pro_tx_hash = pro_tx_hash_for(&register);
    harness.connect(10, vec![register]);

    harness.manager.bump_pose(&pro_tx_hash, POSE_BAN_THRESHOLD, 17);
    assert!(!harness.manager.get(&pro_tx_hash).unwrap().is_valid());

    let reloaded = MasternodeListManager::new(
        Arc::clone(&harness.store) as Arc<dyn crate::storage::KvStore>,
        Arc::clone(&harness.coins) as Arc<dyn crate::types::CoinView>,
        Arc::clone(&harness.chain) as Arc<dyn BlockIndex>,
    );
    let entry = reloaded.get(&pro_tx_hash).unwrap();
    assert!(!entry.is_valid());
    assert_eq!(entry.state.pose_penalty, POSE_BAN_THRESHOLD);
    assert_eq!(entry.state.pose_ban_height, 17);

    // Revival is persisted the same way.
    reloaded.note_signing_success(&pro_tx_hash, 18);
    let revived = MasternodeListManager::new(
        Arc::clone(&harness.store) as Arc<dyn crate::storage::KvStore>,
        Arc::clone(&harness.coins) as Arc<dyn crate::types::CoinView>,
        Arc::clone(&harness.chain) as Arc<dyn BlockIndex>,
    );
    let entry = revived.get(&pro_tx_hash).unwrap();
    assert!(entry.is_valid());
    assert_eq!(entry.state.pose_penalty, 0);
    assert_eq!(entry.state.pose_revived_height, 18);
}

#[test]
fn cold_snapshot_reconstruction_by_replay() {
    let harness = Harness::new();
    let mn = TestMasternode::new(1);
    mn.fund_collateral(&harness.coins);

    let register = mn.register_transaction();
    let pro_tx_hash = pro_tx_hash_for(&register);
    let register_block = harness.connect(10, vec![register]);

    // Advance a few empty blocks.
    for tag in 11u8..16 {
        harness.connect(tag, Vec::new());
    }

    // Build a fresh manager over the same store and chain but drop the
    // non-anchor snapshots, forcing a replay from the genesis anchor.
    for entry in harness.store.iter_prefix(b"dmn_S").unwrap() {
        harness.store.delete(&entry.0).unwrap();
    }
    let manager = MasternodeListManager::new(
        Arc::clone(&harness.store) as Arc<dyn crate::storage::KvStore>,
        Arc::clone(&harness.coins) as Arc<dyn crate::types::CoinView>,
        Arc::clone(&harness.chain) as Arc<dyn BlockIndex>,
    );

    let list = manager.list_for_block(&register_block).unwrap();
    assert!(list.get(&pro_tx_hash).is_some());
    assert_eq!(list.height(), register_block.height);
}

#[test]
fn collateral_spend_in_later_block_removes_the_record() {
    let harness = Harness::new();
    let mn = TestMasternode::new(1);
    mn.fund_collateral(&harness.coins);

    let register = mn.register_transaction();
    let pro_tx_hash = pro_tx_hash_for(&register);
    harness.connect(10, vec![register]);
    assert!(harness.manager.has(&pro_tx_hash));

    harness.connect(11, vec![spending_transaction(9, &[mn.collateral])]);
    assert!(!harness.manager.has(&pro_tx_hash));
    assert!(!harness.manager.is_collateral(&mn.collateral));
}
