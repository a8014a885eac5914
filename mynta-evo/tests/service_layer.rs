//! End-to-end wiring test: one `ServiceLayer` over mock collaborators,
//! driven the way the validation thread drives it.

use std::sync::Arc;

use hashes::Hash;
use mynta::{HashLock, OutPoint, ScriptBuf, Txid};
use mynta_evo::orderbook::{compute_offer_hash, SwapOffer};
use mynta_evo::registry::pro_tx_hash_for;
use mynta_evo::storage::{KvStore, MemoryKvStore};
use mynta_evo::types::{BlockIndex, BlockRef, CoinView, NetworkBus};
use mynta_evo::ServiceLayer;
use mynta_test_utils::{
    block_hash, spending_transaction, txid, MockChain, MockCoinView, MockNetworkBus,
    TestMasternode,
};

struct NodeHarness {
    chain: Arc<MockChain>,
    coins: Arc<MockCoinView>,
    core: ServiceLayer,
    next_tag: u8,
}

impl NodeHarness {
    fn new() -> Self {
        let store = Arc::new(MemoryKvStore::new());
        let coins = Arc::new(MockCoinView::new());
        let chain = Arc::new(MockChain::new());
        let net = Arc::new(MockNetworkBus::new());
        let core = ServiceLayer::init(
            store as Arc<dyn KvStore>,
            Arc::clone(&coins) as Arc<dyn CoinView>,
            Arc::clone(&chain) as Arc<dyn BlockIndex>,
            net as Arc<dyn NetworkBus>,
        )
        .unwrap();
        NodeHarness { chain, coins, core, next_tag: 0 }
    }

    fn connect(&mut self, transactions: Vec<mynta::Transaction>) -> BlockRef {
        let tag = self.next_tag;
        self.next_tag += 1;
        let block = self.chain.extend(block_hash(tag), transactions.clone());
        self.core.block_connected(&block, &transactions).unwrap();
        self.core.updated_block_tip(&block).unwrap();
        block
    }

    fn connect_empty_blocks(&mut self, count: u32) -> BlockRef {
        let mut last = self.chain.tip().unwrap_or(BlockRef::new(block_hash(0xFF), 0));
        for _ in 0..count {
            last = self.connect(Vec::new());
        }
        last
    }
}

fn sample_offer(tag: u8, created_height: u32) -> SwapOffer {
    let hash_lock = HashLock::from_byte_array([tag; 32]);
    SwapOffer {
        offer_hash: compute_offer_hash("", 1_000, "GOLD", 3_000, &hash_lock, created_height),
        maker_asset: String::new(),
        maker_amount: 1_000,
        maker_address: ScriptBuf::from_bytes(vec![0x51]),
        taker_asset: "GOLD".into(),
        taker_amount: 3_000,
        hash_lock,
        timeout_blocks: 100,
        created_height,
        is_active: true,
        is_filled: false,
        fill_tx_hash: Txid::all_zeros(),
        funding_outpoint: OutPoint::new(txid(tag), 1),
    }
}

#[test]
fn registry_and_orderbook_follow_the_chain() {
    let mut node = NodeHarness::new();
    node.connect_empty_blocks(16);

    // A masternode registers.
    let mn = TestMasternode::new(0x31);
    mn.fund_collateral(&node.coins);
    let register = mn.register_transaction();
    let pro_tx_hash = pro_tx_hash_for(&register);
    node.connect(vec![register]);

    assert!(node.core.registry.has(&pro_tx_hash));
    assert_eq!(node.core.registry.tip_list().valid_count(), 1);

    // The registered node is the unique payee candidate.
    let tip = node.chain.tip().unwrap();
    assert_eq!(node.core.registry.payee_for(&tip).unwrap(), Some(pro_tx_hash));

    // An offer appears, bound to a live UTXO.
    let height = tip.height;
    let offer = sample_offer(0x41, height);
    node.coins.add_coin(offer.funding_outpoint, offer.maker_amount, height);
    node.core.orderbook.add_offer(&offer).unwrap();
    assert_eq!(node.core.orderbook.active_offer_count(), 1);

    // Spending the funding outpoint in a block fills the offer.
    let fill = spending_transaction(0x42, &[offer.funding_outpoint]);
    let fill_block = node.connect(vec![fill.clone()]);

    let stored = node.core.orderbook.get_offer(&offer.offer_hash).unwrap().unwrap();
    assert!(stored.is_filled);
    assert_eq!(stored.fill_tx_hash, fill.txid());

    // A reorg disconnects the fill; the offer comes back, the registry
    // rolls back in lockstep.
    node.chain.pop_tip();
    node.core.block_disconnected(&fill_block).unwrap();
    let restored = node.core.orderbook.get_offer(&offer.offer_hash).unwrap().unwrap();
    assert!(restored.is_active);
    assert!(!restored.is_filled);
    assert!(node.core.registry.has(&pro_tx_hash));
}

#[test]
fn collateral_spend_reaches_the_registry_through_block_connected() {
    let mut node = NodeHarness::new();
    node.connect_empty_blocks(16);

    let mn = TestMasternode::new(0x51);
    mn.fund_collateral(&node.coins);
    let register = mn.register_transaction();
    let pro_tx_hash = pro_tx_hash_for(&register);
    node.connect(vec![register]);
    assert!(node.core.registry.has(&pro_tx_hash));

    node.connect(vec![spending_transaction(0x52, &[mn.collateral])]);
    assert!(!node.core.registry.has(&pro_tx_hash));
}

#[test]
fn mempool_gate_accepts_unlocked_transactions() {
    let mut node = NodeHarness::new();
    node.connect_empty_blocks(4);

    let tx = spending_transaction(0x61, &[OutPoint::new(txid(0x62), 0)]);
    // No quorums exist, so nothing gets locked, but the plumbing accepts
    // and processes the transaction without error.
    node.core.transaction_added(&tx).unwrap();
    assert!(!node.core.instantsend.is_locked(&tx.txid()));
}

#[test]
fn snapshot_serialization_is_identical_across_nodes() {
    // Two nodes fed the same blocks end with byte-identical tip snapshots.
    let build = || {
        let mut node = NodeHarness::new();
        node.connect_empty_blocks(16);
        let mn = TestMasternode::new(0x71);
        mn.fund_collateral(&node.coins);
        node.connect(vec![mn.register_transaction()]);
        node
    };
    let node_a = build();
    let node_b = build();
    assert_eq!(
        mynta::consensus::serialize(node_a.core.registry.tip_list().as_ref()),
        mynta::consensus::serialize(node_b.core.registry.tip_list().as_ref()),
    );
}
