//! Mock implementations of the service layer's external collaborators.

use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};

use mynta::{BlockHash, OutPoint, ScriptBuf, Transaction};
use mynta_evo::types::{BlockIndex, BlockRef, Coin, CoinView, NetworkBus};

struct BlockNode {
    block: BlockRef,
    parent: Option<BlockHash>,
    transactions: Vec<Transaction>,
}

#[derive(Default)]
struct ChainInner {
    blocks: BTreeMap<BlockHash, BlockNode>,
    active: Vec<BlockHash>,
}

/// An in-memory block index supporting forks.
#[derive(Default)]
pub struct MockChain {
    inner: RwLock<ChainInner>,
}

impl MockChain {
    /// An empty chain. Heights start at 0 with the first added block.
    pub fn new() -> Self {
        MockChain::default()
    }

    /// Appends a block to the active chain and returns its position.
    pub fn extend(&self, hash: BlockHash, transactions: Vec<Transaction>) -> BlockRef {
        let mut inner = self.inner.write().unwrap();
        let height = inner.active.len() as u32;
        let parent = inner.active.last().copied();
        let block = BlockRef::new(hash, height);
        inner.blocks.insert(hash, BlockNode { block, parent, transactions });
        inner.active.push(hash);
        block
    }

    /// Adds a block on an arbitrary parent without activating it.
    pub fn add_side_block(
        &self,
        parent: BlockHash,
        hash: BlockHash,
        transactions: Vec<Transaction>,
    ) -> BlockRef {
        let mut inner = self.inner.write().unwrap();
        let parent_height = inner.blocks.get(&parent).expect("parent must exist").block.height;
        let block = BlockRef::new(hash, parent_height + 1);
        inner.blocks.insert(hash, BlockNode { block, parent: Some(parent), transactions });
        block
    }

    /// Drops the active tip, returning it.
    pub fn pop_tip(&self) -> Option<BlockRef> {
        let mut inner = self.inner.write().unwrap();
        let hash = inner.active.pop()?;
        Some(inner.blocks[&hash].block)
    }

    fn walk_to_height(
        &self,
        inner: &ChainInner,
        mut from: BlockRef,
        height: u32,
    ) -> Option<BlockRef> {
        while from.height > height {
            let node = inner.blocks.get(&from.hash)?;
            from = inner.blocks.get(&node.parent?)?.block;
        }
        (from.height == height).then_some(from)
    }
}

impl BlockIndex for MockChain {
    fn tip(&self) -> Option<BlockRef> {
        let inner = self.inner.read().unwrap();
        inner.active.last().map(|hash| inner.blocks[hash].block)
    }

    fn block_at_height(&self, height: u32) -> Option<BlockRef> {
        let inner = self.inner.read().unwrap();
        inner.active.get(height as usize).map(|hash| inner.blocks[hash].block)
    }

    fn block_by_hash(&self, hash: &BlockHash) -> Option<BlockRef> {
        let inner = self.inner.read().unwrap();
        inner.blocks.get(hash).map(|node| node.block)
    }

    fn ancestor(&self, block: &BlockRef, height: u32) -> Option<BlockRef> {
        let inner = self.inner.read().unwrap();
        self.walk_to_height(&inner, *block, height)
    }

    fn last_common_ancestor(&self, a: &BlockRef, b: &BlockRef) -> Option<BlockRef> {
        let inner = self.inner.read().unwrap();
        let mut a = *a;
        let mut b = *b;
        let common = a.height.min(b.height);
        a = self.walk_to_height(&inner, a, common)?;
        b = self.walk_to_height(&inner, b, common)?;
        while a.hash != b.hash {
            let a_node = inner.blocks.get(&a.hash)?;
            let b_node = inner.blocks.get(&b.hash)?;
            a = inner.blocks.get(&a_node.parent?)?.block;
            b = inner.blocks.get(&b_node.parent?)?.block;
        }
        Some(a)
    }

    fn block_transactions(&self, hash: &BlockHash) -> Option<Vec<Transaction>> {
        let inner = self.inner.read().unwrap();
        inner.blocks.get(hash).map(|node| node.transactions.clone())
    }
}

/// An in-memory UTXO view.
#[derive(Default)]
pub struct MockCoinView {
    coins: RwLock<BTreeMap<OutPoint, Coin>>,
}

impl MockCoinView {
    pub fn new() -> Self {
        MockCoinView::default()
    }

    /// Adds an unspent output.
    pub fn add_coin(&self, outpoint: OutPoint, value: u64, height: u32) {
        self.add_coin_with_script(outpoint, value, height, ScriptBuf::new());
    }

    /// Adds an unspent output with an explicit locking script.
    pub fn add_coin_with_script(
        &self,
        outpoint: OutPoint,
        value: u64,
        height: u32,
        script_pubkey: ScriptBuf,
    ) {
        self.coins.write().unwrap().insert(
            outpoint,
            Coin { value, script_pubkey, is_coinbase: false, height, spent: false },
        );
    }

    /// Marks an output spent.
    pub fn spend(&self, outpoint: &OutPoint) {
        if let Some(coin) = self.coins.write().unwrap().get_mut(outpoint) {
            coin.spent = true;
        }
    }
}

impl CoinView for MockCoinView {
    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.coins.read().unwrap().get(outpoint).cloned()
    }
}

/// A network bus that records everything broadcast through it.
#[derive(Default)]
pub struct MockNetworkBus {
    messages: Mutex<Vec<(&'static str, Vec<u8>)>>,
}

impl MockNetworkBus {
    pub fn new() -> Self {
        MockNetworkBus::default()
    }

    /// All messages broadcast so far under `topic`.
    pub fn sent(&self, topic: &str) -> Vec<Vec<u8>> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| *t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

impl NetworkBus for MockNetworkBus {
    fn broadcast(&self, topic: &'static str, payload: Vec<u8>) {
        self.messages.lock().unwrap().push((topic, payload));
    }
}
