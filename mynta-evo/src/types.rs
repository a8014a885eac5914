//! External collaborator interfaces.
//!
//! The service layer never walks the chain, reads the UTXO set or touches
//! the network itself; the node hands it these narrow views at init time.

use mynta::{BlockHash, OutPoint, ScriptBuf, Transaction};

/// A block position: hash plus height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockRef {
    pub hash: BlockHash,
    pub height: u32,
}

impl BlockRef {
    /// Creates a new block reference.
    pub fn new(hash: BlockHash, height: u32) -> Self {
        BlockRef { hash, height }
    }
}

/// An unspent (or recently spent) transaction output as seen by the coin
/// view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Coin {
    /// Value in the smallest native unit.
    pub value: u64,
    /// The locking script.
    pub script_pubkey: ScriptBuf,
    /// Whether the output was created by a coinbase.
    pub is_coinbase: bool,
    /// The height of the block that created the output.
    pub height: u32,
    /// Whether the output has been spent.
    pub spent: bool,
}

/// Read access to the block index.
pub trait BlockIndex: Send + Sync {
    /// The active chain tip.
    fn tip(&self) -> Option<BlockRef>;

    /// The active-chain block at `height`.
    fn block_at_height(&self, height: u32) -> Option<BlockRef>;

    /// A block looked up by hash, on any known chain.
    fn block_by_hash(&self, hash: &BlockHash) -> Option<BlockRef>;

    /// The ancestor of `block` at `height` on `block`'s chain.
    fn ancestor(&self, block: &BlockRef, height: u32) -> Option<BlockRef>;

    /// The last block common to the chains of `a` and `b`.
    fn last_common_ancestor(&self, a: &BlockRef, b: &BlockRef) -> Option<BlockRef>;

    /// The full transaction list of a known block, for snapshot replay.
    fn block_transactions(&self, hash: &BlockHash) -> Option<Vec<Transaction>>;
}

/// Read access to the UTXO set.
pub trait CoinView: Send + Sync {
    /// Looks up an output.
    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin>;
}

/// Outbound message fan-out. Inbound traffic arrives through the managers'
/// `process_*` entry points instead of a callback registry.
pub trait NetworkBus: Send + Sync {
    /// Broadcasts `payload` to all peers under `topic`.
    fn broadcast(&self, topic: &'static str, payload: Vec<u8>);
}

/// Broadcast topics used by the service layer.
pub mod topics {
    /// A quorum signature share.
    pub const SIG_SHARE: &str = "qsigshare";
    /// A fully recovered InstantSend lock.
    pub const INSTANT_LOCK: &str = "islock";
    /// A fully recovered ChainLock.
    pub const CHAIN_LOCK: &str = "clsig";
}
