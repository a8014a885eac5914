//! # Mynta Evolution service layer
//!
//! The consensus-enforced subsystems that sit on top of plain proof-of-work
//! validation: the deterministic masternode registry, LLMQ quorums and
//! signing sessions, InstantSend transaction locks, ChainLocks, and the
//! UTXO-bound atomic-swap order book.
//!
//! The node wires the layer up once with its storage, coin view, block
//! index and network bus, then drives it from the validation thread:
//!
//! ```ignore
//! let core = ServiceLayer::init(store, coins, blocks, net)?;
//! // on block connect:
//! core.block_connected(&block_ref, &transactions)?;
//! // on block disconnect:
//! core.block_disconnected(&block_ref)?;
//! // on a new tip:
//! core.updated_block_tip(&tip)?;
//! ```
//!
//! All state transitions are synchronous on the caller's thread; lookups
//! are safe from anywhere.

pub mod chainlocks;
pub mod error;
pub mod instantsend;
pub mod orderbook;
pub mod quorum;
pub mod registry;
pub mod signing;
pub mod storage;
pub mod swap;
pub mod types;

use std::sync::Arc;

use tracing::info;

use crate::chainlocks::ChainLockManager;
use crate::error::ValidationResult;
use crate::instantsend::InstantSendManager;
use crate::quorum::QuorumManager;
use crate::registry::MasternodeListManager;
use crate::signing::SigningManager;
use crate::storage::KvStore;
use crate::types::{BlockIndex, BlockRef, CoinView, NetworkBus};

use mynta::Transaction;

/// The assembled service layer: one instance of every manager, wired in
/// dependency order. Lifecycle is explicit: [`ServiceLayer::init`] builds
/// everything, [`ServiceLayer::shutdown`] tears it down; nothing is
/// constructed implicitly.
pub struct ServiceLayer {
    pub registry: Arc<MasternodeListManager>,
    pub quorums: Arc<QuorumManager>,
    pub signing: Arc<SigningManager>,
    pub instantsend: Arc<InstantSendManager>,
    pub chainlocks: Arc<ChainLockManager>,
    pub orderbook: Arc<orderbook::OrderBook>,
    blocks: Arc<dyn BlockIndex>,
}

impl ServiceLayer {
    /// Builds the full layer over the node's collaborators.
    pub fn init(
        store: Arc<dyn KvStore>,
        coins: Arc<dyn CoinView>,
        blocks: Arc<dyn BlockIndex>,
        net: Arc<dyn NetworkBus>,
    ) -> ValidationResult<Self> {
        let registry = Arc::new(MasternodeListManager::new(
            Arc::clone(&store),
            Arc::clone(&coins),
            Arc::clone(&blocks),
        ));
        let quorums = Arc::new(QuorumManager::new(Arc::clone(&registry), Arc::clone(&blocks)));
        let signing = Arc::new(SigningManager::new(
            Arc::clone(&registry),
            Arc::clone(&quorums),
            Arc::clone(&net),
        ));
        let instantsend = Arc::new(InstantSendManager::new(
            Arc::clone(&store),
            Arc::clone(&signing),
            Arc::clone(&quorums),
            Arc::clone(&net),
        ));
        let chainlocks = Arc::new(ChainLockManager::new(
            Arc::clone(&store),
            Arc::clone(&signing),
            Arc::clone(&quorums),
            Arc::clone(&blocks),
            Arc::clone(&net),
        ));
        let orderbook = Arc::new(orderbook::OrderBook::new(store, Arc::clone(&coins))?);

        info!("service layer initialized");
        Ok(ServiceLayer {
            registry,
            quorums,
            signing,
            instantsend,
            chainlocks,
            orderbook,
            blocks,
        })
    }

    /// Folds a connected block through every component, in lock order:
    /// registry first, order book last.
    pub fn block_connected(
        &self,
        block: &BlockRef,
        transactions: &[Transaction],
    ) -> ValidationResult<()> {
        self.instantsend.check_block(transactions)?;
        if block.height > 0 {
            if let Some(coinbase) = transactions.first().filter(|tx| tx.is_coinbase()) {
                if let Some(parent) = self.blocks.ancestor(block, block.height - 1) {
                    self.registry.check_coinbase_payee(&parent, coinbase)?;
                }
            }
        }
        self.registry.process_block(block, transactions)?;
        self.orderbook.connect_block(block.height, transactions)?;
        Ok(())
    }

    /// Reverts a disconnected block. InstantSend locks deliberately stay.
    pub fn block_disconnected(&self, block: &BlockRef) -> ValidationResult<()> {
        self.registry.undo_block(block)?;
        self.orderbook.disconnect_block(block.height)?;
        Ok(())
    }

    /// Reacts to a tip change: refreshes quorums, retries pending
    /// chainlocks, signs the new tip, expires stale signing sessions.
    pub fn updated_block_tip(&self, tip: &BlockRef) -> ValidationResult<()> {
        self.quorums.updated_block_tip(tip)?;
        self.chainlocks.updated_block_tip(tip)?;
        self.signing.cleanup(tip.height);
        Ok(())
    }

    /// Feeds a relayed transaction into InstantSend.
    pub fn transaction_added(&self, tx: &Transaction) -> ValidationResult<()> {
        self.instantsend.check_mempool_transaction(tx)?;
        self.instantsend.process_transaction(tx)
    }

    /// Tears the layer down. Managers hold no background threads; this
    /// exists so the lifecycle stays explicit at the call site.
    pub fn shutdown(self) {
        info!("service layer shut down");
    }
}
