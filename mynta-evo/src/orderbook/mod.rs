//! The atomic-swap order book.
//!
//! Offers are UTXO-bound: each active offer is backed by one unspent funding
//! outpoint, and spending that outpoint fills (or cancels) the offer. All
//! state lives in one ordered KV store under short prefixes, every block
//! transition is one atomic batch, and an undo log keyed by height makes
//! disconnects exact inverses of connects.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, RwLock};

use hashes::{sha256d, Hash};
use mynta::consensus::{deserialize, encode, serialize, Decodable, Encodable, HashWriter};
use mynta::{HashLock, OfferHash, OutPoint, ScriptBuf, Transaction, Txid};
use tracing::{debug, info};

use crate::error::{StorageError, ValidationError, ValidationResult};
use crate::storage::{make_key, KvStore, WriteBatch};
use crate::types::{BlockIndex, CoinView};

/// Offers must give the counterparty at least this long.
pub const MIN_OFFER_TIMEOUT_BLOCKS: u32 = 10;
/// And at most this long (~3.5 days at one-minute blocks).
pub const MAX_OFFER_TIMEOUT_BLOCKS: u32 = 5040;

/// The display name of the native asset in pair keys.
pub const NATIVE_ASSET_NAME: &str = "MYNTA";

const DB_OFFER: &[u8] = b"O:";
const DB_PAIR: &[u8] = b"P:";
const DB_FUNDING: &[u8] = b"U:";
const DB_HEIGHT: &[u8] = b"H";
const DB_UNDO: &[u8] = b"D:";

/// An offer on the book.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapOffer {
    pub offer_hash: OfferHash,
    /// Asset the maker gives; empty string means native MYNTA.
    pub maker_asset: String,
    pub maker_amount: u64,
    pub maker_address: ScriptBuf,
    /// Asset the maker wants; empty string means native MYNTA.
    pub taker_asset: String,
    pub taker_amount: u64,
    pub hash_lock: HashLock,
    pub timeout_blocks: u32,
    pub created_height: u32,
    pub is_active: bool,
    pub is_filled: bool,
    /// The transaction that filled the offer; all-zero while open.
    pub fill_tx_hash: Txid,
    /// The UTXO backing this offer.
    pub funding_outpoint: OutPoint,
}

impl SwapOffer {
    /// Exchange rate taker/maker.
    pub fn rate(&self) -> f64 {
        if self.maker_amount == 0 {
            return 0.0;
        }
        self.taker_amount as f64 / self.maker_amount as f64
    }

    /// Whether the offer has run out at `current_height`.
    pub fn is_expired(&self, current_height: u32) -> bool {
        current_height >= self.created_height + self.timeout_blocks
    }

    /// The normalized pair key for this offer.
    pub fn pair_key(&self) -> String {
        trading_pair_key(&self.maker_asset, &self.taker_asset)
    }
}

impl Encodable for SwapOffer {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        let mut len = 0;
        len += self.offer_hash.consensus_encode(w)?;
        len += self.maker_asset.consensus_encode(w)?;
        len += self.maker_amount.consensus_encode(w)?;
        len += self.maker_address.consensus_encode(w)?;
        len += self.taker_asset.consensus_encode(w)?;
        len += self.taker_amount.consensus_encode(w)?;
        len += self.hash_lock.consensus_encode(w)?;
        len += self.timeout_blocks.consensus_encode(w)?;
        len += self.created_height.consensus_encode(w)?;
        len += self.is_active.consensus_encode(w)?;
        len += self.is_filled.consensus_encode(w)?;
        len += self.fill_tx_hash.consensus_encode(w)?;
        len += self.funding_outpoint.consensus_encode(w)?;
        Ok(len)
    }
}

impl Decodable for SwapOffer {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, encode::Error> {
        Ok(SwapOffer {
            offer_hash: Decodable::consensus_decode(r)?,
            maker_asset: Decodable::consensus_decode(r)?,
            maker_amount: Decodable::consensus_decode(r)?,
            maker_address: Decodable::consensus_decode(r)?,
            taker_asset: Decodable::consensus_decode(r)?,
            taker_amount: Decodable::consensus_decode(r)?,
            hash_lock: Decodable::consensus_decode(r)?,
            timeout_blocks: Decodable::consensus_decode(r)?,
            created_height: Decodable::consensus_decode(r)?,
            is_active: Decodable::consensus_decode(r)?,
            is_filled: Decodable::consensus_decode(r)?,
            fill_tx_hash: Decodable::consensus_decode(r)?,
            funding_outpoint: Decodable::consensus_decode(r)?,
        })
    }
}

/// The reproducible identity of an offer, so every peer derives the same
/// hash from the same terms.
pub fn compute_offer_hash(
    maker_asset: &str,
    maker_amount: u64,
    taker_asset: &str,
    taker_amount: u64,
    hash_lock: &HashLock,
    created_height: u32,
) -> OfferHash {
    let mut engine = sha256d::Hash::engine();
    maker_asset.to_string().consensus_encode(&mut HashWriter(&mut engine)).expect("engines don't error");
    maker_amount.consensus_encode(&mut HashWriter(&mut engine)).expect("engines don't error");
    taker_asset.to_string().consensus_encode(&mut HashWriter(&mut engine)).expect("engines don't error");
    taker_amount.consensus_encode(&mut HashWriter(&mut engine)).expect("engines don't error");
    hash_lock.consensus_encode(&mut HashWriter(&mut engine)).expect("engines don't error");
    created_height.consensus_encode(&mut HashWriter(&mut engine)).expect("engines don't error");
    OfferHash::from_raw_hash(sha256d::Hash::from_engine(engine))
}

/// `sortAlpha(a, b)` with the native asset normalized, joined by `:`.
pub fn trading_pair_key(asset_a: &str, asset_b: &str) -> String {
    let mut a = if asset_a.is_empty() { NATIVE_ASSET_NAME } else { asset_a };
    let mut b = if asset_b.is_empty() { NATIVE_ASSET_NAME } else { asset_b };
    if a > b {
        std::mem::swap(&mut a, &mut b);
    }
    format!("{}:{}", a, b)
}

/// Structural validation of a new offer.
pub fn check_offer(offer: &SwapOffer) -> ValidationResult<()> {
    if offer.maker_amount == 0 {
        return Err(ValidationError::ConsensusReject("maker amount must be positive".into()));
    }
    if offer.taker_amount == 0 {
        return Err(ValidationError::ConsensusReject("taker amount must be positive".into()));
    }
    if offer.maker_address.is_empty() {
        return Err(ValidationError::ConsensusReject("maker address is required".into()));
    }
    if offer.timeout_blocks < MIN_OFFER_TIMEOUT_BLOCKS {
        return Err(ValidationError::ConsensusReject(format!(
            "timeout {} below minimum {}",
            offer.timeout_blocks, MIN_OFFER_TIMEOUT_BLOCKS
        )));
    }
    if offer.timeout_blocks > MAX_OFFER_TIMEOUT_BLOCKS {
        return Err(ValidationError::ConsensusReject(format!(
            "timeout {} above maximum {}",
            offer.timeout_blocks, MAX_OFFER_TIMEOUT_BLOCKS
        )));
    }
    Ok(())
}

fn offer_key(offer_hash: &OfferHash) -> Vec<u8> {
    make_key(DB_OFFER, &offer_hash.to_byte_array())
}

fn pair_key_bytes(pair: &str, offer_hash: &OfferHash) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + pair.len() + 1 + 32);
    key.extend_from_slice(DB_PAIR);
    key.extend_from_slice(pair.as_bytes());
    key.push(b':');
    key.extend_from_slice(&offer_hash.to_byte_array());
    key
}

fn funding_key(offer_hash: &OfferHash) -> Vec<u8> {
    make_key(DB_FUNDING, &offer_hash.to_byte_array())
}

fn undo_key(height: u32, offer_hash: &OfferHash) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + 4 + 1 + 32);
    key.extend_from_slice(DB_UNDO);
    key.extend_from_slice(&height.to_be_bytes());
    key.push(b':');
    key.extend_from_slice(&offer_hash.to_byte_array());
    key
}

fn undo_prefix(height: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + 4 + 1);
    key.extend_from_slice(DB_UNDO);
    key.extend_from_slice(&height.to_be_bytes());
    key.push(b':');
    key
}

#[derive(Default)]
struct BookState {
    by_outpoint: BTreeMap<OutPoint, OfferHash>,
}

/// The persistent, reorg-safe order book.
pub struct OrderBook {
    store: Arc<dyn KvStore>,
    coins: Arc<dyn CoinView>,
    state: RwLock<BookState>,
}

impl OrderBook {
    /// Opens the book over `store`, rebuilding the funding index from the
    /// persisted offers.
    pub fn new(store: Arc<dyn KvStore>, coins: Arc<dyn CoinView>) -> ValidationResult<Self> {
        let book = OrderBook { store, coins, state: RwLock::new(BookState::default()) };
        book.rebuild_index()?;
        Ok(book)
    }

    fn rebuild_index(&self) -> ValidationResult<()> {
        let mut by_outpoint = BTreeMap::new();
        for (key, value) in self.store.iter_prefix(DB_FUNDING).map_err(ValidationError::Storage)?
        {
            let offer_hash = OfferHash::from_slice(&key[DB_FUNDING.len()..]).map_err(|_| {
                ValidationError::Storage(StorageError::Corruption("bad funding key".into()))
            })?;
            let outpoint: OutPoint = deserialize(&value).map_err(|e| {
                ValidationError::Storage(StorageError::Corruption(e.to_string()))
            })?;
            if let Some(offer) = self.get_offer(&offer_hash)? {
                if offer.is_active {
                    by_outpoint.insert(outpoint, offer_hash);
                }
            }
        }
        let count = by_outpoint.len();
        *self.state.write().expect("orderbook lock") = BookState { by_outpoint };
        if count > 0 {
            info!(active = count, "order book index rebuilt");
        }
        Ok(())
    }

    /// The height the book is synced to.
    pub fn synced_height(&self) -> ValidationResult<Option<u32>> {
        match self.store.get(DB_HEIGHT).map_err(ValidationError::Storage)? {
            None => Ok(None),
            Some(bytes) => {
                let bytes: [u8; 4] = bytes.try_into().map_err(|_| {
                    ValidationError::Storage(StorageError::Corruption("bad height value".into()))
                })?;
                Ok(Some(u32::from_le_bytes(bytes)))
            }
        }
    }

    /// Adds a fresh offer backed by a live funding outpoint.
    pub fn add_offer(&self, offer: &SwapOffer) -> ValidationResult<()> {
        check_offer(offer)?;

        let coin = self.coins.get_coin(&offer.funding_outpoint).ok_or_else(|| {
            ValidationError::ConsensusReject("funding outpoint not found".into())
        })?;
        if coin.spent {
            return Err(ValidationError::ConsensusReject("funding outpoint already spent".into()));
        }

        if self
            .store
            .get(&offer_key(&offer.offer_hash))
            .map_err(ValidationError::Storage)?
            .is_some()
        {
            return Err(ValidationError::Conflict(format!(
                "offer {} already exists",
                offer.offer_hash
            )));
        }
        {
            let state = self.state.read().expect("orderbook lock");
            if state.by_outpoint.contains_key(&offer.funding_outpoint) {
                return Err(ValidationError::Conflict(format!(
                    "outpoint {} already funds an offer",
                    offer.funding_outpoint
                )));
            }
        }

        let mut batch = WriteBatch::new();
        batch.put(offer_key(&offer.offer_hash), serialize(offer));
        batch.put(pair_key_bytes(&offer.pair_key(), &offer.offer_hash), Vec::new());
        batch.put(funding_key(&offer.offer_hash), serialize(&offer.funding_outpoint));
        self.store.write_batch(batch).map_err(ValidationError::Storage)?;

        let mut state = self.state.write().expect("orderbook lock");
        state.by_outpoint.insert(offer.funding_outpoint, offer.offer_hash);
        info!(offer = %offer.offer_hash, pair = %offer.pair_key(), "offer added");
        Ok(())
    }

    /// Folds a connected block: fills offers whose funding was spent,
    /// expires offers that ran out, advances the synced height. One atomic
    /// batch.
    pub fn connect_block(
        &self,
        height: u32,
        transactions: &[Transaction],
    ) -> ValidationResult<()> {
        let mut batch = WriteBatch::new();
        let mut consumed: Vec<OutPoint> = Vec::new();

        {
            let state = self.state.read().expect("orderbook lock");
            for tx in transactions {
                let txid = tx.txid();
                for input in &tx.input {
                    let Some(offer_hash) = state.by_outpoint.get(&input.previous_output) else {
                        continue;
                    };
                    let Some(offer) = self.get_offer(offer_hash)? else {
                        continue;
                    };
                    if !offer.is_active {
                        continue;
                    }
                    batch.put(undo_key(height, offer_hash), serialize(&offer));

                    let mut filled = offer.clone();
                    filled.is_active = false;
                    filled.is_filled = true;
                    filled.fill_tx_hash = txid;
                    batch.put(offer_key(offer_hash), serialize(&filled));
                    batch.delete(pair_key_bytes(&offer.pair_key(), offer_hash));
                    consumed.push(input.previous_output);
                    debug!(offer = %offer_hash, %txid, "offer filled");
                }
            }

            // Expiry sweep over the still-active offers.
            for offer_hash in state.by_outpoint.values() {
                let Some(offer) = self.get_offer(offer_hash)? else {
                    continue;
                };
                if !offer.is_active || !offer.is_expired(height) {
                    continue;
                }
                if consumed.contains(&offer.funding_outpoint) {
                    continue;
                }
                batch.put(undo_key(height, offer_hash), serialize(&offer));

                let mut expired = offer.clone();
                expired.is_active = false;
                batch.put(offer_key(offer_hash), serialize(&expired));
                batch.delete(pair_key_bytes(&offer.pair_key(), offer_hash));
                consumed.push(offer.funding_outpoint);
                debug!(offer = %offer_hash, height, "offer expired");
            }
        }

        batch.put(DB_HEIGHT.to_vec(), height.to_le_bytes().to_vec());
        self.store.write_batch(batch).map_err(ValidationError::Storage)?;

        let mut state = self.state.write().expect("orderbook lock");
        for outpoint in consumed {
            state.by_outpoint.remove(&outpoint);
        }
        Ok(())
    }

    /// Reverts a disconnected block from its undo records. One atomic batch.
    pub fn disconnect_block(&self, height: u32) -> ValidationResult<()> {
        let records =
            self.store.iter_prefix(&undo_prefix(height)).map_err(ValidationError::Storage)?;

        let mut batch = WriteBatch::new();
        let mut restored: Vec<(OutPoint, OfferHash)> = Vec::new();
        for (key, value) in records {
            let offer: SwapOffer = deserialize(&value).map_err(|e| {
                ValidationError::Storage(StorageError::Corruption(e.to_string()))
            })?;
            batch.put(offer_key(&offer.offer_hash), serialize(&offer));
            if offer.is_active {
                batch.put(pair_key_bytes(&offer.pair_key(), &offer.offer_hash), Vec::new());
                restored.push((offer.funding_outpoint, offer.offer_hash));
            }
            batch.delete(key);
        }
        batch.put(DB_HEIGHT.to_vec(), height.saturating_sub(1).to_le_bytes().to_vec());
        self.store.write_batch(batch).map_err(ValidationError::Storage)?;

        let count = restored.len();
        let mut state = self.state.write().expect("orderbook lock");
        for (outpoint, offer_hash) in restored {
            state.by_outpoint.insert(outpoint, offer_hash);
        }
        if count > 0 {
            info!(height, restored = count, "order book rolled back");
        }
        Ok(())
    }

    /// Direct spend notification from the coin view; the effect of
    /// [`OrderBook::connect_block`] for a single outpoint.
    pub fn utxo_spent(
        &self,
        outpoint: &OutPoint,
        spending_txid: Txid,
        height: u32,
    ) -> ValidationResult<()> {
        let offer_hash = {
            let state = self.state.read().expect("orderbook lock");
            match state.by_outpoint.get(outpoint) {
                Some(hash) => *hash,
                None => return Ok(()),
            }
        };
        let Some(offer) = self.get_offer(&offer_hash)? else {
            return Ok(());
        };
        if !offer.is_active {
            return Ok(());
        }

        let mut batch = WriteBatch::new();
        batch.put(undo_key(height, &offer_hash), serialize(&offer));
        let mut filled = offer.clone();
        filled.is_active = false;
        filled.is_filled = true;
        filled.fill_tx_hash = spending_txid;
        batch.put(offer_key(&offer_hash), serialize(&filled));
        batch.delete(pair_key_bytes(&offer.pair_key(), &offer_hash));
        self.store.write_batch(batch).map_err(ValidationError::Storage)?;

        self.state.write().expect("orderbook lock").by_outpoint.remove(outpoint);
        Ok(())
    }

    /// Replays connected blocks between the synced height and the tip, for
    /// crash recovery.
    pub fn replay_to_tip(&self, blocks: &dyn BlockIndex) -> ValidationResult<()> {
        let Some(tip) = blocks.tip() else {
            return Ok(());
        };
        let from = self.synced_height()?.map(|height| height + 1).unwrap_or(0);
        for height in from..=tip.height {
            let Some(block) = blocks.block_at_height(height) else {
                break;
            };
            let transactions = blocks
                .block_transactions(&block.hash)
                .ok_or_else(|| ValidationError::NotFound("block transactions".into()))?;
            self.connect_block(height, &transactions)?;
        }
        Ok(())
    }

    /// A stored offer.
    pub fn get_offer(&self, offer_hash: &OfferHash) -> ValidationResult<Option<SwapOffer>> {
        match self.store.get(&offer_key(offer_hash)).map_err(ValidationError::Storage)? {
            None => Ok(None),
            Some(bytes) => deserialize(&bytes).map(Some).map_err(|e| {
                ValidationError::Storage(StorageError::Corruption(e.to_string()))
            }),
        }
    }

    /// All active offers for a trading pair.
    pub fn offers_for_pair(
        &self,
        asset_a: &str,
        asset_b: &str,
    ) -> ValidationResult<Vec<SwapOffer>> {
        let pair = trading_pair_key(asset_a, asset_b);
        let mut prefix = Vec::with_capacity(2 + pair.len() + 1);
        prefix.extend_from_slice(DB_PAIR);
        prefix.extend_from_slice(pair.as_bytes());
        prefix.push(b':');

        let mut offers = Vec::new();
        for (key, _) in self.store.iter_prefix(&prefix).map_err(ValidationError::Storage)? {
            let offer_hash = OfferHash::from_slice(&key[prefix.len()..]).map_err(|_| {
                ValidationError::Storage(StorageError::Corruption("bad pair key".into()))
            })?;
            if let Some(offer) = self.get_offer(&offer_hash)? {
                if offer.is_active {
                    offers.push(offer);
                }
            }
        }
        Ok(offers)
    }

    /// The best-priced active offer in a pair. `buying` means the caller
    /// wants `want_asset` and reads maker offers of it, preferring the
    /// lowest rate; selling prefers the highest.
    pub fn best_offer(
        &self,
        want_asset: &str,
        have_asset: &str,
        buying: bool,
    ) -> ValidationResult<Option<SwapOffer>> {
        let offers = self.offers_for_pair(want_asset, have_asset)?;
        let mut best: Option<SwapOffer> = None;
        for offer in offers {
            let matches_direction = if buying {
                offer.maker_asset == want_asset
            } else {
                offer.taker_asset == want_asset
            };
            if !matches_direction {
                continue;
            }
            let better = match &best {
                None => true,
                Some(current) => {
                    if buying {
                        offer.rate() < current.rate()
                    } else {
                        offer.rate() > current.rate()
                    }
                }
            };
            if better {
                best = Some(offer);
            }
        }
        Ok(best)
    }

    /// Number of offers currently backed by an unspent funding outpoint.
    pub fn active_offer_count(&self) -> usize {
        self.state.read().expect("orderbook lock").by_outpoint.len()
    }
}
