//! The deterministic masternode registry.
//!
//! Every block deterministically folds its provider transactions into an
//! immutable snapshot of the masternode set. Snapshots are value types:
//! equal inputs give byte-equal serializations on every peer, which is what
//! makes payee selection and quorum construction consensus-safe.

mod apply;
mod list;
mod manager;

pub use apply::{apply_block, pro_tx_hash_for};
pub use list::{score_cmp, MasternodeEntry, MasternodeList, MasternodeState, NO_HEIGHT};
pub use manager::MasternodeListManager;

/// One native coin in its smallest unit.
pub const COIN: u64 = 100_000_000;

/// The exact collateral a registration must bind: 10 000 MYNTA.
pub const COLLATERAL_AMOUNT: u64 = 10_000 * COIN;

/// Confirmations the collateral needs before a registration is accepted.
pub const COLLATERAL_CONFIRMATIONS: u32 = 15;

/// PoSe penalty added per missed signing duty.
pub const POSE_PENALTY_INCREMENT: i32 = 66;

/// PoSe score at which a node is banned.
pub const POSE_BAN_THRESHOLD: i32 = 100;

/// Heights at which snapshots are persisted as replay anchors.
pub const SNAPSHOT_ANCHOR_INTERVAL: u32 = 24;
