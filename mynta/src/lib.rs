// Mynta Core Rust Library
// Written for Mynta in 2026 by
//     The Mynta Core Developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! # Rust Mynta Library
//!
//! Consensus primitives for the Mynta network: transactions with typed
//! provider payloads, LLMQ parameters, BLS12-381 keys and signatures,
//! InstantSend-lock and ChainLock messages, and HTLC scripts.
//!
//! This crate is deliberately stateless. The stateful service layer —
//! the deterministic masternode registry, quorum construction, signing
//! sessions, lock managers and the swap order book — lives in `mynta-evo`
//! and is built on these types.

// Consensus encoding intentionally mirrors the wire format byte for byte;
// clippy's stylistic lints do not outrank that.
#![allow(clippy::manual_range_contains)]

pub use secp256k1;

#[macro_use]
mod internal_macros;

pub mod blockdata;
pub mod bls;
pub mod consensus;
pub mod ephemerealdata;
pub mod hash_types;
pub mod llmq;
pub mod signer;

pub use crate::blockdata::htlc;
pub use crate::blockdata::script::ScriptBuf;
pub use crate::blockdata::transaction::special_transaction::{
    TransactionPayload, TransactionType,
};
pub use crate::blockdata::transaction::{OutPoint, Transaction, TxIn, TxOut};
pub use crate::bls::{BLSPublicKey, BLSSecretKey, BLSSignature};
pub use crate::ephemerealdata::{ChainLock, InstantLock};
pub use crate::hash_types::{
    BlockHash, HashLock, InputsHash, InstantLockHash, OfferHash, ProTxHash, PubkeyHash,
    QuorumHash, QuorumModifierHash, QuorumSignHash, QuorumSigningRequestId, ScoreHash,
    ScriptHash, SpecialTransactionPayloadHash, Txid,
};
pub use crate::llmq::LLMQType;
