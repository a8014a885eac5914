// Mynta Core Rust Library
// Written for Mynta in 2026 by
//     The Mynta Core Developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Consensus-critical serialization.
//!
//! Every value that crosses the wire or is committed to by a hash uses this
//! encoding: little-endian integers, compact-size prefixed vectors, exactly
//! the byte layout the rest of the UTXO ecosystem uses.

pub mod encode;

pub use encode::{deserialize, serialize, Decodable, Encodable, HashWriter, VarInt};
