// Mynta Core Rust Library
// Written for Mynta in 2026 by
//     The Mynta Core Developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Mynta transactions.
//!
//! A Mynta transaction is the usual UTXO transaction, except that versions
//! ≥ 3 carry a 16-bit type and, for non-zero types, an extra payload after
//! the outputs. The type and payload drive the deterministic masternode
//! registry.

pub mod special_transaction;

use std::{fmt, io};

use hashes::{sha256d, Hash};

use crate::consensus::encode::{self, HashWriter, VarInt};
use crate::consensus::{Decodable, Encodable};
use crate::hash_types::{InputsHash, Txid};
use crate::blockdata::script::ScriptBuf;
use special_transaction::TransactionPayload;

/// The sequence value that keeps an input CLTV-eligible while opting out of
/// nothing else.
pub const SEQUENCE_LOCKTIME_ENABLED: u32 = 0xFFFF_FFFE;
/// The final sequence value.
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

/// SIGHASH_ALL, the only hash type the service layer produces.
pub const SIGHASH_ALL: u32 = 1;

/// A reference to a transaction output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutPoint {
    /// The transaction creating the output.
    pub txid: Txid,
    /// The output index within that transaction.
    pub vout: u32,
}

impl OutPoint {
    /// Creates a new outpoint.
    pub fn new(txid: Txid, vout: u32) -> Self {
        OutPoint { txid, vout }
    }

    /// The null outpoint marking a coinbase input.
    pub fn null() -> Self {
        OutPoint { txid: Txid::all_zeros(), vout: u32::MAX }
    }

    /// Whether this is the coinbase marker.
    pub fn is_null(&self) -> bool {
        *self == OutPoint::null()
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

impl_consensus_encoding!(OutPoint, txid, vout);

/// A transaction input.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxIn {
    /// The output being spent.
    pub previous_output: OutPoint,
    /// The unlocking script.
    pub script_sig: ScriptBuf,
    /// The sequence number.
    pub sequence: u32,
}

impl_consensus_encoding!(TxIn, previous_output, script_sig, sequence);

/// A transaction output.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxOut {
    /// Value in the smallest native unit.
    pub value: u64,
    /// The locking script.
    pub script_pubkey: ScriptBuf,
}

impl_consensus_encoding!(TxOut, value, script_pubkey);

/// A Mynta transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// Transaction version. Special payloads require version ≥ 3.
    pub version: u16,
    /// Lock time: a block height below 500 million, a timestamp above.
    pub lock_time: u32,
    /// Inputs.
    pub input: Vec<TxIn>,
    /// Outputs.
    pub output: Vec<TxOut>,
    /// The typed extra payload, present iff the transaction type is non-zero.
    pub special_transaction_payload: Option<TransactionPayload>,
}

impl Transaction {
    /// The transaction id: the double-SHA256 of the serialization.
    pub fn txid(&self) -> Txid {
        let mut engine = sha256d::Hash::engine();
        self.consensus_encode(&mut HashWriter(&mut engine)).expect("engines don't error");
        Txid::from_raw_hash(sha256d::Hash::from_engine(engine))
    }

    /// The hash committing to every spent outpoint, in input order. Special
    /// transaction payloads embed this for replay protection.
    pub fn hash_inputs(&self) -> InputsHash {
        let mut engine = sha256d::Hash::engine();
        for input in &self.input {
            input
                .previous_output
                .consensus_encode(&mut HashWriter(&mut engine))
                .expect("engines don't error");
        }
        InputsHash::from_raw_hash(sha256d::Hash::from_engine(engine))
    }

    /// Whether this is a coinbase transaction.
    pub fn is_coinbase(&self) -> bool {
        self.input.len() == 1 && self.input[0].previous_output.is_null()
    }

    /// The legacy signature hash for signing `input_index` with
    /// `script_code` under `sighash_type`.
    ///
    /// Every other input's script is cleared, the signed input's script is
    /// replaced by `script_code`, and the sighash type is appended before
    /// double hashing.
    pub fn signature_hash(
        &self,
        input_index: usize,
        script_code: &ScriptBuf,
        sighash_type: u32,
    ) -> sha256d::Hash {
        assert!(input_index < self.input.len(), "input index out of range");

        let mut tx = self.clone();
        for (index, input) in tx.input.iter_mut().enumerate() {
            input.script_sig =
                if index == input_index { script_code.clone() } else { ScriptBuf::new() };
        }

        let mut engine = sha256d::Hash::engine();
        tx.consensus_encode(&mut HashWriter(&mut engine)).expect("engines don't error");
        sighash_type.consensus_encode(&mut HashWriter(&mut engine)).expect("engines don't error");
        sha256d::Hash::from_engine(engine)
    }

    /// The combined version/type field as serialized.
    fn packed_version(&self) -> u32 {
        let tx_type = special_transaction::TransactionType::from_optional_payload(
            &self.special_transaction_payload,
        );
        (self.version as u32) | ((tx_type as u32) << 16)
    }
}

impl Encodable for Transaction {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        let mut len = 0;
        len += self.packed_version().consensus_encode(w)?;
        len += self.input.consensus_encode(w)?;
        len += self.output.consensus_encode(w)?;
        len += self.lock_time.consensus_encode(w)?;
        if let Some(ref payload) = self.special_transaction_payload {
            let bytes = crate::consensus::serialize(payload);
            len += bytes.consensus_encode(w)?;
        }
        Ok(len)
    }
}

impl Decodable for Transaction {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, encode::Error> {
        let packed = u32::consensus_decode(r)?;
        let version = (packed & 0xFFFF) as u16;
        let tx_type = special_transaction::TransactionType::try_from((packed >> 16) as u16)?;
        let input = Vec::<TxIn>::consensus_decode(r)?;
        let output = Vec::<TxOut>::consensus_decode(r)?;
        let lock_time = u32::consensus_decode(r)?;
        let special_transaction_payload = if tx_type.has_payload() {
            if version < 3 {
                return Err(encode::Error::ParseFailed(
                    "special transaction payload requires version >= 3",
                ));
            }
            let payload_bytes = Vec::<u8>::consensus_decode(r)?;
            Some(tx_type.decode_payload(&mut payload_bytes.as_slice())?)
        } else {
            None
        };
        Ok(Transaction { version, lock_time, input, output, special_transaction_payload })
    }
}

/// The declared size on the wire of `tx`'s extra payload prefix, useful for
/// fee estimation of typed transactions.
pub fn extra_payload_len(payload: &TransactionPayload) -> usize {
    let bytes = crate::consensus::serialize(payload);
    VarInt(bytes.len() as u64).len() + bytes.len()
}
