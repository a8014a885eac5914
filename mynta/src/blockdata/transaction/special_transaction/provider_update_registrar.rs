// Mynta Core Rust Library
// Written for Mynta in 2026 by
//     The Mynta Core Developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Provider Update Registrar special transaction.
//!
//! Rotates the operator key, the voting key and/or the payout script of a
//! masternode. Signed by the owner key, which alone controls registrar
//! state. Rotating the operator key clears any PoSe ban the old operator
//! earned.

use std::io;

use crate::bls::BLSPublicKey;
use crate::consensus::{encode, Decodable, Encodable};
use crate::hash_types::{InputsHash, ProTxHash, PubkeyHash};
use crate::blockdata::script::ScriptBuf;

use super::SpecialTransactionBasePayloadEncodable;

/// The current payload version.
pub const PROVIDER_UPDATE_REGISTRAR_VERSION: u16 = 1;

/// A Provider Update Registrar payload (type 3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderUpdateRegistrarPayload {
    pub version: u16,
    pub pro_tx_hash: ProTxHash,
    /// Provider mode; only 0 is defined.
    pub provider_mode: u16,
    /// The new operator BLS key.
    pub operator_public_key: BLSPublicKey,
    /// The new voting key id.
    pub voting_key_hash: PubkeyHash,
    /// The new payout script.
    pub script_payout: ScriptBuf,
    pub inputs_hash: InputsHash,
    /// Compact ECDSA signature by the current owner key.
    pub signature: Vec<u8>,
}

impl ProviderUpdateRegistrarPayload {
    /// Field-level validation.
    pub fn check(&self) -> Result<(), encode::Error> {
        if self.provider_mode != 0 {
            return Err(encode::Error::ParseFailed("unknown provider mode"));
        }
        if !self.operator_public_key.is_valid() {
            return Err(encode::Error::ParseFailed("operator key is not a valid G1 point"));
        }
        Ok(())
    }
}

impl SpecialTransactionBasePayloadEncodable for ProviderUpdateRegistrarPayload {
    fn base_payload_data_encode<W: io::Write>(&self, mut s: W) -> Result<usize, io::Error> {
        let mut len = 0;
        len += self.version.consensus_encode(&mut s)?;
        len += self.pro_tx_hash.consensus_encode(&mut s)?;
        len += self.provider_mode.consensus_encode(&mut s)?;
        len += self.operator_public_key.consensus_encode(&mut s)?;
        len += self.voting_key_hash.consensus_encode(&mut s)?;
        len += self.script_payout.consensus_encode(&mut s)?;
        len += self.inputs_hash.consensus_encode(&mut s)?;
        Ok(len)
    }
}

impl Encodable for ProviderUpdateRegistrarPayload {
    fn consensus_encode<W: io::Write + ?Sized>(&self, mut w: &mut W) -> Result<usize, io::Error> {
        let mut len = 0;
        len += self.base_payload_data_encode(&mut w)?;
        len += self.signature.consensus_encode(&mut w)?;
        Ok(len)
    }
}

impl Decodable for ProviderUpdateRegistrarPayload {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, encode::Error> {
        Ok(ProviderUpdateRegistrarPayload {
            version: u16::consensus_decode(r)?,
            pro_tx_hash: ProTxHash::consensus_decode(r)?,
            provider_mode: u16::consensus_decode(r)?,
            operator_public_key: BLSPublicKey::consensus_decode(r)?,
            voting_key_hash: PubkeyHash::consensus_decode(r)?,
            script_payout: ScriptBuf::consensus_decode(r)?,
            inputs_hash: InputsHash::consensus_decode(r)?,
            signature: Vec::<u8>::consensus_decode(r)?,
        })
    }
}
