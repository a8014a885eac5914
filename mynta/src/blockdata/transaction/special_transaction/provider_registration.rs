// Mynta Core Rust Library
// Written for Mynta in 2026 by
//     The Mynta Core Developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Provider Registration special transaction.
//!
//! Registers a masternode. The payload carries two ECDSA key ids and one BLS
//! public key for the three masternode roles: the owner (issues registrar
//! updates), the operator (runs the node, signs quorum messages with the BLS
//! key) and the voting key. The collateral outpoint binds the registration
//! to a 10 000 MYNTA UTXO; spending it later deletes the registration.

use std::io;
use std::net::SocketAddr;

use crate::bls::BLSPublicKey;
use crate::consensus::{encode, Decodable, Encodable};
use crate::hash_types::{InputsHash, PubkeyHash};
use crate::blockdata::script::ScriptBuf;
use crate::blockdata::transaction::OutPoint;

use super::SpecialTransactionBasePayloadEncodable;

/// Operator reward is expressed in basis points; 10000 pays the operator
/// everything.
pub const OPERATOR_REWARD_MAX: u16 = 10000;

/// The current payload version.
pub const PROVIDER_REGISTRATION_VERSION: u16 = 1;

/// A Provider Registration payload (type 1).
///
/// The signature is a compact ECDSA signature by the owner key over the hash
/// of the rest of the payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderRegistrationPayload {
    pub version: u16,
    /// Provider type; only 0 (regular masternode) is defined.
    pub provider_type: u16,
    /// Provider mode; only 0 is defined.
    pub provider_mode: u16,
    pub collateral_outpoint: OutPoint,
    pub service_address: SocketAddr,
    pub owner_key_hash: PubkeyHash,
    pub operator_public_key: BLSPublicKey,
    pub voting_key_hash: PubkeyHash,
    pub operator_reward: u16,
    pub script_payout: ScriptBuf,
    pub inputs_hash: InputsHash,
    pub signature: Vec<u8>,
}

impl ProviderRegistrationPayload {
    /// Field-level validation: defined type/mode, reward range, operator key
    /// decodes onto the curve.
    pub fn check(&self) -> Result<(), encode::Error> {
        if self.provider_type != 0 {
            return Err(encode::Error::ParseFailed("unknown provider type"));
        }
        if self.provider_mode != 0 {
            return Err(encode::Error::ParseFailed("unknown provider mode"));
        }
        if self.operator_reward > OPERATOR_REWARD_MAX {
            return Err(encode::Error::ParseFailed("operator reward above 10000 basis points"));
        }
        if !self.operator_public_key.is_valid() {
            return Err(encode::Error::ParseFailed("operator key is not a valid G1 point"));
        }
        if self.script_payout.is_empty() {
            return Err(encode::Error::ParseFailed("empty payout script"));
        }
        Ok(())
    }
}

impl SpecialTransactionBasePayloadEncodable for ProviderRegistrationPayload {
    fn base_payload_data_encode<W: io::Write>(&self, mut s: W) -> Result<usize, io::Error> {
        let mut len = 0;
        len += self.version.consensus_encode(&mut s)?;
        len += self.provider_type.consensus_encode(&mut s)?;
        len += self.provider_mode.consensus_encode(&mut s)?;
        len += self.collateral_outpoint.consensus_encode(&mut s)?;
        len += self.service_address.consensus_encode(&mut s)?;
        len += self.owner_key_hash.consensus_encode(&mut s)?;
        len += self.operator_public_key.consensus_encode(&mut s)?;
        len += self.voting_key_hash.consensus_encode(&mut s)?;
        len += self.operator_reward.consensus_encode(&mut s)?;
        len += self.script_payout.consensus_encode(&mut s)?;
        len += self.inputs_hash.consensus_encode(&mut s)?;
        Ok(len)
    }
}

impl Encodable for ProviderRegistrationPayload {
    fn consensus_encode<W: io::Write + ?Sized>(&self, mut w: &mut W) -> Result<usize, io::Error> {
        let mut len = 0;
        len += self.base_payload_data_encode(&mut w)?;
        len += self.signature.consensus_encode(&mut w)?;
        Ok(len)
    }
}

impl Decodable for ProviderRegistrationPayload {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, encode::Error> {
        Ok(ProviderRegistrationPayload {
            version: u16::consensus_decode(r)?,
            provider_type: u16::consensus_decode(r)?,
            provider_mode: u16::consensus_decode(r)?,
            collateral_outpoint: OutPoint::consensus_decode(r)?,
            service_address: SocketAddr::consensus_decode(r)?,
            owner_key_hash: PubkeyHash::consensus_decode(r)?,
            operator_public_key: BLSPublicKey::consensus_decode(r)?,
            voting_key_hash: PubkeyHash::consensus_decode(r)?,
            operator_reward: u16::consensus_decode(r)?,
            script_payout: ScriptBuf::consensus_decode(r)?,
            inputs_hash: InputsHash::consensus_decode(r)?,
            signature: Vec::<u8>::consensus_decode(r)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddrV4};

    use hashes::Hash;

    use super::*;
    use crate::bls::BLSSecretKey;
    use crate::consensus::{deserialize, serialize};
    use crate::hash_types::Txid;

    fn sample_payload() -> ProviderRegistrationPayload {
        let operator_key = BLSSecretKey::keygen(&[1u8; 32]).unwrap().public_key();
        ProviderRegistrationPayload {
            version: PROVIDER_REGISTRATION_VERSION,
            provider_type: 0,
            provider_mode: 0,
            collateral_outpoint: OutPoint::new(Txid::from_byte_array([0xCA; 32]), 0),
            service_address: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(1, 2, 5, 6), 19999)),
            owner_key_hash: PubkeyHash::from_byte_array([0x3D; 20]),
            operator_public_key: operator_key,
            voting_key_hash: PubkeyHash::from_byte_array([0xD3; 20]),
            operator_reward: 0,
            script_payout: ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array([0x4F; 20])),
            inputs_hash: InputsHash::from_byte_array([0x7B; 32]),
            signature: vec![0x20; 65],
        }
    }

    #[test]
    fn payload_roundtrip() {
        let payload = sample_payload();
        let encoded = serialize(&payload);
        let decoded: ProviderRegistrationPayload = deserialize(&encoded).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn base_payload_hash_excludes_signature() {
        let payload = sample_payload();
        let mut resigned = payload.clone();
        resigned.signature = vec![0x99; 65];
        assert_eq!(payload.base_payload_hash(), resigned.base_payload_hash());
        assert_ne!(serialize(&payload), serialize(&resigned));
    }

    #[test]
    fn check_rejects_out_of_range_fields() {
        let mut payload = sample_payload();
        assert!(payload.check().is_ok());

        payload.operator_reward = OPERATOR_REWARD_MAX + 1;
        assert!(payload.check().is_err());

        let mut payload = sample_payload();
        payload.provider_type = 1;
        assert!(payload.check().is_err());

        let mut payload = sample_payload();
        payload.operator_public_key = BLSPublicKey::from_bytes([0xFF; 48]);
        assert!(payload.check().is_err());
    }

    #[test]
    fn fixed_layout_prefix() {
        // version(2) type(2) mode(2) outpoint(36) addr(18) owner(20) op(48)
        // voting(20) reward(2) = 150 bytes before the payout script.
        let payload = sample_payload();
        let encoded = serialize(&payload);
        assert_eq!(&encoded[..2], &[1, 0]);
        assert_eq!(encoded[150], 25); // compact-size of the P2PKH payout script
    }
}
