// Mynta Core Rust Library
// Written for Mynta in 2026 by
//     The Mynta Core Developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Provider Update Service special transaction.
//!
//! Moves a masternode to a new service address and optionally sets the
//! operator payout script. Signed with the current operator BLS key, so only
//! the operator can relocate the node.

use std::io;
use std::net::SocketAddr;

use crate::bls::BLSSignature;
use crate::consensus::{encode, Decodable, Encodable};
use crate::hash_types::{InputsHash, ProTxHash};
use crate::blockdata::script::ScriptBuf;

use super::SpecialTransactionBasePayloadEncodable;

/// The current payload version.
pub const PROVIDER_UPDATE_SERVICE_VERSION: u16 = 1;

/// A Provider Update Service payload (type 2).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderUpdateServicePayload {
    pub version: u16,
    pub pro_tx_hash: ProTxHash,
    pub service_address: SocketAddr,
    /// May be empty; a non-empty script replaces the stored operator payout.
    pub script_operator_payout: ScriptBuf,
    pub inputs_hash: InputsHash,
    /// BLS signature by the current operator key over the base payload hash.
    pub signature: BLSSignature,
}

impl ProviderUpdateServicePayload {
    /// Field-level validation.
    pub fn check(&self) -> Result<(), encode::Error> {
        if self.service_address.port() == 0 {
            return Err(encode::Error::ParseFailed("service address without a port"));
        }
        Ok(())
    }
}

impl SpecialTransactionBasePayloadEncodable for ProviderUpdateServicePayload {
    fn base_payload_data_encode<W: io::Write>(&self, mut s: W) -> Result<usize, io::Error> {
        let mut len = 0;
        len += self.version.consensus_encode(&mut s)?;
        len += self.pro_tx_hash.consensus_encode(&mut s)?;
        len += self.service_address.consensus_encode(&mut s)?;
        len += self.script_operator_payout.consensus_encode(&mut s)?;
        len += self.inputs_hash.consensus_encode(&mut s)?;
        Ok(len)
    }
}

impl Encodable for ProviderUpdateServicePayload {
    fn consensus_encode<W: io::Write + ?Sized>(&self, mut w: &mut W) -> Result<usize, io::Error> {
        let mut len = 0;
        len += self.base_payload_data_encode(&mut w)?;
        len += self.signature.consensus_encode(&mut w)?;
        Ok(len)
    }
}

impl Decodable for ProviderUpdateServicePayload {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, encode::Error> {
        Ok(ProviderUpdateServicePayload {
            version: u16::consensus_decode(r)?,
            pro_tx_hash: ProTxHash::consensus_decode(r)?,
            service_address: SocketAddr::consensus_decode(r)?,
            script_operator_payout: ScriptBuf::consensus_decode(r)?,
            inputs_hash: InputsHash::consensus_decode(r)?,
            signature: BLSSignature::consensus_decode(r)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddrV4};

    use hashes::Hash;

    use super::*;
    use crate::consensus::{deserialize, serialize};

    fn sample_payload() -> ProviderUpdateServicePayload {
        ProviderUpdateServicePayload {
            version: PROVIDER_UPDATE_SERVICE_VERSION,
            pro_tx_hash: ProTxHash::from_byte_array([0xAB; 32]),
            service_address: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 9999)),
            script_operator_payout: ScriptBuf::new(),
            inputs_hash: InputsHash::from_byte_array([0x44; 32]),
            signature: BLSSignature::from_bytes([0x55; 96]),
        }
    }

    #[test]
    fn payload_roundtrip() {
        let payload = sample_payload();
        let decoded: ProviderUpdateServicePayload = deserialize(&serialize(&payload)).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn empty_operator_payout_is_one_byte() {
        // version(2) protx(32) addr(18) -> the empty script is a single 0x00.
        let encoded = serialize(&sample_payload());
        assert_eq!(encoded[52], 0x00);
        assert_eq!(encoded.len(), 2 + 32 + 18 + 1 + 32 + 96);
    }

    #[test]
    fn signature_is_outside_the_signed_portion() {
        let payload = sample_payload();
        let mut resigned = payload.clone();
        resigned.signature = BLSSignature::from_bytes([0x66; 96]);
        assert_eq!(payload.base_payload_hash(), resigned.base_payload_hash());
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut payload = sample_payload();
        payload.service_address = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 0));
        assert!(payload.check().is_err());
    }
}
