// Mynta Core Rust Library
// Written for Mynta in 2026 by
//     The Mynta Core Developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Provider Update Revocation special transaction.
//!
//! Lets an operator pull its masternode out of service. The record stays in
//! the registry for history but becomes ineligible for payment and quorum
//! duty until the owner rotates in a new operator key.

use std::io;

use crate::bls::BLSSignature;
use crate::consensus::{encode, Decodable, Encodable};
use crate::hash_types::{InputsHash, ProTxHash};

use super::SpecialTransactionBasePayloadEncodable;

/// The current payload version.
pub const PROVIDER_UPDATE_REVOCATION_VERSION: u16 = 1;

/// Why a masternode was revoked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum RevocationReason {
    NotSpecified = 0,
    Termination = 1,
    Compromised = 2,
    ChangeOfKeys = 3,
}

impl RevocationReason {
    /// The largest defined reason code.
    pub const MAX: u16 = RevocationReason::ChangeOfKeys as u16;
}

impl TryFrom<u16> for RevocationReason {
    type Error = encode::Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RevocationReason::NotSpecified),
            1 => Ok(RevocationReason::Termination),
            2 => Ok(RevocationReason::Compromised),
            3 => Ok(RevocationReason::ChangeOfKeys),
            received => Err(encode::Error::InvalidEnumValue {
                max: RevocationReason::MAX as u64,
                received: received as u64,
                msg: "RevocationReason",
            }),
        }
    }
}

/// A Provider Update Revocation payload (type 4).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderUpdateRevocationPayload {
    pub version: u16,
    pub pro_tx_hash: ProTxHash,
    /// One of [`RevocationReason`], carried raw on the wire.
    pub reason: u16,
    pub inputs_hash: InputsHash,
    /// BLS signature by the current operator key over the base payload hash.
    pub signature: BLSSignature,
}

impl ProviderUpdateRevocationPayload {
    /// Field-level validation.
    pub fn check(&self) -> Result<(), encode::Error> {
        RevocationReason::try_from(self.reason)?;
        Ok(())
    }
}

impl SpecialTransactionBasePayloadEncodable for ProviderUpdateRevocationPayload {
    fn base_payload_data_encode<W: io::Write>(&self, mut s: W) -> Result<usize, io::Error> {
        let mut len = 0;
        len += self.version.consensus_encode(&mut s)?;
        len += self.pro_tx_hash.consensus_encode(&mut s)?;
        len += self.reason.consensus_encode(&mut s)?;
        len += self.inputs_hash.consensus_encode(&mut s)?;
        Ok(len)
    }
}

impl Encodable for ProviderUpdateRevocationPayload {
    fn consensus_encode<W: io::Write + ?Sized>(&self, mut w: &mut W) -> Result<usize, io::Error> {
        let mut len = 0;
        len += self.base_payload_data_encode(&mut w)?;
        len += self.signature.consensus_encode(&mut w)?;
        Ok(len)
    }
}

impl Decodable for ProviderUpdateRevocationPayload {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, encode::Error> {
        Ok(ProviderUpdateRevocationPayload {
            version: u16::consensus_decode(r)?,
            pro_tx_hash: ProTxHash::consensus_decode(r)?,
            reason: u16::consensus_decode(r)?,
            inputs_hash: InputsHash::consensus_decode(r)?,
            signature: BLSSignature::consensus_decode(r)?,
        })
    }
}
