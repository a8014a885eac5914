// Mynta Core Rust Library
// Written for Mynta in 2026 by
//     The Mynta Core Developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Mynta special transactions.
//!
//! A special transaction carries a typed extra payload after its outputs.
//! The four provider types drive the deterministic masternode registry:
//! registration, service update, registrar update and revocation. Every
//! payload commits to the hash of the spending transaction's inputs, so a
//! payload cannot be replayed under a different funding.

pub mod provider_registration;
pub mod provider_update_registrar;
pub mod provider_update_revocation;
pub mod provider_update_service;

use std::io;

use hashes::{sha256d, Hash};

use crate::consensus::{encode, Decodable, Encodable, HashWriter};
use crate::hash_types::SpecialTransactionPayloadHash;
use crate::blockdata::transaction::Transaction;

pub use provider_registration::ProviderRegistrationPayload;
pub use provider_update_registrar::ProviderUpdateRegistrarPayload;
pub use provider_update_revocation::ProviderUpdateRevocationPayload;
pub use provider_update_service::ProviderUpdateServicePayload;

/// The payload of a special transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionPayload {
    /// Registers a new masternode.
    ProviderRegistrationPayloadType(ProviderRegistrationPayload),
    /// Updates a masternode's service address, signed by the operator.
    ProviderUpdateServicePayloadType(ProviderUpdateServicePayload),
    /// Rotates operator/voting keys or the payout script, signed by the owner.
    ProviderUpdateRegistrarPayloadType(ProviderUpdateRegistrarPayload),
    /// Revokes a masternode, signed by the operator.
    ProviderUpdateRevocationPayloadType(ProviderUpdateRevocationPayload),
}

use TransactionPayload::*;

impl TransactionPayload {
    /// The wire type of this payload.
    pub fn get_type(&self) -> TransactionType {
        match self {
            ProviderRegistrationPayloadType(_) => TransactionType::ProviderRegistration,
            ProviderUpdateServicePayloadType(_) => TransactionType::ProviderUpdateService,
            ProviderUpdateRegistrarPayloadType(_) => TransactionType::ProviderUpdateRegistrar,
            ProviderUpdateRevocationPayloadType(_) => TransactionType::ProviderUpdateRevocation,
        }
    }

    /// Downcast helper.
    pub fn to_provider_registration_payload(self) -> Option<ProviderRegistrationPayload> {
        match self {
            ProviderRegistrationPayloadType(payload) => Some(payload),
            _ => None,
        }
    }

    /// Downcast helper.
    pub fn to_update_service_payload(self) -> Option<ProviderUpdateServicePayload> {
        match self {
            ProviderUpdateServicePayloadType(payload) => Some(payload),
            _ => None,
        }
    }

    /// Downcast helper.
    pub fn to_update_registrar_payload(self) -> Option<ProviderUpdateRegistrarPayload> {
        match self {
            ProviderUpdateRegistrarPayloadType(payload) => Some(payload),
            _ => None,
        }
    }

    /// Downcast helper.
    pub fn to_update_revocation_payload(self) -> Option<ProviderUpdateRevocationPayload> {
        match self {
            ProviderUpdateRevocationPayloadType(payload) => Some(payload),
            _ => None,
        }
    }
}

impl Encodable for TransactionPayload {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        match self {
            ProviderRegistrationPayloadType(p) => p.consensus_encode(w),
            ProviderUpdateServicePayloadType(p) => p.consensus_encode(w),
            ProviderUpdateRegistrarPayloadType(p) => p.consensus_encode(w),
            ProviderUpdateRevocationPayloadType(p) => p.consensus_encode(w),
        }
    }
}

/// The 16-bit transaction type carried in the upper half of the version
/// field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum TransactionType {
    /// A plain economic transaction.
    Classic = 0,
    /// Masternode registration.
    ProviderRegistration = 1,
    /// Service address update.
    ProviderUpdateService = 2,
    /// Key/payout update.
    ProviderUpdateRegistrar = 3,
    /// Revocation.
    ProviderUpdateRevocation = 4,
}

impl TransactionType {
    /// The type that matches an optional payload.
    pub fn from_optional_payload(payload: &Option<TransactionPayload>) -> Self {
        match payload {
            None => TransactionType::Classic,
            Some(payload) => payload.get_type(),
        }
    }

    /// Whether transactions of this type carry an extra payload.
    pub fn has_payload(&self) -> bool {
        !matches!(self, TransactionType::Classic)
    }

    /// Decodes the extra payload bytes for this type.
    pub fn decode_payload<R: io::Read + ?Sized>(
        &self,
        r: &mut R,
    ) -> Result<TransactionPayload, encode::Error> {
        match self {
            TransactionType::Classic => {
                Err(encode::Error::ParseFailed("classic transactions have no payload"))
            }
            TransactionType::ProviderRegistration => Ok(ProviderRegistrationPayloadType(
                ProviderRegistrationPayload::consensus_decode(r)?,
            )),
            TransactionType::ProviderUpdateService => Ok(ProviderUpdateServicePayloadType(
                ProviderUpdateServicePayload::consensus_decode(r)?,
            )),
            TransactionType::ProviderUpdateRegistrar => Ok(ProviderUpdateRegistrarPayloadType(
                ProviderUpdateRegistrarPayload::consensus_decode(r)?,
            )),
            TransactionType::ProviderUpdateRevocation => Ok(ProviderUpdateRevocationPayloadType(
                ProviderUpdateRevocationPayload::consensus_decode(r)?,
            )),
        }
    }
}

impl TryFrom<u16> for TransactionType {
    type Error = encode::Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TransactionType::Classic),
            1 => Ok(TransactionType::ProviderRegistration),
            2 => Ok(TransactionType::ProviderUpdateService),
            3 => Ok(TransactionType::ProviderUpdateRegistrar),
            4 => Ok(TransactionType::ProviderUpdateRevocation),
            received => Err(encode::Error::InvalidEnumValue {
                max: 4,
                received: received as u64,
                msg: "TransactionType",
            }),
        }
    }
}

/// Payloads hash their signed portion (everything except the signature) for
/// the registration/update signature.
pub trait SpecialTransactionBasePayloadEncodable {
    /// Encodes the payload without its signature field.
    fn base_payload_data_encode<W: io::Write>(&self, s: W) -> Result<usize, io::Error>;

    /// The hash of the signed portion.
    fn base_payload_hash(&self) -> SpecialTransactionPayloadHash {
        let mut engine = sha256d::Hash::engine();
        self.base_payload_data_encode(HashWriter(&mut engine)).expect("engines don't error");
        SpecialTransactionPayloadHash::from_raw_hash(sha256d::Hash::from_engine(engine))
    }
}

/// Structural validation of a special transaction: version gate, payload
/// presence and the replay-protecting inputs hash.
pub fn check_special_transaction(tx: &Transaction) -> Result<(), encode::Error> {
    let Some(payload) = &tx.special_transaction_payload else {
        return Ok(());
    };
    if tx.version < 3 {
        return Err(encode::Error::ParseFailed("special payload on transaction version < 3"));
    }
    let expected = tx.hash_inputs();
    let matches = match payload {
        ProviderRegistrationPayloadType(p) => p.inputs_hash == expected,
        ProviderUpdateServicePayloadType(p) => p.inputs_hash == expected,
        ProviderUpdateRegistrarPayloadType(p) => p.inputs_hash == expected,
        ProviderUpdateRevocationPayloadType(p) => p.inputs_hash == expected,
    };
    if !matches {
        return Err(encode::Error::ParseFailed("payload inputs hash does not match inputs"));
    }
    match payload {
        ProviderRegistrationPayloadType(p) => p.check(),
        ProviderUpdateServicePayloadType(p) => p.check(),
        ProviderUpdateRegistrarPayloadType(p) => p.check(),
        ProviderUpdateRevocationPayloadType(p) => p.check(),
    }
}
