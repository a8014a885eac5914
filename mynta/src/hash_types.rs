// Mynta Core Rust Library
// Written for Mynta in 2026 by
//     The Mynta Core Developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Mynta hash types.
//!
//! Newtypes over the raw hash engines so a quorum hash can never be confused
//! with a txid at a call site.

use hashes::{hash160, hash_newtype, sha256, sha256d, Hash};

hash_newtype! {
    /// A mynta transaction hash/id.
    pub struct Txid(sha256d::Hash);

    /// A mynta block hash.
    pub struct BlockHash(sha256d::Hash);

    /// The registration transaction hash identifying a masternode.
    pub struct ProTxHash(sha256d::Hash);

    /// The deterministic identifier of a quorum.
    pub struct QuorumHash(sha256d::Hash);

    /// The per-session identifier binding a signing request across members.
    pub struct QuorumSigningRequestId(sha256d::Hash);

    /// The digest that quorum members actually sign.
    pub struct QuorumSignHash(sha256d::Hash);

    /// The hash of all outpoints spent by a special transaction, committed to
    /// inside its payload for replay protection.
    pub struct InputsHash(sha256d::Hash);

    /// The hash of a special transaction payload without its signature field.
    pub struct SpecialTransactionPayloadHash(sha256d::Hash);

    /// Deterministic score used for payee and quorum member ordering.
    pub struct ScoreHash(sha256d::Hash);

    /// The per-block modifier feeding quorum member scores.
    pub struct QuorumModifierHash(sha256d::Hash);

    /// The hash identifying an InstantSend lock message.
    pub struct InstantLockHash(sha256d::Hash);

    /// The identifier of an atomic-swap offer.
    pub struct OfferHash(sha256d::Hash);

    /// SHA-256 of an atomic-swap secret; the hash lock in an HTLC script.
    pub struct HashLock(sha256::Hash);

    /// A hash of a public key, as carried in P2PKH scripts and key ids.
    pub struct PubkeyHash(hash160::Hash);

    /// A hash of a script, as carried in P2SH outputs.
    pub struct ScriptHash(hash160::Hash);
}

macro_rules! impl_hash_newtype_encodable {
    ($($ty:ident),+) => {
        $(
            impl $crate::consensus::Encodable for $ty {
                fn consensus_encode<W: std::io::Write + ?Sized>(
                    &self,
                    writer: &mut W,
                ) -> Result<usize, std::io::Error> {
                    self.to_byte_array().consensus_encode(writer)
                }
            }

            impl $crate::consensus::Decodable for $ty {
                fn consensus_decode<R: std::io::Read + ?Sized>(
                    reader: &mut R,
                ) -> Result<Self, $crate::consensus::encode::Error> {
                    Ok($ty::from_byte_array($crate::consensus::Decodable::consensus_decode(
                        reader,
                    )?))
                }
            }
        )+
    };
}

impl_hash_newtype_encodable!(
    Txid,
    BlockHash,
    ProTxHash,
    QuorumHash,
    QuorumSigningRequestId,
    QuorumSignHash,
    InputsHash,
    SpecialTransactionPayloadHash,
    ScoreHash,
    QuorumModifierHash,
    InstantLockHash,
    OfferHash,
    HashLock,
    PubkeyHash,
    ScriptHash
);

impl Default for BlockHash {
    fn default() -> Self {
        BlockHash::from_byte_array(<sha256d::Hash as Hash>::all_zeros().to_byte_array())
    }
}

#[cfg(test)]
mod tests {
    use hashes::Hash;

    use super::*;
    use crate::consensus::{deserialize, serialize};

    #[test]
    fn hash_newtypes_roundtrip() {
        let txid = Txid::from_byte_array([7u8; 32]);
        let encoded = serialize(&txid);
        assert_eq!(encoded, vec![7u8; 32]);
        let decoded: Txid = deserialize(&encoded).unwrap();
        assert_eq!(decoded, txid);
    }

    #[test]
    fn pubkey_hash_is_twenty_bytes() {
        let key_id = PubkeyHash::from_byte_array([0xAB; 20]);
        assert_eq!(serialize(&key_id).len(), 20);
    }
}
