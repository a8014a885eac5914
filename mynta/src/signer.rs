// Mynta Core Rust Library
// Written for Mynta in 2026 by
//     The Mynta Core Developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Compact ECDSA signing over secp256k1.
//!
//! Owner keys sign special-transaction payloads with 65-byte recoverable
//! compact signatures. Verification recovers the public key and compares
//! its hash160 against the key id on record, so no public key ever travels
//! in the payload.

use std::{error, fmt};

use hashes::{hash160, Hash};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

use crate::hash_types::PubkeyHash;

/// Size of a recoverable compact signature.
pub const COMPACT_SIGNATURE_SIZE: usize = 65;

/// Signing/verification failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignerError {
    /// Key bytes are not a valid secp256k1 secret key.
    InvalidSecretKey,
    /// The signature is not 65 bytes or carries an invalid recovery id.
    InvalidSignature,
    /// The signature does not recover to the expected key.
    RecoveryMismatch,
}

impl fmt::Display for SignerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SignerError::InvalidSecretKey => write!(f, "invalid secret key"),
            SignerError::InvalidSignature => write!(f, "invalid compact signature"),
            SignerError::RecoveryMismatch => write!(f, "signature does not match the key id"),
        }
    }
}

impl error::Error for SignerError {}

/// Signs a 32-byte digest, producing a 65-byte recoverable compact
/// signature (header byte then r ‖ s).
pub fn sign_hash(hash: &[u8; 32], secret_key: &[u8]) -> Result<Vec<u8>, SignerError> {
    let secp = Secp256k1::signing_only();
    let secret_key =
        SecretKey::from_slice(secret_key).map_err(|_| SignerError::InvalidSecretKey)?;
    let message = Message::from_digest(*hash);
    let (recovery_id, compact) =
        secp.sign_ecdsa_recoverable(&message, &secret_key).serialize_compact();

    let mut signature = Vec::with_capacity(COMPACT_SIGNATURE_SIZE);
    // 27 marks a recoverable signature, +4 a compressed public key.
    signature.push(27 + 4 + recovery_id.to_i32() as u8);
    signature.extend_from_slice(&compact);
    Ok(signature)
}

/// Recovers the public key behind a compact signature over `hash`.
pub fn recover_pubkey(hash: &[u8; 32], signature: &[u8]) -> Result<PublicKey, SignerError> {
    if signature.len() != COMPACT_SIGNATURE_SIZE {
        return Err(SignerError::InvalidSignature);
    }
    let header = signature[0];
    if !(27..27 + 8).contains(&header) {
        return Err(SignerError::InvalidSignature);
    }
    let recovery_id = RecoveryId::from_i32(((header - 27) & 0x03) as i32)
        .map_err(|_| SignerError::InvalidSignature)?;
    let recoverable = RecoverableSignature::from_compact(&signature[1..], recovery_id)
        .map_err(|_| SignerError::InvalidSignature)?;

    let secp = Secp256k1::verification_only();
    let message = Message::from_digest(*hash);
    secp.recover_ecdsa(&message, &recoverable).map_err(|_| SignerError::InvalidSignature)
}

/// Verifies that a compact signature over `hash` was produced by the key
/// hashing to `key_id`.
pub fn verify_hash_signature(
    hash: &[u8; 32],
    signature: &[u8],
    key_id: &PubkeyHash,
) -> Result<(), SignerError> {
    let pubkey = recover_pubkey(hash, signature)?;
    let recovered_id =
        PubkeyHash::from_raw_hash(hash160::Hash::hash(&pubkey.serialize()));
    if recovered_id == *key_id {
        Ok(())
    } else {
        Err(SignerError::RecoveryMismatch)
    }
}

/// The key id (hash160) of a public key.
pub fn pubkey_hash(pubkey: &PublicKey) -> PubkeyHash {
    PubkeyHash::from_raw_hash(hash160::Hash::hash(&pubkey.serialize()))
}

#[cfg(test)]
mod tests {
    use secp256k1::rand::thread_rng;

    use super::*;

    fn keypair() -> (SecretKey, PublicKey) {
        let secp = Secp256k1::new();
        secp.generate_keypair(&mut thread_rng())
    }

    #[test]
    fn sign_and_verify_against_key_id() {
        let (secret_key, public_key) = keypair();
        let digest = [0x21u8; 32];

        let signature = sign_hash(&digest, &secret_key.secret_bytes()).unwrap();
        assert_eq!(signature.len(), COMPACT_SIGNATURE_SIZE);

        let key_id = pubkey_hash(&public_key);
        assert_eq!(verify_hash_signature(&digest, &signature, &key_id), Ok(()));
    }

    #[test]
    fn wrong_key_id_is_rejected() {
        let (secret_key, _) = keypair();
        let (_, other_public) = keypair();
        let digest = [0x22u8; 32];

        let signature = sign_hash(&digest, &secret_key.secret_bytes()).unwrap();
        assert_eq!(
            verify_hash_signature(&digest, &signature, &pubkey_hash(&other_public)),
            Err(SignerError::RecoveryMismatch)
        );
    }

    #[test]
    fn tampered_digest_fails() {
        let (secret_key, public_key) = keypair();
        let digest = [0x23u8; 32];
        let signature = sign_hash(&digest, &secret_key.secret_bytes()).unwrap();

        let mut other_digest = digest;
        other_digest[0] ^= 1;
        // Recovery yields some key, but not ours.
        assert!(verify_hash_signature(&other_digest, &signature, &pubkey_hash(&public_key))
            .is_err());
    }

    #[test]
    fn malformed_signatures_are_rejected() {
        let digest = [0x24u8; 32];
        assert_eq!(recover_pubkey(&digest, &[0u8; 64]), Err(SignerError::InvalidSignature));
        let mut signature = vec![0u8; 65];
        signature[0] = 0x00; // bad header
        assert_eq!(recover_pubkey(&digest, &signature), Err(SignerError::InvalidSignature));
    }
}
