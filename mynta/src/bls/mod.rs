// Mynta Core Rust Library
// Written for Mynta in 2026 by
//     The Mynta Core Developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! BLS12-381 keys and signatures.
//!
//! Secret keys are scalars, public keys compressed G1 points (48 bytes),
//! signatures compressed G2 points (96 bytes). Messages are hashed to G2
//! with the IETF ciphersuite DST below; verification is a real pairing
//! check, never a byte comparison.
//!
//! Secret material is move-only and erased on drop.

mod lazy;

use std::sync::atomic::{compiler_fence, Ordering};
use std::{error, fmt, io};

use bls12_381::hash_to_curve::{ExpandMsgXmd, HashToCurve};
use bls12_381::{
    multi_miller_loop, G1Affine, G1Projective, G2Affine, G2Prepared, G2Projective, Gt, Scalar,
};
use hashes::{sha256d, Hash};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

pub use lazy::{BLSLazyPublicKey, BLSLazySignature};

use crate::consensus::{Decodable, Encodable};

/// Domain-separation tag for hash-to-G2. Every signature in the protocol
/// uses this ciphersuite.
pub const BLS_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

/// Salt for HKDF-based key generation.
const KEYGEN_SALT: &[u8] = b"BLS-SIG-KEYGEN-SALT-";

/// Size of a serialized secret key.
pub const BLS_SECRET_KEY_SIZE: usize = 32;
/// Size of a compressed G1 public key.
pub const BLS_PUBLIC_KEY_SIZE: usize = 48;
/// Size of a compressed G2 signature.
pub const BLS_SIGNATURE_SIZE: usize = 96;

/// BLS operation failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlsError {
    /// Bytes do not encode a curve point or scalar.
    InvalidEncoding,
    /// The point parsed but is not in the prime-order subgroup.
    SubgroupCheckFailed,
    /// The key material is unusable (zero scalar, identity point, bad IKM).
    InvalidKey,
    /// The operation was asked to work over an empty or mismatched domain.
    DomainMismatch,
}

impl fmt::Display for BlsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BlsError::InvalidEncoding => write!(f, "invalid point or scalar encoding"),
            BlsError::SubgroupCheckFailed => write!(f, "point is not in the prime-order subgroup"),
            BlsError::InvalidKey => write!(f, "unusable key material"),
            BlsError::DomainMismatch => write!(f, "empty or mismatched input domain"),
        }
    }
}

impl error::Error for BlsError {}

fn hash_to_g2(msg: &[u8; 32]) -> G2Projective {
    <G2Projective as HashToCurve<ExpandMsgXmd<sha2_0_9::Sha256>>>::hash_to_curve(&msg[..], BLS_DST)
}

/// A BLS secret key.
///
/// Move-only: there is no `Clone`, and the scalar is overwritten when the
/// value is dropped.
pub struct BLSSecretKey {
    scalar: Scalar,
}

impl BLSSecretKey {
    /// Derives a secret key from input keying material via HKDF-SHA256.
    ///
    /// Fails with [`BlsError::InvalidKey`] when the expanded bytes are not a
    /// canonical non-zero scalar; the caller retries with fresh IKM.
    pub fn keygen(ikm: &[u8]) -> Result<Self, BlsError> {
        let hk = Hkdf::<Sha256>::new(Some(KEYGEN_SALT), ikm);
        let mut okm = Zeroizing::new([0u8; BLS_SECRET_KEY_SIZE]);
        hk.expand(&[], &mut okm[..]).map_err(|_| BlsError::InvalidKey)?;
        Self::from_bytes(&okm)
    }

    /// Parses a secret key from its 32-byte little-endian encoding.
    pub fn from_bytes(bytes: &[u8; BLS_SECRET_KEY_SIZE]) -> Result<Self, BlsError> {
        let scalar =
            Option::<Scalar>::from(Scalar::from_bytes(bytes)).ok_or(BlsError::InvalidKey)?;
        if scalar == Scalar::from(0u64) {
            return Err(BlsError::InvalidKey);
        }
        Ok(BLSSecretKey { scalar })
    }

    /// Serializes the secret key. The buffer erases itself when dropped.
    pub fn to_bytes(&self) -> Zeroizing<[u8; BLS_SECRET_KEY_SIZE]> {
        compiler_fence(Ordering::SeqCst);
        let bytes = Zeroizing::new(self.scalar.to_bytes());
        compiler_fence(Ordering::SeqCst);
        bytes
    }

    /// The corresponding public key, `sk · G1`.
    pub fn public_key(&self) -> BLSPublicKey {
        let point = G1Projective::generator() * self.scalar;
        BLSPublicKey(G1Affine::from(point).to_compressed())
    }

    /// Signs a 32-byte message digest: `sk · hash_to_G2(msg)`.
    pub fn sign(&self, msg: &[u8; 32]) -> BLSSignature {
        let point = hash_to_g2(msg) * self.scalar;
        BLSSignature(G2Affine::from(point).to_compressed())
    }

    /// A proof of possession: a signature over the hash of our own public
    /// key. Registrations verify this to close the rogue-key attack.
    pub fn proof_of_possession(&self) -> BLSSignature {
        let digest = sha256d::Hash::hash(self.public_key().as_bytes());
        self.sign(digest.as_byte_array())
    }
}

impl Drop for BLSSecretKey {
    fn drop(&mut self) {
        self.scalar = Scalar::from(0u64);
        compiler_fence(Ordering::SeqCst);
    }
}

impl fmt::Debug for BLSSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BLSSecretKey(<secret>)")
    }
}

/// A BLS public key: a compressed G1 point.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BLSPublicKey([u8; BLS_PUBLIC_KEY_SIZE]);

impl BLSPublicKey {
    /// Wraps raw bytes without parsing. Validity is checked on use.
    pub fn from_bytes(bytes: [u8; BLS_PUBLIC_KEY_SIZE]) -> Self {
        BLSPublicKey(bytes)
    }

    /// The compressed encoding.
    pub fn as_bytes(&self) -> &[u8; BLS_PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Decodes the point, enforcing the subgroup check and rejecting the
    /// identity.
    pub fn to_g1(&self) -> Result<G1Affine, BlsError> {
        let point = Option::<G1Affine>::from(G1Affine::from_compressed_unchecked(&self.0))
            .ok_or(BlsError::InvalidEncoding)?;
        if !bool::from(point.is_torsion_free()) {
            return Err(BlsError::SubgroupCheckFailed);
        }
        if bool::from(point.is_identity()) {
            return Err(BlsError::InvalidKey);
        }
        Ok(point)
    }

    /// Whether the bytes decode to a usable key.
    pub fn is_valid(&self) -> bool {
        self.to_g1().is_ok()
    }
}

impl From<G1Affine> for BLSPublicKey {
    fn from(point: G1Affine) -> Self {
        BLSPublicKey(point.to_compressed())
    }
}

impl fmt::Display for BLSPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for BLSPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BLSPublicKey({})", self)
    }
}

impl Default for BLSPublicKey {
    fn default() -> Self {
        BLSPublicKey([0u8; BLS_PUBLIC_KEY_SIZE])
    }
}

impl Encodable for BLSPublicKey {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        self.0.consensus_encode(w)
    }
}

impl Decodable for BLSPublicKey {
    fn consensus_decode<R: io::Read + ?Sized>(
        r: &mut R,
    ) -> Result<Self, crate::consensus::encode::Error> {
        Ok(BLSPublicKey(Decodable::consensus_decode(r)?))
    }
}

/// A BLS signature: a compressed G2 point.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BLSSignature([u8; BLS_SIGNATURE_SIZE]);

impl BLSSignature {
    /// Wraps raw bytes without parsing. Validity is checked on use.
    pub fn from_bytes(bytes: [u8; BLS_SIGNATURE_SIZE]) -> Self {
        BLSSignature(bytes)
    }

    /// The compressed encoding.
    pub fn as_bytes(&self) -> &[u8; BLS_SIGNATURE_SIZE] {
        &self.0
    }

    /// Decodes the point, enforcing the subgroup check.
    pub fn to_g2(&self) -> Result<G2Affine, BlsError> {
        let point = Option::<G2Affine>::from(G2Affine::from_compressed_unchecked(&self.0))
            .ok_or(BlsError::InvalidEncoding)?;
        if !bool::from(point.is_torsion_free()) {
            return Err(BlsError::SubgroupCheckFailed);
        }
        Ok(point)
    }

    /// Single-pairing verification of this signature over `msg` by `pk`.
    ///
    /// "Insecure" refers only to the absence of rogue-key protection; the
    /// pairing check itself is complete. Returns `false` when either the key
    /// or the signature fails decoding or the subgroup check.
    pub fn verify_insecure(&self, pk: &BLSPublicKey, msg: &[u8; 32]) -> bool {
        let sig = match self.to_g2() {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        let pk = match pk.to_g1() {
            Ok(pk) => pk,
            Err(_) => return false,
        };
        let hm = G2Prepared::from(G2Affine::from(hash_to_g2(msg)));
        let sig_prepared = G2Prepared::from(sig);
        let neg_g1 = -G1Affine::generator();
        let result = multi_miller_loop(&[(&pk, &hm), (&neg_g1, &sig_prepared)])
            .final_exponentiation();
        result == Gt::identity()
    }

    /// Multi-pairing verification of an aggregate signature over per-key
    /// messages.
    pub fn verify_aggregate(&self, pairs: &[(BLSPublicKey, [u8; 32])]) -> bool {
        if pairs.is_empty() {
            return false;
        }
        let sig = match self.to_g2() {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        let mut terms = Vec::with_capacity(pairs.len() + 1);
        for (pk, msg) in pairs {
            let pk = match pk.to_g1() {
                Ok(pk) => pk,
                Err(_) => return false,
            };
            terms.push((pk, G2Prepared::from(G2Affine::from(hash_to_g2(msg)))));
        }
        terms.push((-G1Affine::generator(), G2Prepared::from(sig)));
        let refs: Vec<(&G1Affine, &G2Prepared)> = terms.iter().map(|(p, h)| (p, h)).collect();
        multi_miller_loop(&refs).final_exponentiation() == Gt::identity()
    }

    /// Verification of an aggregate signature where every signer signed the
    /// same message: equivalent to verifying against the key sum.
    pub fn verify_same_message(&self, keys: &[BLSPublicKey], msg: &[u8; 32]) -> bool {
        let aggregated = match aggregate_public_keys(keys) {
            Ok(key) => key,
            Err(_) => return false,
        };
        self.verify_insecure(&aggregated, msg)
    }
}

impl fmt::Display for BLSSignature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for BLSSignature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BLSSignature({})", self)
    }
}

impl Default for BLSSignature {
    fn default() -> Self {
        BLSSignature([0u8; BLS_SIGNATURE_SIZE])
    }
}

impl Encodable for BLSSignature {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        self.0.consensus_encode(w)
    }
}

impl Decodable for BLSSignature {
    fn consensus_decode<R: io::Read + ?Sized>(
        r: &mut R,
    ) -> Result<Self, crate::consensus::encode::Error> {
        Ok(BLSSignature(Decodable::consensus_decode(r)?))
    }
}

/// Sums public keys in G1. Fails if any input fails decoding or the input is
/// empty.
pub fn aggregate_public_keys(keys: &[BLSPublicKey]) -> Result<BLSPublicKey, BlsError> {
    if keys.is_empty() {
        return Err(BlsError::DomainMismatch);
    }
    let mut acc = G1Projective::identity();
    for key in keys {
        acc += G1Projective::from(key.to_g1()?);
    }
    Ok(BLSPublicKey(G1Affine::from(acc).to_compressed()))
}

/// Sums signatures in G2. Fails if any input fails decoding or the input is
/// empty.
pub fn aggregate_signatures(sigs: &[BLSSignature]) -> Result<BLSSignature, BlsError> {
    if sigs.is_empty() {
        return Err(BlsError::DomainMismatch);
    }
    let mut acc = G2Projective::identity();
    for sig in sigs {
        acc += G2Projective::from(sig.to_g2()?);
    }
    Ok(BLSSignature(G2Affine::from(acc).to_compressed()))
}

/// Verifies a proof of possession for `pk`.
pub fn verify_proof_of_possession(pk: &BLSPublicKey, pop: &BLSSignature) -> bool {
    let digest = sha256d::Hash::hash(pk.as_bytes());
    pop.verify_insecure(pk, digest.as_byte_array())
}
