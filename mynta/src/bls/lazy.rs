// Mynta Core Rust Library
// Written for Mynta in 2026 by
//     The Mynta Core Developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.

//! Lazily decoded BLS wrappers.
//!
//! Curve decompression and the subgroup check cost far more than carrying
//! bytes around. These wrappers hold the wire bytes and decode on first use;
//! the cached result lives behind a single-writer lock so concurrent readers
//! never decode twice.

use std::fmt;
use std::sync::OnceLock;

use bls12_381::{G1Affine, G2Affine};

use super::{BLSPublicKey, BLSSignature};

/// A public key that defers curve parsing until first use.
pub struct BLSLazyPublicKey {
    bytes: BLSPublicKey,
    decoded: OnceLock<Option<G1Affine>>,
}

impl BLSLazyPublicKey {
    /// Wraps serialized key bytes.
    pub fn new(bytes: BLSPublicKey) -> Self {
        BLSLazyPublicKey { bytes, decoded: OnceLock::new() }
    }

    /// The wire bytes.
    pub fn as_bytes(&self) -> &BLSPublicKey {
        &self.bytes
    }

    /// The decoded point, parsing on first call.
    pub fn decoded(&self) -> Option<&G1Affine> {
        self.decoded.get_or_init(|| self.bytes.to_g1().ok()).as_ref()
    }

    /// Whether the bytes decode to a usable key.
    pub fn is_valid(&self) -> bool {
        self.decoded().is_some()
    }
}

impl From<BLSPublicKey> for BLSLazyPublicKey {
    fn from(bytes: BLSPublicKey) -> Self {
        BLSLazyPublicKey::new(bytes)
    }
}

impl Clone for BLSLazyPublicKey {
    fn clone(&self) -> Self {
        // The cache is an optimization; a clone re-derives it on demand.
        BLSLazyPublicKey::new(self.bytes)
    }
}

impl PartialEq for BLSLazyPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for BLSLazyPublicKey {}

impl fmt::Debug for BLSLazyPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BLSLazyPublicKey({})", self.bytes)
    }
}

/// A signature that defers curve parsing until first use.
pub struct BLSLazySignature {
    bytes: BLSSignature,
    decoded: OnceLock<Option<G2Affine>>,
}

impl BLSLazySignature {
    /// Wraps serialized signature bytes.
    pub fn new(bytes: BLSSignature) -> Self {
        BLSLazySignature { bytes, decoded: OnceLock::new() }
    }

    /// The wire bytes.
    pub fn as_bytes(&self) -> &BLSSignature {
        &self.bytes
    }

    /// The decoded point, parsing on first call.
    pub fn decoded(&self) -> Option<&G2Affine> {
        self.decoded.get_or_init(|| self.bytes.to_g2().ok()).as_ref()
    }

    /// Whether the bytes decode to a valid group element.
    pub fn is_valid(&self) -> bool {
        self.decoded().is_some()
    }
}

impl From<BLSSignature> for BLSLazySignature {
    fn from(bytes: BLSSignature) -> Self {
        BLSLazySignature::new(bytes)
    }
}

impl Clone for BLSLazySignature {
    fn clone(&self) -> Self {
        BLSLazySignature::new(self.bytes)
    }
}

impl PartialEq for BLSLazySignature {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for BLSLazySignature {}

impl fmt::Debug for BLSLazySignature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BLSLazySignature({})", self.bytes)
    }
}
