//! Error types for the Mynta service layer.

use thiserror::Error;

/// Umbrella error for service-layer operations.
#[derive(Debug, Error)]
pub enum EvoError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("internal invariant broken: {0}")]
    Invariant(String),
}

/// Validation-related errors.
///
/// These map onto the stable RPC error codes via [`ValidationError::code`].
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A block or transaction violates a consensus rule. The peer that sent
    /// it can be DoS-scored.
    #[error("consensus reject: {0}")]
    ConsensusReject(String),

    /// A wire payload is malformed.
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// The new item disagrees with something already accepted at the same
    /// slot. The stored item always wins.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A signature or key failed cryptographic verification.
    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    /// A referenced object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Serialization problem below the message level.
    #[error("encoding: {0}")]
    Encoding(#[from] mynta::consensus::encode::Error),

    /// Storage gave out mid-validation.
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
}

impl ValidationError {
    /// The stable RPC error code for this failure class.
    pub fn code(&self) -> i32 {
        match self {
            ValidationError::ConsensusReject(_) => -26,
            ValidationError::ProtocolMismatch(_) => -22,
            ValidationError::Conflict(_) => -27,
            ValidationError::CryptoFailure(_) => -26,
            ValidationError::NotFound(_) => -5,
            ValidationError::Encoding(_) => -22,
            ValidationError::Storage(_) => -32,
        }
    }
}

/// Storage-related errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A write failed for a hopefully-transient reason; the block transition
    /// is aborted and may be retried.
    #[error("transient write failure: {0}")]
    Transient(String),

    /// Stored bytes failed to decode.
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// A lock guarding the store was poisoned by a panicking writer.
    #[error("lock poisoned")]
    LockPoisoned,
}

/// Type alias for validation results.
pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// Type alias for storage results.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_codes_are_stable() {
        assert_eq!(ValidationError::ConsensusReject(String::new()).code(), -26);
        assert_eq!(ValidationError::Conflict(String::new()).code(), -27);
        assert_eq!(ValidationError::NotFound(String::new()).code(), -5);
        assert_eq!(ValidationError::ProtocolMismatch(String::new()).code(), -22);
    }
}
