//! Error types for Seal encryption and decryption.

use thiserror::Error;

/// Errors that can occur while encrypting, parsing or decrypting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SealError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid secret sharing parameters: threshold {threshold}, shares {shares}")]
    InvalidParameters { threshold: u8, shares: u8 },

    #[error("Malformed encrypted object: {0}")]
    MalformedObject(String),

    #[error("Unsupported encrypted object version {0}")]
    UnsupportedVersion(u8),

    #[error("Unsupported {kind} scheme tag {tag}")]
    UnsupportedScheme { kind: &'static str, tag: u32 },

    #[error("Insufficient partial keys: need {required}, got {got}")]
    InsufficientKeys { required: usize, got: usize },

    #[error("Insufficient shares: need {required}, got {got}")]
    InsufficientShares { required: usize, got: usize },

    #[error("Corrupt share: {0}")]
    CorruptShare(String),

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Invalid G1 point encoding")]
    InvalidG1Point,

    #[error("Invalid G2 point encoding")]
    InvalidG2Point,

    #[error("Invalid scalar encoding")]
    InvalidScalar,

    #[error("Key derivation failed")]
    KeyDerivationFailed,

    #[error("Proof of possession verification failed")]
    InvalidProofOfPossession,

    #[error("User secret key does not match identity and public key")]
    InvalidUserSecretKey,
}

pub type SealResult<T> = Result<T, SealError>;
