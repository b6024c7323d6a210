//! Key server coordination
//!
//! Resolves key servers and checks their proofs of possession, then collects
//! partial keys for an encrypted object by:
//! 1. Requesting a partial key from every listed server concurrently
//! 2. Verifying each key against the server's public key and the identity
//! 3. Stopping as soon as `threshold` keys have been accepted
//! 4. Handing the keys over as a [`DecryptionContext`]

use std::time::Duration;

use seal_crypto::SealError;
use seal_types::{G1Point, KeyServerInfo, ObjectId};
use thiserror::Error;

pub use ::async_trait::async_trait;
pub use seal_crypto::DecryptionContext;

pub mod collector;
pub mod directory;
pub mod memory;

pub use collector::{fetch_partial_keys, CollectionState, PartialKeyCollector};
pub use directory::{fetch_verified_key_server_info, fetch_verified_key_server_set};
pub use memory::{LocalKeyServer, MemoryDirectory, ServerBehavior};

/// Errors from resolving key servers and fetching partial keys.
#[derive(Error, Debug)]
pub enum KeyServerError {
    #[error(transparent)]
    Seal(#[from] SealError),

    #[error("Key server {0} not found")]
    NotFound(ObjectId),

    #[error("Invalid proof of possession for key server {0}")]
    InvalidProofOfPossession(ObjectId),

    #[error("Key server {0} is not a service of this object")]
    UnknownServer(ObjectId),

    #[error("Duplicate partial key from key server {0}")]
    DuplicateKey(ObjectId),

    #[error("Invalid partial key from key server {0}")]
    InvalidKey(ObjectId),

    #[error("Threshold not met: have {have}, need {need}")]
    ThresholdNotMet { have: usize, need: usize },

    #[error("Request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, KeyServerError>;

/// Everything a key server needs to decide on and answer a key request.
///
/// The signed request and certificate are opaque here; they are checked by
/// the server. `identity` is the full id the object was encrypted to.
#[derive(Clone, Default)]
pub struct KeyRequest {
    pub identity: Vec<u8>,
    pub signed_request: Vec<u8>,
    pub certificate: Vec<u8>,
    pub ephemeral_secret: Vec<u8>,
}

impl std::fmt::Debug for KeyRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRequest")
            .field("identity", &hex::encode(&self.identity))
            .field("signed_request_len", &self.signed_request.len())
            .field("certificate_len", &self.certificate.len())
            .finish_non_exhaustive()
    }
}

impl KeyRequest {
    pub fn for_identity(identity: Vec<u8>) -> Self {
        Self {
            identity,
            ..Self::default()
        }
    }
}

/// Chain-backed lookup of registered key servers.
#[async_trait]
pub trait KeyServerDirectory: Send + Sync {
    /// Resolve a key server object id to its URL and public key.
    async fn resolve_key_server(&self, object_id: &ObjectId) -> Result<KeyServerInfo>;
}

/// Transport to key servers.
#[async_trait]
pub trait KeyServerClient: Send + Sync {
    /// Fetch the server's proof of possession of its master key.
    async fn fetch_proof_of_possession(&self, url: &str) -> Result<G1Point>;

    /// Ask the server at `url` for its partial key for `request.identity`.
    async fn fetch_partial_key(&self, url: &str, request: &KeyRequest) -> Result<G1Point>;
}

/// Configuration for partial key fetching.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Maximum requests in flight at once
    pub max_concurrent_requests: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_concurrent_requests: 32,
        }
    }
}
