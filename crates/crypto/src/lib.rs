//! Threshold encryption to independent key servers.
//!
//! A payload is encrypted under a fresh AES-256 key. The key is split with
//! Shamir's scheme so that any `threshold` of `n` shares rebuild it, and each
//! share is encrypted to one key server with Boneh-Franklin IBE over
//! BLS12-381. Every share is encrypted to the same identity,
//! `[len(DST)] || DST || package_id || inner_id`.
//!
//! # Overview
//!
//! 1. **Setup**: each key server publishes `P_i = s_i·G2` and a proof of
//!    possession binding it to the server's object id and URL.
//!
//! 2. **Encryption**: anyone encrypts with the public keys alone, producing
//!    an [`EncryptedObject`] with one masked share per server.
//!
//! 3. **Key release**: a server that approves the request returns its
//!    partial key `s_i·H(identity)`.
//!
//! 4. **Decryption**: `threshold` partial keys unmask enough shares to
//!    rebuild the AES key, which opens the payload.

pub mod dem;
pub mod error;
pub mod gf256;
pub mod ibe;
pub mod key_servers;
pub mod object;
pub mod seal;
pub mod tss;
mod wire;

/// Length of the symmetric key and of every share payload.
pub const KEY_SIZE: usize = 32;

/// Domain separation tag prefixed to every identity.
pub const DST: &[u8] = b"SUI-SEAL-IBE-BLS12381-00";

pub use error::{SealError, SealResult};
pub use ibe::{
    create_proof_of_possession, extract, generate_key_pair, verify_proof_of_possession,
    verify_user_secret_key, MasterKey, PublicKey, UserSecretKey,
};
pub use key_servers::{DecryptionContext, KeyServer, KeyServerSet};
pub use object::{Ciphertext, EncryptedObject, IbeEncryptions};
pub use seal::{
    create_full_id, decrypt, decrypt_bytes, decrypt_with_context, encrypt, encrypt_to_bytes,
    EncryptionInput,
};
pub use tss::Share;
