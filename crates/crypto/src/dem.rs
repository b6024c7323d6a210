//! AES-256-GCM encryption of the payload under the reconstructed key.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{CryptoRng, RngCore};

use crate::error::{SealError, SealResult};
use crate::KEY_SIZE;

pub const NONCE_SIZE: usize = 12;
pub const MAC_SIZE: usize = 16;

/// Output of [`encrypt`]: nonce, ciphertext body and authentication tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AeadCiphertext {
    pub nonce: [u8; NONCE_SIZE],
    pub blob: Vec<u8>,
    pub mac: [u8; MAC_SIZE],
}

/// Encrypt `plaintext` under `key` with a random nonce.
pub fn encrypt<R: RngCore + CryptoRng>(
    key: &[u8; KEY_SIZE],
    plaintext: &[u8],
    rng: &mut R,
) -> SealResult<AeadCiphertext> {
    let mut nonce = [0u8; NONCE_SIZE];
    rng.fill_bytes(&mut nonce);

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| SealError::EncryptionFailed(format!("Failed to create cipher: {}", e)))?;

    let mut blob = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| SealError::EncryptionFailed(format!("AES-GCM encryption failed: {}", e)))?;

    // Split ciphertext and tag
    let tag_start = blob.len() - MAC_SIZE;
    let mut mac = [0u8; MAC_SIZE];
    mac.copy_from_slice(&blob[tag_start..]);
    blob.truncate(tag_start);

    Ok(AeadCiphertext { nonce, blob, mac })
}

/// Decrypt and authenticate. Any mismatch of key, nonce, body or tag is
/// reported as [`SealError::DecryptionFailed`].
pub fn decrypt(key: &[u8; KEY_SIZE], ciphertext: &AeadCiphertext) -> SealResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| SealError::DecryptionFailed)?;

    // Reconstruct ciphertext with tag for decryption
    let mut ct_with_tag = Vec::with_capacity(ciphertext.blob.len() + MAC_SIZE);
    ct_with_tag.extend_from_slice(&ciphertext.blob);
    ct_with_tag.extend_from_slice(&ciphertext.mac);

    cipher
        .decrypt(Nonce::from_slice(&ciphertext.nonce), ct_with_tag.as_ref())
        .map_err(|_| SealError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_round_trip_and_layout() {
        let key = [3u8; KEY_SIZE];
        let ct = encrypt(&key, b"secret bid: 1000", &mut OsRng).unwrap();
        assert_eq!(ct.blob.len(), 16);
        assert_eq!(decrypt(&key, &ct).unwrap(), b"secret bid: 1000");
    }

    #[test]
    fn test_empty_plaintext() {
        let key = [8u8; KEY_SIZE];
        let ct = encrypt(&key, b"", &mut OsRng).unwrap();
        assert!(ct.blob.is_empty());
        assert_eq!(decrypt(&key, &ct).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_tampering_is_detected() {
        let key = [3u8; KEY_SIZE];
        let ct = encrypt(&key, b"payload", &mut OsRng).unwrap();

        let mut flipped_blob = ct.clone();
        flipped_blob.blob[0] ^= 0x01;
        assert_eq!(decrypt(&key, &flipped_blob), Err(SealError::DecryptionFailed));

        let mut flipped_mac = ct.clone();
        flipped_mac.mac[15] ^= 0x80;
        assert_eq!(decrypt(&key, &flipped_mac), Err(SealError::DecryptionFailed));

        let mut flipped_nonce = ct.clone();
        flipped_nonce.nonce[0] ^= 0x01;
        assert_eq!(decrypt(&key, &flipped_nonce), Err(SealError::DecryptionFailed));

        assert_eq!(decrypt(&[4u8; KEY_SIZE], &ct), Err(SealError::DecryptionFailed));
    }
}
