//! Threshold encryption to a set of key servers, and decryption from the
//! partial keys they return.

use rand::{CryptoRng, RngCore};
use tracing::{debug, info};
use zeroize::Zeroize;

use seal_types::ObjectId;

use crate::dem::{self, AeadCiphertext};
use crate::error::{SealError, SealResult};
use crate::ibe::{self, decompress_g2, UserSecretKey};
use crate::key_servers::{DecryptionContext, KeyServerSet};
use crate::object::{Ciphertext, EncryptedObject, IbeEncryptions, SEAL_VERSION};
use crate::tss::{self, Share};
use crate::{DST, KEY_SIZE};

/// The identity shares are encrypted to:
/// `[len(DST)] || DST || package_id || inner_id`.
pub fn create_full_id(package_id: &ObjectId, inner_id: &[u8]) -> Vec<u8> {
    let mut full_id = Vec::with_capacity(1 + DST.len() + 32 + inner_id.len());
    full_id.push(DST.len() as u8);
    full_id.extend_from_slice(DST);
    full_id.extend_from_slice(package_id.as_bytes());
    full_id.extend_from_slice(inner_id);
    full_id
}

/// What to do with the payload once the key is chosen.
#[derive(Clone, PartialEq, Eq)]
pub enum EncryptionInput {
    /// Encrypt `data` with AES-256-GCM under the key.
    Aes256Gcm { data: Vec<u8> },
    /// Carry no payload: the key itself is the secret being protected.
    Plain,
}

impl std::fmt::Debug for EncryptionInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aes256Gcm { data } => f
                .debug_struct("Aes256Gcm")
                .field("len", &data.len())
                .finish(),
            Self::Plain => f.write_str("Plain"),
        }
    }
}

impl EncryptionInput {
    fn encrypt<R: RngCore + CryptoRng>(
        &self,
        key: &[u8; KEY_SIZE],
        rng: &mut R,
    ) -> SealResult<Ciphertext> {
        match self {
            Self::Aes256Gcm { data } => Ok(dem::encrypt(key, data, rng)?.into()),
            Self::Plain => Ok(Ciphertext::Plain),
        }
    }
}

/// Encrypt `input` so that any `threshold` of `key_servers` can release it.
///
/// Returns the object together with the symmetric key, which the caller may
/// keep as a backup. The i-th server of the set gets share index `i + 1`.
pub fn encrypt<R: RngCore + CryptoRng>(
    package_id: ObjectId,
    inner_id: Vec<u8>,
    key_servers: &KeyServerSet,
    threshold: u8,
    input: EncryptionInput,
    rng: &mut R,
) -> SealResult<(EncryptedObject, [u8; KEY_SIZE])> {
    let number_of_shares = u8::try_from(key_servers.len()).map_err(|_| {
        SealError::InvalidInput(format!("{} key servers", key_servers.len()))
    })?;
    if threshold == 0 || threshold > number_of_shares {
        return Err(SealError::InvalidInput(format!(
            "threshold {threshold} for {number_of_shares} key servers"
        )));
    }

    let mut key = [0u8; KEY_SIZE];
    rng.fill_bytes(&mut key);
    let ciphertext = input.encrypt(&key, rng)?;

    let full_id = create_full_id(&package_id, &inner_id);
    let mut shares = tss::split(&key, number_of_shares, threshold, rng)?;
    let mut payloads: Vec<[u8; KEY_SIZE]> = shares.iter().map(|s| s.payload).collect();
    let (encapsulation, masked) =
        ibe::encrypt_batched(&full_id, &payloads, &key_servers.public_keys(), rng)?;
    payloads.zeroize();

    let services = key_servers
        .iter()
        .zip(&shares)
        .map(|(server, share)| (server.object_id, share.index))
        .collect();
    shares.zeroize();

    let object = EncryptedObject {
        version: SEAL_VERSION,
        package_id,
        inner_id,
        services,
        threshold,
        encrypted_shares: IbeEncryptions::BonehFranklinBls12381 {
            encapsulation: ibe::compress_g2(&encapsulation),
            shares: masked,
        },
        ciphertext,
    };

    info!(
        package_id = %object.package_id,
        inner_id = hex::encode(&object.inner_id),
        services = number_of_shares,
        threshold,
        ciphertext = object.ciphertext.tag(),
        "Encrypted object"
    );
    Ok((object, key))
}

/// [`encrypt`], returning the serialized object.
pub fn encrypt_to_bytes<R: RngCore + CryptoRng>(
    package_id: ObjectId,
    inner_id: Vec<u8>,
    key_servers: &KeyServerSet,
    threshold: u8,
    input: EncryptionInput,
    rng: &mut R,
) -> SealResult<(Vec<u8>, [u8; KEY_SIZE])> {
    let (object, key) = encrypt(package_id, inner_id, key_servers, threshold, input, rng)?;
    Ok((object.to_bytes(), key))
}

/// Decrypt with one partial key per service, in `services` order.
pub fn decrypt(object: &EncryptedObject, partial_keys: &[UserSecretKey]) -> SealResult<Vec<u8>> {
    object.validate()?;
    let services = object.services.len();
    if partial_keys.len() != services || partial_keys.len() < object.threshold as usize {
        return Err(SealError::InsufficientKeys {
            required: services,
            got: partial_keys.len(),
        });
    }
    let selected: Vec<(usize, &UserSecretKey)> = partial_keys.iter().enumerate().collect();
    open(object, &selected)
}

/// Decrypt with the partial keys of any subset of the services holding at
/// least `threshold` of them.
pub fn decrypt_with_context(
    object: &EncryptedObject,
    context: &DecryptionContext,
) -> SealResult<Vec<u8>> {
    object.validate()?;
    let threshold = object.threshold as usize;
    let available: Vec<(usize, &UserSecretKey)> = object
        .services
        .iter()
        .enumerate()
        .filter_map(|(i, (object_id, _))| context.get(object_id).map(|key| (i, key)))
        .collect();

    if available.len() < threshold {
        return Err(SealError::InsufficientKeys {
            required: threshold,
            got: available.len(),
        });
    }
    open(object, &available[..threshold])
}

/// Parse `bytes` and decrypt with [`decrypt_with_context`].
pub fn decrypt_bytes(bytes: &[u8], context: &DecryptionContext) -> SealResult<Vec<u8>> {
    let object = EncryptedObject::from_bytes(bytes)?;
    decrypt_with_context(&object, context)
}

/// Recover the key from the selected `(service position, partial key)` pairs
/// and open the ciphertext with it.
fn open(object: &EncryptedObject, selected: &[(usize, &UserSecretKey)]) -> SealResult<Vec<u8>> {
    if let Ciphertext::Unknown { tag, .. } = &object.ciphertext {
        return Err(SealError::UnsupportedScheme {
            kind: "ciphertext",
            tag: *tag,
        });
    }

    let mut key = recover_key(object, selected)?;
    let result = match &object.ciphertext {
        Ciphertext::Aes256Gcm { nonce, blob, mac } => dem::decrypt(
            &key,
            &AeadCiphertext {
                nonce: *nonce,
                blob: blob.clone(),
                mac: *mac,
            },
        ),
        Ciphertext::Plain => Ok(key.to_vec()),
        Ciphertext::Unknown { tag, .. } => Err(SealError::UnsupportedScheme {
            kind: "ciphertext",
            tag: *tag,
        }),
    };
    key.zeroize();

    if result.is_ok() {
        info!(
            package_id = %object.package_id,
            inner_id = hex::encode(&object.inner_id),
            shares_used = selected.len(),
            "Decrypted object"
        );
    }
    result
}

fn recover_key(
    object: &EncryptedObject,
    selected: &[(usize, &UserSecretKey)],
) -> SealResult<[u8; KEY_SIZE]> {
    let IbeEncryptions::BonehFranklinBls12381 {
        encapsulation,
        shares,
    } = &object.encrypted_shares;
    let encapsulation = decompress_g2(encapsulation)?;

    let mut decrypted = selected
        .iter()
        .map(|(position, partial_key)| {
            let index = object.services[*position].1;
            debug!(share_index = index, "Decrypting share");
            ibe::decrypt(&encapsulation, partial_key, &shares[*position], index)
        })
        .collect::<SealResult<Vec<Share>>>()?;

    let key = match decrypted.as_slice() {
        [only] => Ok(only.payload),
        _ => tss::combine(&decrypted, object.threshold),
    };
    decrypted.zeroize();
    key
}
