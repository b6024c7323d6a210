//! Boneh-Franklin identity-based encryption over BLS12-381, batched across
//! key servers.
//!
//! Each key server holds a master key `s_i` and publishes `P_i = s_i·G2`.
//! Anyone can encrypt to an identity `id` using only the public keys; the
//! server hands out `s_i·H(id)` (a point in G1) to authorized callers.
//!
//! # Batched encryption
//!
//! To encrypt 32-byte payloads `m_1..m_n` to `id` under `P_1..P_n`:
//! 1. Compute H = H_1(id) ∈ G1
//! 2. Sample one random scalar r
//! 3. Compute the encapsulation U = r·G2, shared by every payload
//! 4. For each i, mask_i = KDF(e(r·H, P_i)) and c_i = m_i ⊕ mask_i
//!
//! # Decryption
//!
//! Given the user secret key σ_i = s_i·H(id):
//! 1. e(σ_i, U) = e(H, G2)^{s_i·r} = e(r·H, P_i)
//! 2. m_i = c_i ⊕ KDF(e(σ_i, U))
//!
//! Nothing here authenticates the result: a wrong σ_i gives a wrong m_i.

use blstrs::{pairing, Compress, G1Affine, G1Projective, G2Affine, G2Projective, Gt, Scalar};
use ff::Field;
use group::{prime::PrimeCurveAffine, Curve, Group};
use hkdf::Hkdf;
use rand::{CryptoRng, RngCore};
use sha2::Sha256;

use seal_types::{G1Point, G2Point, ObjectId};

use crate::error::{SealError, SealResult};
use crate::tss::Share;
use crate::KEY_SIZE;

/// Hash-to-curve suite tag for H_1 (RFC 9380, SHA-256, SSWU, random oracle).
pub const DST_G1: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_NUL_";

/// Domain separation tag for proofs of possession.
pub const DST_POP: &[u8] = b"SUI-SEAL-IBE-BLS12381-POP-00";

/// Domain separation tag for the mask derivation.
pub const DST_KDF: &[u8] = b"SUI-SEAL-IBE-BLS12381-H2-00";

/// A key server's master secret `s`.
pub type MasterKey = Scalar;

/// A key server's public key `s·G2`.
pub type PublicKey = G2Affine;

/// The key a server extracts for one identity, `s·H(id)`.
pub type UserSecretKey = G1Affine;

/// The per-object ephemeral value `r·G2`.
pub type Encapsulation = G2Affine;

/// Generate a fresh master key and its public key.
pub fn generate_key_pair<R: RngCore + CryptoRng>(rng: &mut R) -> (MasterKey, PublicKey) {
    let master_key = random_scalar(rng);
    let public_key = public_key_from_master_key(&master_key);
    (master_key, public_key)
}

pub fn public_key_from_master_key(master_key: &MasterKey) -> PublicKey {
    (G2Projective::generator() * master_key).to_affine()
}

/// Derive the user secret key for `identity`: σ = s·H(id).
pub fn extract(master_key: &MasterKey, identity: &[u8]) -> UserSecretKey {
    (G1Projective::from(hash_to_g1(identity)) * master_key).to_affine()
}

/// Check that `user_secret_key` was extracted for `identity` by the holder of
/// `public_key`: e(σ, G2) == e(H(id), P).
pub fn verify_user_secret_key(
    user_secret_key: &UserSecretKey,
    identity: &[u8],
    public_key: &PublicKey,
) -> SealResult<()> {
    let lhs = pairing(user_secret_key, &G2Affine::generator());
    let rhs = pairing(&hash_to_g1(identity), public_key);
    if lhs == rhs {
        Ok(())
    } else {
        Err(SealError::InvalidUserSecretKey)
    }
}

/// Encrypt one 32-byte payload per public key to `identity`, sharing a single
/// encapsulation. The masked payloads are index-aligned with the inputs.
pub fn encrypt_batched<R: RngCore + CryptoRng>(
    identity: &[u8],
    payloads: &[[u8; KEY_SIZE]],
    public_keys: &[PublicKey],
    rng: &mut R,
) -> SealResult<(Encapsulation, Vec<[u8; KEY_SIZE]>)> {
    if payloads.len() != public_keys.len() {
        return Err(SealError::InvalidInput(format!(
            "{} payloads for {} public keys",
            payloads.len(),
            public_keys.len()
        )));
    }
    if public_keys.iter().any(|pk| bool::from(pk.is_identity())) {
        return Err(SealError::InvalidInput(
            "public key is the point at infinity".into(),
        ));
    }

    let r = random_scalar(rng);
    let encapsulation = (G2Projective::generator() * r).to_affine();

    // e(H(id), P_i)^r = e(r·H(id), P_i)
    let r_id_hash = (G1Projective::from(hash_to_g1(identity)) * r).to_affine();

    let masked = payloads
        .iter()
        .zip(public_keys)
        .map(|(payload, public_key)| {
            let mask = kdf(&pairing(&r_id_hash, public_key))?;
            Ok(xor(payload, &mask))
        })
        .collect::<SealResult<Vec<_>>>()?;

    Ok((encapsulation, masked))
}

/// Unmask one payload with the server-issued key and tag it with its share
/// index for reconstruction.
pub fn decrypt(
    encapsulation: &Encapsulation,
    user_secret_key: &UserSecretKey,
    masked: &[u8; KEY_SIZE],
    index: u8,
) -> SealResult<Share> {
    let mask = kdf(&pairing(user_secret_key, encapsulation))?;
    Ok(Share {
        index,
        payload: xor(masked, &mask),
    })
}

/// Sign `DST_POP || public key || object id || url` with the master key, binding
/// the public key to the registered server.
pub fn create_proof_of_possession(
    master_key: &MasterKey,
    object_id: &ObjectId,
    url: &str,
) -> G1Affine {
    let public_key = public_key_from_master_key(master_key);
    let message = pop_message(&public_key, object_id, url);
    (hash_to_g1_with_dst(&message, DST_POP) * master_key).to_affine()
}

/// Verify a proof of possession: e(pop, G2) == e(H(msg), P).
pub fn verify_proof_of_possession(
    public_key: &PublicKey,
    object_id: &ObjectId,
    url: &str,
    pop: &G1Affine,
) -> SealResult<()> {
    let message = pop_message(public_key, object_id, url);
    let h = hash_to_g1_with_dst(&message, DST_POP).to_affine();
    if pairing(pop, &G2Affine::generator()) == pairing(&h, public_key) {
        Ok(())
    } else {
        Err(SealError::InvalidProofOfPossession)
    }
}

fn pop_message(public_key: &PublicKey, object_id: &ObjectId, url: &str) -> Vec<u8> {
    let mut message = Vec::with_capacity(DST_POP.len() + 96 + 32 + url.len());
    message.extend_from_slice(DST_POP);
    message.extend_from_slice(&public_key.to_compressed());
    message.extend_from_slice(object_id.as_bytes());
    message.extend_from_slice(url.as_bytes());
    message
}

/// Hash arbitrary data to a G1 point using hash-to-curve (RFC 9380).
pub fn hash_to_g1(data: &[u8]) -> G1Affine {
    hash_to_g1_with_dst(data, DST_G1).to_affine()
}

fn hash_to_g1_with_dst(data: &[u8], dst: &[u8]) -> G1Projective {
    G1Projective::hash_to_curve(data, dst, &[])
}

/// Derive a 32-byte mask from a GT element.
fn kdf(gt: &Gt) -> SealResult<[u8; KEY_SIZE]> {
    let hk = Hkdf::<Sha256>::new(None, &gt_to_bytes(gt)?);
    let mut key = [0u8; KEY_SIZE];
    hk.expand(DST_KDF, &mut key)
        .map_err(|_| SealError::KeyDerivationFailed)?;
    Ok(key)
}

/// Canonical compressed encoding of a GT element (288 bytes).
fn gt_to_bytes(gt: &Gt) -> SealResult<Vec<u8>> {
    let mut bytes = Vec::with_capacity(288);
    gt.write_compressed(&mut bytes)
        .map_err(|_| SealError::KeyDerivationFailed)?;
    Ok(bytes)
}

fn xor(a: &[u8; KEY_SIZE], b: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    let mut out = [0u8; KEY_SIZE];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b)) {
        *o = x ^ y;
    }
    out
}

/// Generate a random scalar.
pub fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Scalar {
    Scalar::random(&mut *rng)
}

/// Big-endian encoding of a master key.
pub fn master_key_to_bytes(master_key: &MasterKey) -> [u8; 32] {
    master_key.to_bytes_be()
}

pub fn master_key_from_bytes(bytes: &[u8; 32]) -> SealResult<MasterKey> {
    Option::from(Scalar::from_bytes_be(bytes)).ok_or(SealError::InvalidScalar)
}

/// Compress a G1 point to bytes.
pub fn compress_g1(point: &G1Affine) -> G1Point {
    G1Point(point.to_compressed())
}

/// Decompress a G1 point from bytes.
pub fn decompress_g1(point: &G1Point) -> SealResult<G1Affine> {
    Option::from(G1Affine::from_compressed(&point.0)).ok_or(SealError::InvalidG1Point)
}

/// Compress a G2 point to bytes.
pub fn compress_g2(point: &G2Affine) -> G2Point {
    G2Point(point.to_compressed())
}

/// Decompress a G2 point from bytes.
pub fn decompress_g2(point: &G2Point) -> SealResult<G2Affine> {
    Option::from(G2Affine::from_compressed(&point.0)).ok_or(SealError::InvalidG2Point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_hash_to_g1() {
        let point1 = hash_to_g1(b"test identity 1");
        let point2 = hash_to_g1(b"test identity 2");
        let point3 = hash_to_g1(b"test identity 1");

        assert_ne!(point1, point2);
        assert_eq!(point1, point3);
        assert!(!bool::from(point1.is_identity()));
    }

    #[test]
    fn test_batched_round_trip() {
        let mut rng = OsRng;
        let keys: Vec<_> = (0..3).map(|_| generate_key_pair(&mut rng)).collect();
        let public_keys: Vec<_> = keys.iter().map(|(_, pk)| *pk).collect();
        let identity = b"package||inner-id";
        let payloads = [[1u8; KEY_SIZE], [2u8; KEY_SIZE], [3u8; KEY_SIZE]];

        let (encapsulation, masked) =
            encrypt_batched(identity, &payloads, &public_keys, &mut rng).unwrap();
        assert_eq!(masked.len(), 3);
        assert_ne!(masked[0], payloads[0]);

        for (i, (master_key, _)) in keys.iter().enumerate() {
            let usk = extract(master_key, identity);
            let share = decrypt(&encapsulation, &usk, &masked[i], i as u8 + 1).unwrap();
            assert_eq!(share.index, i as u8 + 1);
            assert_eq!(share.payload, payloads[i]);
        }
    }

    #[test]
    fn test_wrong_key_yields_wrong_payload() {
        let mut rng = OsRng;
        let (master_key, public_key) = generate_key_pair(&mut rng);
        let payload = [9u8; KEY_SIZE];

        let (encapsulation, masked) =
            encrypt_batched(b"identity-a", &[payload], &[public_key], &mut rng).unwrap();

        // Key for a different identity unmasks to garbage without an error
        let wrong_usk = extract(&master_key, b"identity-b");
        let share = decrypt(&encapsulation, &wrong_usk, &masked[0], 1).unwrap();
        assert_ne!(share.payload, payload);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut rng = OsRng;
        let (_, public_key) = generate_key_pair(&mut rng);
        let result = encrypt_batched(b"id", &[[0u8; KEY_SIZE]; 2], &[public_key], &mut rng);
        assert!(matches!(result, Err(SealError::InvalidInput(_))));

        let identity_key = G2Affine::identity();
        let result = encrypt_batched(b"id", &[[0u8; KEY_SIZE]], &[identity_key], &mut rng);
        assert!(matches!(result, Err(SealError::InvalidInput(_))));
    }

    #[test]
    fn test_verify_user_secret_key() {
        let mut rng = OsRng;
        let (master_key, public_key) = generate_key_pair(&mut rng);
        let (other_key, _) = generate_key_pair(&mut rng);

        let usk = extract(&master_key, b"id");
        assert!(verify_user_secret_key(&usk, b"id", &public_key).is_ok());
        assert_eq!(
            verify_user_secret_key(&usk, b"other id", &public_key),
            Err(SealError::InvalidUserSecretKey)
        );
        let foreign = extract(&other_key, b"id");
        assert!(verify_user_secret_key(&foreign, b"id", &public_key).is_err());
    }

    #[test]
    fn test_proof_of_possession() {
        let mut rng = OsRng;
        let (master_key, public_key) = generate_key_pair(&mut rng);
        let object_id = ObjectId([4u8; 32]);
        let url = "https://seal-1.example";

        let pop = create_proof_of_possession(&master_key, &object_id, url);
        assert!(verify_proof_of_possession(&public_key, &object_id, url, &pop).is_ok());

        // Bound to the object id, the url and the key
        assert!(verify_proof_of_possession(&public_key, &ObjectId([5u8; 32]), url, &pop).is_err());
        assert!(
            verify_proof_of_possession(&public_key, &object_id, "https://evil.example", &pop)
                .is_err()
        );
        let (_, other_public_key) = generate_key_pair(&mut rng);
        assert_eq!(
            verify_proof_of_possession(&other_public_key, &object_id, url, &pop),
            Err(SealError::InvalidProofOfPossession)
        );
    }

    #[test]
    fn test_point_and_scalar_encodings() {
        let mut rng = OsRng;
        let (master_key, public_key) = generate_key_pair(&mut rng);

        let bytes = master_key_to_bytes(&master_key);
        assert_eq!(master_key_from_bytes(&bytes).unwrap(), master_key);
        assert_eq!(
            master_key_from_bytes(&[0xffu8; 32]),
            Err(SealError::InvalidScalar)
        );

        let compressed = compress_g2(&public_key);
        assert_eq!(decompress_g2(&compressed).unwrap(), public_key);
        assert_eq!(
            decompress_g2(&G2Point([0x01u8; 96])),
            Err(SealError::InvalidG2Point)
        );

        let usk = extract(&master_key, b"id");
        assert_eq!(decompress_g1(&compress_g1(&usk)).unwrap(), usk);
        assert_eq!(
            decompress_g1(&G1Point([0x01u8; 48])),
            Err(SealError::InvalidG1Point)
        );
    }
}
