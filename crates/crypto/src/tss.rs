//! Shamir secret sharing of a 256-bit key over GF(256).
//!
//! In a (t, n) sharing:
//! - every byte of the secret is the constant term of its own random
//!   polynomial of degree t-1
//! - share i holds the evaluations of all 32 polynomials at x = i (1..=n)
//! - any t shares recover the secret by Lagrange interpolation at x = 0
//!
//! A share serializes to 33 bytes: the 32 evaluations followed by the index.

use std::collections::BTreeMap;

use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

use crate::error::{SealError, SealResult};
use crate::gf256::GF256;
use crate::KEY_SIZE;

/// Length of a serialized share (payload followed by the index byte).
pub const SHARE_SIZE: usize = KEY_SIZE + 1;

/// One point of the sharing polynomials.
#[derive(Clone, PartialEq, Eq, Zeroize)]
pub struct Share {
    /// x-coordinate, never 0
    pub index: u8,
    /// Evaluations at `index`, one per secret byte
    pub payload: [u8; KEY_SIZE],
}

impl std::fmt::Debug for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Share").field("index", &self.index).finish_non_exhaustive()
    }
}

impl Share {
    pub fn to_bytes(&self) -> [u8; SHARE_SIZE] {
        let mut bytes = [0u8; SHARE_SIZE];
        bytes[..KEY_SIZE].copy_from_slice(&self.payload);
        bytes[KEY_SIZE] = self.index;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> SealResult<Self> {
        if bytes.len() != SHARE_SIZE {
            return Err(SealError::CorruptShare(format!(
                "expected {SHARE_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let index = bytes[KEY_SIZE];
        if index == 0 {
            return Err(SealError::CorruptShare("share index 0 is reserved".into()));
        }
        let mut payload = [0u8; KEY_SIZE];
        payload.copy_from_slice(&bytes[..KEY_SIZE]);
        Ok(Self { index, payload })
    }
}

/// Split `secret` into `number_of_shares` shares with indices `1..=number_of_shares`,
/// any `threshold` of which reconstruct it.
pub fn split<R: RngCore + CryptoRng>(
    secret: &[u8; KEY_SIZE],
    number_of_shares: u8,
    threshold: u8,
    rng: &mut R,
) -> SealResult<Vec<Share>> {
    if threshold == 0 || threshold > number_of_shares {
        return Err(SealError::InvalidParameters {
            threshold,
            shares: number_of_shares,
        });
    }

    // coefficients[k][j] is the coefficient of x^(k+1) in the polynomial for byte j
    let mut coefficients = vec![[0u8; KEY_SIZE]; threshold as usize - 1];
    for row in coefficients.iter_mut() {
        rng.fill_bytes(row);
    }

    let shares = (1..=number_of_shares)
        .map(|index| {
            let x = GF256(index);
            let mut payload = [0u8; KEY_SIZE];
            for (j, out) in payload.iter_mut().enumerate() {
                // Horner: a_{t-1}, ..., a_1, then the secret byte
                let mut acc = GF256::ZERO;
                for row in coefficients.iter().rev() {
                    acc = acc * x + GF256(row[j]);
                }
                *out = (acc * x + GF256(secret[j])).0;
            }
            Share { index, payload }
        })
        .collect();

    coefficients.zeroize();
    Ok(shares)
}

/// Reconstruct the secret from at least `threshold` shares.
///
/// Shares repeating an index with the same payload count once. A single
/// share is returned as-is, which is the whole secret when `threshold` is 1.
pub fn combine(shares: &[Share], threshold: u8) -> SealResult<[u8; KEY_SIZE]> {
    if threshold == 0 {
        return Err(SealError::InvalidParameters {
            threshold,
            shares: shares.len().min(u8::MAX as usize) as u8,
        });
    }

    let mut points: BTreeMap<u8, &[u8; KEY_SIZE]> = BTreeMap::new();
    for share in shares {
        if share.index == 0 {
            return Err(SealError::CorruptShare("share index 0 is reserved".into()));
        }
        match points.get(&share.index) {
            Some(existing) if **existing != share.payload => {
                return Err(SealError::CorruptShare(format!(
                    "conflicting payloads for index {}",
                    share.index
                )));
            }
            Some(_) => {}
            None => {
                points.insert(share.index, &share.payload);
            }
        }
    }

    if points.len() < threshold as usize {
        return Err(SealError::InsufficientShares {
            required: threshold as usize,
            got: points.len(),
        });
    }

    if points.len() == 1 {
        if let Some(payload) = points.values().next() {
            return Ok(**payload);
        }
    }

    let indices: Vec<u8> = points.keys().copied().collect();
    let mut secret = [0u8; KEY_SIZE];
    for (&index, payload) in &points {
        let lambda = lagrange_coefficient(index, &indices)?;
        for (out, &y) in secret.iter_mut().zip(payload.iter()) {
            *out = (GF256(*out) + lambda * GF256(y)).0;
        }
    }
    Ok(secret)
}

/// Lagrange coefficient at x = 0 for `i` among `indices`.
///
/// λ_i = Π_{j≠i} x_j / (x_j - x_i)
fn lagrange_coefficient(i: u8, indices: &[u8]) -> SealResult<GF256> {
    let x_i = GF256(i);
    let mut numerator = GF256::ONE;
    let mut denominator = GF256::ONE;

    for &j in indices {
        if j == i {
            continue;
        }
        let x_j = GF256(j);
        numerator = numerator * x_j;
        denominator = denominator * (x_j - x_i);
    }

    (numerator / denominator)
        .ok_or_else(|| SealError::CorruptShare("duplicate interpolation point".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn secret() -> [u8; KEY_SIZE] {
        let mut s = [0u8; KEY_SIZE];
        for (i, b) in s.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(37).wrapping_add(5);
        }
        s
    }

    #[test]
    fn test_every_threshold_subset_recovers_secret() {
        let mut rng = StdRng::seed_from_u64(7);
        let shares = split(&secret(), 5, 3, &mut rng).unwrap();
        assert_eq!(shares.len(), 5);
        assert_eq!(
            shares.iter().map(|s| s.index).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );

        for a in 0..5 {
            for b in (a + 1)..5 {
                for c in (b + 1)..5 {
                    let subset = [shares[a].clone(), shares[b].clone(), shares[c].clone()];
                    assert_eq!(combine(&subset, 3).unwrap(), secret());
                }
            }
        }
        assert_eq!(combine(&shares, 3).unwrap(), secret());
    }

    #[test]
    fn test_threshold_one_embeds_secret() {
        let mut rng = StdRng::seed_from_u64(1);
        let shares = split(&secret(), 4, 1, &mut rng).unwrap();
        for share in &shares {
            assert_eq!(share.payload, secret());
            assert_eq!(combine(std::slice::from_ref(share), 1).unwrap(), secret());
        }
    }

    #[test]
    fn test_threshold_equal_to_share_count() {
        let mut rng = StdRng::seed_from_u64(2);
        let shares = split(&secret(), 255, 255, &mut rng).unwrap();
        assert_eq!(shares.last().unwrap().index, 255);
        assert_eq!(combine(&shares, 255).unwrap(), secret());
        assert!(matches!(
            combine(&shares[..254], 255),
            Err(SealError::InsufficientShares { required: 255, got: 254 })
        ));
    }

    #[test]
    fn test_sub_threshold_fails() {
        let mut rng = StdRng::seed_from_u64(3);
        let shares = split(&secret(), 5, 3, &mut rng).unwrap();
        let result = combine(&shares[..2], 3);
        assert_eq!(
            result,
            Err(SealError::InsufficientShares { required: 3, got: 2 })
        );
    }

    #[test]
    fn test_duplicate_shares_count_once() {
        let mut rng = StdRng::seed_from_u64(4);
        let shares = split(&secret(), 5, 3, &mut rng).unwrap();
        let repeated = [shares[0].clone(), shares[0].clone(), shares[1].clone()];
        assert!(matches!(
            combine(&repeated, 3),
            Err(SealError::InsufficientShares { required: 3, got: 2 })
        ));

        let mut conflicting = shares[0].clone();
        conflicting.payload[0] ^= 1;
        let result = combine(&[shares[0].clone(), conflicting, shares[1].clone()], 2);
        assert!(matches!(result, Err(SealError::CorruptShare(_))));
    }

    #[test]
    fn test_invalid_parameters() {
        let mut rng = StdRng::seed_from_u64(5);
        assert!(matches!(
            split(&secret(), 3, 0, &mut rng),
            Err(SealError::InvalidParameters { threshold: 0, shares: 3 })
        ));
        assert!(matches!(
            split(&secret(), 3, 4, &mut rng),
            Err(SealError::InvalidParameters { threshold: 4, shares: 3 })
        ));
        assert!(matches!(
            split(&secret(), 0, 0, &mut rng),
            Err(SealError::InvalidParameters { .. })
        ));
    }

    #[test]
    fn test_share_bytes_carry_trailing_index() {
        let mut rng = StdRng::seed_from_u64(6);
        let shares = split(&secret(), 3, 2, &mut rng).unwrap();
        let bytes = shares[2].to_bytes();
        assert_eq!(bytes.len(), SHARE_SIZE);
        assert_eq!(bytes[KEY_SIZE], 3);
        assert_eq!(Share::from_bytes(&bytes).unwrap(), shares[2]);

        let mut zero_index = bytes;
        zero_index[KEY_SIZE] = 0;
        assert!(matches!(
            Share::from_bytes(&zero_index),
            Err(SealError::CorruptShare(_))
        ));
        assert!(Share::from_bytes(&bytes[..32]).is_err());
    }

    #[test]
    fn test_zero_index_rejected_by_combine() {
        let share = Share {
            index: 0,
            payload: secret(),
        };
        assert!(matches!(
            combine(&[share], 1),
            Err(SealError::CorruptShare(_))
        ));
    }
}
