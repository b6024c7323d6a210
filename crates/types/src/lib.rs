//! Core type definitions shared across the Seal workspace.
//!
//! This crate provides the plain value types used by the encryption core,
//! the key-server layer and the CLI: on-chain object identifiers, compressed
//! BLS12-381 points, and the registered description of a key server.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{hex::Hex, serde_as};
use thiserror::Error;

/// Length of an on-chain object identifier.
pub const OBJECT_ID_LENGTH: usize = 32;

/// Errors produced while parsing the textual form of a value type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(String),

    #[error("Invalid length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
}

// =========================
// OBJECT IDENTIFIERS
// =========================

/// 32-byte identifier of an on-chain object (package or key server).
///
/// Displayed as `0x`-prefixed lowercase hex. Parsing accepts the short form
/// (`0x2`), which is left-padded with zeros.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub [u8; OBJECT_ID_LENGTH]);

impl ObjectId {
    pub const fn new(bytes: [u8; OBJECT_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_LENGTH] {
        &self.0
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypesError> {
        let array: [u8; OBJECT_ID_LENGTH] =
            bytes.try_into().map_err(|_| TypesError::InvalidLength {
                expected: OBJECT_ID_LENGTH,
                got: bytes.len(),
            })?;
        Ok(Self(array))
    }
}

impl From<[u8; OBJECT_ID_LENGTH]> for ObjectId {
    fn from(bytes: [u8; OBJECT_ID_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for ObjectId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self)
    }
}

impl FromStr for ObjectId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.is_empty() || digits.len() > OBJECT_ID_LENGTH * 2 {
            return Err(TypesError::InvalidLength {
                expected: OBJECT_ID_LENGTH,
                got: digits.len().div_ceil(2),
            });
        }

        let padded = format!("{:0>width$}", digits, width = OBJECT_ID_LENGTH * 2);
        let bytes = hex::decode(&padded).map_err(|e| TypesError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =========================
// CRYPTOGRAPHIC PRIMITIVES
// =========================

/// Compressed G1 point on BLS12-381 (48 bytes)
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct G1Point(#[serde_as(as = "Hex")] pub [u8; 48]);

impl Default for G1Point {
    fn default() -> Self {
        Self([0u8; 48])
    }
}

/// Compressed G2 point on BLS12-381 (96 bytes)
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct G2Point(#[serde_as(as = "Hex")] pub [u8; 96]);

impl Default for G2Point {
    fn default() -> Self {
        Self([0u8; 96])
    }
}

impl G1Point {
    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        Ok(Self(decode_fixed(s)?))
    }
}

impl G2Point {
    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        Ok(Self(decode_fixed(s)?))
    }
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], TypesError> {
    let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))
        .map_err(|e| TypesError::InvalidHex(e.to_string()))?;
    let got = bytes.len();
    bytes
        .try_into()
        .map_err(|_| TypesError::InvalidLength { expected: N, got })
}

// =========================
// KEY SERVERS
// =========================

/// A key server as registered on-chain.
///
/// The public key is only trustworthy once its proof of possession has been
/// checked against `object_id` and `url`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyServerInfo {
    pub object_id: ObjectId,
    pub name: String,
    pub url: String,
    pub public_key: G2Point,
}
