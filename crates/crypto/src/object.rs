//! The `EncryptedObject` and its canonical byte encoding.
//!
//! Layout (version 0), in order:
//!
//! | field              | encoding                                             |
//! |--------------------|------------------------------------------------------|
//! | `version`          | `u8`                                                 |
//! | `package_id`       | 32 bytes                                             |
//! | `inner_id`         | ULEB128 length, bytes                                |
//! | `services`         | ULEB128 count, `(object_id [32], share_index u8)*`   |
//! | `threshold`        | `u8`                                                 |
//! | `encrypted_shares` | ULEB128 tag 0, encapsulation [96], ULEB128 count, `[32]*` |
//! | `ciphertext`       | ULEB128 tag, variant payload                         |
//!
//! Ciphertext tag 0 is AES-256-GCM (`nonce [12]`, length-prefixed blob,
//! `mac [16]`), tag 1 is plain (no payload). Any other tag is kept as an
//! opaque remainder so newer objects still parse.

use std::collections::BTreeSet;

use seal_types::{G2Point, ObjectId};

use crate::dem::{AeadCiphertext, MAC_SIZE, NONCE_SIZE};
use crate::error::{SealError, SealResult};
use crate::wire::{Reader, Writer};
use crate::{create_full_id, KEY_SIZE};

/// The only object version this crate reads and writes.
pub const SEAL_VERSION: u8 = 0;

/// Upper bound on the number of key servers of one object.
pub const MAX_SERVICES: usize = u8::MAX as usize;

const ENCAPSULATION_SIZE: usize = 96;
const SERVICE_SIZE: usize = 32 + 1;

const IBE_BONEH_FRANKLIN_BLS12381: u32 = 0;
const CIPHERTEXT_AES_256_GCM: u32 = 0;
const CIPHERTEXT_PLAIN: u32 = 1;

/// Per-server IBE encryptions of the key shares.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IbeEncryptions {
    BonehFranklinBls12381 {
        /// `r·G2`, shared by every share
        encapsulation: G2Point,
        /// Masked share payloads, aligned with `services`
        shares: Vec<[u8; KEY_SIZE]>,
    },
}

impl IbeEncryptions {
    pub fn len(&self) -> usize {
        match self {
            Self::BonehFranklinBls12381 { shares, .. } => shares.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The payload, encrypted under the shared key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ciphertext {
    Aes256Gcm {
        nonce: [u8; NONCE_SIZE],
        blob: Vec<u8>,
        mac: [u8; MAC_SIZE],
    },
    /// No payload; the reconstructed key is the result.
    Plain,
    /// A ciphertext kind this version cannot decrypt.
    Unknown { tag: u32, bytes: Vec<u8> },
}

impl Ciphertext {
    pub fn tag(&self) -> u32 {
        match self {
            Self::Aes256Gcm { .. } => CIPHERTEXT_AES_256_GCM,
            Self::Plain => CIPHERTEXT_PLAIN,
            Self::Unknown { tag, .. } => *tag,
        }
    }
}

impl From<AeadCiphertext> for Ciphertext {
    fn from(ct: AeadCiphertext) -> Self {
        Self::Aes256Gcm {
            nonce: ct.nonce,
            blob: ct.blob,
            mac: ct.mac,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedObject {
    pub version: u8,
    pub package_id: ObjectId,
    pub inner_id: Vec<u8>,
    /// `(key server object id, share index)`, in encryption order
    pub services: Vec<(ObjectId, u8)>,
    pub threshold: u8,
    pub encrypted_shares: IbeEncryptions,
    pub ciphertext: Ciphertext,
}

impl EncryptedObject {
    /// The identity the shares were encrypted to.
    pub fn full_id(&self) -> Vec<u8> {
        create_full_id(&self.package_id, &self.inner_id)
    }

    /// Share index assigned to `object_id`, if it is one of the services.
    pub fn share_index(&self, object_id: &ObjectId) -> Option<u8> {
        self.services
            .iter()
            .find(|(id, _)| id == object_id)
            .map(|(_, index)| *index)
    }

    /// Check the structural invariants:
    /// `1 <= threshold <= len(services) == len(shares) <= 255`, share
    /// indices non-zero and distinct, and no unknown ciphertext claiming a
    /// known tag.
    pub fn validate(&self) -> SealResult<()> {
        if self.version != SEAL_VERSION {
            return Err(SealError::UnsupportedVersion(self.version));
        }
        let services = self.services.len();
        if services == 0 || services > MAX_SERVICES {
            return Err(malformed(format!("{services} services")));
        }
        if self.encrypted_shares.len() != services {
            return Err(malformed(format!(
                "{} encrypted shares for {services} services",
                self.encrypted_shares.len()
            )));
        }
        if self.threshold == 0 || self.threshold as usize > services {
            return Err(malformed(format!(
                "threshold {} for {services} services",
                self.threshold
            )));
        }

        let mut indices = BTreeSet::new();
        for (_, index) in &self.services {
            if *index == 0 || !indices.insert(*index) {
                return Err(malformed(format!("invalid or repeated share index {index}")));
            }
        }

        if let Ciphertext::Unknown { tag, .. } = &self.ciphertext {
            if *tag == CIPHERTEXT_AES_256_GCM || *tag == CIPHERTEXT_PLAIN {
                return Err(malformed(format!("unknown ciphertext with known tag {tag}")));
            }
        }
        Ok(())
    }

    /// Canonical encoding. Deterministic: equal objects give equal bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.u8(self.version);
        w.fixed(self.package_id.as_bytes());
        w.bytes(&self.inner_id);

        w.len(self.services.len());
        for (object_id, index) in &self.services {
            w.fixed(object_id.as_bytes());
            w.u8(*index);
        }
        w.u8(self.threshold);

        match &self.encrypted_shares {
            IbeEncryptions::BonehFranklinBls12381 {
                encapsulation,
                shares,
            } => {
                w.uleb128(IBE_BONEH_FRANKLIN_BLS12381);
                w.fixed(&encapsulation.0);
                w.len(shares.len());
                for share in shares {
                    w.fixed(share);
                }
            }
        }

        w.uleb128(self.ciphertext.tag());
        match &self.ciphertext {
            Ciphertext::Aes256Gcm { nonce, blob, mac } => {
                w.fixed(nonce);
                w.bytes(blob);
                w.fixed(mac);
            }
            Ciphertext::Plain => {}
            Ciphertext::Unknown { bytes, .. } => w.fixed(bytes),
        }
        w.finish()
    }

    /// Parse and validate an object. The whole input must be consumed.
    pub fn from_bytes(bytes: &[u8]) -> SealResult<Self> {
        let mut r = Reader::new(bytes);

        let version = r.u8("version")?;
        if version != SEAL_VERSION {
            return Err(SealError::UnsupportedVersion(version));
        }
        let package_id = ObjectId(r.fixed("package_id")?);
        let inner_id = r.bytes("inner_id")?;

        let count = r.len(SERVICE_SIZE, "services")?;
        let mut services = Vec::with_capacity(count);
        for _ in 0..count {
            let object_id = ObjectId(r.fixed("service object id")?);
            let index = r.u8("share index")?;
            services.push((object_id, index));
        }
        let threshold = r.u8("threshold")?;

        let encrypted_shares = match r.uleb128("encrypted_shares tag")? {
            IBE_BONEH_FRANKLIN_BLS12381 => {
                let encapsulation = G2Point(r.fixed::<ENCAPSULATION_SIZE>("encapsulation")?);
                let count = r.len(KEY_SIZE, "encrypted shares")?;
                let shares = (0..count)
                    .map(|_| r.fixed::<KEY_SIZE>("encrypted share"))
                    .collect::<SealResult<Vec<_>>>()?;
                IbeEncryptions::BonehFranklinBls12381 {
                    encapsulation,
                    shares,
                }
            }
            tag => return Err(SealError::UnsupportedScheme { kind: "IBE", tag }),
        };

        let ciphertext = match r.uleb128("ciphertext tag")? {
            CIPHERTEXT_AES_256_GCM => Ciphertext::Aes256Gcm {
                nonce: r.fixed("nonce")?,
                blob: r.bytes("blob")?,
                mac: r.fixed("mac")?,
            },
            CIPHERTEXT_PLAIN => Ciphertext::Plain,
            tag => Ciphertext::Unknown {
                tag,
                bytes: r.rest(),
            },
        };
        r.finish()?;

        let object = Self {
            version,
            package_id,
            inner_id,
            services,
            threshold,
            encrypted_shares,
            ciphertext,
        };
        object.validate()?;
        Ok(object)
    }
}

fn malformed(message: String) -> SealError {
    SealError::MalformedObject(message)
}
