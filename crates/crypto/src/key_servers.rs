//! Key server sets and the partial keys collected from them.

use std::collections::BTreeMap;

use seal_types::{KeyServerInfo, ObjectId};

use crate::error::{SealError, SealResult};
use crate::ibe::{decompress_g2, PublicKey, UserSecretKey};
use crate::object::MAX_SERVICES;

/// A key server as seen by an encryptor: its on-chain id and public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyServer {
    pub object_id: ObjectId,
    pub public_key: PublicKey,
}

impl TryFrom<&KeyServerInfo> for KeyServer {
    type Error = SealError;

    fn try_from(info: &KeyServerInfo) -> SealResult<Self> {
        Ok(Self {
            object_id: info.object_id,
            public_key: decompress_g2(&info.public_key)?,
        })
    }
}

/// An ordered, non-empty list of distinct key servers.
///
/// The order is the encryption order: the i-th server receives share index
/// `i + 1`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyServerSet {
    servers: Vec<KeyServer>,
}

impl KeyServerSet {
    pub fn new(servers: Vec<KeyServer>) -> SealResult<Self> {
        if servers.is_empty() || servers.len() > MAX_SERVICES {
            return Err(SealError::InvalidInput(format!(
                "expected 1 to {MAX_SERVICES} key servers, got {}",
                servers.len()
            )));
        }
        for (i, server) in servers.iter().enumerate() {
            if servers[..i].iter().any(|s| s.object_id == server.object_id) {
                return Err(SealError::InvalidInput(format!(
                    "key server {} listed twice",
                    server.object_id
                )));
            }
        }
        Ok(Self { servers })
    }

    /// Build a set from resolved server infos, decoding each public key.
    pub fn from_infos(infos: &[KeyServerInfo]) -> SealResult<Self> {
        let servers = infos
            .iter()
            .map(KeyServer::try_from)
            .collect::<SealResult<Vec<_>>>()?;
        Self::new(servers)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KeyServer> {
        self.servers.iter()
    }

    pub fn get(&self, index: usize) -> Option<&KeyServer> {
        self.servers.get(index)
    }

    pub fn get_by_id(&self, object_id: &ObjectId) -> Option<&KeyServer> {
        self.servers.iter().find(|s| &s.object_id == object_id)
    }

    pub fn public_keys(&self) -> Vec<PublicKey> {
        self.servers.iter().map(|s| s.public_key).collect()
    }
}

impl<'a> IntoIterator for &'a KeyServerSet {
    type Item = &'a KeyServer;
    type IntoIter = std::slice::Iter<'a, KeyServer>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Partial keys received so far, by key server object id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecryptionContext {
    keys: BTreeMap<ObjectId, UserSecretKey>,
}

impl DecryptionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a key, returning the one it replaces.
    pub fn insert(&mut self, object_id: ObjectId, key: UserSecretKey) -> Option<UserSecretKey> {
        self.keys.insert(object_id, key)
    }

    pub fn get(&self, object_id: &ObjectId) -> Option<&UserSecretKey> {
        self.keys.get(object_id)
    }

    pub fn contains(&self, object_id: &ObjectId) -> bool {
        self.keys.contains_key(object_id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<(ObjectId, UserSecretKey)> for DecryptionContext {
    fn from_iter<I: IntoIterator<Item = (ObjectId, UserSecretKey)>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ibe::{compress_g2, extract, generate_key_pair};
    use rand::rngs::OsRng;

    fn server(byte: u8) -> KeyServer {
        let (_, public_key) = generate_key_pair(&mut OsRng);
        KeyServer {
            object_id: ObjectId([byte; 32]),
            public_key,
        }
    }

    #[test]
    fn test_set_bounds_and_uniqueness() {
        assert!(matches!(
            KeyServerSet::new(vec![]),
            Err(SealError::InvalidInput(_))
        ));

        let a = server(1);
        let duplicate = KeyServerSet::new(vec![a.clone(), server(2), a.clone()]);
        assert!(matches!(duplicate, Err(SealError::InvalidInput(_))));

        let (_, public_key) = generate_key_pair(&mut OsRng);
        let too_many = (0..256u32)
            .map(|i| {
                let mut id = [0u8; 32];
                id[..4].copy_from_slice(&i.to_le_bytes());
                KeyServer {
                    object_id: ObjectId(id),
                    public_key,
                }
            })
            .collect::<Vec<_>>();
        assert!(KeyServerSet::new(too_many[..255].to_vec()).is_ok());
        assert!(KeyServerSet::new(too_many).is_err());
    }

    #[test]
    fn test_lookup_by_index_and_id() {
        let servers = vec![server(1), server(2), server(3)];
        let set = KeyServerSet::new(servers.clone()).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.get(1), Some(&servers[1]));
        assert_eq!(set.get(3), None);
        assert_eq!(set.get_by_id(&ObjectId([3; 32])), Some(&servers[2]));
        assert_eq!(set.public_keys()[0], servers[0].public_key);
        assert_eq!(
            set.iter().map(|s| s.object_id).collect::<Vec<_>>(),
            vec![ObjectId([1; 32]), ObjectId([2; 32]), ObjectId([3; 32])]
        );
    }

    #[test]
    fn test_from_infos_decodes_public_keys() {
        let s = server(9);
        let info = KeyServerInfo {
            object_id: s.object_id,
            name: "seal-9".into(),
            url: "https://seal-9.example".into(),
            public_key: compress_g2(&s.public_key),
        };
        let set = KeyServerSet::from_infos(std::slice::from_ref(&info)).unwrap();
        assert_eq!(set.get(0), Some(&s));

        let mut broken = info;
        broken.public_key.0 = [0x01; 96];
        assert_eq!(
            KeyServerSet::from_infos(&[broken]),
            Err(SealError::InvalidG2Point)
        );
    }

    #[test]
    fn test_context_insert_and_lookup() {
        let (master_key, _) = generate_key_pair(&mut OsRng);
        let first = extract(&master_key, b"one");
        let second = extract(&master_key, b"two");

        let mut context = DecryptionContext::new();
        assert!(context.is_empty());
        assert_eq!(context.insert(ObjectId([1; 32]), first), None);
        assert_eq!(context.insert(ObjectId([1; 32]), second), Some(first));
        assert!(context.contains(&ObjectId([1; 32])));
        assert_eq!(context.get(&ObjectId([1; 32])), Some(&second));
        assert_eq!(context.len(), 1);
    }
}
