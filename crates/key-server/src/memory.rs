//! In-memory key server directory and key servers for local use and testing

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rand::{CryptoRng, RngCore};
use seal_crypto::ibe::{compress_g1, compress_g2, public_key_from_master_key};
use seal_crypto::{create_proof_of_possession, extract, generate_key_pair, MasterKey};
use seal_types::{G1Point, KeyServerInfo, ObjectId};
use tracing::debug;

use crate::{async_trait, KeyRequest, KeyServerClient, KeyServerDirectory, KeyServerError, Result};

/// Directory backed by a map from object id to server info.
#[derive(Debug, Default, Clone)]
pub struct MemoryDirectory {
    servers: HashMap<ObjectId, KeyServerInfo>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a key server.
    pub fn insert(&mut self, info: KeyServerInfo) -> Option<KeyServerInfo> {
        self.servers.insert(info.object_id, info)
    }

    pub fn get(&self, object_id: &ObjectId) -> Option<&KeyServerInfo> {
        self.servers.get(object_id)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

impl FromIterator<KeyServerInfo> for MemoryDirectory {
    fn from_iter<I: IntoIterator<Item = KeyServerInfo>>(iter: I) -> Self {
        let mut directory = Self::new();
        for info in iter {
            directory.insert(info);
        }
        directory
    }
}

#[async_trait]
impl KeyServerDirectory for MemoryDirectory {
    async fn resolve_key_server(&self, object_id: &ObjectId) -> Result<KeyServerInfo> {
        self.servers
            .get(object_id)
            .cloned()
            .ok_or(KeyServerError::NotFound(*object_id))
    }
}

/// How a local key server answers requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerBehavior {
    #[default]
    Honest,
    /// Every request fails at the transport
    Offline,
    /// Answers with keys and proofs that do not verify
    Corrupt,
    /// Answers honestly after a delay
    Slow(Duration),
}

struct LocalServer {
    object_id: ObjectId,
    master_key: MasterKey,
    behavior: ServerBehavior,
}

/// Key servers held in process, addressed by URL.
///
/// Every request is granted: access policy is out of scope here.
#[derive(Default)]
pub struct LocalKeyServer {
    servers: HashMap<String, LocalServer>,
    served: AtomicUsize,
}

impl LocalKeyServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `master_key` at `url`, returning the info to register for it.
    pub fn add(
        &mut self,
        object_id: ObjectId,
        name: &str,
        url: &str,
        master_key: MasterKey,
    ) -> KeyServerInfo {
        let public_key = public_key_from_master_key(&master_key);
        self.servers.insert(
            url.to_string(),
            LocalServer {
                object_id,
                master_key,
                behavior: ServerBehavior::Honest,
            },
        );
        KeyServerInfo {
            object_id,
            name: name.to_string(),
            url: url.to_string(),
            public_key: compress_g2(&public_key),
        }
    }

    /// Serve a freshly generated master key at `url`.
    pub fn generate<R: RngCore + CryptoRng>(
        &mut self,
        object_id: ObjectId,
        name: &str,
        url: &str,
        rng: &mut R,
    ) -> KeyServerInfo {
        let (master_key, _) = generate_key_pair(rng);
        self.add(object_id, name, url, master_key)
    }

    pub fn set_behavior(&mut self, url: &str, behavior: ServerBehavior) {
        if let Some(server) = self.servers.get_mut(url) {
            server.behavior = behavior;
        }
    }

    pub fn master_key(&self, url: &str) -> Option<&MasterKey> {
        self.servers.get(url).map(|server| &server.master_key)
    }

    /// Number of partial keys handed out so far.
    pub fn requests_served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }

    fn server(&self, url: &str) -> Result<&LocalServer> {
        let server = self
            .servers
            .get(url)
            .ok_or_else(|| KeyServerError::Transport(format!("no key server at {url}")))?;
        if server.behavior == ServerBehavior::Offline {
            return Err(KeyServerError::Transport(format!("{url} is unreachable")));
        }
        Ok(server)
    }
}

#[async_trait]
impl KeyServerClient for LocalKeyServer {
    async fn fetch_proof_of_possession(&self, url: &str) -> Result<G1Point> {
        let server = self.server(url)?;
        let signed_url = match server.behavior {
            ServerBehavior::Corrupt => format!("{url}/forged"),
            _ => url.to_string(),
        };
        let pop = create_proof_of_possession(&server.master_key, &server.object_id, &signed_url);
        Ok(compress_g1(&pop))
    }

    async fn fetch_partial_key(&self, url: &str, request: &KeyRequest) -> Result<G1Point> {
        let server = self.server(url)?;
        if request.identity.is_empty() {
            return Err(KeyServerError::Transport("request carries no identity".into()));
        }

        let key = match server.behavior {
            ServerBehavior::Corrupt => {
                let mut wrong_identity = request.identity.clone();
                wrong_identity.push(0);
                extract(&server.master_key, &wrong_identity)
            }
            ServerBehavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                extract(&server.master_key, &request.identity)
            }
            ServerBehavior::Honest | ServerBehavior::Offline => {
                extract(&server.master_key, &request.identity)
            }
        };

        self.served.fetch_add(1, Ordering::SeqCst);
        debug!(object_id = %server.object_id, url, "Served partial key");
        Ok(compress_g1(&key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use seal_crypto::ibe::{decompress_g1, decompress_g2};
    use seal_crypto::{verify_proof_of_possession, verify_user_secret_key};

    #[tokio::test]
    async fn test_directory_resolves_registered_servers() {
        let mut servers = LocalKeyServer::new();
        let info = servers.generate(ObjectId([1; 32]), "one", "https://one.example", &mut OsRng);
        let directory: MemoryDirectory = std::iter::once(info.clone()).collect();

        assert_eq!(directory.len(), 1);
        assert_eq!(
            directory.resolve_key_server(&ObjectId([1; 32])).await.unwrap(),
            info
        );
        assert!(matches!(
            directory.resolve_key_server(&ObjectId([2; 32])).await,
            Err(KeyServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_honest_server_answers_verify() {
        let mut servers = LocalKeyServer::new();
        let url = "https://one.example";
        let info = servers.generate(ObjectId([1; 32]), "one", url, &mut OsRng);
        let public_key = decompress_g2(&info.public_key).unwrap();

        let pop = servers.fetch_proof_of_possession(url).await.unwrap();
        let pop = decompress_g1(&pop).unwrap();
        assert!(verify_proof_of_possession(&public_key, &info.object_id, url, &pop).is_ok());

        let request = KeyRequest::for_identity(b"full id".to_vec());
        let key = servers.fetch_partial_key(url, &request).await.unwrap();
        let key = decompress_g1(&key).unwrap();
        assert!(verify_user_secret_key(&key, b"full id", &public_key).is_ok());
        assert_eq!(servers.requests_served(), 1);
    }

    #[tokio::test]
    async fn test_offline_and_unknown_urls_fail() {
        let mut servers = LocalKeyServer::new();
        servers.generate(ObjectId([1; 32]), "one", "https://one.example", &mut OsRng);
        servers.set_behavior("https://one.example", ServerBehavior::Offline);
        let request = KeyRequest::for_identity(b"id".to_vec());

        assert!(matches!(
            servers.fetch_partial_key("https://one.example", &request).await,
            Err(KeyServerError::Transport(_))
        ));
        assert!(matches!(
            servers.fetch_proof_of_possession("https://two.example").await,
            Err(KeyServerError::Transport(_))
        ));
        assert_eq!(servers.requests_served(), 0);
    }
}
