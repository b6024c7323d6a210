//! Quorum collection of partial keys.

use std::collections::HashMap;
use std::sync::Arc;

use seal_crypto::ibe::decompress_g1;
use seal_crypto::{verify_user_secret_key, EncryptedObject, KeyServerSet, PublicKey};
use seal_types::{G1Point, KeyServerInfo, ObjectId};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::{
    DecryptionContext, FetchConfig, KeyRequest, KeyServerClient, KeyServerError, Result,
};

/// State of a partial key collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionState {
    /// Fewer than `threshold` keys accepted
    Collecting,
    /// Enough keys to decrypt
    Ready,
}

/// Accepts partial keys for one encrypted object, verifying each against the
/// issuing server's public key.
#[derive(Debug)]
pub struct PartialKeyCollector {
    identity: Vec<u8>,
    threshold: usize,
    /// Services of the object whose public key is known
    public_keys: HashMap<ObjectId, PublicKey>,
    context: DecryptionContext,
    state: CollectionState,
}

impl PartialKeyCollector {
    /// Start collecting for `object`. Services missing from `key_servers`
    /// cannot contribute.
    pub fn new(object: &EncryptedObject, key_servers: &KeyServerSet) -> Result<Self> {
        object.validate()?;
        let public_keys = object
            .services
            .iter()
            .filter_map(|(object_id, _)| {
                key_servers
                    .get_by_id(object_id)
                    .map(|server| (*object_id, server.public_key))
            })
            .collect();

        Ok(Self {
            identity: object.full_id(),
            threshold: object.threshold as usize,
            public_keys,
            context: DecryptionContext::new(),
            state: CollectionState::Collecting,
        })
    }

    /// Submit the partial key returned by `object_id`.
    pub fn submit_key(
        &mut self,
        object_id: ObjectId,
        partial_key: &G1Point,
    ) -> Result<CollectionState> {
        let public_key = self
            .public_keys
            .get(&object_id)
            .ok_or(KeyServerError::UnknownServer(object_id))?;

        if self.context.contains(&object_id) {
            return Err(KeyServerError::DuplicateKey(object_id));
        }

        let key = decompress_g1(partial_key)?;
        if verify_user_secret_key(&key, &self.identity, public_key).is_err() {
            warn!(object_id = %object_id, "Partial key failed verification");
            return Err(KeyServerError::InvalidKey(object_id));
        }

        self.context.insert(object_id, key);
        debug!(
            object_id = %object_id,
            keys_collected = self.context.len(),
            threshold = self.threshold,
            "Accepted partial key"
        );

        if self.state == CollectionState::Collecting && self.context.len() >= self.threshold {
            self.state = CollectionState::Ready;
            info!(keys_collected = self.context.len(), "Threshold met");
        }
        Ok(self.state)
    }

    pub fn state(&self) -> CollectionState {
        self.state
    }

    pub fn collected(&self) -> usize {
        self.context.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Servers that can still contribute a key.
    pub fn pending(&self) -> impl Iterator<Item = &ObjectId> {
        self.public_keys
            .keys()
            .filter(|id| !self.context.contains(id))
    }

    pub fn into_context(self) -> DecryptionContext {
        self.context
    }
}

/// Request partial keys for `object` from its services concurrently, and
/// return once `threshold` verified keys are in.
///
/// Requests still in flight at that point are aborted. Failed, timed out
/// and invalid responses are logged and skipped.
pub async fn fetch_partial_keys<C>(
    client: Arc<C>,
    key_servers: &[KeyServerInfo],
    object: &EncryptedObject,
    request: &KeyRequest,
    config: &FetchConfig,
) -> Result<DecryptionContext>
where
    C: KeyServerClient + ?Sized + 'static,
{
    let set = KeyServerSet::from_infos(key_servers)?;
    let mut collector = PartialKeyCollector::new(object, &set)?;
    let need = collector.threshold();

    let urls: HashMap<ObjectId, String> = key_servers
        .iter()
        .map(|info| (info.object_id, info.url.clone()))
        .collect();
    let targets: Vec<(ObjectId, String)> = collector
        .pending()
        .filter_map(|id| urls.get(id).map(|url| (*id, url.clone())))
        .collect();

    if targets.len() < need {
        warn!(
            reachable = targets.len(),
            threshold = need,
            "Not enough known key servers for this object"
        );
        return Err(KeyServerError::ThresholdNotMet {
            have: 0,
            need,
        });
    }

    info!(
        package_id = %object.package_id,
        servers = targets.len(),
        threshold = need,
        "Fetching partial keys"
    );

    let request = Arc::new(request.clone());
    let permits = Arc::new(Semaphore::new(config.max_concurrent_requests.max(1)));
    let timeout = config.request_timeout;
    let mut tasks = JoinSet::new();

    for (object_id, url) in targets {
        let client = Arc::clone(&client);
        let request = Arc::clone(&request);
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => {
                    let fetched =
                        tokio::time::timeout(timeout, client.fetch_partial_key(&url, &request))
                            .await;
                    match fetched {
                        Ok(result) => result,
                        Err(_) => Err(KeyServerError::Timeout { url, timeout }),
                    }
                }
                Err(e) => Err(KeyServerError::Transport(e.to_string())),
            };
            (object_id, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (object_id, result) = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Partial key task failed");
                continue;
            }
        };

        let partial_key = match result {
            Ok(partial_key) => partial_key,
            Err(e) => {
                warn!(object_id = %object_id, error = %e, "Partial key request failed");
                continue;
            }
        };

        match collector.submit_key(object_id, &partial_key) {
            Ok(CollectionState::Ready) => {
                debug!(cancelled = tasks.len(), "Cancelling outstanding requests");
                tasks.abort_all();
                return Ok(collector.into_context());
            }
            Ok(CollectionState::Collecting) => {}
            Err(e) => warn!(object_id = %object_id, error = %e, "Rejected partial key"),
        }
    }

    Err(KeyServerError::ThresholdNotMet {
        have: collector.collected(),
        need,
    })
}
