//! Resolution of key servers with proof-of-possession checks.

use seal_crypto::ibe::{decompress_g1, decompress_g2};
use seal_crypto::{verify_proof_of_possession, KeyServerSet};
use seal_types::{KeyServerInfo, ObjectId};
use tracing::{debug, warn};

use crate::{KeyServerClient, KeyServerDirectory, KeyServerError, Result};

/// Resolve each object id and keep it only if the server proves possession
/// of the master key behind its registered public key.
///
/// The output follows the order of `object_ids`, which becomes the
/// encryption order when the infos are turned into a [`KeyServerSet`].
pub async fn fetch_verified_key_server_info<D, C>(
    directory: &D,
    client: &C,
    object_ids: &[ObjectId],
) -> Result<Vec<KeyServerInfo>>
where
    D: KeyServerDirectory + ?Sized,
    C: KeyServerClient + ?Sized,
{
    let mut infos = Vec::with_capacity(object_ids.len());
    for object_id in object_ids {
        let info = directory.resolve_key_server(object_id).await?;
        if info.object_id != *object_id {
            warn!(
                requested = %object_id,
                resolved = %info.object_id,
                "Directory returned a different key server"
            );
            return Err(KeyServerError::NotFound(*object_id));
        }

        let pop = client.fetch_proof_of_possession(&info.url).await?;
        let public_key = decompress_g2(&info.public_key)?;
        let verified = decompress_g1(&pop).and_then(|pop| {
            verify_proof_of_possession(&public_key, &info.object_id, &info.url, &pop)
        });
        if verified.is_err() {
            warn!(
                object_id = %info.object_id,
                url = %info.url,
                "Proof of possession rejected"
            );
            return Err(KeyServerError::InvalidProofOfPossession(*object_id));
        }

        debug!(object_id = %info.object_id, name = %info.name, "Verified key server");
        infos.push(info);
    }
    Ok(infos)
}

/// [`fetch_verified_key_server_info`], collected into a [`KeyServerSet`].
pub async fn fetch_verified_key_server_set<D, C>(
    directory: &D,
    client: &C,
    object_ids: &[ObjectId],
) -> Result<KeyServerSet>
where
    D: KeyServerDirectory + ?Sized,
    C: KeyServerClient + ?Sized,
{
    let infos = fetch_verified_key_server_info(directory, client, object_ids).await?;
    Ok(KeyServerSet::from_infos(&infos)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LocalKeyServer, MemoryDirectory, ServerBehavior};
    use rand::rngs::OsRng;

    fn setup(n: u8) -> (MemoryDirectory, LocalKeyServer, Vec<ObjectId>) {
        let mut servers = LocalKeyServer::new();
        let mut directory = MemoryDirectory::new();
        let mut ids = Vec::new();
        for i in 1..=n {
            let info = servers.generate(
                ObjectId([i; 32]),
                &format!("server-{i}"),
                &format!("https://seal-{i}.example"),
                &mut OsRng,
            );
            ids.push(info.object_id);
            directory.insert(info);
        }
        (directory, servers, ids)
    }

    #[tokio::test]
    async fn test_verified_infos_keep_requested_order() {
        let (directory, servers, ids) = setup(3);
        let reversed: Vec<_> = ids.iter().rev().copied().collect();

        let infos = fetch_verified_key_server_info(&directory, &servers, &reversed)
            .await
            .unwrap();
        assert_eq!(
            infos.iter().map(|i| i.object_id).collect::<Vec<_>>(),
            reversed
        );

        let set = fetch_verified_key_server_set(&directory, &servers, &ids)
            .await
            .unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.get(0).unwrap().object_id, ids[0]);
    }

    #[tokio::test]
    async fn test_bad_proof_of_possession_rejected() {
        let (directory, mut servers, ids) = setup(2);
        servers.set_behavior("https://seal-2.example", ServerBehavior::Corrupt);

        let result = fetch_verified_key_server_info(&directory, &servers, &ids).await;
        assert!(matches!(
            result,
            Err(KeyServerError::InvalidProofOfPossession(id)) if id == ids[1]
        ));
    }

    #[tokio::test]
    async fn test_unknown_server_not_found() {
        let (directory, servers, _) = setup(1);
        let result =
            fetch_verified_key_server_info(&directory, &servers, &[ObjectId([0xee; 32])]).await;
        assert!(matches!(result, Err(KeyServerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_public_key_swap_detected() {
        let (mut directory, servers, ids) = setup(2);
        // Server 1 re-registers advertising server 2's public key
        let mut forged = directory.get(&ids[0]).unwrap().clone();
        forged.public_key = directory.get(&ids[1]).unwrap().public_key;
        directory.insert(forged);

        let result = fetch_verified_key_server_info(&directory, &servers, &ids).await;
        assert!(matches!(
            result,
            Err(KeyServerError::InvalidProofOfPossession(id)) if id == ids[0]
        ));
    }
}
