//! End-to-end integration tests for Seal.
//!
//! These tests exercise the full lifecycle:
//! 1. Key server setup and proof-of-possession checks
//! 2. Encryption to the verified key server set
//! 3. Quorum fetch of partial keys
//! 4. Threshold decryption

use std::sync::Arc;

use rand::rngs::OsRng;
use seal_crypto::{
    decrypt, decrypt_bytes, decrypt_with_context, encrypt, encrypt_to_bytes, extract,
    EncryptedObject, EncryptionInput, SealError,
};
use seal_key_server::{
    fetch_partial_keys, fetch_verified_key_server_info, fetch_verified_key_server_set,
    FetchConfig, KeyRequest, KeyServerError, LocalKeyServer, MemoryDirectory, ServerBehavior,
};
use seal_types::{KeyServerInfo, ObjectId};

const PACKAGE_ID: ObjectId = ObjectId([0x5e; 32]);

struct Network {
    servers: LocalKeyServer,
    directory: MemoryDirectory,
    ids: Vec<ObjectId>,
}

fn url(i: u8) -> String {
    format!("https://seal-{i}.example")
}

fn spawn_network(n: u8) -> Network {
    let mut servers = LocalKeyServer::new();
    let mut directory = MemoryDirectory::new();
    let mut ids = Vec::new();
    for i in 1..=n {
        let info = servers.generate(ObjectId([i; 32]), &format!("server-{i}"), &url(i), &mut OsRng);
        ids.push(info.object_id);
        directory.insert(info);
    }
    Network {
        servers,
        directory,
        ids,
    }
}

async fn verified_infos(network: &Network) -> Vec<KeyServerInfo> {
    fetch_verified_key_server_info(&network.directory, &network.servers, &network.ids)
        .await
        .unwrap()
}

/// Test the complete flow with some key servers misbehaving.
#[tokio::test]
async fn test_full_seal_flow() {
    let mut network = spawn_network(5);

    // ========================================
    // Phase 1: Resolve and verify key servers
    // ========================================

    let infos = verified_infos(&network).await;
    let key_servers = fetch_verified_key_server_set(&network.directory, &network.servers, &network.ids)
        .await
        .unwrap();
    assert_eq!(key_servers.len(), 5);

    // ========================================
    // Phase 2: Encrypt
    // ========================================

    let (bytes, _) = encrypt_to_bytes(
        PACKAGE_ID,
        b"sealed bid 7".to_vec(),
        &key_servers,
        3,
        EncryptionInput::Aes256Gcm {
            data: b"bid: 1000 SUI".to_vec(),
        },
        &mut OsRng,
    )
    .unwrap();
    let object = EncryptedObject::from_bytes(&bytes).unwrap();
    assert_eq!(object.services.len(), 5);

    // ========================================
    // Phase 3: Fetch partial keys
    // ========================================

    network.servers.set_behavior(&url(1), ServerBehavior::Offline);
    network.servers.set_behavior(&url(4), ServerBehavior::Corrupt);

    let context = fetch_partial_keys(
        Arc::new(network.servers),
        &infos,
        &object,
        &KeyRequest::for_identity(object.full_id()),
        &FetchConfig::default(),
    )
    .await
    .unwrap();
    assert_eq!(context.len(), 3);

    // ========================================
    // Phase 4: Decrypt
    // ========================================

    assert_eq!(decrypt_bytes(&bytes, &context).unwrap(), b"bid: 1000 SUI");
}

/// n = 5, t = 3: servers {1, 3, 5} decrypt, {1, 3} do not, and a key
/// answered for the wrong server breaks decryption.
#[tokio::test]
async fn test_hello_seal_over_key_servers() {
    let network = spawn_network(5);
    let infos = verified_infos(&network).await;
    let key_servers = fetch_verified_key_server_set(&network.directory, &network.servers, &network.ids)
        .await
        .unwrap();
    let (object, _) = encrypt(
        PACKAGE_ID,
        b"hello".to_vec(),
        &key_servers,
        3,
        EncryptionInput::Aes256Gcm {
            data: b"hello seal".to_vec(),
        },
        &mut OsRng,
    )
    .unwrap();

    let mut network = network;
    for i in [2, 4] {
        network.servers.set_behavior(&url(i), ServerBehavior::Offline);
    }
    let servers = Arc::new(network.servers);
    let request = KeyRequest::for_identity(object.full_id());

    let context = fetch_partial_keys(
        Arc::clone(&servers),
        &infos,
        &object,
        &request,
        &FetchConfig::default(),
    )
    .await
    .unwrap();
    assert!(context.contains(&ObjectId([1; 32])));
    assert!(context.contains(&ObjectId([3; 32])));
    assert!(context.contains(&ObjectId([5; 32])));
    assert_eq!(decrypt_with_context(&object, &context).unwrap(), b"hello seal");

    // Only servers 1 and 3 reachable
    let only_two: Vec<_> = infos
        .iter()
        .filter(|info| info.object_id == ObjectId([1; 32]) || info.object_id == ObjectId([3; 32]))
        .cloned()
        .collect();
    let result = fetch_partial_keys(
        Arc::clone(&servers),
        &only_two,
        &object,
        &request,
        &FetchConfig::default(),
    )
    .await;
    assert!(matches!(
        result,
        Err(KeyServerError::ThresholdNotMet { have: 0, need: 3 })
    ));

    // Server 3's slot filled with server 2's key
    let full_id = object.full_id();
    let mut swapped = context.clone();
    let server_2_key = extract(servers.master_key(&url(2)).unwrap(), &full_id);
    swapped.insert(ObjectId([3; 32]), server_2_key);
    assert_eq!(
        decrypt_with_context(&object, &swapped),
        Err(SealError::DecryptionFailed)
    );
}

/// Keys released for one object do not open another.
#[tokio::test]
async fn test_keys_are_bound_to_identity() {
    let network = spawn_network(3);
    let infos = verified_infos(&network).await;
    let key_servers = seal_crypto::KeyServerSet::from_infos(&infos).unwrap();

    let encrypt_for = |inner_id: &[u8]| {
        encrypt(
            PACKAGE_ID,
            inner_id.to_vec(),
            &key_servers,
            2,
            EncryptionInput::Aes256Gcm {
                data: inner_id.to_vec(),
            },
            &mut OsRng,
        )
        .unwrap()
        .0
    };
    let first = encrypt_for(b"first");
    let second = encrypt_for(b"second");

    let servers = Arc::new(network.servers);
    let context = fetch_partial_keys(
        servers,
        &infos,
        &first,
        &KeyRequest::for_identity(first.full_id()),
        &FetchConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(decrypt_with_context(&first, &context).unwrap(), b"first");
    assert_eq!(
        decrypt_with_context(&second, &context),
        Err(SealError::DecryptionFailed)
    );
}

/// Plain mode protects the key itself; strict decryption needs every key.
#[test]
fn test_plain_mode_and_strict_decrypt() {
    let mut servers = LocalKeyServer::new();
    let infos: Vec<_> = (1..=4u8)
        .map(|i| servers.generate(ObjectId([i; 32]), &format!("server-{i}"), &url(i), &mut OsRng))
        .collect();
    let key_servers = seal_crypto::KeyServerSet::from_infos(&infos).unwrap();

    let (object, key) = encrypt(
        PACKAGE_ID,
        b"plain".to_vec(),
        &key_servers,
        4,
        EncryptionInput::Plain,
        &mut OsRng,
    )
    .unwrap();

    let full_id = object.full_id();
    let keys: Vec<_> = (1..=4u8)
        .map(|i| extract(servers.master_key(&url(i)).unwrap(), &full_id))
        .collect();

    assert_eq!(decrypt(&object, &keys).unwrap(), key.to_vec());
    assert_eq!(
        decrypt(&object, &keys[..3]),
        Err(SealError::InsufficientKeys {
            required: 4,
            got: 3
        })
    );
}
