//! On-disk formats: local key server key files and key server lists.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use seal_crypto::ibe::{
    compress_g1, compress_g2, master_key_from_bytes, master_key_to_bytes,
    public_key_from_master_key,
};
use seal_crypto::{create_proof_of_possession, MasterKey};
use seal_types::{G1Point, G2Point, KeyServerInfo, ObjectId};

/// A local key server's identity and master key, persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyFile {
    pub object_id: ObjectId,
    pub name: String,
    pub url: String,
    /// Master key, big-endian hex
    master_key: String,
    pub public_key: G2Point,
    pub proof_of_possession: G1Point,
}

impl KeyFile {
    pub fn new(object_id: ObjectId, name: String, url: String, master_key: &MasterKey) -> Self {
        let public_key = compress_g2(&public_key_from_master_key(master_key));
        let pop = create_proof_of_possession(master_key, &object_id, &url);
        Self {
            object_id,
            name,
            url,
            master_key: hex::encode(master_key_to_bytes(master_key)),
            public_key,
            proof_of_possession: compress_g1(&pop),
        }
    }

    pub fn master_key(&self) -> Result<MasterKey> {
        let bytes: [u8; 32] = hex::decode(&self.master_key)?
            .try_into()
            .map_err(|_| anyhow!("Invalid master key length"))?;
        Ok(master_key_from_bytes(&bytes)?)
    }

    pub fn info(&self) -> KeyServerInfo {
        KeyServerInfo {
            object_id: self.object_id,
            name: self.name.clone(),
            url: self.url.clone(),
            public_key: self.public_key,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading key file {}", path.display()))?;
        let key_file: Self = serde_json::from_str(&data)?;

        let derived = compress_g2(&public_key_from_master_key(&key_file.master_key()?));
        if derived != key_file.public_key {
            bail!("Key file {} has a mismatched public key", path.display());
        }
        Ok(key_file)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }
}

/// Read a JSON list of key servers, or an empty list if the file is absent.
pub fn load_servers(path: &Path) -> Result<Vec<KeyServerInfo>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading key servers {}", path.display()))?;
    Ok(serde_json::from_str(&data)?)
}

/// Add `info` to the list at `path`, replacing an entry with the same id.
pub fn register_server(path: &Path, info: KeyServerInfo) -> Result<Vec<KeyServerInfo>> {
    let mut servers = load_servers(path)?;
    match servers.iter_mut().find(|s| s.object_id == info.object_id) {
        Some(existing) => *existing = info,
        None => servers.push(info),
    }
    write_json(path, &servers)?;
    Ok(servers)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(value)?;
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use seal_crypto::generate_key_pair;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("seal-cli-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_key_file_round_trip() {
        let (master_key, _) = generate_key_pair(&mut OsRng);
        let key_file = KeyFile::new(
            ObjectId([3; 32]),
            "local".into(),
            "http://localhost:2024".into(),
            &master_key,
        );
        let path = temp_path("key.json");
        key_file.save(&path).unwrap();

        let loaded = KeyFile::load(&path).unwrap();
        assert_eq!(loaded.master_key().unwrap(), master_key);
        assert_eq!(loaded.info(), key_file.info());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_mismatched_public_key_rejected() {
        let (master_key, _) = generate_key_pair(&mut OsRng);
        let (_, other_public_key) = generate_key_pair(&mut OsRng);
        let mut key_file = KeyFile::new(
            ObjectId([3; 32]),
            "local".into(),
            "http://localhost:2024".into(),
            &master_key,
        );
        key_file.public_key = compress_g2(&other_public_key);
        let path = temp_path("mismatch.json");
        key_file.save(&path).unwrap();

        assert!(KeyFile::load(&path).is_err());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_register_server_replaces_by_id() {
        let path = temp_path("servers.json");
        let _ = std::fs::remove_file(&path);
        let info = |name: &str, byte: u8| KeyServerInfo {
            object_id: ObjectId([byte; 32]),
            name: name.into(),
            url: format!("http://{name}"),
            public_key: G2Point::default(),
        };

        register_server(&path, info("a", 1)).unwrap();
        register_server(&path, info("b", 2)).unwrap();
        let servers = register_server(&path, info("a2", 1)).unwrap();

        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].name, "a2");
        assert_eq!(load_servers(&path).unwrap(), servers);
        std::fs::remove_file(&path).unwrap();
    }
}
