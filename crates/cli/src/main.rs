//! CLI for Seal threshold encryption.
//!
//! This binary provides commands for:
//! - Generating local key server keys
//! - Extracting partial keys for an identity
//! - Encrypting to a set of key servers
//! - Decrypting with partial keys or local key files
//! - Inspecting encrypted objects

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::info;

use seal_crypto::ibe::{compress_g1, decompress_g1};
use seal_crypto::{
    create_full_id, decrypt, decrypt_with_context, encrypt_to_bytes, extract, generate_key_pair,
    Ciphertext, DecryptionContext, EncryptedObject, EncryptionInput, IbeEncryptions,
    KeyServerSet, UserSecretKey,
};
use seal_key_server::{
    fetch_partial_keys, fetch_verified_key_server_info, FetchConfig, KeyRequest, LocalKeyServer,
    MemoryDirectory,
};
use seal_types::{G1Point, ObjectId};

mod keyfile;

use keyfile::{load_servers, register_server, KeyFile};

#[derive(Parser)]
#[command(name = "seal")]
#[command(about = "Threshold encryption with independent key servers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a master key for a local key server
    Keygen {
        /// Display name of the key server
        #[arg(long)]
        name: String,

        /// URL the key server is reachable at
        #[arg(long)]
        url: String,

        /// Key server object id (random if omitted)
        #[arg(long)]
        object_id: Option<ObjectId>,

        /// Where to write the key file
        #[arg(long)]
        out: PathBuf,

        /// Key server list to register the new server in
        #[arg(long)]
        servers: Option<PathBuf>,
    },

    /// Extract the partial key for an identity from a key file
    Extract {
        #[arg(long)]
        key_file: PathBuf,

        /// Package id (hex)
        #[arg(long)]
        package_id: ObjectId,

        /// Inner id (hex)
        #[arg(long)]
        inner_id: String,
    },

    /// Encrypt to a set of key servers
    Encrypt {
        /// JSON list of key servers, in encryption order
        #[arg(long)]
        servers: PathBuf,

        /// Package id (hex)
        #[arg(long)]
        package_id: ObjectId,

        /// Inner id (hex)
        #[arg(long)]
        inner_id: String,

        /// Number of key servers needed to decrypt
        #[arg(short = 't', long)]
        threshold: u8,

        /// File to encrypt
        #[arg(long, required_unless_present = "plain", conflicts_with = "plain")]
        input: Option<PathBuf>,

        /// Encrypt no payload; the key itself is the secret
        #[arg(long)]
        plain: bool,

        /// Where to write the base64 object (stdout if omitted)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Where to write the symmetric key (hex) as a backup
        #[arg(long)]
        key_out: Option<PathBuf>,
    },

    /// Decrypt an encrypted object
    Decrypt {
        /// Base64 encrypted object
        #[arg(long)]
        object: PathBuf,

        /// Partial key as OBJECT_ID=HEX (repeatable)
        #[arg(long = "key")]
        keys: Vec<String>,

        /// Local key server key file to fetch partial keys from (repeatable)
        #[arg(long = "key-file", conflicts_with = "keys")]
        key_files: Vec<PathBuf>,

        /// Require one key per service, in service order
        #[arg(long)]
        strict: bool,

        /// Per-request timeout in seconds when fetching from key files
        #[arg(long, default_value = "10")]
        timeout_secs: u64,

        /// Where to write the plaintext (stdout if omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Print an encrypted object as JSON
    Inspect {
        /// Base64 encrypted object
        #[arg(long)]
        object: PathBuf,
    },
}

fn keygen_cmd(
    name: String,
    url: String,
    object_id: Option<ObjectId>,
    out: &Path,
    servers: Option<&Path>,
) -> Result<()> {
    let mut rng = OsRng;
    let object_id = object_id.unwrap_or_else(|| {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        ObjectId(bytes)
    });

    let (master_key, _) = generate_key_pair(&mut rng);
    let key_file = KeyFile::new(object_id, name, url, &master_key);
    key_file.save(out)?;
    info!(object_id = %object_id, path = %out.display(), "Generated key server key");

    if let Some(servers) = servers {
        let all = register_server(servers, key_file.info())?;
        info!(servers = all.len(), path = %servers.display(), "Registered key server");
    }

    println!("{}", serde_json::to_string_pretty(&key_file.info())?);
    Ok(())
}

fn extract_cmd(key_file: &Path, package_id: ObjectId, inner_id: &str) -> Result<()> {
    let key_file = KeyFile::load(key_file)?;
    let full_id = create_full_id(&package_id, &parse_hex(inner_id)?);
    let partial_key = extract(&key_file.master_key()?, &full_id);
    println!("{}={}", key_file.object_id, hex::encode(compress_g1(&partial_key).0));
    Ok(())
}

fn encrypt_cmd(
    servers: &Path,
    package_id: ObjectId,
    inner_id: &str,
    threshold: u8,
    input: Option<&Path>,
    out: Option<&Path>,
    key_out: Option<&Path>,
) -> Result<()> {
    let infos = load_servers(servers)?;
    if infos.is_empty() {
        bail!("No key servers in {}", servers.display());
    }
    let key_servers = KeyServerSet::from_infos(&infos)?;

    let input = match input {
        Some(path) => EncryptionInput::Aes256Gcm {
            data: std::fs::read(path).with_context(|| format!("reading {}", path.display()))?,
        },
        None => EncryptionInput::Plain,
    };

    let (bytes, mut key) = encrypt_to_bytes(
        package_id,
        parse_hex(inner_id)?,
        &key_servers,
        threshold,
        input,
        &mut OsRng,
    )?;

    if let Some(key_out) = key_out {
        std::fs::write(key_out, hex::encode(key))?;
    }
    key.fill(0);

    let encoded = STANDARD.encode(&bytes);
    match out {
        Some(path) => {
            std::fs::write(path, &encoded)?;
            println!("Encrypted object written to {}", path.display());
            println!("  Servers: {}", infos.len());
            println!("  Threshold: {}", threshold);
            println!("  Size: {} bytes", bytes.len());
        }
        None => println!("{}", encoded),
    }
    Ok(())
}

async fn decrypt_cmd(
    object: &Path,
    keys: &[String],
    key_files: &[PathBuf],
    strict: bool,
    timeout_secs: u64,
    out: Option<&Path>,
) -> Result<()> {
    let object = read_object(object)?;

    let plaintext = if !key_files.is_empty() {
        let context = fetch_from_key_files(&object, key_files, timeout_secs).await?;
        decrypt_with_context(&object, &context)?
    } else if strict {
        let partial_keys = parse_keys(keys)?;
        let ordered = object
            .services
            .iter()
            .map(|(object_id, _)| {
                partial_keys
                    .iter()
                    .find(|(id, _)| id == object_id)
                    .map(|(_, key)| *key)
                    .ok_or_else(|| anyhow!("Missing partial key for {}", object_id))
            })
            .collect::<Result<Vec<_>>>()?;
        decrypt(&object, &ordered)?
    } else {
        let context: DecryptionContext = parse_keys(keys)?.into_iter().collect();
        decrypt_with_context(&object, &context)?
    };

    match out {
        Some(path) => {
            std::fs::write(path, &plaintext)?;
            println!("Decrypted {} bytes to {}", plaintext.len(), path.display());
        }
        None => std::io::stdout().write_all(&plaintext)?,
    }
    Ok(())
}

/// Serve the key files locally, verify their proofs of possession and
/// collect a quorum of partial keys from them.
async fn fetch_from_key_files(
    object: &EncryptedObject,
    key_files: &[PathBuf],
    timeout_secs: u64,
) -> Result<DecryptionContext> {
    let mut servers = LocalKeyServer::new();
    let mut directory = MemoryDirectory::new();
    for path in key_files {
        let key_file = KeyFile::load(path)?;
        let info = servers.add(
            key_file.object_id,
            &key_file.name,
            &key_file.url,
            key_file.master_key()?,
        );
        directory.insert(info);
    }

    let object_ids: Vec<ObjectId> = object
        .services
        .iter()
        .map(|(object_id, _)| *object_id)
        .filter(|object_id| directory.get(object_id).is_some())
        .collect();
    let infos = fetch_verified_key_server_info(&directory, &servers, &object_ids).await?;

    let config = FetchConfig {
        request_timeout: std::time::Duration::from_secs(timeout_secs),
        ..FetchConfig::default()
    };
    let context = fetch_partial_keys(
        Arc::new(servers),
        &infos,
        object,
        &KeyRequest::for_identity(object.full_id()),
        &config,
    )
    .await?;
    Ok(context)
}

fn inspect_cmd(object: &Path) -> Result<()> {
    let object = read_object(object)?;
    let IbeEncryptions::BonehFranklinBls12381 {
        encapsulation,
        shares,
    } = &object.encrypted_shares;

    let ciphertext = match &object.ciphertext {
        Ciphertext::Aes256Gcm { nonce, blob, mac } => serde_json::json!({
            "type": "Aes256Gcm",
            "nonce": hex::encode(nonce),
            "blob_len": blob.len(),
            "mac": hex::encode(mac),
        }),
        Ciphertext::Plain => serde_json::json!({ "type": "Plain" }),
        Ciphertext::Unknown { tag, bytes } => serde_json::json!({
            "type": "Unknown",
            "tag": tag,
            "len": bytes.len(),
        }),
    };

    let view = serde_json::json!({
        "version": object.version,
        "package_id": object.package_id,
        "inner_id": hex::encode(&object.inner_id),
        "threshold": object.threshold,
        "services": object
            .services
            .iter()
            .map(|(object_id, index)| serde_json::json!({ "object_id": object_id, "index": index }))
            .collect::<Vec<_>>(),
        "encrypted_shares": {
            "type": "BonehFranklinBls12381",
            "encapsulation": encapsulation,
            "shares": shares.iter().map(hex::encode).collect::<Vec<_>>(),
        },
        "ciphertext": ciphertext,
    });
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

fn read_object(path: &Path) -> Result<EncryptedObject> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading object {}", path.display()))?;
    let bytes = STANDARD.decode(text.trim())?;
    Ok(EncryptedObject::from_bytes(&bytes)?)
}

fn parse_hex(s: &str) -> Result<Vec<u8>> {
    Ok(hex::decode(s.strip_prefix("0x").unwrap_or(s))?)
}

/// Parse `OBJECT_ID=HEX` partial key arguments.
fn parse_keys(keys: &[String]) -> Result<Vec<(ObjectId, UserSecretKey)>> {
    keys.iter()
        .map(|arg| {
            let (object_id, key) = arg
                .split_once('=')
                .ok_or_else(|| anyhow!("Expected OBJECT_ID=KEY, got {arg}"))?;
            let object_id: ObjectId = object_id.parse()?;
            let key = decompress_g1(&G1Point::from_hex(key)?)?;
            Ok((object_id, key))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("seal=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen {
            name,
            url,
            object_id,
            out,
            servers,
        } => {
            keygen_cmd(name, url, object_id, &out, servers.as_deref())?;
        }

        Commands::Extract {
            key_file,
            package_id,
            inner_id,
        } => {
            extract_cmd(&key_file, package_id, &inner_id)?;
        }

        Commands::Encrypt {
            servers,
            package_id,
            inner_id,
            threshold,
            input,
            plain: _,
            out,
            key_out,
        } => {
            encrypt_cmd(
                &servers,
                package_id,
                &inner_id,
                threshold,
                input.as_deref(),
                out.as_deref(),
                key_out.as_deref(),
            )?;
        }

        Commands::Decrypt {
            object,
            keys,
            key_files,
            strict,
            timeout_secs,
            out,
        } => {
            decrypt_cmd(&object, &keys, &key_files, strict, timeout_secs, out.as_deref()).await?;
        }

        Commands::Inspect { object } => {
            inspect_cmd(&object)?;
        }
    }

    Ok(())
}
