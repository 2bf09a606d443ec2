//! Keys stored as JSON files, one per key. Devnet keys are derived from hashes
//! and only good enough to tell test accounts apart.

use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use tracing::debug;

use crate::{
    identity::sha3_hex,
    keyring::{KeyInfo, KeyOptions, KeyType, Keyring, KeyringError},
};

pub const ADDRESS_PREFIX: &str = "devnet1";

pub fn address_from_pub_key(pub_key: &str) -> String {
    format!("{ADDRESS_PREFIX}{}", &sha3_hex(&[pub_key.as_bytes()])[..40])
}

/// The devnet signature of `msg`: a hash of the signer's public key and the
/// message, checkable by anyone.
pub fn devnet_signature(pub_key: &str, msg: &[u8]) -> Vec<u8> {
    let mut hasher = Sha3_256::new();
    hasher.update(pub_key.as_bytes());
    hasher.update(msg);
    hasher.finalize().to_vec()
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct StoredKey {
    info: KeyInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secret: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    threshold: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct FileKeyring {
    dir: PathBuf,
}

impl FileKeyring {
    pub fn open(dir: &Path) -> Result<Self, KeyringError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> Result<PathBuf, KeyringError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(KeyringError::InvalidOptions(format!(
                "invalid key name {name:?}"
            )));
        }
        Ok(self.dir.join(format!("{name}.json")))
    }

    fn load(&self, name: &str) -> Result<StoredKey, KeyringError> {
        let path = self.path(name)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(KeyringError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn multisig(&self, name: &str, opts: &KeyOptions) -> Result<StoredKey, KeyringError> {
        let threshold = opts.multisig_threshold.unwrap_or(1);
        if threshold == 0 || threshold as usize > opts.multisig.len() {
            return Err(KeyringError::InvalidOptions(format!(
                "threshold {threshold} for {} member(s)",
                opts.multisig.len()
            )));
        }
        let mut members = opts.multisig.clone();
        if !opts.no_sort {
            members.sort();
        }
        let mut pub_keys = Vec::with_capacity(members.len());
        for member in &members {
            let stored = self.load(member)?;
            if stored.info.key_type != KeyType::Local {
                return Err(KeyringError::InvalidOptions(format!(
                    "multisig member {member} is not a local key"
                )));
            }
            pub_keys.push(stored.info.pub_key);
        }
        let threshold_bytes = threshold.to_be_bytes();
        let mut parts: Vec<&[u8]> = vec![b"multi".as_slice(), threshold_bytes.as_slice()];
        parts.extend(pub_keys.iter().map(|k| k.as_bytes()));
        let pub_key = sha3_hex(&parts);
        Ok(StoredKey {
            info: KeyInfo {
                name: name.to_string(),
                key_type: KeyType::Multi,
                address: address_from_pub_key(&pub_key),
                pub_key,
            },
            secret: None,
            members,
            threshold: Some(threshold),
        })
    }

    fn local(name: &str) -> StoredKey {
        let secret: [u8; 32] = rand::thread_rng().gen();
        let pub_key = sha3_hex(&[b"pub".as_slice(), &secret]);
        StoredKey {
            info: KeyInfo {
                name: name.to_string(),
                key_type: KeyType::Local,
                address: address_from_pub_key(&pub_key),
                pub_key,
            },
            secret: Some(hex::encode(secret)),
            members: Vec::new(),
            threshold: None,
        }
    }
}

impl Keyring for FileKeyring {
    fn add(&self, name: &str, opts: &KeyOptions) -> Result<KeyInfo, KeyringError> {
        let path = self.path(name)?;
        if path.exists() {
            return Err(KeyringError::AlreadyExists(name.to_string()));
        }
        let stored = if opts.multisig.is_empty() {
            Self::local(name)
        } else {
            self.multisig(name, opts)?
        };
        std::fs::write(&path, serde_json::to_vec_pretty(&stored)?)?;
        debug!("Added key {} ({})", name, stored.info.address);
        Ok(stored.info)
    }

    fn delete(&self, name: &str) -> Result<(), KeyringError> {
        let path = self.path(name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(KeyringError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn show(&self, name: &str) -> Result<KeyInfo, KeyringError> {
        Ok(self.load(name)?.info)
    }

    fn sign(&self, name: &str, msg: &[u8]) -> Result<Vec<u8>, KeyringError> {
        let stored = self.load(name)?;
        if stored.secret.is_none() {
            return Err(KeyringError::InvalidOptions(format!(
                "{name} is a multisig key and cannot sign alone"
            )));
        }
        Ok(devnet_signature(&stored.info.pub_key, msg))
    }
}
