//! Local node identity: the p2p node key and the consensus key of a validator.
//!
//! Both files are created once by `init` and read back when the validator
//! starts. Keys are derived with sha3 from random bytes; they identify nodes,
//! they do not sign anything.

use std::path::Path;

use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

pub const NODE_KEY_FILE: &str = "node_key.json";
pub const PRIV_VALIDATOR_KEY_FILE: &str = "priv_validator_key.json";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NodeKey {
    pub id: String,
    pub priv_key: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PrivValidatorKey {
    pub address: String,
    pub pub_key: String,
    pub priv_key: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeIdentity {
    pub node_key: NodeKey,
    pub validator_key: PrivValidatorKey,
}

pub fn sha3_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Sha3_256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

impl NodeIdentity {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let node_secret: [u8; 32] = rng.gen();
        let validator_secret: [u8; 32] = rng.gen();

        let node_pub = sha3_hex(&[b"node".as_slice(), &node_secret]);
        let validator_pub = sha3_hex(&[b"consensus".as_slice(), &validator_secret]);
        let validator_address = sha3_hex(&[validator_pub.as_bytes()])[..40].to_uppercase();

        Self {
            node_key: NodeKey {
                id: node_pub[..40].to_string(),
                priv_key: hex::encode(node_secret),
            },
            validator_key: PrivValidatorKey {
                address: validator_address,
                pub_key: validator_pub,
                priv_key: hex::encode(validator_secret),
            },
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_key.id
    }

    pub fn write(&self, config_dir: &Path) -> Result<()> {
        write_json(&config_dir.join(NODE_KEY_FILE), &self.node_key)?;
        write_json(
            &config_dir.join(PRIV_VALIDATOR_KEY_FILE),
            &self.validator_key,
        )
    }

    pub fn load(config_dir: &Path) -> Result<Self> {
        Ok(Self {
            node_key: read_json(&config_dir.join(NODE_KEY_FILE))?,
            validator_key: read_json(&config_dir.join(PRIV_VALIDATOR_KEY_FILE))?,
        })
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("decoding {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_are_unique_and_persist() {
        let tmpdir = tempfile::Builder::new().tempdir().unwrap();
        let a = NodeIdentity::generate();
        let b = NodeIdentity::generate();
        assert_ne!(a.node_id(), b.node_id());
        assert_eq!(a.node_id().len(), 40);

        a.write(tmpdir.path()).unwrap();
        assert_eq!(NodeIdentity::load(tmpdir.path()).unwrap(), a);
    }

    #[test]
    fn load_without_files_fails() {
        let tmpdir = tempfile::Builder::new().tempdir().unwrap();
        assert!(NodeIdentity::load(tmpdir.path()).is_err());
    }
}
