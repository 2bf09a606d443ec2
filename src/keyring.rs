//! Keyring collaborator interface.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum KeyringError {
    #[error("key {0} not found in the keyring")]
    NotFound(String),
    #[error("key {0} already exists")]
    AlreadyExists(String),
    #[error("invalid key options: {0}")]
    InvalidOptions(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Local,
    Multi,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct KeyInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub key_type: KeyType,
    pub address: String,
    pub pub_key: String,
}

#[derive(Clone, Debug, Default)]
pub struct KeyOptions {
    /// Members of a multisig key, by key name.
    pub multisig: Vec<String>,
    pub multisig_threshold: Option<u32>,
    /// Keep members in the given order instead of sorting them.
    pub no_sort: bool,
}

impl KeyOptions {
    pub fn multisig(threshold: u32, members: &[&str]) -> Self {
        Self {
            multisig: members.iter().map(|m| m.to_string()).collect(),
            multisig_threshold: Some(threshold),
            no_sort: false,
        }
    }
}

/// Key storage owned by a collaborator. Fixtures only keep key names.
pub trait Keyring: Clone + Send + Sync + 'static {
    fn add(&self, name: &str, opts: &KeyOptions) -> Result<KeyInfo, KeyringError>;
    fn delete(&self, name: &str) -> Result<(), KeyringError>;
    fn show(&self, name: &str) -> Result<KeyInfo, KeyringError>;
    fn sign(&self, name: &str, msg: &[u8]) -> Result<Vec<u8>, KeyringError>;
}
