//! In-process implementation of every collaborator the orchestrator needs:
//! a file keyring, a command runner and validators that produce blocks without
//! any consensus behind them.

use std::{collections::BTreeMap, path::Path, sync::Arc};

use anyhow::{bail, Context, Result};
use serde_json::json;

use crate::{
    genesis::GenTxRecord,
    runtime::{ChainApp, ValidatorConfig},
};

pub mod commands;
pub mod keyring;
pub mod rpc;
pub mod switch;
pub mod validator;

pub use commands::DevnetCommands;
pub use keyring::FileKeyring;
pub use rpc::RpcClient;
pub use switch::Switch;
pub use validator::DevnetValidator;

#[derive(Clone, Default)]
pub struct DevnetApp {
    switch: Arc<Switch>,
}

impl DevnetApp {
    pub fn switch(&self) -> &Arc<Switch> {
        &self.switch
    }
}

impl ChainApp for DevnetApp {
    type Keyring = FileKeyring;
    type Runner = DevnetCommands;
    type Validator = DevnetValidator;

    fn keyring(&self, dir: &Path) -> Result<FileKeyring> {
        Ok(FileKeyring::open(dir)?)
    }

    fn command_runner(&self) -> DevnetCommands {
        DevnetCommands::default()
    }

    fn default_app_state(&self, bond_denom: &str) -> BTreeMap<String, serde_json::Value> {
        BTreeMap::from([
            ("auth".to_string(), json!({ "accounts": [] })),
            (
                "bank".to_string(),
                json!({ "balances": [], "params": { "default_send_enabled": true } }),
            ),
            ("genutil".to_string(), json!({ "gen_txs": [] })),
            (
                "staking".to_string(),
                json!({
                    "params": {
                        "bond_denom": bond_denom,
                        "max_validators": 100,
                        "unbonding_time": "1814400s"
                    }
                }),
            ),
        ])
    }

    fn verify_gentx(&self, gentx: &GenTxRecord) -> Result<()> {
        if keyring::address_from_pub_key(&gentx.signer_pub_key) != gentx.delegator_address {
            bail!("signer does not own {}", gentx.delegator_address);
        }
        let signature = hex::decode(&gentx.signature).context("decoding gentx signature")?;
        if signature != keyring::devnet_signature(&gentx.signer_pub_key, &gentx.sign_bytes()?) {
            bail!("invalid signature");
        }
        if !gentx.memo.starts_with(&format!("{}@", gentx.node_id)) {
            bail!("memo {:?} does not point at node {}", gentx.memo, gentx.node_id);
        }
        Ok(())
    }

    async fn start_validator(&self, config: ValidatorConfig) -> Result<DevnetValidator> {
        DevnetValidator::start(config, self.switch.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        genesis::Coin,
        keyring::{KeyOptions, Keyring},
    };

    fn signed_gentx(keyring: &FileKeyring) -> GenTxRecord {
        let key = keyring.add("val", &KeyOptions::default()).unwrap();
        let mut gentx = GenTxRecord {
            name: "val".to_string(),
            chain_id: "c".to_string(),
            node_id: "abc".to_string(),
            delegator_address: key.address,
            validator_pub_key: "vpk".to_string(),
            amount: Coin::new(10, "stake"),
            memo: "abc@127.0.0.1:26656".to_string(),
            signer_pub_key: key.pub_key,
            signature: String::new(),
        };
        gentx.signature = hex::encode(keyring.sign("val", &gentx.sign_bytes().unwrap()).unwrap());
        gentx
    }

    #[test]
    fn verifies_signed_gentx() {
        let tmpdir = tempfile::Builder::new().tempdir().unwrap();
        let app = DevnetApp::default();
        let keyring = app.keyring(tmpdir.path()).unwrap();
        let gentx = signed_gentx(&keyring);
        app.verify_gentx(&gentx).unwrap();

        let mut tampered = gentx.clone();
        tampered.amount = Coin::new(1_000, "stake");
        assert!(app.verify_gentx(&tampered).is_err());

        let mut wrong_memo = gentx;
        wrong_memo.memo = "other@127.0.0.1:1".to_string();
        assert!(app.verify_gentx(&wrong_memo).is_err());
    }
}
