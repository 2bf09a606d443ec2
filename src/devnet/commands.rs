use anyhow::{bail, Context, Result};
use serde_json::json;

use crate::{
    command::{CommandContext, CommandRunner},
    fixture::{CONFIG_DIR, GENESIS_FILE, KEYRING_DIR},
    genesis::GenesisDocument,
    keyring::Keyring,
};

use super::{keyring::FileKeyring, rpc::RpcClient};

/// Operations understood by devnet nodes. Outputs are JSON documents.
#[derive(Clone, Debug, Default)]
pub struct DevnetCommands;

fn positional(flags: &[String]) -> impl Iterator<Item = &str> {
    flags
        .iter()
        .map(String::as_str)
        .filter(|f| !f.starts_with("--"))
}

impl CommandRunner for DevnetCommands {
    async fn run(&self, ctx: &CommandContext, operation: &str, flags: &[String]) -> Result<Vec<u8>> {
        let output = match operation {
            "status" => serde_json::to_value(RpcClient::new(&ctx.rpc_addr)?.status().await?)?,
            "query block" => serde_json::to_value(RpcClient::new(&ctx.rpc_addr)?.block().await?)?,
            "query balances" => {
                let address = positional(flags)
                    .next()
                    .context("query balances needs an address")?;
                let genesis =
                    GenesisDocument::load(&ctx.home.join(CONFIG_DIR).join(GENESIS_FILE))?;
                let balances = genesis.balance_of(address)?.unwrap_or_default();
                json!({ "balances": balances })
            }
            "validate-genesis" => {
                let path = match positional(flags).next() {
                    Some(path) => std::path::PathBuf::from(path),
                    None => ctx.home.join(CONFIG_DIR).join(GENESIS_FILE),
                };
                let genesis = GenesisDocument::load(&path)?;
                genesis.validate()?;
                json!({ "valid": true, "chain_id": genesis.chain_id })
            }
            "keys show" => {
                let name = positional(flags)
                    .next()
                    .context("keys show needs a key name")?;
                let keyring = FileKeyring::open(&ctx.home.join(KEYRING_DIR))?;
                serde_json::to_value(keyring.show(name)?)?
            }
            other => bail!("unknown command {other:?}"),
        };
        Ok(serde_json::to_vec(&output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(home: &std::path::Path) -> CommandContext {
        CommandContext {
            home: home.to_path_buf(),
            chain_id: "c".to_string(),
            moniker: "m".to_string(),
            rpc_addr: "127.0.0.1:1".to_string(),
        }
    }

    #[test_log::test(tokio::test)]
    async fn unknown_operation_is_an_error() {
        let tmpdir = tempfile::Builder::new().tempdir().unwrap();
        let err = DevnetCommands
            .run(&ctx(tmpdir.path()), "tx fly", &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown command"));
    }

    #[test_log::test(tokio::test)]
    async fn query_balances_reads_genesis() {
        let tmpdir = tempfile::Builder::new().tempdir().unwrap();
        let config = tmpdir.path().join(CONFIG_DIR);
        std::fs::create_dir_all(&config).unwrap();
        let mut genesis = GenesisDocument::new("c", Default::default());
        genesis
            .add_account("addr", "5stake".parse().unwrap(), None)
            .unwrap();
        genesis.save(&config.join(GENESIS_FILE)).unwrap();

        let out = DevnetCommands
            .run(
                &ctx(tmpdir.path()),
                "query balances",
                &["addr".to_string(), "--output=json".to_string()],
            )
            .await
            .unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(doc["balances"][0]["amount"], json!(5));

        assert!(DevnetCommands
            .run(&ctx(tmpdir.path()), "query balances", &[])
            .await
            .is_err());
    }
}
