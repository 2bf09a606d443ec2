//! The validator runtime collaborator, and the running network built from it.

use std::{
    collections::BTreeMap,
    future::Future,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    command::CommandRunner, genesis::GenTxRecord, keyring::Keyring, peers::PeerList,
    readiness::wait_for,
};

/// Everything a validator needs to start from a prepared home.
#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    pub moniker: String,
    pub home: PathBuf,
    pub chain_id: String,
    pub node_id: String,
    pub genesis_file: PathBuf,
    pub p2p_listen: String,
    pub rpc_listen: String,
    pub grpc_listen: String,
    /// Host and port other nodes dial, `host:port`.
    pub p2p_external: String,
    pub persistent_peers: PeerList,
    pub min_gas_prices: String,
    pub timeout_commit: Duration,
    pub mempool_broadcast: bool,
}

/// A started validator, owned by the orchestrator.
pub trait ValidatorHandle: Send + Sync + 'static {
    fn node_id(&self) -> &str;
    fn moniker(&self) -> &str;
    /// Advertised p2p address, `tcp://host:port`.
    fn p2p_address(&self) -> String;
    /// Base url of the rpc server, `http://host:port`.
    fn rpc_address(&self) -> String;
    fn latest_height(&self) -> impl Future<Output = Result<u64>> + Send;
    /// Resolves with the new height once a block above the current one exists.
    fn wait_for_next_block(&self) -> impl Future<Output = Result<u64>> + Send;
    fn cleanup(&mut self) -> impl Future<Output = ()> + Send;
}

/// The chain binding: keyring, command layer, module defaults and validators.
pub trait ChainApp: Clone + Send + Sync + 'static {
    type Keyring: Keyring;
    type Runner: CommandRunner;
    type Validator: ValidatorHandle;

    /// Opens the keyring stored under `dir`.
    fn keyring(&self, dir: &Path) -> Result<Self::Keyring>;
    fn command_runner(&self) -> Self::Runner;
    /// Module sections of a freshly initialised genesis.
    fn default_app_state(&self, bond_denom: &str) -> BTreeMap<String, serde_json::Value>;
    /// Signature and content checks the builder cannot do itself.
    fn verify_gentx(&self, gentx: &GenTxRecord) -> Result<()>;
    fn start_validator(
        &self,
        config: ValidatorConfig,
    ) -> impl Future<Output = Result<Self::Validator>> + Send;
}

/// Running validators, in start order.
pub struct Network<V: ValidatorHandle> {
    validators: Vec<V>,
    block_wait_timeout: Duration,
    cancel: CancellationToken,
}

impl<V: ValidatorHandle> Network<V> {
    pub fn new(block_wait_timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            validators: Vec::new(),
            block_wait_timeout,
            cancel,
        }
    }

    pub fn push(&mut self, validator: V) {
        self.validators.push(validator);
    }

    pub fn validators(&self) -> &[V] {
        &self.validators
    }

    pub fn validator(&self, index: usize) -> Option<&V> {
        self.validators.get(index)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Waits for the network to produce its next block, as seen by the first
    /// validator.
    pub async fn wait_for_next_block(&self) -> Result<u64> {
        self.wait_for_next_block_on(0).await
    }

    pub async fn wait_for_next_block_on(&self, index: usize) -> Result<u64> {
        let validator = self
            .validators
            .get(index)
            .with_context(|| format!("no validator at index {index}"))?;
        let what = format!("next block on {}", validator.moniker());
        wait_for(
            &what,
            self.block_wait_timeout,
            &self.cancel,
            validator.wait_for_next_block(),
        )
        .await?
    }

    /// Waits until validator `index` reports at least `height`.
    pub async fn wait_for_height_on(&self, index: usize, height: u64) -> Result<u64> {
        let validator = self
            .validators
            .get(index)
            .with_context(|| format!("no validator at index {index}"))?;
        let what = format!("height {height} on {}", validator.moniker());
        wait_for(&what, self.block_wait_timeout, &self.cancel, async {
            loop {
                let current = validator.latest_height().await?;
                if current >= height {
                    return anyhow::Ok(current);
                }
                validator.wait_for_next_block().await?;
            }
        })
        .await?
    }

    pub async fn latest_height(&self) -> Result<u64> {
        self.validators
            .first()
            .context("network has no validator")?
            .latest_height()
            .await
    }

    /// Stops every validator, newest first. Safe to call more than once.
    pub async fn cleanup(&mut self) {
        self.cancel.cancel();
        while let Some(mut validator) = self.validators.pop() {
            info!("Stopping validator {}", validator.moniker());
            validator.cleanup().await;
        }
    }
}

impl<V: ValidatorHandle> Drop for Network<V> {
    fn drop(&mut self) {
        if !self.validators.is_empty() {
            warn!(
                "Network dropped with {} running validator(s), cancelling",
                self.validators.len()
            );
        }
        self.cancel.cancel();
    }
}
