//! One validator's isolated environment: home directory, identity, ports and
//! local genesis.
//!
//! Home layout, fixed across init, collect and start:
//!
//! ```text
//! <home>/config/genesis.json
//! <home>/config/priv_validator_key.json
//! <home>/config/node_key.json
//! <home>/config/config.toml
//! <home>/config/app.toml
//! <home>/config/gentx/
//! <home>/keyring-test/
//! ```

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    command::{CommandContext, CommandRunner},
    error::{CollaboratorError, InfrastructureFault},
    genesis::{Coin, Coins, GenTxRecord, GenesisDocument, VestingOptions},
    identity::{NodeIdentity, PRIV_VALIDATOR_KEY_FILE},
    keyring::{KeyInfo, KeyOptions, Keyring, KeyringError},
    peers::PeerList,
    ports::{NodePorts, PortAllocator},
    readiness::{wait_until_ready, Backoff, HttpProbe},
    runtime::{ChainApp, Network, ValidatorConfig, ValidatorHandle},
    utils::{conf::SharedConf, logger::LogMe},
};

pub const CONFIG_DIR: &str = "config";
pub const GENESIS_FILE: &str = "genesis.json";
pub const CONFIG_TOML: &str = "config.toml";
pub const APP_TOML: &str = "app.toml";
pub const GENTX_DIR: &str = "gentx";
pub const KEYRING_DIR: &str = "keyring-test";

/// Keys provisioned by [`NodeFixture::init_fixtures`].
pub const VALIDATOR_KEY: &str = "validator";
pub const USER_KEYS: [&str; 2] = ["alice", "bob"];
pub const VESTING_KEY: &str = "vesting";
pub const MULTISIG_KEY: &str = "multisig";

const USER_COINS: &str = "1000000000link,100000000000000stake2";
const VESTING_COINS: &str = "500000000000feet";
const VESTING_PERIOD_SECS: i64 = 60;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct P2pSection {
    pub laddr: String,
    pub external_address: String,
    pub persistent_peers: String,
    pub addr_book_strict: bool,
    pub allow_duplicate_ip: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RpcSection {
    pub laddr: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConsensusSection {
    pub timeout_commit_ms: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MempoolSection {
    pub broadcast: bool,
}

/// `config/config.toml`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NodeConfigFile {
    pub moniker: String,
    pub p2p: P2pSection,
    pub rpc: RpcSection,
    pub consensus: ConsensusSection,
    pub mempool: MempoolSection,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GrpcSection {
    pub enable: bool,
    pub address: String,
}

/// `config/app.toml`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AppConfigFile {
    pub minimum_gas_prices: String,
    pub grpc: GrpcSection,
}

/// Options of a node joining a running network.
#[derive(Debug, Clone)]
pub struct AddNodeOptions {
    pub min_gas_prices: Option<String>,
    pub mempool_broadcast: bool,
}

impl Default for AddNodeOptions {
    fn default() -> Self {
        Self {
            min_gas_prices: None,
            mempool_broadcast: true,
        }
    }
}

impl AddNodeOptions {
    pub fn no_mempool_broadcast() -> Self {
        Self {
            mempool_broadcast: false,
            ..Self::default()
        }
    }
}

/// Creates an isolated home under `home_root`, named after `name`.
pub fn create_home(home_root: &Path, name: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(home_root)
        .with_context(|| format!("creating home root {}", home_root.display()))?;
    let dir = tempfile::Builder::new()
        .prefix(&format!("{name}-"))
        .disable_cleanup(true)
        .tempdir_in(home_root)
        .with_context(|| format!("creating home for {name}"))?;
    Ok(dir.path().to_path_buf())
}

fn random_chain_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("test-chain-{suffix}")
}

/// What producing a gentx needs, detached from the fixture so it can run on
/// a blocking thread.
#[derive(Clone)]
pub struct GentxJob<K: Keyring> {
    keyring: K,
    genesis_file: PathBuf,
    default_output: PathBuf,
    config_dir: PathBuf,
    p2p_port: u16,
}

impl<K: Keyring> GentxJob<K> {
    pub fn run(self, key_name: &str, amount: &Coin, output: Option<&Path>) -> Result<PathBuf> {
        let genesis = GenesisDocument::load(&self.genesis_file)?;
        let identity = NodeIdentity::load(&self.config_dir)?;
        let key = self.keyring.show(key_name)?;

        let mut gentx = GenTxRecord {
            name: key_name.to_string(),
            chain_id: genesis.chain_id.clone(),
            node_id: identity.node_id().to_string(),
            delegator_address: key.address,
            validator_pub_key: identity.validator_key.pub_key.clone(),
            amount: amount.clone(),
            memo: format!("{}@127.0.0.1:{}", identity.node_id(), self.p2p_port),
            signer_pub_key: key.pub_key,
            signature: String::new(),
        };
        genesis.check_gentx(&gentx)?;
        gentx.signature = hex::encode(self.keyring.sign(key_name, &gentx.sign_bytes()?)?);

        let output = match output {
            Some(path) => path.to_path_buf(),
            None => {
                std::fs::create_dir_all(&self.default_output)?;
                self.default_output
                    .join(format!("gentx-{}.json", identity.node_id()))
            }
        };
        gentx.save(&output)?;
        info!("Genesis transaction of {} written to {}", key_name, output.display());
        Ok(output)
    }
}

pub struct NodeFixture<A: ChainApp> {
    app: A,
    conf: SharedConf,
    name: String,
    home: PathBuf,
    moniker: String,
    chain_id: String,
    ports: NodePorts,
    keyring: A::Keyring,
    runner: A::Runner,
}

impl<A: ChainApp> NodeFixture<A> {
    /// Leases ports and creates an empty home for the node `name`.
    pub fn new(app: A, conf: SharedConf, ports: &PortAllocator, name: &str) -> Result<Self> {
        let ports = NodePorts::lease(ports)?;
        let home = create_home(&conf.home_root, name)?;
        let keyring = app
            .keyring(&home.join(KEYRING_DIR))
            .with_context(|| format!("opening keyring of {name}"))?;
        let runner = app.command_runner();
        debug!(
            "Fixture {} at {} (rpc {}, p2p {}, grpc {})",
            name,
            home.display(),
            ports.rpc.port,
            ports.p2p.port,
            ports.grpc.port
        );
        Ok(Self {
            app,
            conf,
            name: name.to_string(),
            home,
            moniker: name.to_string(),
            chain_id: String::new(),
            ports,
            keyring,
            runner,
        })
    }

    /// Single validator chain: fixed key set, funded accounts (one of them
    /// vesting), gentx and collection. The node is not started.
    pub fn init_fixtures(app: A, conf: SharedConf, ports: &PortAllocator, test_name: &str) -> Result<Self> {
        let mut f = Self::new(app, conf, ports, test_name)?;
        if let Err(e) = f.provision_single() {
            f.cleanup(&[]);
            return Err(e);
        }
        Ok(f)
    }

    fn provision_single(&mut self) -> Result<()> {
        let mut names = vec![VALIDATOR_KEY, VESTING_KEY, MULTISIG_KEY];
        names.extend(USER_KEYS);
        for name in names {
            self.keys_delete(name)?;
        }
        self.keys_add(VALIDATOR_KEY, &KeyOptions::default())?;
        self.keys_add(VESTING_KEY, &KeyOptions::default())?;
        for user in USER_KEYS {
            self.keys_add(user, &KeyOptions::default())?;
        }
        let mut members = vec![VALIDATOR_KEY];
        members.extend(USER_KEYS);
        self.keys_add(MULTISIG_KEY, &KeyOptions::multisig(2, &members))?;

        self.init(VALIDATOR_KEY, None)?;

        let start_coins: Coins = self.conf.start_coins.parse()?;
        self.add_genesis_account(&self.key_address(VALIDATOR_KEY)?, start_coins.clone(), None)?;
        let now = Utc::now();
        self.add_genesis_account(
            &self.key_address(VESTING_KEY)?,
            start_coins,
            Some(VestingOptions {
                amount: VESTING_COINS.parse()?,
                start_time: now,
                end_time: now + chrono::Duration::seconds(VESTING_PERIOD_SECS),
            }),
        )?;
        let user_coins: Coins = USER_COINS.parse()?;
        for user in USER_KEYS {
            self.add_genesis_account(&self.key_address(user)?, user_coins.clone(), None)?;
        }

        let stake = Coin::new(self.conf.gentx_stake, self.conf.bond_denom.clone());
        self.gen_tx(VALIDATOR_KEY, &stake, None)?;
        self.collect_gen_txs(None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn moniker(&self) -> &str {
        &self.moniker
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn ports(&self) -> &NodePorts {
        &self.ports
    }

    pub fn keyring(&self) -> &A::Keyring {
        &self.keyring
    }

    pub fn config_dir(&self) -> PathBuf {
        self.home.join(CONFIG_DIR)
    }

    pub fn genesis_file(&self) -> PathBuf {
        self.config_dir().join(GENESIS_FILE)
    }

    pub fn priv_validator_key_file(&self) -> PathBuf {
        self.config_dir().join(PRIV_VALIDATOR_KEY_FILE)
    }

    pub fn gentx_dir(&self) -> PathBuf {
        self.config_dir().join(GENTX_DIR)
    }

    pub fn identity(&self) -> Result<NodeIdentity> {
        NodeIdentity::load(&self.config_dir())
            .with_context(|| format!("{} is not initialised", self.name))
    }

    pub fn node_id(&self) -> Result<String> {
        Ok(self.identity()?.node_key.id)
    }

    /// Creates the config directory, the node identity and a genesis skeleton.
    /// The chain id comes from `chain_id` or is generated.
    pub fn init(&mut self, moniker: &str, chain_id: Option<&str>) -> Result<()> {
        let config_dir = self.config_dir();
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("creating {}", config_dir.display()))?;

        let identity = NodeIdentity::generate();
        identity.write(&config_dir)?;

        let chain_id = chain_id.map(str::to_string).unwrap_or_else(random_chain_id);
        let genesis = GenesisDocument::new(
            chain_id.clone(),
            self.app.default_app_state(&self.conf.bond_denom),
        );
        genesis.save(&self.genesis_file())?;

        self.moniker = moniker.to_string();
        self.chain_id = chain_id;
        info!(
            "Initialised {} ({}) on chain {}",
            self.moniker,
            identity.node_id(),
            self.chain_id
        );
        Ok(())
    }

    pub fn keys_add(&self, name: &str, opts: &KeyOptions) -> Result<KeyInfo> {
        self.keyring
            .add(name, opts)
            .with_context(|| format!("adding key {name} to {}", self.name))
    }

    /// Deleting a key that does not exist is not an error.
    pub fn keys_delete(&self, name: &str) -> Result<()> {
        match self.keyring.delete(name) {
            Ok(()) | Err(KeyringError::NotFound(_)) => Ok(()),
            Err(e) => Err(e).with_context(|| format!("deleting key {name} of {}", self.name)),
        }
    }

    pub fn keys_show(&self, name: &str) -> Result<KeyInfo> {
        self.keyring
            .show(name)
            .with_context(|| format!("showing key {name} of {}", self.name))
    }

    pub fn key_address(&self, name: &str) -> Result<String> {
        Ok(self.keys_show(name)?.address)
    }

    pub fn add_genesis_account(
        &self,
        address: &str,
        coins: Coins,
        vesting: Option<VestingOptions>,
    ) -> Result<()> {
        let path = self.genesis_file();
        let mut genesis = GenesisDocument::load(&path)?;
        genesis
            .add_account(address, coins, vesting)
            .with_context(|| format!("adding genesis account to {}", self.name))?;
        genesis.save(&path)
    }

    pub fn gentx_job(&self) -> GentxJob<A::Keyring> {
        GentxJob {
            keyring: self.keyring.clone(),
            genesis_file: self.genesis_file(),
            default_output: self.gentx_dir(),
            config_dir: self.config_dir(),
            p2p_port: self.ports.p2p.port,
        }
    }

    /// Writes this node's gentx, by default into `config/gentx/`.
    pub fn gen_tx(&self, key_name: &str, amount: &Coin, output: Option<&Path>) -> Result<PathBuf> {
        self.gentx_job()
            .run(key_name, amount, output)
            .with_context(|| format!("gentx of {}", self.name))
    }

    /// Merges the gentxs found in `source` (default `config/gentx/`) into the
    /// local genesis. The result holds exactly the records present.
    pub fn collect_gen_txs(&self, source: Option<&Path>) -> Result<()> {
        let source = source
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.gentx_dir());
        let path = self.genesis_file();
        let mut genesis = GenesisDocument::load(&path)?;
        let gentxs = crate::genesis::read_gentx_dir(&source)?;
        let count = gentxs.len();
        genesis
            .apply_gentxs(gentxs, |gentx| self.app.verify_gentx(gentx))
            .with_context(|| format!("collecting gentxs into {}", self.name))?;
        genesis.save(&path)?;
        info!(
            "Collected {} gentx(s) from {} into {}",
            count,
            source.display(),
            self.name
        );
        Ok(())
    }

    pub fn validate_genesis(&self, path: Option<&Path>) -> Result<()> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.genesis_file());
        GenesisDocument::load(&path)?
            .validate()
            .with_context(|| format!("validating {}", path.display()))
    }

    pub fn genesis(&self) -> Result<GenesisDocument> {
        GenesisDocument::load(&self.genesis_file())
    }

    pub fn genesis_state(&self) -> Result<BTreeMap<String, serde_json::Value>> {
        Ok(self.genesis()?.app_state)
    }

    pub fn genesis_bytes(&self) -> Result<Vec<u8>> {
        let path = self.genesis_file();
        if !path.exists() {
            return Err(InfrastructureFault::MissingGenesis(path).into());
        }
        std::fs::read(&path).with_context(|| format!("reading {}", path.display()))
    }

    /// Replaces the local genesis with `bytes`, verbatim.
    pub fn write_genesis_bytes(&self, bytes: &[u8]) -> Result<()> {
        let path = self.genesis_file();
        std::fs::create_dir_all(self.config_dir())?;
        std::fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))
    }

    pub fn write_node_config(&self, peers: &PeerList, mempool_broadcast: bool) -> Result<()> {
        let file = NodeConfigFile {
            moniker: self.moniker.clone(),
            p2p: P2pSection {
                laddr: self.ports.p2p.tcp_listen_addr(),
                external_address: self.ports.p2p.local_addr(),
                persistent_peers: peers.to_string(),
                addr_book_strict: false,
                allow_duplicate_ip: true,
            },
            rpc: RpcSection {
                laddr: self.ports.rpc.tcp_listen_addr(),
            },
            consensus: ConsensusSection {
                timeout_commit_ms: self.conf.timeout_commit_ms,
            },
            mempool: MempoolSection {
                broadcast: mempool_broadcast,
            },
        };
        write_toml(&self.config_dir().join(CONFIG_TOML), &file)
    }

    pub fn write_app_config(&self, min_gas_prices: &str) -> Result<()> {
        let file = AppConfigFile {
            minimum_gas_prices: min_gas_prices.to_string(),
            grpc: GrpcSection {
                enable: true,
                address: self.ports.grpc.listen_addr(),
            },
        };
        write_toml(&self.config_dir().join(APP_TOML), &file)
    }

    pub fn node_config(&self) -> Result<NodeConfigFile> {
        read_toml(&self.config_dir().join(CONFIG_TOML))
    }

    pub fn app_config(&self) -> Result<AppConfigFile> {
        read_toml(&self.config_dir().join(APP_TOML))
    }

    /// The `persistent_peers` value written into `config/config.toml`.
    pub fn persistent_peers(&self) -> Result<PeerList> {
        self.node_config()?.p2p.persistent_peers.parse()
    }

    /// Writes the node configuration, starts the validator and waits until its
    /// rpc server reports a block. A validator that never becomes ready is
    /// stopped before the fault is returned.
    pub async fn launch(
        &self,
        min_gas_prices: &str,
        peers: PeerList,
        mempool_broadcast: bool,
    ) -> Result<A::Validator> {
        self.write_node_config(&peers, mempool_broadcast)?;
        self.write_app_config(min_gas_prices)?;
        let genesis_file = self.genesis_file();
        if !genesis_file.exists() {
            return Err(InfrastructureFault::MissingGenesis(genesis_file).into());
        }

        let config = ValidatorConfig {
            moniker: self.moniker.clone(),
            home: self.home.clone(),
            chain_id: self.chain_id.clone(),
            node_id: self.node_id()?,
            genesis_file,
            p2p_listen: self.ports.p2p.listen_addr(),
            rpc_listen: self.ports.rpc.listen_addr(),
            grpc_listen: self.ports.grpc.listen_addr(),
            p2p_external: self.ports.p2p.local_addr(),
            persistent_peers: peers,
            min_gas_prices: min_gas_prices.to_string(),
            timeout_commit: self.conf.timeout_commit(),
            mempool_broadcast,
        };
        let mut validator = self
            .app
            .start_validator(config)
            .await
            .with_context(|| format!("starting validator {}", self.moniker))?;

        let probe = HttpProbe::block(self.ports.rpc.port);
        match wait_until_ready(&probe, &Backoff::from(&self.conf.readiness)).await {
            Ok(_) => Ok(validator),
            Err(fault) => {
                validator.cleanup().await;
                Err(anyhow::Error::new(fault).context(format!("starting {}", self.moniker)))
            }
        }
    }

    /// Starts this node alone and waits for its next block.
    pub async fn start(&self, min_gas_prices: &str) -> Result<Network<A::Validator>> {
        let validator = self.launch(min_gas_prices, PeerList::default(), true).await?;
        let mut network = Network::new(self.conf.block_wait_timeout(), CancellationToken::new());
        network.push(validator);
        if let Err(e) = network.wait_for_next_block().await {
            network.cleanup().await;
            return Err(e);
        }
        Ok(network)
    }

    fn command_context(&self) -> CommandContext {
        CommandContext {
            home: self.home.clone(),
            chain_id: self.chain_id.clone(),
            moniker: self.moniker.clone(),
            rpc_addr: self.ports.rpc.local_addr(),
        }
    }

    /// Runs a collaborator command against this node.
    pub async fn exec(&self, operation: &str, flags: &[String]) -> Result<Vec<u8>, CollaboratorError> {
        self.runner
            .run(&self.command_context(), operation, flags)
            .await
            .map_err(|e| CollaboratorError::new(operation, e))
    }

    pub async fn exec_json(
        &self,
        operation: &str,
        flags: &[String],
    ) -> Result<serde_json::Value, CollaboratorError> {
        let out = self.exec(operation, flags).await?;
        serde_json::from_slice(&out)
            .map_err(|e| CollaboratorError::new(operation, anyhow::Error::new(e).context("decoding output")))
    }

    /// Removes the home and every `extra` path. Never fails, and running it
    /// again is a no-op.
    pub fn cleanup(&self, extra: &[PathBuf]) {
        for path in std::iter::once(&self.home).chain(extra) {
            if !path.exists() {
                continue;
            }
            let res = if path.is_dir() {
                std::fs::remove_dir_all(path)
            } else {
                std::fs::remove_file(path)
            };
            if res
                .log_warn(format!("Removing {} of {}", path.display(), self.name))
                .is_ok()
            {
                debug!("Removed {}", path.display());
            }
        }
    }
}

fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = toml::to_string(value)?;
    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("decoding {}", path.display()))
}
