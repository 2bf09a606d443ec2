//! Multi-validator networks built from node fixtures.
//!
//! A [`FixtureGroup`] walks through
//! `Created -> NodesInitialized -> GenesisAssembled -> Converged -> Running`.
//! Adding a node to a running group goes through
//! `JoiningNodeInitialized -> PeerWired -> JoiningNodeStarted` and back to
//! `Running`. [`FixtureGroup::cleanup`] is accepted in every state.

use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    barrier::GentxLatch,
    error::InfrastructureFault,
    fixture::{create_home, AddNodeOptions, NodeFixture},
    genesis::{genesis_hash, read_gentx_dir, Coin, Coins, GenesisDocument},
    keyring::KeyOptions,
    peers::{peers_for, PeerList},
    ports::PortAllocator,
    runtime::{ChainApp, Network},
    utils::{conf::SharedConf, logger::LogMe},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    Created,
    NodesInitialized,
    GenesisAssembled,
    Converged,
    Running,
    JoiningNodeInitialized,
    PeerWired,
    JoiningNodeStarted,
    TornDown,
}

impl ClusterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterState::Created => "Created",
            ClusterState::NodesInitialized => "NodesInitialized",
            ClusterState::GenesisAssembled => "GenesisAssembled",
            ClusterState::Converged => "Converged",
            ClusterState::Running => "Running",
            ClusterState::JoiningNodeInitialized => "JoiningNodeInitialized",
            ClusterState::PeerWired => "PeerWired",
            ClusterState::JoiningNodeStarted => "JoiningNodeStarted",
            ClusterState::TornDown => "TornDown",
        }
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct FixtureGroup<A: ChainApp> {
    app: A,
    conf: SharedConf,
    ports: Arc<PortAllocator>,
    test_name: String,
    chain_id: String,
    network_name: String,
    staging_dir: PathBuf,
    fixtures: Vec<NodeFixture<A>>,
    genesis_content: Option<Vec<u8>>,
    latch: Option<Arc<GentxLatch>>,
    network: Network<A::Validator>,
    cancel: CancellationToken,
    state: ClusterState,
}

impl<A: ChainApp> FixtureGroup<A> {
    /// An empty group leasing its ports from the process wide allocator.
    pub fn new(app: A, conf: SharedConf, test_name: &str) -> Result<Self> {
        let ports = PortAllocator::process_wide(&conf);
        Self::with_ports(app, conf, ports, test_name)
    }

    pub fn with_ports(
        app: A,
        conf: SharedConf,
        ports: Arc<PortAllocator>,
        test_name: &str,
    ) -> Result<Self> {
        let network_name = format!("{}{}", conf.network_name_prefix, test_name);
        let staging_dir = create_home(&conf.home_root, &format!("{network_name}-gentxs"))?;
        let cancel = CancellationToken::new();
        info!("📡 Network {} created", network_name);
        Ok(Self {
            network: Network::new(conf.block_wait_timeout(), cancel.clone()),
            app,
            ports,
            test_name: test_name.to_string(),
            chain_id: test_name.to_string(),
            network_name,
            staging_dir,
            fixtures: Vec::new(),
            genesis_content: None,
            latch: None,
            cancel,
            state: ClusterState::Created,
            conf,
        })
    }

    /// Initialises `n` nodes and converges their genesis. Everything created
    /// so far is removed when a step fails.
    pub async fn init(app: A, conf: SharedConf, test_name: &str, n: usize) -> Result<Self> {
        let mut group = Self::new(app, conf, test_name)?;
        let res = async {
            group.init_nodes(n)?;
            group.assemble_genesis().await?;
            group.converge()
        }
        .await;
        if let Err(e) = res {
            group.cleanup().await;
            return Err(e);
        }
        Ok(group)
    }

    fn transition(&self, from: &[ClusterState], to: ClusterState) -> Result<()> {
        if from.contains(&self.state) {
            return Ok(());
        }
        Err(InfrastructureFault::InvalidTransition {
            from: self.state.as_str(),
            to: to.as_str(),
        }
        .into())
    }

    fn node_name(&self, index: usize) -> String {
        format!("{}-{}{}", self.test_name, self.conf.node_name_prefix, index)
    }

    /// Creates, initialises and keys `n` nodes on the group chain id.
    pub fn init_nodes(&mut self, n: usize) -> Result<()> {
        self.transition(&[ClusterState::Created], ClusterState::NodesInitialized)?;
        if n == 0 {
            bail!("a network needs at least one node");
        }
        for index in 0..n {
            let name = self.node_name(index);
            let fixture =
                NodeFixture::new(self.app.clone(), self.conf.clone(), &self.ports, &name)?;
            // Pushed before init so that cleanup sees it if init fails.
            self.fixtures.push(fixture);
            let fixture = self
                .fixtures
                .last_mut()
                .context("fixture was just pushed")?;
            fixture.keys_delete(&name)?;
            fixture.keys_add(&name, &KeyOptions::default())?;
            fixture.init(&name, Some(self.chain_id.as_str()))?;
        }
        self.latch = Some(Arc::new(GentxLatch::new(
            self.fixtures.iter().map(|f| f.name().to_string()),
        )));
        self.state = ClusterState::NodesInitialized;
        info!("Initialised {} node(s) for {}", n, self.network_name);
        Ok(())
    }

    /// Funds every participant in every node's genesis, then produces one gentx
    /// per node into the staging directory, concurrently.
    pub async fn assemble_genesis(&mut self) -> Result<()> {
        self.transition(
            &[ClusterState::NodesInitialized],
            ClusterState::GenesisAssembled,
        )?;
        let latch = self.latch.clone().context("nodes are not initialised")?;

        let start_coins: Coins = self.conf.start_coins.parse()?;
        let addresses = self
            .fixtures
            .iter()
            .map(|f| f.key_address(f.name()))
            .collect::<Result<Vec<_>>>()?;
        for fixture in &self.fixtures {
            for address in &addresses {
                fixture.add_genesis_account(address, start_coins.clone(), None)?;
            }
        }

        let stake = Coin::new(self.conf.gentx_stake, self.conf.bond_denom.clone());
        let mut producers = JoinSet::new();
        for fixture in &self.fixtures {
            let job = fixture.gentx_job();
            let name = fixture.name().to_string();
            let output = self.staging_dir.join(format!("{name}.json"));
            let stake = stake.clone();
            let latch = latch.clone();
            producers.spawn_blocking(move || {
                match job.run(&name, &stake, Some(output.as_path())) {
                    Ok(_) => latch.arrive(&name),
                    Err(e) => {
                        error!("gentx of {} failed: {:#}", name, e);
                        latch.fail(&name);
                    }
                }
            });
        }

        match latch.wait(self.conf.barrier_timeout()).await {
            Ok(()) => {
                while let Some(res) = producers.join_next().await {
                    if let Err(e) = res {
                        warn!("gentx producer panicked: {}", e);
                    }
                }
            }
            Err(violation) => {
                // Blocking producers cannot be aborted; leave stragglers behind.
                producers.detach_all();
                warn!("{}", violation);
            }
        }

        self.state = ClusterState::GenesisAssembled;
        Ok(())
    }

    /// Merges the staged gentxs on every node, then copies node 0's genesis
    /// byte for byte over every other node's.
    pub fn converge(&mut self) -> Result<()> {
        self.transition(&[ClusterState::GenesisAssembled], ClusterState::Converged)?;
        let latch = self.latch.clone().context("nodes are not initialised")?;
        latch.check()?;

        let staged = read_gentx_dir(&self.staging_dir)?;
        if staged.len() != self.fixtures.len() {
            let missing = self
                .fixtures
                .iter()
                .map(|f| f.name().to_string())
                .filter(|name| !staged.iter().any(|tx| &tx.name == name))
                .collect();
            return Err(InfrastructureFault::BarrierViolation {
                expected: self.fixtures.len(),
                present: staged.len(),
                missing,
            }
            .into());
        }

        for fixture in &self.fixtures {
            fixture.collect_gen_txs(Some(self.staging_dir.as_path()))?;
            fixture.validate_genesis(None)?;
        }

        let (canonical, others) = self
            .fixtures
            .split_first()
            .context("network has no node")?;
        let canonical_bytes = canonical.genesis_bytes()?;
        let canonical_doc = GenesisDocument::from_slice(&canonical_bytes)?;
        for fixture in others {
            let merged = fixture.genesis()?;
            if !canonical_doc.same_content(&merged) {
                return Err(InfrastructureFault::GenesisDivergence {
                    node: fixture.name().to_string(),
                    canonical: canonical.name().to_string(),
                    reason: describe_divergence(&canonical_doc, &merged),
                }
                .into());
            }
        }
        for fixture in others {
            fixture.write_genesis_bytes(&canonical_bytes)?;
        }

        let hash = genesis_hash(&canonical_bytes);
        for fixture in &self.fixtures {
            let on_disk = genesis_hash(&fixture.genesis_bytes()?);
            if on_disk != hash {
                return Err(InfrastructureFault::GenesisDivergence {
                    node: fixture.name().to_string(),
                    canonical: canonical.name().to_string(),
                    reason: format!("genesis hash {on_disk} after copy"),
                }
                .into());
            }
        }
        info!(
            "🌱 Genesis of {} converged on {} node(s), hash {}",
            self.chain_id,
            self.fixtures.len(),
            hash
        );
        self.genesis_content = Some(canonical_bytes);
        self.state = ClusterState::Converged;
        Ok(())
    }

    /// Starts every node in order, each one peered with the nodes already
    /// running, then waits for the network to produce a block.
    pub async fn start_cluster(&mut self) -> Result<()> {
        self.transition(&[ClusterState::Converged], ClusterState::Running)?;
        for fixture in &self.fixtures {
            let peers = peers_for(&fixture.node_id()?, self.network.validators())?;
            let validator = fixture
                .launch(&self.conf.min_gas_prices, peers, true)
                .await?;
            self.network.push(validator);
        }
        let height = self.network.wait_for_next_block().await?;
        info!(
            "🚀 Network {} running with {} validator(s) at height {}",
            self.network_name,
            self.network.len(),
            height
        );
        self.state = ClusterState::Running;
        Ok(())
    }

    /// Adds a full node to the running network with the converged genesis,
    /// and waits until it caught up. Returns its index. A node that fails to
    /// start is removed and the group stays `Running`.
    pub async fn add_full_node(&mut self, opts: AddNodeOptions) -> Result<usize> {
        self.transition(&[ClusterState::Running], ClusterState::JoiningNodeInitialized)?;
        let genesis = self
            .genesis_content
            .clone()
            .context("network has no converged genesis")?;

        let index = self.network.len();
        let name = self.node_name(index);
        let mut fixture =
            NodeFixture::new(self.app.clone(), self.conf.clone(), &self.ports, &name)?;
        let (validator, target) = match self.join(&mut fixture, &genesis, &opts).await {
            Ok(joined) => joined,
            Err(e) => {
                fixture.cleanup(&[]);
                self.state = ClusterState::Running;
                return Err(e.context(format!("adding {name} to {}", self.network_name)));
            }
        };
        self.fixtures.push(fixture);
        self.network.push(validator);
        self.state = ClusterState::JoiningNodeStarted;

        let height = self.network.wait_for_height_on(index, target).await?;
        info!("➕ {} joined {} at height {}", name, self.network_name, height);
        self.state = ClusterState::Running;
        Ok(index)
    }

    /// Initialises, wires and starts a joining node. Returns the validator and
    /// the height it has to reach.
    async fn join(
        &mut self,
        fixture: &mut NodeFixture<A>,
        genesis: &[u8],
        opts: &AddNodeOptions,
    ) -> Result<(A::Validator, u64)> {
        let name = fixture.name().to_string();
        fixture.init(&name, Some(self.chain_id.as_str()))?;
        fixture.write_genesis_bytes(genesis)?;
        self.state = ClusterState::JoiningNodeInitialized;

        let peers = peers_for(&fixture.node_id()?, self.network.validators())?;
        self.state = ClusterState::PeerWired;

        let target = self.network.latest_height().await?;
        let min_gas_prices = opts
            .min_gas_prices
            .clone()
            .unwrap_or_else(|| self.conf.min_gas_prices.clone());
        let validator = fixture
            .launch(&min_gas_prices, peers, opts.mempool_broadcast)
            .await?;
        Ok((validator, target))
    }

    pub fn fixture(&self, index: usize) -> Option<&NodeFixture<A>> {
        self.fixtures.get(index)
    }

    pub fn fixtures(&self) -> &[NodeFixture<A>] {
        &self.fixtures
    }

    pub fn validator(&self, index: usize) -> Option<&A::Validator> {
        self.network.validator(index)
    }

    pub fn network(&self) -> &Network<A::Validator> {
        &self.network
    }

    pub fn state(&self) -> ClusterState {
        self.state
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    pub fn staging_dir(&self) -> &std::path::Path {
        &self.staging_dir
    }

    pub fn genesis_content(&self) -> Option<&[u8]> {
        self.genesis_content.as_deref()
    }

    /// Persistent peers configured on node `index`.
    pub fn peers_of(&self, index: usize) -> Result<PeerList> {
        self.fixtures
            .get(index)
            .with_context(|| format!("no node at index {index}"))?
            .persistent_peers()
    }

    pub async fn wait_for_next_block(&self) -> Result<u64> {
        self.network.wait_for_next_block().await
    }

    /// Stops every validator and removes every home and the staging
    /// directory. Never fails; running it again is a no-op.
    pub async fn cleanup(&mut self) {
        if self.state == ClusterState::TornDown {
            return;
        }
        self.network.cleanup().await;
        for fixture in &self.fixtures {
            fixture.cleanup(&[]);
        }
        if self.staging_dir.exists() {
            let _ = std::fs::remove_dir_all(&self.staging_dir)
                .log_warn(format!("Removing staging dir of {}", self.network_name));
        }
        info!("🧹 Network {} torn down", self.network_name);
        self.state = ClusterState::TornDown;
    }
}

impl<A: ChainApp> Drop for FixtureGroup<A> {
    fn drop(&mut self) {
        if self.state == ClusterState::TornDown {
            return;
        }
        warn!(
            "Network {} dropped in state {} without cleanup",
            self.network_name, self.state
        );
        self.cancel.cancel();
        for fixture in &self.fixtures {
            fixture.cleanup(&[]);
        }
        let _ = std::fs::remove_dir_all(&self.staging_dir);
    }
}

fn describe_divergence(canonical: &GenesisDocument, other: &GenesisDocument) -> String {
    if canonical.chain_id != other.chain_id {
        return format!("chain id {} != {}", other.chain_id, canonical.chain_id);
    }
    if canonical.consensus_params != other.consensus_params {
        return "consensus params differ".to_string();
    }
    let modules: Vec<&str> = canonical
        .app_state
        .iter()
        .filter(|(module, state)| other.app_state.get(module.as_str()) != Some(*state))
        .map(|(module, _)| module.as_str())
        .chain(
            other
                .app_state
                .keys()
                .filter(|module| !canonical.app_state.contains_key(*module))
                .map(String::as_str),
        )
        .collect();
    format!("app state differs in {}", modules.join(", "))
}
