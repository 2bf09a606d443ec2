use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::{sync::watch, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::InfrastructureFault,
    genesis::{genesis_hash, GenesisDocument},
    runtime::{ValidatorConfig, ValidatorHandle},
};

use super::{
    rpc::{self, NodeInfo, RpcState},
    switch::{Registration, Switch},
};

/// An in-process validator. Without persistent peers it produces a block every
/// `timeout_commit`; otherwise it follows the first peer it can dial.
pub struct DevnetValidator {
    moniker: String,
    node_id: String,
    p2p_external: String,
    rpc_port: u16,
    height: watch::Receiver<u64>,
    switch: Arc<Switch>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl DevnetValidator {
    pub async fn start(config: ValidatorConfig, switch: Arc<Switch>) -> Result<Self> {
        if !config.genesis_file.exists() {
            return Err(InfrastructureFault::MissingGenesis(config.genesis_file.clone()).into());
        }
        let genesis_bytes = std::fs::read(&config.genesis_file)
            .with_context(|| format!("reading {}", config.genesis_file.display()))?;
        let genesis = GenesisDocument::from_slice(&genesis_bytes)?;
        genesis.validate()?;
        if genesis.chain_id != config.chain_id {
            bail!(
                "genesis is for chain {}, node is configured for {}",
                genesis.chain_id,
                config.chain_id
            );
        }
        let hash = genesis_hash(&genesis_bytes);

        let cancel = CancellationToken::new();
        // Stops whatever was spawned if starting fails half way.
        let guard = cancel.clone().drop_guard();
        let mut tasks = Vec::new();
        let (tx, height) = watch::channel(0u64);

        let upstream = if config.persistent_peers.is_empty() {
            tasks.push(tokio::spawn(produce_blocks(
                config.moniker.clone(),
                tx,
                config.timeout_commit,
                cancel.clone(),
            )));
            None
        } else {
            let upstream = dial_first_peer(&switch, &config, &hash)?;
            tasks.push(tokio::spawn(follow(
                config.moniker.clone(),
                upstream.clone(),
                tx,
                cancel.clone(),
            )));
            Some(upstream)
        };

        let listener = tokio::net::TcpListener::bind(&config.rpc_listen)
            .await
            .with_context(|| format!("binding rpc server of {}", config.moniker))?;
        let rpc_port = listener.local_addr()?.port();
        let state = RpcState {
            node_info: NodeInfo {
                id: config.node_id.clone(),
                moniker: config.moniker.clone(),
                network: config.chain_id.clone(),
                listen_addr: config.p2p_external.clone(),
            },
            genesis_hash: hash.clone(),
            min_gas_prices: config.min_gas_prices.clone(),
            mempool_broadcast: config.mempool_broadcast,
            height: height.clone(),
            upstream,
        };
        let shutdown = cancel.clone();
        let moniker = config.moniker.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, rpc::router(state))
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
            {
                error!("rpc server of {} stopped: {}", moniker, e);
            }
        }));

        switch.register(
            &config.node_id,
            Registration {
                genesis_hash: hash,
                p2p_addr: config.p2p_external.clone(),
                height: height.clone(),
            },
        );
        guard.disarm();
        info!(
            "Validator {} started, rpc on {}, p2p on {}",
            config.moniker, rpc_port, config.p2p_external
        );

        Ok(Self {
            moniker: config.moniker,
            node_id: config.node_id,
            p2p_external: config.p2p_external,
            rpc_port,
            height,
            switch,
            cancel,
            tasks,
        })
    }
}

fn dial_first_peer(
    switch: &Switch,
    config: &ValidatorConfig,
    genesis_hash: &str,
) -> Result<watch::Receiver<u64>> {
    let mut last_err = None;
    for peer in config.persistent_peers.iter() {
        match switch.dial(peer, genesis_hash) {
            Ok(upstream) => {
                debug!("{} dialed {}", config.moniker, peer);
                return Ok(upstream);
            }
            Err(e) => {
                warn!("{} cannot dial {}: {:#}", config.moniker, peer, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err
        .unwrap_or_else(|| anyhow::anyhow!("no persistent peer"))
        .context(format!("{} has no reachable peer", config.moniker)))
}

async fn produce_blocks(
    moniker: String,
    tx: watch::Sender<u64>,
    period: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                tx.send_modify(|height| *height += 1);
                debug!("{} produced block {}", moniker, *tx.borrow());
            }
        }
    }
}

async fn follow(
    moniker: String,
    mut upstream: watch::Receiver<u64>,
    tx: watch::Sender<u64>,
    cancel: CancellationToken,
) {
    loop {
        let latest = *upstream.borrow_and_update();
        tx.send_if_modified(|height| {
            if latest > *height {
                *height = latest;
                true
            } else {
                false
            }
        });
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = upstream.changed() => {
                if changed.is_err() {
                    warn!("{} lost its peer", moniker);
                    break;
                }
            }
        }
    }
}

impl ValidatorHandle for DevnetValidator {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn moniker(&self) -> &str {
        &self.moniker
    }

    fn p2p_address(&self) -> String {
        format!("tcp://{}", self.p2p_external)
    }

    fn rpc_address(&self) -> String {
        format!("http://127.0.0.1:{}", self.rpc_port)
    }

    async fn latest_height(&self) -> Result<u64> {
        Ok(*self.height.borrow())
    }

    async fn wait_for_next_block(&self) -> Result<u64> {
        let mut height = self.height.clone();
        let current = *height.borrow_and_update();
        loop {
            height
                .changed()
                .await
                .with_context(|| format!("validator {} stopped", self.moniker))?;
            let latest = *height.borrow_and_update();
            if latest > current {
                return Ok(latest);
            }
        }
    }

    async fn cleanup(&mut self) {
        self.cancel.cancel();
        self.switch.unregister(&self.node_id);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("task of {} failed: {}", self.moniker, e);
            }
        }
    }
}

impl Drop for DevnetValidator {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.switch.unregister(&self.node_id);
    }
}
