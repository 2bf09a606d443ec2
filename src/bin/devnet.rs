use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use testnet_fixtures::{
    cluster::FixtureGroup,
    devnet::DevnetApp,
    fixture::AddNodeOptions,
    runtime::ValidatorHandle,
    utils::{
        conf::FixtureConf,
        logger::{setup_tracing, TracingMode},
    },
};
use tracing::{error, info};

/// Runs a local devnet until Ctrl-C
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Number of validators
    #[arg(short, long)]
    pub nodes: Option<usize>,

    /// Full nodes to add once the validators run
    #[arg(long, default_value_t = 0)]
    pub add_nodes: usize,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub config_file: Option<String>,

    #[arg(long)]
    pub min_gas_prices: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut conf = FixtureConf::new(args.config_file).context("reading config file")?;
    if let Some(min_gas_prices) = args.min_gas_prices {
        conf.min_gas_prices = min_gas_prices;
    }
    let nodes = args.nodes.unwrap_or(conf.group_size);
    let name = args.name.unwrap_or_else(|| "devnet".to_string());

    setup_tracing(TracingMode::from_log_format(&conf.log_format), name.clone())
        .context("setting up tracing")?;
    info!("Starting devnet {} with {} node(s)", name, nodes);

    let mut group = FixtureGroup::init(DevnetApp::default(), Arc::new(conf), &name, nodes).await?;
    if let Err(e) = run(&mut group, args.add_nodes).await {
        error!("devnet failed: {:#}", e);
        group.cleanup().await;
        return Err(e);
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("Ctrl-C received, tearing down");
    group.cleanup().await;
    Ok(())
}

async fn run(group: &mut FixtureGroup<DevnetApp>, add_nodes: usize) -> Result<()> {
    group.start_cluster().await?;
    for _ in 0..add_nodes {
        group.add_full_node(AddNodeOptions::default()).await?;
    }

    for (index, validator) in group.network().validators().iter().enumerate() {
        info!(
            "{} ({}): rpc {}, p2p {}",
            validator.moniker(),
            index,
            validator.rpc_address(),
            validator.p2p_address()
        );
    }
    let last = group.fixtures().len().saturating_sub(1);
    info!("Persistent peers of the last node: [{}]", group.peers_of(last)?);
    Ok(())
}
