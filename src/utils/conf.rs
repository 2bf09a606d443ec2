use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReadinessConf {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: u32,
    /// A probe that gets no answer within this delay counts as failed.
    pub probe_timeout_ms: u64,
}

impl Default for ReadinessConf {
    fn default() -> Self {
        Self {
            max_attempts: 7,
            initial_delay_ms: 100,
            backoff_factor: 2,
            probe_timeout_ms: 2000,
        }
    }
}

pub type SharedConf = Arc<FixtureConf>;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FixtureConf {
    /// Ports are leased starting right after this one.
    pub base_port: u16,
    /// Leases must stay strictly below this value (ip_local_port_range min).
    pub port_ceiling: u16,
    /// Every fixture home is created under this directory.
    pub home_root: PathBuf,
    pub node_name_prefix: String,
    pub network_name_prefix: String,
    pub group_size: usize,
    pub bond_denom: String,
    pub gentx_stake: u64,
    pub start_coins: String,
    pub min_gas_prices: String,
    pub timeout_commit_ms: u64,
    pub readiness: ReadinessConf,
    pub block_wait_timeout_secs: u64,
    pub barrier_timeout_secs: u64,
    pub log_format: String,
}

impl Default for FixtureConf {
    fn default() -> Self {
        Self {
            base_port: 26656,
            port_ceiling: 32768,
            home_root: std::env::temp_dir().join("testnet-fixtures"),
            node_name_prefix: "node".to_string(),
            network_name_prefix: "devnet-testnet-".to_string(),
            group_size: 4,
            bond_denom: "stake".to_string(),
            gentx_stake: 100_000_000,
            start_coins: "1000000000000fee2t,1000000000000feet,1000000000foot,150000000stake"
                .to_string(),
            min_gas_prices: String::new(),
            timeout_commit_ms: 1000,
            readiness: ReadinessConf::default(),
            block_wait_timeout_secs: 30,
            barrier_timeout_secs: 30,
            log_format: "full".to_string(),
        }
    }
}

impl FixtureConf {
    pub fn new(config_file: Option<String>) -> Result<Self, ConfigError> {
        // Priority order: built-in defaults, then config file, then environment variables
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Some(config_file) = config_file {
            builder = builder.add_source(File::with_name(config_file.as_str()));
        }
        let s = builder
            .add_source(
                Environment::with_prefix("testnet")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    pub fn new_shared(config_file: Option<String>) -> Result<SharedConf, ConfigError> {
        Self::new(config_file).map(Arc::new)
    }

    pub fn timeout_commit(&self) -> Duration {
        Duration::from_millis(self.timeout_commit_ms)
    }

    pub fn block_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.block_wait_timeout_secs)
    }

    pub fn barrier_timeout(&self) -> Duration {
        Duration::from_secs(self.barrier_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_survive_a_round_trip_through_config() {
        let conf = FixtureConf::new(None).unwrap();
        assert_eq!(conf.readiness, ReadinessConf::default());
        assert_eq!(conf.port_ceiling, 32768);
        assert_eq!(conf.bond_denom, "stake");
    }

    #[test]
    fn file_overrides_defaults() {
        let tmpdir = tempfile::Builder::new().tempdir().unwrap();
        let file = tmpdir.path().join("fixtures.toml");
        std::fs::write(
            &file,
            "base_port = 40000\nport_ceiling = 41000\n[readiness]\nmax_attempts = 3\n",
        )
        .unwrap();

        let conf = FixtureConf::new(Some(file.to_string_lossy().into_owned())).unwrap();
        assert_eq!(conf.base_port, 40000);
        assert_eq!(conf.port_ceiling, 41000);
        assert_eq!(conf.readiness.max_attempts, 3);
        assert_eq!(conf.readiness.initial_delay_ms, 100);
        assert_eq!(conf.group_size, 4);
    }
}
