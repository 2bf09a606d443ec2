#![allow(unused)]

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use tempfile::TempDir;

use testnet_fixtures::{
    cluster::FixtureGroup,
    devnet::DevnetApp,
    fixture::NodeFixture,
    ports::PortAllocator,
    utils::conf::{FixtureConf, SharedConf},
};

/// Fast blocks and short waits, with every home under a scratch directory.
pub fn test_conf(home_root: &Path) -> FixtureConf {
    FixtureConf {
        home_root: home_root.to_path_buf(),
        timeout_commit_ms: 200,
        block_wait_timeout_secs: 10,
        barrier_timeout_secs: 10,
        ..FixtureConf::default()
    }
}

pub struct TestCtx {
    home_root: TempDir,
    pub conf: SharedConf,
}

impl TestCtx {
    pub fn new() -> Result<Self> {
        Self::with_conf(|_| {})
    }

    pub fn with_conf(tweak: impl FnOnce(&mut FixtureConf)) -> Result<Self> {
        let home_root = tempfile::Builder::new().prefix("testnet-").tempdir()?;
        let mut conf = test_conf(home_root.path());
        tweak(&mut conf);
        Ok(Self {
            home_root,
            conf: Arc::new(conf),
        })
    }

    pub fn home_root(&self) -> &Path {
        self.home_root.path()
    }

    pub fn ports(&self) -> Arc<PortAllocator> {
        PortAllocator::process_wide(&self.conf)
    }

    pub fn group(&self, test_name: &str) -> Result<FixtureGroup<DevnetApp>> {
        FixtureGroup::new(DevnetApp::default(), self.conf.clone(), test_name)
    }

    pub async fn cluster(&self, test_name: &str, n: usize) -> Result<FixtureGroup<DevnetApp>> {
        FixtureGroup::init(DevnetApp::default(), self.conf.clone(), test_name, n).await
    }

    pub fn single(&self, test_name: &str) -> Result<NodeFixture<DevnetApp>> {
        NodeFixture::init_fixtures(
            DevnetApp::default(),
            self.conf.clone(),
            &self.ports(),
            test_name,
        )
    }
}

/// Every entry left under `dir`.
pub fn leftovers(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok().map(|e| e.path())).collect())
        .unwrap_or_default()
}
