//! Persistent peer lists for nodes joining a running network.

use std::{fmt, str::FromStr};

use anyhow::{bail, Context, Result};
use reqwest::Url;
use tracing::info;

use crate::runtime::ValidatorHandle;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    pub node_id: String,
    pub host: String,
    pub port: u16,
}

impl PeerAddress {
    /// Builds the peer address of a validator from its advertised
    /// `tcp://host:port` p2p address.
    pub fn from_p2p_address(node_id: &str, p2p_address: &str) -> Result<Self> {
        let url = Url::parse(p2p_address)
            .with_context(|| format!("parsing p2p address {p2p_address:?} of {node_id}"))?;
        let host = url
            .host_str()
            .with_context(|| format!("p2p address {p2p_address:?} has no host"))?;
        let port = url
            .port()
            .with_context(|| format!("p2p address {p2p_address:?} has no port"))?;
        Ok(Self {
            node_id: node_id.to_string(),
            host: host.to_string(),
            port,
        })
    }

    pub fn dial_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.node_id, self.host, self.port)
    }
}

impl FromStr for PeerAddress {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (node_id, addr) = s
            .trim()
            .split_once('@')
            .with_context(|| format!("peer {s:?} is not id@host:port"))?;
        let (host, port) = addr
            .rsplit_once(':')
            .with_context(|| format!("peer {s:?} has no port"))?;
        if node_id.is_empty() || host.is_empty() {
            bail!("peer {s:?} is not id@host:port");
        }
        Ok(Self {
            node_id: node_id.to_string(),
            host: host.to_string(),
            port: port
                .parse()
                .with_context(|| format!("invalid port in peer {s:?}"))?,
        })
    }
}

/// Ordered peers, rendered as the comma separated `persistent_peers` value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerList(Vec<PeerAddress>);

impl PeerList {
    pub fn new(peers: Vec<PeerAddress>) -> Self {
        Self(peers)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.0.iter().any(|p| p.node_id == node_id)
    }

    pub fn node_ids(&self) -> Vec<&str> {
        self.0.iter().map(|p| p.node_id.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerAddress> {
        self.0.iter()
    }
}

impl fmt::Display for PeerList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let peers: Vec<String> = self.0.iter().map(PeerAddress::to_string).collect();
        f.write_str(&peers.join(","))
    }
}

impl FromStr for PeerList {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        s.split(',')
            .filter(|p| !p.trim().is_empty())
            .map(PeerAddress::from_str)
            .collect::<Result<Vec<_>>>()
            .map(PeerList)
    }
}

/// Peers of a node about to join: every running validator but itself.
pub fn peers_for<V: ValidatorHandle>(joining_node_id: &str, running: &[V]) -> Result<PeerList> {
    let peers = running
        .iter()
        .filter(|v| v.node_id() != joining_node_id)
        .map(|v| PeerAddress::from_p2p_address(v.node_id(), &v.p2p_address()))
        .collect::<Result<Vec<_>>>()?;
    let peers = PeerList(peers);
    info!("🔗 Peers for {}: [{}]", joining_node_id, peers);
    Ok(peers)
}
