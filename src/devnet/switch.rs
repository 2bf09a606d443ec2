//! In-process stand-in for the p2p layer: validators register their height
//! feed here, and followers dial peers through it.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use anyhow::{bail, Context, Result};
use tokio::sync::watch;
use tracing::debug;

use crate::peers::PeerAddress;

#[derive(Debug, Clone)]
pub struct Registration {
    pub genesis_hash: String,
    /// `host:port` the node accepts connections on.
    pub p2p_addr: String,
    pub height: watch::Receiver<u64>,
}

#[derive(Debug, Default)]
pub struct Switch {
    nodes: Mutex<HashMap<String, Registration>>,
}

impl Switch {
    fn nodes(&self) -> MutexGuard<'_, HashMap<String, Registration>> {
        self.nodes.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, node_id: &str, registration: Registration) {
        debug!("Switch: {} listening on {}", node_id, registration.p2p_addr);
        self.nodes().insert(node_id.to_string(), registration);
    }

    pub fn unregister(&self, node_id: &str) {
        if self.nodes().remove(node_id).is_some() {
            debug!("Switch: {} left", node_id);
        }
    }

    pub fn is_registered(&self, node_id: &str) -> bool {
        self.nodes().contains_key(node_id)
    }

    /// Connects to `peer`, refusing peers running another genesis.
    pub fn dial(&self, peer: &PeerAddress, genesis_hash: &str) -> Result<watch::Receiver<u64>> {
        let nodes = self.nodes();
        let registration = nodes
            .get(&peer.node_id)
            .with_context(|| format!("peer {peer} is not reachable"))?;
        if registration.p2p_addr != peer.dial_addr() {
            bail!(
                "peer {} listens on {}, not {}",
                peer.node_id,
                registration.p2p_addr,
                peer.dial_addr()
            );
        }
        if registration.genesis_hash != genesis_hash {
            bail!(
                "peer {} runs genesis {} but ours is {}",
                peer.node_id,
                registration.genesis_hash,
                genesis_hash
            );
        }
        Ok(registration.height.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(id: &str, port: u16) -> PeerAddress {
        PeerAddress {
            node_id: id.to_string(),
            host: "127.0.0.1".to_string(),
            port,
        }
    }

    #[test]
    fn dial_checks_address_and_genesis() {
        let switch = Switch::default();
        let (tx, rx) = watch::channel(7u64);
        switch.register(
            "a",
            Registration {
                genesis_hash: "h1".to_string(),
                p2p_addr: "127.0.0.1:1000".to_string(),
                height: rx,
            },
        );

        assert_eq!(*switch.dial(&peer("a", 1000), "h1").unwrap().borrow(), 7);
        assert!(switch.dial(&peer("a", 1001), "h1").is_err());
        assert!(switch.dial(&peer("a", 1000), "h2").is_err());
        assert!(switch.dial(&peer("b", 1000), "h1").is_err());

        switch.unregister("a");
        assert!(!switch.is_registered("a"));
        drop(tx);
    }
}
