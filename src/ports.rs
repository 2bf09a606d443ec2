//! Collision-free port leases for fixtures sharing one test process.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, OnceLock,
    },
};

use tracing::{debug, warn};

use crate::{error::InfrastructureFault, utils::conf::FixtureConf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortRole {
    P2p,
    Rpc,
    Grpc,
}

impl fmt::Display for PortRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PortRole::P2p => "p2p",
            PortRole::Rpc => "rpc",
            PortRole::Grpc => "grpc",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortLease {
    pub port: u16,
    pub role: PortRole,
}

impl PortLease {
    /// `tcp://0.0.0.0:<port>`, the listen form used for p2p and rpc.
    pub fn tcp_listen_addr(&self) -> String {
        format!("tcp://0.0.0.0:{}", self.port)
    }

    /// `0.0.0.0:<port>`, the listen form used for grpc.
    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    pub fn local_addr(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }
}

/// Hands out ports from a single monotonically increasing counter.
///
/// Leases are never returned: a port stays with its fixture for the lifetime of
/// the test process.
#[derive(Debug)]
pub struct PortAllocator {
    next: AtomicU32,
    base_port: u16,
    ceiling: u16,
}

static PROCESS_WIDE: OnceLock<Arc<PortAllocator>> = OnceLock::new();

impl PortAllocator {
    pub fn new(base_port: u16, ceiling: u16) -> Self {
        Self {
            next: AtomicU32::new(base_port as u32),
            base_port,
            ceiling,
        }
    }

    pub fn from_conf(conf: &FixtureConf) -> Self {
        Self::new(conf.base_port, conf.port_ceiling)
    }

    /// The allocator shared by every fixture of this process. The first caller
    /// decides the port range; a fixture or group that needs its own range
    /// takes an explicit allocator instead (`FixtureGroup::with_ports`).
    pub fn process_wide(conf: &FixtureConf) -> Arc<PortAllocator> {
        let allocator = PROCESS_WIDE
            .get_or_init(|| Arc::new(Self::from_conf(conf)))
            .clone();
        if allocator.range() != (conf.base_port, conf.port_ceiling) {
            warn!(
                "Process wide ports already lease from {:?}, ignoring {:?}",
                allocator.range(),
                (conf.base_port, conf.port_ceiling)
            );
        }
        allocator
    }

    /// `(base_port, ceiling)`
    pub fn range(&self) -> (u16, u16) {
        (self.base_port, self.ceiling)
    }

    pub fn lease(&self, role: PortRole) -> Result<PortLease, InfrastructureFault> {
        let port = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        if port >= self.ceiling as u32 {
            return Err(InfrastructureFault::PortExhausted {
                role,
                port,
                ceiling: self.ceiling,
            });
        }
        debug!("Leased {} port {}", role, port);
        Ok(PortLease {
            port: port as u16,
            role,
        })
    }
}

/// The three ports every node fixture holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePorts {
    pub rpc: PortLease,
    pub p2p: PortLease,
    pub grpc: PortLease,
}

impl NodePorts {
    pub fn lease(allocator: &PortAllocator) -> Result<Self, InfrastructureFault> {
        Ok(Self {
            rpc: allocator.lease(PortRole::Rpc)?,
            p2p: allocator.lease(PortRole::P2p)?,
            grpc: allocator.lease(PortRole::Grpc)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn leases_are_sequential() {
        let ports = PortAllocator::new(26656, 32768);
        assert_eq!(ports.lease(PortRole::Rpc).unwrap().port, 26657);
        assert_eq!(ports.lease(PortRole::P2p).unwrap().port, 26658);
        let grpc = ports.lease(PortRole::Grpc).unwrap();
        assert_eq!(grpc.port, 26659);
        assert_eq!(grpc.listen_addr(), "0.0.0.0:26659");
    }

    #[test]
    fn ceiling_is_fatal() {
        let ports = PortAllocator::new(32765, 32768);
        assert!(ports.lease(PortRole::P2p).is_ok());
        assert!(ports.lease(PortRole::P2p).is_ok());
        let err = ports.lease(PortRole::Rpc).unwrap_err();
        assert!(matches!(
            err,
            InfrastructureFault::PortExhausted { port: 32768, .. }
        ));
        // Exhaustion is permanent.
        assert!(ports.lease(PortRole::Rpc).is_err());
    }

    #[test]
    fn concurrent_leases_are_unique_and_ordered_per_caller() {
        let ports = Arc::new(PortAllocator::new(10000, 32768));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ports = ports.clone();
                std::thread::spawn(move || {
                    (0..200)
                        .map(|_| ports.lease(PortRole::P2p).unwrap().port)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            let leased = handle.join().unwrap();
            assert!(leased.windows(2).all(|w| w[0] < w[1]));
            for port in leased {
                assert!(all.insert(port), "port {port} leased twice");
            }
        }
        assert_eq!(all.len(), 1600);
    }

    #[test]
    fn node_ports_are_distinct() {
        let ports = PortAllocator::new(20000, 32768);
        let a = NodePorts::lease(&ports).unwrap();
        let b = NodePorts::lease(&ports).unwrap();
        let set: HashSet<u16> = [a.rpc, a.p2p, a.grpc, b.rpc, b.p2p, b.grpc]
            .iter()
            .map(|l| l.port)
            .collect();
        assert_eq!(set.len(), 6);
    }

    #[test]
    fn process_wide_keeps_the_first_range() {
        let first = FixtureConf {
            base_port: 40000,
            port_ceiling: 41000,
            ..FixtureConf::default()
        };
        let later = FixtureConf {
            base_port: 50000,
            port_ceiling: 51000,
            ..FixtureConf::default()
        };

        let a = PortAllocator::process_wide(&first);
        let b = PortAllocator::process_wide(&later);

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.range(), (40000, 41000));
        let lease = b.lease(PortRole::Rpc).unwrap();
        assert!(lease.port > 40000 && lease.port < 41000);
    }
}
