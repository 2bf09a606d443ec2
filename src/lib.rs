//! # testnet-fixtures
//!
//! *Ephemeral validator networks for integration tests.*
//!
//! This crate provisions isolated validator homes, builds and converges a shared
//! genesis across them, wires persistent peers, starts validators and waits for
//! them to produce blocks. The consensus engine, the keyring and the command
//! layer are collaborators reached through the traits in [`runtime`],
//! [`keyring`] and [`command`].
//!
//! An in-process implementation of those collaborators lives in [`devnet`], so a
//! whole cluster can run inside a single test process:
//!
//! ```rust,ignore
//! let mut group = FixtureGroup::init(DevnetApp::default(), conf, "my_test", 4).await?;
//! group.start_cluster().await?;
//! let joining = group.add_full_node(AddNodeOptions::default()).await?;
//! group.cleanup().await;
//! ```

pub mod barrier;
pub mod cluster;
pub mod command;
pub mod devnet;
pub mod error;
pub mod fixture;
pub mod genesis;
pub mod identity;
pub mod keyring;
pub mod peers;
pub mod ports;
pub mod readiness;
pub mod runtime;
pub mod utils;
