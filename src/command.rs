//! One capability to run any collaborator command against a node.

use std::{future::Future, path::PathBuf};

use anyhow::Result;

/// What a command needs to know about the node it targets.
#[derive(Clone, Debug)]
pub struct CommandContext {
    pub home: PathBuf,
    pub chain_id: String,
    pub moniker: String,
    /// `host:port` of the node rpc server.
    pub rpc_addr: String,
}

/// Runs a named operation (`"status"`, `"query balances"`, ...) with its flags
/// and returns the raw output. Callers never branch on the operation.
pub trait CommandRunner: Clone + Send + Sync + 'static {
    fn run(
        &self,
        ctx: &CommandContext,
        operation: &str,
        flags: &[String],
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;
}
