//! Error classes of the orchestrator.
//!
//! Two families travel inside `anyhow::Error` chains and can be recovered with
//! `downcast_ref`:
//!
//! * [`InfrastructureFault`]: the network under test is missing or inconsistent.
//!   Callers must abort the test instead of continuing.
//! * [`CollaboratorError`]: a collaborator command returned an error. This is an
//!   ordinary result value that tests are expected to assert on.

use std::{path::PathBuf, time::Duration};

use crate::ports::PortRole;

#[derive(Debug, thiserror::Error)]
pub enum InfrastructureFault {
    #[error("port {port} for {role} is not below the ephemeral port range start {ceiling}")]
    PortExhausted {
        role: PortRole,
        port: u32,
        ceiling: u16,
    },
    #[error("{endpoint} not ready after {attempts} attempts ({waited:?} waited)")]
    ReadinessTimeout {
        endpoint: String,
        attempts: u32,
        waited: Duration,
    },
    #[error("gentx barrier violated: {present} of {expected} records, missing {missing:?}")]
    BarrierViolation {
        expected: usize,
        present: usize,
        missing: Vec<String>,
    },
    #[error("genesis file missing at {0}")]
    MissingGenesis(PathBuf),
    #[error("merged genesis of {node} diverges from {canonical}: {reason}")]
    GenesisDivergence {
        node: String,
        canonical: String,
        reason: String,
    },
    #[error("timed out after {after:?} waiting for {what}")]
    WaitTimeout { what: String, after: Duration },
    #[error("wait for {0} cancelled")]
    Cancelled(String),
    #[error("cluster cannot go from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// A collaborator command that returned an error.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed: {cause:#}")]
pub struct CollaboratorError {
    pub operation: String,
    pub cause: anyhow::Error,
}

impl CollaboratorError {
    pub fn new(operation: impl Into<String>, cause: anyhow::Error) -> Self {
        Self {
            operation: operation.into(),
            cause,
        }
    }
}

/// True when any error in the chain is an [`InfrastructureFault`].
pub fn is_infrastructure_fault(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<InfrastructureFault>().is_some())
}
