//! Rendezvous of gentx producers before genesis collection.

use std::{
    collections::BTreeSet,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use tokio::sync::Notify;
use tracing::debug;

use crate::error::InfrastructureFault;

#[derive(Debug, Default)]
struct Reports {
    arrived: BTreeSet<String>,
    failed: BTreeSet<String>,
}

/// Completes once every expected node reported its gentx. A producer that
/// reports a failure breaks the barrier for good.
#[derive(Debug)]
pub struct GentxLatch {
    expected: BTreeSet<String>,
    reports: Mutex<Reports>,
    notify: Notify,
}

impl GentxLatch {
    pub fn new<I, S>(expected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            expected: expected.into_iter().map(Into::into).collect(),
            reports: Mutex::new(Reports::default()),
            notify: Notify::new(),
        }
    }

    fn reports(&self) -> MutexGuard<'_, Reports> {
        self.reports.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records the gentx of `name`. Unknown names are ignored.
    pub fn arrive(&self, name: &str) {
        if !self.expected.contains(name) {
            debug!("Ignoring gentx of unexpected node {}", name);
            return;
        }
        let complete = {
            let mut reports = self.reports();
            reports.arrived.insert(name.to_string());
            reports.arrived.len() == self.expected.len()
        };
        debug!("Gentx of {} arrived", name);
        if complete {
            self.notify.notify_waiters();
        }
    }

    /// Records that `name` will never produce its gentx.
    pub fn fail(&self, name: &str) {
        self.reports().failed.insert(name.to_string());
        self.notify.notify_waiters();
    }

    pub fn expected(&self) -> usize {
        self.expected.len()
    }

    pub fn present(&self) -> usize {
        self.reports().arrived.len()
    }

    pub fn is_complete(&self) -> bool {
        self.present() == self.expected.len()
    }

    fn is_broken(&self) -> bool {
        !self.reports().failed.is_empty()
    }

    pub fn missing(&self) -> Vec<String> {
        let reports = self.reports();
        self.expected.difference(&reports.arrived).cloned().collect()
    }

    /// Fails with a barrier violation unless every record is present.
    pub fn check(&self) -> Result<(), InfrastructureFault> {
        if self.is_complete() {
            return Ok(());
        }
        Err(self.violation())
    }

    /// Waits until complete. Fails with a barrier violation as soon as a
    /// producer failed, or after `timeout`.
    pub async fn wait(&self, timeout: Duration) -> Result<(), InfrastructureFault> {
        let waited = tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.is_complete() || self.is_broken() {
                    return;
                }
                notified.await;
            }
        })
        .await;
        match waited {
            Ok(()) => self.check(),
            Err(_) => Err(self.violation()),
        }
    }

    fn violation(&self) -> InfrastructureFault {
        InfrastructureFault::BarrierViolation {
            expected: self.expected.len(),
            present: self.present(),
            missing: self.missing(),
        }
    }
}
