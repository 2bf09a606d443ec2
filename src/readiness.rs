//! Liveness probing with bounded exponential backoff, and the one wait
//! primitive every block-production wait goes through.

use std::{future::Future, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{error::InfrastructureFault, utils::conf::ReadinessConf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub factor: u32,
    pub probe_timeout: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from(&ReadinessConf::default())
    }
}

impl From<&ReadinessConf> for Backoff {
    fn from(conf: &ReadinessConf) -> Self {
        Self {
            max_attempts: conf.max_attempts,
            initial_delay: Duration::from_millis(conf.initial_delay_ms),
            factor: conf.backoff_factor,
            probe_timeout: Duration::from_millis(conf.probe_timeout_ms),
        }
    }
}

impl Backoff {
    /// Time slept when every attempt fails: 12.7s with the defaults.
    pub fn total_wait(&self) -> Duration {
        (0..self.max_attempts).map(|i| self.delay(i)).sum()
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.initial_delay * self.factor.saturating_pow(attempt)
    }
}

/// A liveness check against one endpoint.
pub trait Probe: Send + Sync {
    fn endpoint(&self) -> String;
    fn probe(&self) -> impl Future<Output = bool> + Send;
}

/// Ready once `GET <url>` answers with a success status.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// The block endpoint of a validator rpc server. It only answers 200 once
    /// a first block exists.
    pub fn block(rpc_port: u16) -> Self {
        Self::new(format!("http://127.0.0.1:{rpc_port}/block"))
    }
}

impl Probe for HttpProbe {
    fn endpoint(&self) -> String {
        self.url.clone()
    }

    async fn probe(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(res) => res.status().is_success(),
            Err(e) => {
                debug!("probe {} failed: {}", self.url, e);
                false
            }
        }
    }
}

/// Probes until success, sleeping `initial_delay * factor^n` after the n-th
/// failure. A probe still pending after `probe_timeout` is a failure. Running
/// out of attempts is fatal: the node is considered dead.
pub async fn wait_until_ready<P: Probe>(
    probe: &P,
    backoff: &Backoff,
) -> Result<Duration, InfrastructureFault> {
    let mut waited = Duration::ZERO;
    for attempt in 0..backoff.max_attempts {
        let ready = match tokio::time::timeout(backoff.probe_timeout, probe.probe()).await {
            Ok(ready) => ready,
            Err(_) => {
                debug!(
                    "{} gave no answer within {:?}",
                    probe.endpoint(),
                    backoff.probe_timeout
                );
                false
            }
        };
        if ready {
            info!(
                "✅ {} ready after {} attempt(s) ({:?})",
                probe.endpoint(),
                attempt + 1,
                waited
            );
            return Ok(waited);
        }
        let delay = backoff.delay(attempt);
        debug!(
            "⏰ {} not ready (attempt {}), retrying in {:?}",
            probe.endpoint(),
            attempt + 1,
            delay
        );
        tokio::time::sleep(delay).await;
        waited += delay;
    }
    Err(InfrastructureFault::ReadinessTimeout {
        endpoint: probe.endpoint(),
        attempts: backoff.max_attempts,
        waited,
    })
}

/// Awaits `fut` unless `timeout` elapses or `cancel` fires first.
pub async fn wait_for<T, F>(
    what: &str,
    timeout: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Result<T, InfrastructureFault>
where
    F: Future<Output = T>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(InfrastructureFault::Cancelled(what.to_string())),
        res = tokio::time::timeout(timeout, fut) => res.map_err(|_| InfrastructureFault::WaitTimeout {
            what: what.to_string(),
            after: timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    struct CountingProbe {
        calls: AtomicU32,
        ready_on: Option<u32>,
    }

    impl CountingProbe {
        fn new(ready_on: Option<u32>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                ready_on,
            }
        }
    }

    impl Probe for CountingProbe {
        fn endpoint(&self) -> String {
            "counting".to_string()
        }

        async fn probe(&self) -> bool {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.ready_on.is_some_and(|n| call >= n)
        }
    }

    #[test]
    fn default_backoff_waits_about_twelve_seconds() {
        assert_eq!(Backoff::default().total_wait(), Duration::from_millis(12_700));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn ready_on_third_attempt_waits_300ms() {
        let probe = CountingProbe::new(Some(3));
        let start = Instant::now();

        let waited = wait_until_ready(&probe, &Backoff::default()).await.unwrap();

        assert_eq!(waited, Duration::from_millis(300));
        assert_eq!(start.elapsed(), Duration::from_millis(300));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn immediately_ready_does_not_sleep() {
        let probe = CountingProbe::new(Some(1));
        let waited = wait_until_ready(&probe, &Backoff::default()).await.unwrap();
        assert_eq!(waited, Duration::ZERO);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn never_ready_fails_after_max_attempts() {
        let probe = CountingProbe::new(None);

        let err = wait_until_ready(&probe, &Backoff::default())
            .await
            .unwrap_err();

        assert_eq!(probe.calls.load(Ordering::SeqCst), 7);
        match err {
            InfrastructureFault::ReadinessTimeout {
                attempts, waited, ..
            } => {
                assert_eq!(attempts, 7);
                assert_eq!(waited, Duration::from_millis(12_700));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn http_probe_fails_on_closed_port() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(!HttpProbe::block(port).probe().await);
    }

    #[test_log::test(tokio::test)]
    async fn silent_endpoint_counts_as_a_failed_attempt() {
        // Accepted by the kernel backlog, never answered.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let backoff = Backoff {
            max_attempts: 2,
            initial_delay: Duration::from_millis(10),
            factor: 2,
            probe_timeout: Duration::from_millis(200),
        };

        let res = tokio::time::timeout(
            Duration::from_secs(5),
            wait_until_ready(&HttpProbe::block(port), &backoff),
        )
        .await
        .expect("readiness must give up on its own");

        match res.unwrap_err() {
            InfrastructureFault::ReadinessTimeout {
                attempts, waited, ..
            } => {
                assert_eq!(attempts, 2);
                assert_eq!(waited, Duration::from_millis(30));
            }
            other => panic!("unexpected error {other}"),
        }
        drop(listener);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn wait_for_times_out() {
        let cancel = CancellationToken::new();
        let err = wait_for(
            "next block",
            Duration::from_secs(5),
            &cancel,
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, InfrastructureFault::WaitTimeout { .. }));
    }

    #[test_log::test(tokio::test)]
    async fn wait_for_honours_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = wait_for(
            "next block",
            Duration::from_secs(5),
            &cancel,
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, InfrastructureFault::Cancelled(_)));
    }

    #[test_log::test(tokio::test)]
    async fn wait_for_returns_value() {
        let cancel = CancellationToken::new();
        let v = wait_for("value", Duration::from_secs(5), &cancel, async { 42 })
            .await
            .unwrap();
        assert_eq!(v, 42);
    }
}
