use crate::agent::LivenessTransport;
use metrics::counter;
use shardctl_common::Instance;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Bounded liveness checks against tablets
#[derive(Clone)]
pub struct HealthChecker {
    transport: Arc<dyn LivenessTransport>,
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(transport: Arc<dyn LivenessTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check if the tablet wrapping `instance` answers a ping within the timeout.
    ///
    /// The ping runs as its own task so that connection setup, which may
    /// retry with backoff inside the transport, is bounded too. On timeout the
    /// task is left to finish in the background and its result is dropped.
    pub async fn is_reachable(&self, instance: &Instance) -> bool {
        let transport = Arc::clone(&self.transport);
        let target = instance.clone();
        let timeout = self.timeout;
        let ping = tokio::spawn(async move { transport.ping(&target, timeout).await });

        match tokio::time::timeout(timeout, ping).await {
            Err(_) => {
                counter!("shardctl.probe.timeouts").increment(1);
                error!(
                    alias = %instance.alias,
                    host = %instance.tablet.hostname,
                    "Ping abort timeout {:?}", timeout
                );
                false
            }
            Ok(Ok(Ok(()))) => {
                debug!(alias = %instance.alias, "ping ok");
                true
            }
            Ok(Ok(Err(e))) => {
                counter!("shardctl.probe.failures").increment(1);
                error!(
                    alias = %instance.alias,
                    host = %instance.tablet.hostname,
                    error = %e,
                    "Ping error"
                );
                false
            }
            Ok(Err(join_error)) => {
                counter!("shardctl.probe.failures").increment(1);
                error!(alias = %instance.alias, error = %join_error, "ping task failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shardctl_common::{InstanceKey, Result, ShardCtlError, TabletInfo};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct SlowTransport {
        delay: Duration,
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl LivenessTransport for SlowTransport {
        async fn ping(&self, _instance: &Instance, _timeout: Duration) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct RefusingTransport;

    #[async_trait]
    impl LivenessTransport for RefusingTransport {
        async fn ping(&self, instance: &Instance, _timeout: Duration) -> Result<()> {
            Err(ShardCtlError::ConnectionRefused {
                address: instance.tablet.hostname.clone(),
            })
        }
    }

    fn instance() -> Instance {
        Instance::new(
            "zone1-100",
            InstanceKey::new("db1", 3306),
            TabletInfo {
                hostname: "db1".into(),
                port: 15100,
                ..Default::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_ping_is_bounded() {
        let finished = Arc::new(AtomicBool::new(false));
        let checker = HealthChecker::new(
            Arc::new(SlowTransport {
                delay: Duration::from_secs(30),
                finished: finished.clone(),
            }),
            Duration::from_secs(2),
        );

        let start = tokio::time::Instant::now();
        assert!(!checker.is_reachable(&instance()).await);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(2) && waited < Duration::from_secs(3));

        // The in-flight ping is detached, not cancelled.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_ping_is_reachable() {
        let checker = HealthChecker::new(
            Arc::new(SlowTransport {
                delay: Duration::from_millis(10),
                finished: Arc::new(AtomicBool::new(false)),
            }),
            Duration::from_secs(2),
        );
        assert!(checker.is_reachable(&instance()).await);
    }

    #[tokio::test]
    async fn test_ping_error_is_unreachable() {
        let checker = HealthChecker::new(Arc::new(RefusingTransport), Duration::from_secs(2));
        assert!(!checker.is_reachable(&instance()).await);
    }
}
