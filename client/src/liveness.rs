use async_trait::async_trait;
use shardctl_cluster::LivenessTransport;
use shardctl_common::{Instance, Result, ShardCtlError};
use std::io::ErrorKind;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::trace;

/// Pings a tablet by opening a TCP connection to its management endpoint
#[derive(Debug, Default, Clone)]
pub struct TcpLivenessTransport;

impl TcpLivenessTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LivenessTransport for TcpLivenessTransport {
    async fn ping(&self, instance: &Instance, timeout: Duration) -> Result<()> {
        let address = format!("{}:{}", instance.tablet.hostname, instance.tablet.port);
        if instance.tablet.hostname.is_empty() || instance.tablet.port == 0 {
            return Err(ShardCtlError::InvalidInstanceKey {
                alias: instance.alias.clone(),
                key: address,
            });
        }

        let connect = TcpStream::connect(address.as_str());
        match tokio::time::timeout(timeout, connect).await {
            Ok(Ok(_stream)) => {
                trace!(alias = %instance.alias, %address, "tablet answered");
                Ok(())
            }
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                Err(ShardCtlError::ConnectionRefused { address })
            }
            Ok(Err(e)) => Err(ShardCtlError::Io(e)),
            Err(_) => Err(ShardCtlError::Timeout {
                operation: format!("ping {}", address),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}
