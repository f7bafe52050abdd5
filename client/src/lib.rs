pub mod agent;
pub mod liveness;

pub use agent::RestDbAgent;
pub use liveness::TcpLivenessTransport;

use serde::{Deserialize, Serialize};
use shardctl_common::{Result, ShardCtlError};
use std::time::Duration;

/// Path on the tablet endpoint serving the node's own consensus state
pub const LOCAL_VIEW_PATH: &str = "/debug/consensus/local";

/// Path on the leader's tablet endpoint serving the shard-wide view
pub const GLOBAL_VIEW_PATH: &str = "/debug/consensus/global";

/// Settings shared by the HTTP agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Whole-request timeout
    pub timeout_ms: u64,
    /// Connection setup timeout
    pub connect_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            connect_timeout_ms: 1_000,
            user_agent: format!("shardctl/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(ShardCtlError::Configuration {
                message: "request timeout must be greater than 0".into(),
            });
        }
        if self.connect_timeout_ms == 0 || self.connect_timeout_ms > self.timeout_ms {
            return Err(ShardCtlError::Configuration {
                message: "connect timeout must be in 1..=request timeout".into(),
            });
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(ClientConfig::default().validate().is_ok());

        let zero = ClientConfig {
            timeout_ms: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let inverted = ClientConfig {
            timeout_ms: 100,
            connect_timeout_ms: 200,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());
    }
}
