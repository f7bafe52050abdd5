use crate::{ClientConfig, GLOBAL_VIEW_PATH, LOCAL_VIEW_PATH};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use shardctl_cluster::DbAgent;
use shardctl_common::{ConsensusGlobalView, ConsensusLocalView, Instance, Result, ShardCtlError};
use std::error::Error as StdError;
use tracing::{debug, instrument};

/// Database agent querying each tablet's consensus debug endpoints over HTTP
pub struct RestDbAgent {
    http: reqwest::Client,
    config: ClientConfig,
}

impl RestDbAgent {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ShardCtlError::Network {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn get_json<T: DeserializeOwned>(&self, instance: &Instance, path: &str) -> Result<T> {
        if !instance.key.is_valid() {
            return Err(ShardCtlError::InvalidInstanceKey {
                alias: instance.alias.clone(),
                key: instance.key.to_string(),
            });
        }

        let address = format!("{}:{}", instance.tablet.hostname, instance.tablet.port);
        let url = format!("http://{}{}", address, path);
        debug!(alias = %instance.alias, %url, "querying tablet");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| map_request_error(e, &address, self.config.timeout_ms))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ShardCtlError::Network {
                message: format!("{} returned {}", url, status),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ShardCtlError::Serialization(format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl DbAgent for RestDbAgent {
    #[instrument(skip(self, instance), fields(alias = %instance.alias))]
    async fn fetch_local_view(&self, instance: &Instance) -> Result<ConsensusLocalView> {
        self.get_json(instance, LOCAL_VIEW_PATH).await
    }

    #[instrument(skip(self, leader, _local), fields(leader = %leader.alias))]
    async fn fetch_global_view(
        &self,
        leader: &Instance,
        _local: &ConsensusLocalView,
    ) -> Result<ConsensusGlobalView> {
        self.get_json(leader, GLOBAL_VIEW_PATH).await
    }
}

/// Translate a transport failure into an error that keeps the
/// reachability signature intact.
fn map_request_error(e: reqwest::Error, address: &str, timeout_ms: u64) -> ShardCtlError {
    if e.is_timeout() {
        return ShardCtlError::Timeout {
            operation: format!("request to {}", address),
            timeout_ms,
        };
    }

    let chain = error_chain(&e);
    if e.is_connect() {
        let lowered = chain.to_lowercase();
        if lowered.contains("dns error") || lowered.contains("failed to lookup address") {
            let host = address.rsplit_once(':').map(|(h, _)| h).unwrap_or(address);
            return ShardCtlError::UnknownHost { host: host.to_string() };
        }
        if lowered.contains("connection refused") {
            return ShardCtlError::ConnectionRefused {
                address: address.to_string(),
            };
        }
    }

    ShardCtlError::Network { message: chain }
}

// reqwest's own message hides the io error underneath.
fn error_chain(e: &reqwest::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
