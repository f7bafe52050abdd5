use ::config::{Config, Environment, File, FileFormat, Map};
use serde::{Deserialize, Serialize};
use shardctl_client::ClientConfig;
use shardctl_cluster::ControllerConfig;
use shardctl_common::{
    Instance, InstanceKey, Result, ShardCtlError, ShardIdentity, ShardRoster, TabletInfo,
    TabletType, DEFAULT_KEYSPACE, DEFAULT_SHARD,
};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Prefix of environment overrides, e.g. `SHARDCTL_LOG__LEVEL=debug`
pub const ENV_PREFIX: &str = "SHARDCTL";

/// Daemon configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardctlConfig {
    pub controller: ControllerSection,
    pub http: HttpSection,
    pub metrics: MetricsSection,
    pub log: LogSection,
    pub agent: ClientConfig,
    pub shards: Vec<ShardSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSection {
    /// Generated at startup when unset
    pub controller_id: Option<Uuid>,
    pub scan_interval_ms: u64,
    pub ping_tablet_timeout_ms: u64,
    pub refresh_roster_interval_ms: u64,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            controller_id: None,
            scan_interval_ms: 5_000,
            ping_tablet_timeout_ms: 2_000,
            refresh_roster_interval_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    pub listen_addr: String,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:15999".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    /// Prometheus exporter address; no exporter when unset
    pub listen_addr: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// One statically configured shard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardSection {
    #[serde(default = "default_keyspace")]
    pub keyspace: String,
    #[serde(default = "default_shard")]
    pub shard: String,
    /// Alias of the tablet recorded as primary
    #[serde(default)]
    pub primary: Option<String>,
    #[serde(default)]
    pub instances: Vec<InstanceSection>,
}

fn default_keyspace() -> String {
    DEFAULT_KEYSPACE.to_string()
}

fn default_shard() -> String {
    DEFAULT_SHARD.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSection {
    pub alias: String,
    /// Database host and port
    pub host: String,
    pub port: u16,
    /// Tablet endpoint; the database host when unset
    #[serde(default)]
    pub tablet_host: Option<String>,
    pub tablet_port: u16,
}

impl ShardSection {
    pub fn identity(&self) -> ShardIdentity {
        ShardIdentity::new(self.keyspace.clone(), self.shard.clone())
    }

    pub fn roster(&self) -> ShardRoster {
        let instances = self
            .instances
            .iter()
            .map(|i| {
                let tablet_type = if self.primary.as_deref() == Some(i.alias.as_str()) {
                    TabletType::Primary
                } else {
                    TabletType::Replica
                };
                Instance::new(
                    i.alias.clone(),
                    InstanceKey::new(i.host.clone(), i.port),
                    TabletInfo {
                        hostname: i.tablet_host.clone().unwrap_or_else(|| i.host.clone()),
                        port: i.tablet_port,
                        tablet_type,
                    },
                )
            })
            .collect();
        ShardRoster::new(instances, self.primary.clone())
    }
}

impl ShardctlConfig {
    /// Load defaults, then the YAML file if given, then `SHARDCTL_*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// As `load`, reading overrides from `env` instead of the process environment
    pub fn load_with_env(path: Option<&Path>, env: Option<Map<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ShardCtlError::Configuration {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(ShardCtlError::Configuration { message });

        if self.controller.scan_interval_ms == 0 {
            return invalid("controller.scan_interval_ms must be greater than 0".into());
        }
        if self.controller.ping_tablet_timeout_ms == 0 {
            return invalid("controller.ping_tablet_timeout_ms must be greater than 0".into());
        }
        if self.controller.refresh_roster_interval_ms == 0 {
            return invalid("controller.refresh_roster_interval_ms must be greater than 0".into());
        }
        self.agent.validate()?;

        let mut identities = HashSet::new();
        for shard in &self.shards {
            let identity = shard.identity();
            if !identities.insert(identity.clone()) {
                return invalid(format!("shard {} configured twice", identity));
            }
            let mut aliases = HashSet::new();
            for instance in &shard.instances {
                if !aliases.insert(instance.alias.as_str()) {
                    return invalid(format!("{}: duplicate tablet alias {}", identity, instance.alias));
                }
            }
            if let Some(primary) = &shard.primary {
                if !aliases.contains(primary.as_str()) {
                    return invalid(format!("{}: primary {} is not a configured tablet", identity, primary));
                }
            }
        }
        Ok(())
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            controller_id: self.controller.controller_id.unwrap_or_else(Uuid::new_v4),
            scan_interval: Duration::from_millis(self.controller.scan_interval_ms),
            refresh_roster_interval: Duration::from_millis(self.controller.refresh_roster_interval_ms),
            ping_tablet_timeout: Duration::from_millis(self.controller.ping_tablet_timeout_ms),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| ShardCtlError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
controller:
  scan_interval_ms: 1000
http:
  listen_addr: "127.0.0.1:8080"
shards:
  - keyspace: commerce
    shard: "0"
    primary: zone1-100
    instances:
      - { alias: zone1-100, host: db1, port: 3306, tablet_port: 15100 }
      - { alias: zone1-101, host: db2, port: 3306, tablet_host: tablet2, tablet_port: 15100 }
"#;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = ShardctlConfig::load_with_env(None, Some(Map::new())).unwrap();
        assert_eq!(config, ShardctlConfig::default());
        let controller = config.controller_config();
        assert_eq!(controller.scan_interval, Duration::from_secs(5));
        assert_eq!(controller.ping_tablet_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_load_yaml() {
        let file = write_config(SAMPLE);
        let config = ShardctlConfig::load_with_env(Some(file.path()), Some(Map::new())).unwrap();

        assert_eq!(config.controller.scan_interval_ms, 1000);
        // Unset keys keep their defaults.
        assert_eq!(config.controller.ping_tablet_timeout_ms, 2000);
        assert_eq!(config.http.listen_addr, "127.0.0.1:8080");

        let shard = &config.shards[0];
        assert_eq!(shard.identity().to_string(), "commerce/0");
        let roster = shard.roster();
        assert_eq!(roster.primary().unwrap().tablet.tablet_type, TabletType::Primary);
        let replica = roster.find_by_alias("zone1-101").unwrap();
        assert_eq!(replica.tablet.hostname, "tablet2");
        assert_eq!(roster.find_by_alias("zone1-100").unwrap().tablet.hostname, "db1");
    }

    #[test]
    fn test_env_overrides_file() {
        let file = write_config(SAMPLE);
        let mut env = Map::new();
        env.insert("SHARDCTL_CONTROLLER__SCAN_INTERVAL_MS".to_string(), "250".to_string());
        env.insert("SHARDCTL_LOG__LEVEL".to_string(), "debug".to_string());

        let config = ShardctlConfig::load_with_env(Some(file.path()), Some(env)).unwrap();
        assert_eq!(config.controller.scan_interval_ms, 250);
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn test_rejects_bad_config() {
        let file = write_config(
            r#"
shards:
  - keyspace: commerce
    primary: zone1-999
    instances:
      - { alias: zone1-100, host: db1, port: 3306, tablet_port: 15100 }
"#,
        );
        let err = ShardctlConfig::load_with_env(Some(file.path()), Some(Map::new())).unwrap_err();
        assert!(err.to_string().contains("zone1-999"));

        let mut env = Map::new();
        env.insert("SHARDCTL_CONTROLLER__SCAN_INTERVAL_MS".to_string(), "0".to_string());
        assert!(ShardctlConfig::load_with_env(None, Some(env)).is_err());

        let missing = std::path::PathBuf::from("/nonexistent/shardctl.yaml");
        assert!(ShardctlConfig::load_with_env(Some(&missing), Some(Map::new())).is_err());
    }

    #[test]
    fn test_yaml_dump_round_trips() {
        let file = write_config(SAMPLE);
        let config = ShardctlConfig::load_with_env(Some(file.path()), Some(Map::new())).unwrap();
        let dumped = write_config(&config.to_yaml().unwrap());
        let reloaded = ShardctlConfig::load_with_env(Some(dumped.path()), Some(Map::new())).unwrap();
        assert_eq!(reloaded, config);
    }
}
