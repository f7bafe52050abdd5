use serde::{Deserialize, Serialize};
use std::fmt;

/// Keyspace used when none is configured
pub const DEFAULT_KEYSPACE: &str = "_vt";

/// Shard name used for unsharded keyspaces
pub const DEFAULT_SHARD: &str = "0";

/// Logical shard identity: (keyspace, shard)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardIdentity {
    pub keyspace: String,
    pub shard: String,
}

impl ShardIdentity {
    pub fn new(keyspace: impl Into<String>, shard: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            shard: shard.into(),
        }
    }
}

impl Default for ShardIdentity {
    fn default() -> Self {
        Self::new(DEFAULT_KEYSPACE, DEFAULT_SHARD)
    }
}

impl fmt::Display for ShardIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.keyspace, self.shard)
    }
}

/// Network location of a database node
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceKey {
    pub hostname: String,
    pub port: u16,
}

impl InstanceKey {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }

    /// A key is usable only when both host and port are populated.
    /// Crashed tablets often report neither.
    pub fn is_valid(&self) -> bool {
        !self.hostname.is_empty() && self.port != 0
    }

    pub fn matches(&self, host: &str, port: u16) -> bool {
        self.hostname == host && self.port == port
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

/// Role a tablet is registered with in topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabletType {
    Primary,
    Replica,
    Rdonly,
    #[default]
    Unknown,
}

impl fmt::Display for TabletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TabletType::Primary => write!(f, "PRIMARY"),
            TabletType::Replica => write!(f, "REPLICA"),
            TabletType::Rdonly => write!(f, "RDONLY"),
            TabletType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Management endpoint of the tablet wrapping a database node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabletInfo {
    pub hostname: String,
    pub port: u16,
    #[serde(default)]
    pub tablet_type: TabletType,
}

/// One node of a shard's consensus group, as registered in topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Stable tablet alias, independent of network location
    pub alias: String,
    /// Where the database itself listens
    pub key: InstanceKey,
    pub tablet: TabletInfo,
}

impl Instance {
    pub fn new(alias: impl Into<String>, key: InstanceKey, tablet: TabletInfo) -> Self {
        Self {
            alias: alias.into(),
            key,
            tablet,
        }
    }
}

/// Topology's view of a shard: members plus the recorded primary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRoster {
    pub instances: Vec<Instance>,
    pub primary_alias: Option<String>,
}

impl ShardRoster {
    pub fn new(instances: Vec<Instance>, primary_alias: Option<String>) -> Self {
        Self {
            instances,
            primary_alias,
        }
    }

    pub fn find_by_alias(&self, alias: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.alias == alias)
    }

    /// Tablet running the database at `host:port`, if topology knows one
    pub fn find_by_host_port(&self, host: &str, port: u16) -> Option<&Instance> {
        self.instances.iter().find(|i| i.key.matches(host, port))
    }

    /// The instance topology records as primary for the shard
    pub fn primary(&self) -> Option<&Instance> {
        self.primary_alias
            .as_deref()
            .and_then(|alias| self.find_by_alias(alias))
    }

    pub fn aliases(&self) -> Vec<String> {
        self.instances.iter().map(|i| i.alias.clone()).collect()
    }
}

/// Role a node reports for itself in the consensus group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusRole {
    Leader,
    Follower,
    Candidate,
    Learner,
    Logger,
    #[default]
    Unknown,
}

impl fmt::Display for ConsensusRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusRole::Leader => write!(f, "Leader"),
            ConsensusRole::Follower => write!(f, "Follower"),
            ConsensusRole::Candidate => write!(f, "Candidate"),
            ConsensusRole::Learner => write!(f, "Learner"),
            ConsensusRole::Logger => write!(f, "Logger"),
            ConsensusRole::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One node's self-reported consensus state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusLocalView {
    pub server_id: u64,
    pub role: ConsensusRole,
    pub current_term: u64,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub port: u16,
}

impl ConsensusLocalView {
    pub fn is_leader(&self) -> bool {
        self.role == ConsensusRole::Leader
    }
}

/// Shard-wide consensus state as seen from the elected leader
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusGlobalView {
    pub leader_host: String,
    pub leader_port: u16,
    pub leader_server_id: u64,
    pub leader_term: u64,
    pub is_leader_online: bool,
    /// Members the leader reports as not replicating from it
    #[serde(default)]
    pub disconnected: Vec<InstanceKey>,
}

impl ConsensusGlobalView {
    /// Leader location and online flag: `(host, port, online)`
    pub fn primary(&self) -> (&str, u16, bool) {
        (&self.leader_host, self.leader_port, self.is_leader_online)
    }

    pub fn is_unconnected_replica(&self, key: &InstanceKey) -> bool {
        self.disconnected.iter().any(|k| k == key)
    }
}

/// Health classification of a shard, one per diagnosis cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnoseResult {
    /// The view refresh itself failed
    Error,
    Healthy,
    /// No reachable tablet is serving the consensus leader
    UnreachablePrimary,
    /// Topology's primary disagrees with the consensus leader
    WrongPrimaryTablet,
    /// No node reports itself as online leader
    MissingConsensusLeader,
    /// The leader reports a member as disconnected
    UnconnectedReplica,
}

impl DiagnoseResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnoseResult::Error => "error",
            DiagnoseResult::Healthy => "Healthy",
            DiagnoseResult::UnreachablePrimary => "UnreachablePrimary",
            DiagnoseResult::WrongPrimaryTablet => "WrongPrimaryTablet",
            DiagnoseResult::MissingConsensusLeader => "MissingConsensusLeader",
            DiagnoseResult::UnconnectedReplica => "UnconnectedReplica",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, DiagnoseResult::Healthy)
    }
}

impl fmt::Display for DiagnoseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
