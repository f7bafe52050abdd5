use parking_lot::RwLock;
use shardctl_common::{ConsensusGlobalView, ConsensusLocalView, InstanceKey};
use std::collections::BTreeMap;
use std::fmt;

/// Everything one refresh learned about the consensus group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsensusSnapshot {
    /// Local views of the nodes that answered, keyed by tablet alias
    pub local_views: BTreeMap<String, ConsensusLocalView>,
    /// Present only when the refresh fully succeeded
    pub global: Option<ConsensusGlobalView>,
}

impl ConsensusSnapshot {
    pub fn is_empty(&self) -> bool {
        self.local_views.is_empty() && self.global.is_none()
    }
}

/// Latest consensus snapshot for a shard, replaced wholesale on every refresh
#[derive(Debug, Default)]
pub struct ConsensusView {
    snapshot: RwLock<ConsensusSnapshot>,
}

impl ConsensusView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, snapshot: ConsensusSnapshot) {
        *self.snapshot.write() = snapshot;
    }

    pub fn clear(&self) {
        self.record(ConsensusSnapshot::default());
    }

    pub fn snapshot(&self) -> ConsensusSnapshot {
        self.snapshot.read().clone()
    }

    pub fn global(&self) -> Option<ConsensusGlobalView> {
        self.snapshot.read().global.clone()
    }

    /// Leader `(host, port, online)`; `("", 0, false)` when no view is recorded
    pub fn primary(&self) -> (String, u16, bool) {
        match &self.snapshot.read().global {
            Some(global) => {
                let (host, port, online) = global.primary();
                (host.to_string(), port, online)
            }
            None => (String::new(), 0, false),
        }
    }

    pub fn is_unconnected_replica(&self, key: &InstanceKey) -> bool {
        self.snapshot
            .read()
            .global
            .as_ref()
            .map(|g| g.is_unconnected_replica(key))
            .unwrap_or(false)
    }
}

impl fmt::Display for ConsensusView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot.read();
        match &snapshot.global {
            Some(g) => write!(
                f,
                "consensus view: leader={}:{} server_id={} term={} online={} disconnected={:?}",
                g.leader_host, g.leader_port, g.leader_server_id, g.leader_term, g.is_leader_online,
                g.disconnected.iter().map(|k| k.to_string()).collect::<Vec<_>>()
            )?,
            None => write!(f, "consensus view: <empty>")?,
        }
        for (alias, local) in &snapshot.local_views {
            write!(f, "\n  {} role={} term={} server_id={}", alias, local.role, local.current_term, local.server_id)?;
        }
        Ok(())
    }
}
