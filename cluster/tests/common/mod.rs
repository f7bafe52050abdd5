#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use shardctl_cluster::{
    Collaborators, ConsensusShard, ControllerConfig, DbAgent, LivenessTransport, RepairOutcome,
    Repairer, ShardContext, TopologyProvider,
};
use shardctl_common::*;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How a fake node answers a local view fetch
#[derive(Debug, Clone)]
pub enum NodeBehavior {
    Answer(ConsensusRole, u64),
    Refuse,
    Fail(String),
}

/// Database agent driven by per-node scripts. Each fetch consumes the front
/// of the node's script; the last entry repeats forever.
#[derive(Default)]
pub struct FakeAgent {
    scripts: Mutex<HashMap<String, VecDeque<NodeBehavior>>>,
    global_fails: Mutex<bool>,
    disconnected: Mutex<Vec<InstanceKey>>,
    pub local_fetches: AtomicUsize,
    pub global_fetches: AtomicUsize,
}

impl FakeAgent {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, alias: &str, behavior: NodeBehavior) {
        self.script(alias, vec![behavior]);
    }

    pub fn script(&self, alias: &str, behaviors: Vec<NodeBehavior>) {
        self.scripts.lock().insert(alias.to_string(), behaviors.into());
    }

    pub fn fail_global(&self, fail: bool) {
        *self.global_fails.lock() = fail;
    }

    pub fn set_disconnected(&self, keys: Vec<InstanceKey>) {
        *self.disconnected.lock() = keys;
    }

    pub fn local_fetch_count(&self) -> usize {
        self.local_fetches.load(Ordering::SeqCst)
    }

    fn next(&self, alias: &str) -> NodeBehavior {
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(alias) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap(),
            Some(script) => script.front().cloned().unwrap_or(NodeBehavior::Refuse),
            None => NodeBehavior::Refuse,
        }
    }
}

#[async_trait]
impl DbAgent for FakeAgent {
    async fn fetch_local_view(&self, instance: &Instance) -> Result<ConsensusLocalView> {
        self.local_fetches.fetch_add(1, Ordering::SeqCst);
        match self.next(&instance.alias) {
            NodeBehavior::Answer(role, term) => Ok(ConsensusLocalView {
                server_id: instance.key.hostname.len() as u64 + term,
                role,
                current_term: term,
                hostname: "localhost".into(),
                port: instance.key.port,
            }),
            NodeBehavior::Refuse => Err(ShardCtlError::Network {
                message: format!("dial tcp {}: connect: connection refused", instance.key),
            }),
            NodeBehavior::Fail(message) => Err(ShardCtlError::Network { message }),
        }
    }

    async fn fetch_global_view(
        &self,
        _leader: &Instance,
        local: &ConsensusLocalView,
    ) -> Result<ConsensusGlobalView> {
        self.global_fetches.fetch_add(1, Ordering::SeqCst);
        if *self.global_fails.lock() {
            return Err(ShardCtlError::Network {
                message: "global view query timed out".into(),
            });
        }
        Ok(ConsensusGlobalView {
            // Deliberately wrong; the refresher must re-anchor on topology's address.
            leader_host: "localhost".into(),
            leader_port: local.port,
            leader_server_id: 0,
            leader_term: 0,
            is_leader_online: true,
            disconnected: self.disconnected.lock().clone(),
        })
    }
}

/// Liveness transport with a configurable set of dead tablets
#[derive(Default)]
pub struct FakeLiveness {
    down: Mutex<HashSet<String>>,
    pub pings: AtomicUsize,
}

impl FakeLiveness {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_down(&self, alias: &str, down: bool) {
        let mut set = self.down.lock();
        if down {
            set.insert(alias.to_string());
        } else {
            set.remove(alias);
        }
    }
}

#[async_trait]
impl LivenessTransport for FakeLiveness {
    async fn ping(&self, instance: &Instance, _timeout: Duration) -> Result<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.down.lock().contains(&instance.alias) {
            return Err(ShardCtlError::ConnectionRefused {
                address: format!("{}:{}", instance.tablet.hostname, instance.tablet.port),
            });
        }
        Ok(())
    }
}

/// Repairer that records every call
#[derive(Default)]
pub struct RecordingRepairer {
    pub calls: Mutex<Vec<(DiagnoseResult, ShardContext)>>,
    fail: Mutex<bool>,
}

impl RecordingRepairer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    pub fn results(&self) -> Vec<DiagnoseResult> {
        self.calls.lock().iter().map(|(r, _)| *r).collect()
    }
}

#[async_trait]
impl Repairer for RecordingRepairer {
    async fn repair(&self, result: DiagnoseResult, ctx: &ShardContext) -> Result<RepairOutcome> {
        self.calls.lock().push((result, ctx.clone()));
        if *self.fail.lock() {
            return Err(ShardCtlError::Repair {
                message: "topology write rejected".into(),
            });
        }
        Ok(RepairOutcome::Noop)
    }
}

/// Topology backed by a map
#[derive(Default)]
pub struct MapTopology {
    pub rosters: Mutex<HashMap<ShardIdentity, ShardRoster>>,
}

impl MapTopology {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put(&self, identity: ShardIdentity, roster: ShardRoster) {
        self.rosters.lock().insert(identity, roster);
    }
}

#[async_trait]
impl TopologyProvider for MapTopology {
    async fn shard_roster(&self, shard: &ShardIdentity) -> Result<ShardRoster> {
        // Suspend like a real topology read so concurrent callers interleave.
        tokio::task::yield_now().await;
        self.rosters
            .lock()
            .get(shard)
            .cloned()
            .ok_or_else(|| ShardCtlError::Topology {
                message: format!("shard {} not found", shard),
            })
    }
}

pub fn instance(alias: &str, host: &str) -> Instance {
    Instance::new(
        alias,
        InstanceKey::new(host, 3306),
        TabletInfo {
            hostname: host.to_string(),
            port: 15100,
            tablet_type: TabletType::Replica,
        },
    )
}

/// zone1-100 on db1, zone1-101 on db2, zone1-102 on db3
pub fn three_node_roster(primary: Option<&str>) -> ShardRoster {
    ShardRoster::new(
        vec![
            instance("zone1-100", "db1"),
            instance("zone1-101", "db2"),
            instance("zone1-102", "db3"),
        ],
        primary.map(String::from),
    )
}

pub struct Harness {
    pub agent: Arc<FakeAgent>,
    pub liveness: Arc<FakeLiveness>,
    pub repairer: Arc<RecordingRepairer>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            agent: FakeAgent::new(),
            liveness: FakeLiveness::new(),
            repairer: RecordingRepairer::new(),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            agent: self.agent.clone(),
            liveness: self.liveness.clone(),
            repairer: self.repairer.clone(),
        }
    }

    /// db1 leads at `term`, the others follow
    pub fn elect_db1(&self, term: u64) {
        self.agent.set("zone1-100", NodeBehavior::Answer(ConsensusRole::Leader, term));
        self.agent.set("zone1-101", NodeBehavior::Answer(ConsensusRole::Follower, term));
        self.agent.set("zone1-102", NodeBehavior::Answer(ConsensusRole::Follower, term));
    }

    pub fn shard(&self, roster: ShardRoster) -> ConsensusShard {
        let config = ControllerConfig {
            ping_tablet_timeout: Duration::from_millis(500),
            ..Default::default()
        };
        ConsensusShard::new(
            ShardIdentity::new("commerce", "0"),
            roster,
            self.collaborators(),
            &config,
        )
    }
}
