use crate::agent::{Collaborators, TopologyProvider};
use crate::shard::ConsensusShard;
use crate::ControllerConfig;
use dashmap::DashMap;
use shardctl_common::{DiagnoseResult, Result, ShardIdentity};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Controller - drives diagnosis and repair for every tracked shard
pub struct ConsensusController {
    /// Configuration
    pub config: ControllerConfig,

    /// Shards under management
    shards: DashMap<ShardIdentity, Arc<ConsensusShard>>,

    /// Per-shard loop cancellation, children of `shutdown`
    loops: DashMap<ShardIdentity, CancellationToken>,

    topology: Arc<dyn TopologyProvider>,

    collaborators: Collaborators,

    shutdown: CancellationToken,
}

impl ConsensusController {
    /// Create a new controller
    pub fn new(
        config: ControllerConfig,
        topology: Arc<dyn TopologyProvider>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            config,
            shards: DashMap::new(),
            loops: DashMap::new(),
            topology,
            collaborators,
            shutdown: CancellationToken::new(),
        }
    }

    /// Start tracking a shard, reading its roster from topology
    pub async fn track_shard(&self, identity: ShardIdentity) -> Result<Arc<ConsensusShard>> {
        if let Some(existing) = self.shards.get(&identity) {
            return Ok(existing.clone());
        }

        let roster = self.topology.shard_roster(&identity).await?;
        info!(
            shard = %identity,
            instances = roster.instances.len(),
            primary = ?roster.primary_alias,
            "tracking shard"
        );

        // A concurrent call may have won while topology was read.
        let shard = self
            .shards
            .entry(identity.clone())
            .or_insert_with(|| {
                Arc::new(ConsensusShard::new(
                    identity,
                    roster,
                    self.collaborators.clone(),
                    &self.config,
                ))
            })
            .clone();

        Ok(shard)
    }

    /// Stop tracking a shard. Its periodic loop, if running, exits.
    pub fn untrack_shard(&self, identity: &ShardIdentity) -> bool {
        if let Some((_, token)) = self.loops.remove(identity) {
            token.cancel();
        }
        let removed = self.shards.remove(identity).is_some();
        if removed {
            info!(shard = %identity, "untracked shard");
        }
        removed
    }

    pub fn shard(&self, identity: &ShardIdentity) -> Option<Arc<ConsensusShard>> {
        self.shards.get(identity).map(|s| s.clone())
    }

    /// All tracked shards, ordered by identity
    pub fn shards(&self) -> Vec<Arc<ConsensusShard>> {
        let mut shards: Vec<_> = self.shards.iter().map(|e| e.value().clone()).collect();
        shards.sort_by(|a, b| a.identity.cmp(&b.identity));
        shards
    }

    /// Spawn one periodic scan loop per tracked shard. Calling again picks
    /// up shards tracked since.
    pub fn start(self: &Arc<Self>) {
        info!(
            controller_id = %self.config.controller_id,
            shards = self.shards.len(),
            "Starting consensus controller"
        );

        for shard in self.shards() {
            self.spawn_shard_loop(shard);
        }
    }

    fn spawn_shard_loop(self: &Arc<Self>, shard: Arc<ConsensusShard>) {
        if self.loops.contains_key(&shard.identity) {
            return;
        }
        let token = self.shutdown.child_token();
        self.loops.insert(shard.identity.clone(), token.clone());

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            controller.run_shard_loop(shard, token).await;
        });
    }

    async fn run_shard_loop(&self, shard: Arc<ConsensusShard>, token: CancellationToken) {
        let mut scan = tokio::time::interval(self.config.scan_interval);
        scan.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut roster_refresh = tokio::time::interval(self.config.refresh_roster_interval);
        roster_refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The roster was just read when the shard was tracked.
        roster_refresh.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = roster_refresh.tick() => {
                    if let Err(e) = shard.refresh_roster(self.topology.as_ref()).await {
                        warn!(shard = %shard.identity, error = %e, "failed to refresh shard roster");
                    }
                }
                _ = scan.tick() => {
                    shard.scan_and_repair().await;
                }
            }
        }

        info!(shard = %shard.identity, "shard scan loop stopped");
    }

    /// Scan every tracked shard once, in identity order
    pub async fn scan_all(&self) -> Vec<(ShardIdentity, DiagnoseResult)> {
        let mut results = Vec::new();
        for shard in self.shards() {
            let result = shard.scan_and_repair().await;
            results.push((shard.identity.clone(), result));
        }
        results
    }

    /// Stop all scan loops
    pub fn shutdown(&self) {
        info!("Stopping consensus controller");
        self.shutdown.cancel();
        self.loops.clear();
    }

    /// Get controller statistics
    pub fn stats(&self) -> ControllerStats {
        let mut by_result = BTreeMap::new();
        let mut healthy_shards = 0;
        for shard in self.shards() {
            let label = match shard.status().diagnose_result {
                Some(result) => {
                    if result.is_healthy() {
                        healthy_shards += 1;
                    }
                    result.as_str()
                }
                None => "pending",
            };
            *by_result.entry(label.to_string()).or_insert(0) += 1;
        }

        ControllerStats {
            total_shards: self.shards.len(),
            healthy_shards,
            by_result,
        }
    }
}

/// Controller statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct ControllerStats {
    pub total_shards: usize,
    pub healthy_shards: usize,
    /// Shard count per last diagnose result
    pub by_result: BTreeMap<String, usize>,
}
