use crate::agent::{Collaborators, DbAgent, Repairer, ShardContext, TopologyProvider};
use crate::health::HealthChecker;
use crate::status::{ShardStatus, ShardStatusCollector};
use crate::view::ConsensusView;
use crate::ControllerConfig;
use chrono::{DateTime, Utc};
use metrics::counter;
use parking_lot::RwLock;
use shardctl_common::{DiagnoseResult, Result, ShardIdentity, ShardRoster};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument};

/// Last classification of a shard and when it started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastDiagnose {
    pub result: DiagnoseResult,
    pub since: DateTime<Utc>,
}

/// Bookkeeping owned by the shard's critical section
#[derive(Debug, Default)]
pub(crate) struct DiagnoseState {
    pub(crate) last: Option<LastDiagnose>,
}

/// A shard under management: its roster, consensus view and diagnosis state
pub struct ConsensusShard {
    pub identity: ShardIdentity,
    roster: RwLock<Arc<ShardRoster>>,
    pub(crate) view: ConsensusView,
    pub(crate) collector: ShardStatusCollector,
    pub(crate) health: HealthChecker,
    pub(crate) agent: Arc<dyn DbAgent>,
    repairer: Arc<dyn Repairer>,
    is_active: AtomicBool,
    /// Held for the full extent of a diagnosis
    pub(crate) state: Mutex<DiagnoseState>,
}

impl ConsensusShard {
    pub fn new(
        identity: ShardIdentity,
        roster: ShardRoster,
        collaborators: Collaborators,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            identity,
            roster: RwLock::new(Arc::new(roster)),
            view: ConsensusView::new(),
            collector: ShardStatusCollector::new(),
            health: HealthChecker::new(collaborators.liveness, config.ping_tablet_timeout),
            agent: collaborators.agent,
            repairer: collaborators.repairer,
            is_active: AtomicBool::new(true),
            state: Mutex::new(DiagnoseState::default()),
        }
    }

    /// Whether the controller reconciles this shard. Inactive shards always
    /// diagnose as healthy.
    pub fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }

    pub fn set_active(&self, active: bool) {
        let was = self.is_active.swap(active, Ordering::SeqCst);
        if was != active {
            info!(shard = %self.identity, active, "shard management toggled");
        }
    }

    /// Current roster. Callers keep the returned snapshot for a whole cycle.
    pub fn roster(&self) -> Arc<ShardRoster> {
        self.roster.read().clone()
    }

    /// Replace the roster wholesale
    pub fn set_roster(&self, roster: ShardRoster) {
        *self.roster.write() = Arc::new(roster);
    }

    /// Re-read membership and the recorded primary from topology
    #[instrument(skip(self, topology), fields(shard = %self.identity))]
    pub async fn refresh_roster(&self, topology: &dyn TopologyProvider) -> Result<()> {
        let fresh = topology.shard_roster(&self.identity).await?;
        let previous = self.roster();

        if previous.primary_alias != fresh.primary_alias {
            info!(
                from = ?previous.primary_alias,
                to = ?fresh.primary_alias,
                "topology primary changed"
            );
        }
        if previous.instances.len() != fresh.instances.len() {
            info!(
                from = previous.instances.len(),
                to = fresh.instances.len(),
                "shard membership changed"
            );
        }

        self.set_roster(fresh);
        Ok(())
    }

    pub fn status(&self) -> ShardStatus {
        self.collector.snapshot()
    }

    pub fn view(&self) -> &ConsensusView {
        &self.view
    }

    /// Last classification as seen by the critical section. Waits for any
    /// diagnosis in flight; status readers use `status()` instead.
    pub async fn last_diagnose(&self) -> Option<LastDiagnose> {
        self.state.lock().await.last
    }

    /// Snapshot handed to the repairer
    pub fn context(&self) -> ShardContext {
        ShardContext {
            identity: self.identity.clone(),
            roster: self.roster(),
            global_view: self.view.global(),
            status: self.collector.snapshot(),
        }
    }

    /// Diagnose the shard, then hand the classification to the repairer.
    ///
    /// A diagnosis error still goes to the repairer as `Error`; repair
    /// failures are logged and swallowed so later cycles are unaffected.
    #[instrument(skip(self), fields(shard = %self.identity))]
    pub async fn scan_and_repair(&self) -> DiagnoseResult {
        info!("ScanAndRepairShard diagnose {} status", self.identity);

        let result = match self.diagnose().await {
            Ok(result) => result,
            Err(e) => {
                info!(error = %e, "fail to scanAndRepairShard {} because of diagnose error", self.identity);
                DiagnoseResult::Error
            }
        };

        info!("{} status is {}", self.identity, result);

        let ctx = self.context();
        if let Err(e) = self.repairer.repair(result, &ctx).await {
            counter!("shardctl.repair.failures").increment(1);
            error!(status = %result, error = %e, "failed to ScanAndRepairShard repair");
        }

        result
    }
}
