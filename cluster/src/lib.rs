pub mod agent;
pub mod view;
pub mod status;
pub mod health;
pub mod refresh;
pub mod diagnose;
pub mod shard;
pub mod repair;
pub mod manager;

pub use agent::{Collaborators, DbAgent, LivenessTransport, Repairer, RepairOutcome, ShardContext, TopologyProvider};
pub use view::{ConsensusSnapshot, ConsensusView};
pub use status::{ShardStatus, ShardStatusCollector};
pub use health::HealthChecker;
pub use refresh::elect_leader;
pub use shard::{ConsensusShard, LastDiagnose};
pub use repair::{AdvisoryRepairer, RepairAction, plan_repair};
pub use manager::{ConsensusController, ControllerStats};

use std::time::Duration;
use uuid::Uuid;

/// Default bound on a single tablet liveness ping
pub const DEFAULT_PING_TABLET_TIMEOUT: Duration = Duration::from_secs(2);

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Identifies this controller among redundant instances in logs
    pub controller_id: Uuid,

    /// How often each shard is diagnosed and repaired
    pub scan_interval: Duration,

    /// How often each shard's roster is re-read from topology
    pub refresh_roster_interval: Duration,

    /// Time to wait when pinging a tablet
    pub ping_tablet_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            controller_id: Uuid::new_v4(),
            scan_interval: Duration::from_secs(5),
            refresh_roster_interval: Duration::from_secs(60),
            ping_tablet_timeout: DEFAULT_PING_TABLET_TIMEOUT,
        }
    }
}
