//! Seams to the systems the controller observes and drives.
//!
//! Everything behind these traits lives outside the controller: the topology
//! store, the per-node consensus query transport, the tablet liveness RPC and
//! the code that actually mutates topology to repair a shard.

use crate::status::ShardStatus;
use async_trait::async_trait;
use shardctl_common::{
    ConsensusGlobalView, ConsensusLocalView, DiagnoseResult, Instance, Result, ShardIdentity,
    ShardRoster,
};
use std::sync::Arc;
use std::time::Duration;

/// Queries consensus state from the database nodes
#[async_trait]
pub trait DbAgent: Send + Sync {
    /// Fetch one node's self-reported role and term
    async fn fetch_local_view(&self, instance: &Instance) -> Result<ConsensusLocalView>;

    /// Fetch the shard-wide view from the elected leader
    async fn fetch_global_view(
        &self,
        leader: &Instance,
        local: &ConsensusLocalView,
    ) -> Result<ConsensusGlobalView>;

    /// View recorded when no leader could be selected
    fn new_empty_global_view(&self) -> ConsensusGlobalView {
        ConsensusGlobalView::default()
    }
}

/// Tablet liveness RPC
#[async_trait]
pub trait LivenessTransport: Send + Sync {
    /// Ping the tablet wrapping `instance`. Implementations may take longer
    /// than `timeout`; the caller does not wait past it.
    async fn ping(&self, instance: &Instance, timeout: Duration) -> Result<()>;
}

/// Source of shard membership and the recorded primary
#[async_trait]
pub trait TopologyProvider: Send + Sync {
    async fn shard_roster(&self, shard: &ShardIdentity) -> Result<ShardRoster>;
}

/// What a repair attempt did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    Noop,
    Fixed,
}

/// Shard state handed to a repairer.
///
/// This is a snapshot taken after diagnosis; repairers must re-check it
/// under their own lock before mutating anything, since other controller
/// instances may be repairing the same shard.
#[derive(Debug, Clone)]
pub struct ShardContext {
    pub identity: ShardIdentity,
    pub roster: Arc<ShardRoster>,
    pub global_view: Option<ConsensusGlobalView>,
    pub status: ShardStatus,
}

/// Converges topology with the consensus group
#[async_trait]
pub trait Repairer: Send + Sync {
    async fn repair(&self, result: DiagnoseResult, ctx: &ShardContext) -> Result<RepairOutcome>;
}

/// The collaborators a shard needs to diagnose and repair itself
#[derive(Clone)]
pub struct Collaborators {
    pub agent: Arc<dyn DbAgent>,
    pub liveness: Arc<dyn LivenessTransport>,
    pub repairer: Arc<dyn Repairer>,
}
