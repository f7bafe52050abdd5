use crate::agent::{RepairOutcome, Repairer, ShardContext};
use async_trait::async_trait;
use shardctl_common::{DiagnoseResult, Result};
use std::fmt;
use tracing::{debug, warn};

/// A converging action for an unhealthy shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairAction {
    /// Re-point topology's primary at the tablet serving the consensus leader
    ChangePrimaryTablet { alias: String, address: String },
    /// Bring back a tablet for the consensus leader at `address`
    RecoverPrimaryTablet { address: String },
    /// Reattach a member the leader reports as disconnected
    RejoinReplica { alias: String },
}

impl fmt::Display for RepairAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairAction::ChangePrimaryTablet { alias, address } => {
                write!(f, "change primary tablet to {} ({})", alias, address)
            }
            RepairAction::RecoverPrimaryTablet { address } => {
                write!(f, "recover primary tablet at {}", address)
            }
            RepairAction::RejoinReplica { alias } => write!(f, "rejoin replica {}", alias),
        }
    }
}

/// Decide what, if anything, would converge the shard.
///
/// Preconditions are re-checked against `ctx` rather than trusted from the
/// classification, which may be stale by the time repair runs.
pub fn plan_repair(result: DiagnoseResult, ctx: &ShardContext) -> Option<RepairAction> {
    let leader = ctx
        .global_view
        .as_ref()
        .filter(|g| g.is_leader_online && !g.leader_host.is_empty() && g.leader_port != 0);

    match result {
        DiagnoseResult::Healthy | DiagnoseResult::Error => None,
        // Nothing to converge to until the group elects someone.
        DiagnoseResult::MissingConsensusLeader => None,
        DiagnoseResult::UnreachablePrimary => leader.map(|g| RepairAction::RecoverPrimaryTablet {
            address: format!("{}:{}", g.leader_host, g.leader_port),
        }),
        DiagnoseResult::WrongPrimaryTablet => {
            let g = leader?;
            let tablet = ctx.roster.find_by_host_port(&g.leader_host, g.leader_port)?;
            if ctx.roster.primary_alias.as_deref() == Some(tablet.alias.as_str()) {
                return None;
            }
            Some(RepairAction::ChangePrimaryTablet {
                alias: tablet.alias.clone(),
                address: tablet.key.to_string(),
            })
        }
        DiagnoseResult::UnconnectedReplica => {
            let g = leader?;
            ctx.roster
                .instances
                .iter()
                .find(|i| g.is_unconnected_replica(&i.key))
                .map(|i| RepairAction::RejoinReplica { alias: i.alias.clone() })
        }
    }
}

/// Repairer that only reports what it would do.
///
/// Used when the controller runs without write access to topology.
#[derive(Debug, Default, Clone)]
pub struct AdvisoryRepairer;

#[async_trait]
impl Repairer for AdvisoryRepairer {
    async fn repair(&self, result: DiagnoseResult, ctx: &ShardContext) -> Result<RepairOutcome> {
        match plan_repair(result, ctx) {
            Some(action) => warn!(
                shard = %ctx.identity,
                status = %result,
                "repair needed: {} (advisory mode, topology left untouched)",
                action
            ),
            None => debug!(shard = %ctx.identity, status = %result, "no repair action"),
        }
        Ok(RepairOutcome::Noop)
    }
}
