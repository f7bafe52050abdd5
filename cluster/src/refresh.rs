use crate::shard::ConsensusShard;
use crate::view::ConsensusSnapshot;
use shardctl_common::{ConsensusLocalView, Instance, Result, ShardCtlError, ShardRoster};
use std::sync::Arc;
use tracing::{error, info};

/// Pick the most credible leader among nodes that answered.
///
/// The first node reporting `Leader` becomes the candidate; later ones only
/// replace it with a strictly greater term. With dual leaders, the one
/// holding the newer term wins regardless of scan order.
pub fn elect_leader(
    responders: &[(Instance, ConsensusLocalView)],
) -> Option<&(Instance, ConsensusLocalView)> {
    let mut leader: Option<&(Instance, ConsensusLocalView)> = None;
    for candidate in responders.iter().filter(|(_, local)| local.is_leader()) {
        match leader {
            Some((_, current)) if current.current_term >= candidate.1.current_term => {}
            _ => leader = Some(candidate),
        }
    }
    leader
}

impl ConsensusShard {
    /// Query every instance for its local view, select the leader and fetch
    /// the shard-wide view from it.
    ///
    /// Per-node failures are recorded and skipped. The resulting view is
    /// recorded in one step; on failure an empty view is recorded instead.
    pub(crate) async fn refresh_consensus_view(&self, roster: &ShardRoster) -> Result<()> {
        self.collector.clear();

        let outcomes = self.fetch_local_views(roster).await;

        let mut snapshot = ConsensusSnapshot::default();
        let mut responders = Vec::with_capacity(outcomes.len());
        for (instance, outcome) in roster.instances.iter().zip(outcomes) {
            match outcome {
                Ok(local) => {
                    snapshot.local_views.insert(instance.alias.clone(), local.clone());
                    responders.push((instance.clone(), local));
                }
                Err(e) => {
                    self.collector.record_problematic(&instance.alias);
                    if e.is_unreachable() {
                        self.collector.record_unreachable(&instance.alias);
                    }
                    error!(
                        alias = %instance.alias,
                        error = %e,
                        "error while fetch local view from consensus node"
                    );
                }
            }
        }

        if responders.is_empty() {
            self.view.clear();
            return Err(ShardCtlError::NoInstanceResponded {
                shard: self.identity.to_string(),
            });
        }

        snapshot.global = match elect_leader(&responders) {
            Some((leader, local)) => {
                info!(
                    server_id = local.server_id,
                    term = local.current_term,
                    "get consensus leader {}",
                    leader.key
                );
                match self.agent.fetch_global_view(leader, local).await {
                    Ok(mut global) => {
                        // Anchor at the address topology knows, not whatever
                        // the node believes it listens on.
                        global.leader_host = leader.key.hostname.clone();
                        global.leader_port = leader.key.port;
                        global.leader_server_id = local.server_id;
                        global.leader_term = local.current_term;
                        Some(global)
                    }
                    Err(e) => {
                        error!(
                            leader = %leader.key,
                            error = %e,
                            "error while fetch global view from consensus leader"
                        );
                        self.view.clear();
                        return Err(ShardCtlError::UnreachableLeader {
                            host: leader.key.hostname.clone(),
                            port: leader.key.port,
                        });
                    }
                }
            }
            None => Some(self.agent.new_empty_global_view()),
        };

        self.view.record(snapshot);
        Ok(())
    }

    /// Fetch all local views concurrently. Outcomes come back in roster order
    /// so leader selection never depends on completion order.
    async fn fetch_local_views(
        &self,
        roster: &ShardRoster,
    ) -> Vec<Result<ConsensusLocalView>> {
        let handles: Vec<_> = roster
            .instances
            .iter()
            .map(|instance| {
                let agent = Arc::clone(&self.agent);
                let instance = instance.clone();
                tokio::spawn(async move {
                    if !instance.key.is_valid() {
                        return Err(ShardCtlError::InvalidInstanceKey {
                            alias: instance.alias.clone(),
                            key: instance.key.to_string(),
                        });
                    }
                    agent.fetch_local_view(&instance).await
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(ShardCtlError::Internal {
                    message: format!("local view fetch task failed: {}", e),
                }),
            });
        }
        outcomes
    }
}
