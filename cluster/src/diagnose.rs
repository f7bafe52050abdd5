//! Shard diagnosis.
//!
//! Checks run in a fixed order: a failed view refresh yields `Error`; an
//! absent or offline consensus leader yields `MissingConsensusLeader`; a
//! leader with no reachable tablet yields `UnreachablePrimary`; a topology
//! primary that is not the leader yields `WrongPrimaryTablet`; otherwise the
//! shard is `Healthy`.

use crate::shard::{ConsensusShard, LastDiagnose};
use chrono::Utc;
use metrics::{counter, histogram};
use rand::seq::SliceRandom;
use shardctl_common::{DiagnoseResult, Instance, Result, ShardCtlError, ShardRoster};
use std::time::Instant;
use tracing::{error, info, instrument, warn};

impl ConsensusShard {
    /// Diagnose the shard.
    ///
    /// Holds the shard's critical section for the whole cycle. An `Err`
    /// means the view refresh failed and the shard is classified `Error`.
    #[instrument(skip(self), fields(shard = %self.identity))]
    pub async fn diagnose(&self) -> Result<DiagnoseResult> {
        let mut state = self.state.lock().await;
        let start = Instant::now();

        let roster = self.roster();
        let outcome = self.diagnose_locked(&roster).await;
        let result = match &outcome {
            Ok(result) => *result,
            Err(_) => DiagnoseResult::Error,
        };

        self.collector.record_diagnose_result(result);
        self.collector.record_roster(&roster);

        counter!("shardctl.diagnose.total", "result" => result.as_str()).increment(1);
        histogram!("shardctl.diagnose.duration").record(start.elapsed().as_secs_f64());

        if !result.is_healthy() {
            let status = self.collector.snapshot();
            warn!(
                result = %result,
                last_result = ?state.last.map(|l| l.result),
                instances = ?status.instances,
                primary = ?status.primary,
                primary_tablet = %primary_tablet_alias(&roster),
                problematics = ?status.problematics,
                unreachables = ?status.unreachables,
                "diagnose shard as unhealthy for {}\n{}",
                self.identity,
                self.view
            );
        }

        if state.last.map(|l| l.result) != Some(result) {
            let since = Utc::now();
            state.last = Some(LastDiagnose { result, since });
            self.collector.record_since(since);
        }

        outcome
    }

    async fn diagnose_locked(&self, roster: &ShardRoster) -> Result<DiagnoseResult> {
        self.refresh_consensus_view(roster)
            .await
            .map_err(|e| e.context("fail to refresh consensus view"))?;

        if !self.is_active() {
            return Ok(DiagnoseResult::Healthy);
        }

        let first = self.check_primary_tablet(roster).await;
        if first != DiagnoseResult::MissingConsensusLeader {
            return Ok(first);
        }

        // The group may be mid-election; look once more before settling.
        self.refresh_consensus_view(roster)
            .await
            .map_err(|e| e.context("fail to refresh consensus view"))?;

        if !self.is_active() {
            return Ok(DiagnoseResult::Healthy);
        }
        Ok(self.check_primary_tablet(roster).await)
    }

    async fn check_primary_tablet(&self, roster: &ShardRoster) -> DiagnoseResult {
        let (host, port, online) = self.view.primary();

        if !online || host.is_empty() || port == 0 {
            warn!("consensus group has no Leader {}:{}", host, port);
            return DiagnoseResult::MissingConsensusLeader;
        }

        // No tablet running on the leader's address means it is stuck or
        // gone; so does a tablet that does not answer a ping.
        let reachable = match roster.find_by_host_port(&host, port) {
            Some(tablet) => self.health.is_reachable(tablet).await,
            None => false,
        };
        if !reachable {
            error!("Failed to find tablet that is running with database on {}:{}", host, port);
            return DiagnoseResult::UnreachablePrimary;
        }

        // No recorded primary usually means the shard is still being
        // initialized; repair will adopt the consensus leader.
        match roster.primary() {
            Some(primary) if primary.key.matches(&host, port) => DiagnoseResult::Healthy,
            _ => {
                info!("unable to find primary tablet for {}", self.identity);
                DiagnoseResult::WrongPrimaryTablet
            }
        }
    }

    /// Classify from the last recorded view without refreshing or probing.
    pub fn fast_path_diagnose(&self) -> DiagnoseResult {
        let roster = self.roster();
        let (host, port, online) = self.view.primary();

        let Some(primary) = roster.primary() else {
            info!("Primary tablet unknown {}", self.identity);
            return DiagnoseResult::WrongPrimaryTablet;
        };

        // The view is empty right after startup, before any refresh.
        if !online || host.is_empty() || port == 0 {
            return DiagnoseResult::WrongPrimaryTablet;
        }

        if !primary.key.matches(&host, port) {
            if roster.find_by_host_port(&host, port).is_none() {
                return DiagnoseResult::UnreachablePrimary;
            }
            return DiagnoseResult::WrongPrimaryTablet;
        }

        DiagnoseResult::Healthy
    }

    /// Ping the tablet topology records as primary
    pub async fn is_primary_reachable(&self) -> Result<bool> {
        let roster = self.roster();
        let primary = roster.primary().ok_or_else(|| ShardCtlError::MissingPrimaryTablet {
            shard: self.identity.to_string(),
        })?;
        Ok(self.health.is_reachable(primary).await)
    }

    pub fn primary_tablet_alias(&self) -> String {
        primary_tablet_alias(&self.roster())
    }

    /// Find a member the leader reports as disconnected.
    ///
    /// Members are visited in random order so repeated repairs do not
    /// always pick the same node.
    pub fn disconnected_instance(&self) -> Result<Option<Instance>> {
        let roster = self.roster();
        if roster.primary().is_none() {
            return Err(ShardCtlError::MissingPrimaryTablet {
                shard: self.identity.to_string(),
            });
        }

        let mut instances = roster.instances.clone();
        instances.shuffle(&mut rand::thread_rng());

        Ok(instances
            .into_iter()
            .find(|instance| self.view.is_unconnected_replica(&instance.key)))
    }
}

fn primary_tablet_alias(roster: &ShardRoster) -> String {
    roster
        .primary()
        .map(|p| p.alias.clone())
        .unwrap_or_else(|| "UNKNOWN".to_string())
}
