use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shardctl_common::{DiagnoseResult, ShardRoster};

/// Observable state of a shard from the most recent diagnosis cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardStatus {
    pub diagnose_result: Option<DiagnoseResult>,
    /// When `diagnose_result` last changed value
    pub since: Option<DateTime<Utc>>,
    pub unreachables: Vec<String>,
    pub problematics: Vec<String>,
    pub primary: Option<String>,
    pub instances: Vec<String>,
}

/// Per-cycle fault lists and last classification of a shard.
///
/// Guarded by its own lock so status readers never wait on a diagnosis.
#[derive(Debug, Default)]
pub struct ShardStatusCollector {
    status: Mutex<ShardStatus>,
}

impl ShardStatusCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_diagnose_result(&self, result: DiagnoseResult) {
        self.status.lock().diagnose_result = Some(result);
    }

    pub fn record_since(&self, since: DateTime<Utc>) {
        self.status.lock().since = Some(since);
    }

    pub fn record_unreachable(&self, alias: &str) {
        push_unique(&mut self.status.lock().unreachables, alias);
    }

    pub fn record_problematic(&self, alias: &str) {
        push_unique(&mut self.status.lock().problematics, alias);
    }

    pub fn record_roster(&self, roster: &ShardRoster) {
        let mut status = self.status.lock();
        status.instances = roster.aliases();
        status.primary = roster.primary_alias.clone();
    }

    /// Reset the fault lists. The last diagnose result is kept until overwritten.
    pub fn clear(&self) {
        let mut status = self.status.lock();
        status.unreachables.clear();
        status.problematics.clear();
    }

    pub fn snapshot(&self) -> ShardStatus {
        self.status.lock().clone()
    }
}

// Fault lists are bounded by shard fan-out, so a linear scan is fine.
fn push_unique(list: &mut Vec<String>, alias: &str) {
    if !list.iter().any(|a| a == alias) {
        list.push(alias.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_idempotent() {
        let collector = ShardStatusCollector::new();
        for _ in 0..5 {
            collector.record_unreachable("zone1-100");
            collector.record_problematic("zone1-100");
        }
        collector.record_problematic("zone1-101");

        let status = collector.snapshot();
        assert_eq!(status.unreachables, vec!["zone1-100"]);
        assert_eq!(status.problematics, vec!["zone1-100", "zone1-101"]);
    }

    #[test]
    fn test_clear_keeps_last_result() {
        let collector = ShardStatusCollector::new();
        collector.record_diagnose_result(DiagnoseResult::UnreachablePrimary);
        collector.record_unreachable("zone1-100");
        collector.record_problematic("zone1-100");

        collector.clear();

        let status = collector.snapshot();
        assert!(status.unreachables.is_empty());
        assert!(status.problematics.is_empty());
        assert_eq!(status.diagnose_result, Some(DiagnoseResult::UnreachablePrimary));
    }

    #[test]
    fn test_record_roster() {
        use shardctl_common::{Instance, InstanceKey, TabletInfo};

        let collector = ShardStatusCollector::new();
        let roster = ShardRoster::new(
            vec![Instance::new("zone1-100", InstanceKey::new("db1", 3306), TabletInfo::default())],
            Some("zone1-100".into()),
        );
        collector.record_roster(&roster);

        let status = collector.snapshot();
        assert_eq!(status.instances, vec!["zone1-100"]);
        assert_eq!(status.primary.as_deref(), Some("zone1-100"));
    }
}
