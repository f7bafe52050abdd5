use crate::config::ShardSection;
use async_trait::async_trait;
use shardctl_cluster::TopologyProvider;
use shardctl_common::{Result, ShardCtlError, ShardIdentity, ShardRoster};
use std::collections::BTreeMap;

/// Topology read once from the daemon configuration
#[derive(Debug, Clone, Default)]
pub struct StaticTopology {
    rosters: BTreeMap<ShardIdentity, ShardRoster>,
}

impl StaticTopology {
    pub fn from_sections(sections: &[ShardSection]) -> Self {
        let rosters = sections
            .iter()
            .map(|section| (section.identity(), section.roster()))
            .collect();
        Self { rosters }
    }

    /// Configured shards, in identity order
    pub fn identities(&self) -> Vec<ShardIdentity> {
        self.rosters.keys().cloned().collect()
    }
}

#[async_trait]
impl TopologyProvider for StaticTopology {
    async fn shard_roster(&self, shard: &ShardIdentity) -> Result<ShardRoster> {
        self.rosters
            .get(shard)
            .cloned()
            .ok_or_else(|| ShardCtlError::Topology {
                message: format!("shard {} is not configured", shard),
            })
    }
}
