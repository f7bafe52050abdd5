use crate::read_write::suggest_tablet_type;
use metrics::counter;
use serde::{Deserialize, Serialize};
use shardctl_common::{ReadWriteSeparationStrategySetting, Result, TabletType};
use tracing::debug;

/// Session facts that pin traffic to the primary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub in_transaction: bool,
    pub has_created_temp_tables: bool,
    pub has_advisory_lock: bool,
}

impl SessionState {
    pub fn is_pinned(&self) -> bool {
        self.in_transaction || self.has_created_temp_tables || self.has_advisory_lock
    }
}

/// Routes statements for gateway sessions under one strategy setting
#[derive(Debug, Clone, Default)]
pub struct QueryRouter {
    setting: ReadWriteSeparationStrategySetting,
}

impl QueryRouter {
    pub fn new(setting: ReadWriteSeparationStrategySetting) -> Self {
        Self { setting }
    }

    /// Build a router from the textual setting, e.g. `"enable"`
    pub fn from_setting(value: &str) -> Result<Self> {
        Ok(Self::new(ReadWriteSeparationStrategySetting::parse(value)?))
    }

    pub fn setting(&self) -> &ReadWriteSeparationStrategySetting {
        &self.setting
    }

    pub fn route(&self, session: &SessionState, sql: &str) -> Result<TabletType> {
        let tablet_type = suggest_tablet_type(
            self.setting.strategy,
            session.in_transaction,
            session.has_created_temp_tables,
            session.has_advisory_lock,
            sql,
        )
        .inspect_err(|e| {
            counter!("shardctl.route.errors").increment(1);
            debug!(error = %e, "unable to classify statement");
        })?;

        counter!("shardctl.route.total", "tablet_type" => tablet_type.to_string()).increment(1);
        debug!(%tablet_type, pinned = session.is_pinned(), "routed statement");
        Ok(tablet_type)
    }
}
