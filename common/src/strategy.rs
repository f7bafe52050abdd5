use crate::error::{Result, ShardCtlError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether read-only statements may be routed to replicas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadWriteSeparationStrategy {
    Enable,
    #[default]
    Disable,
}

impl ReadWriteSeparationStrategy {
    pub fn is_enabled(&self) -> bool {
        matches!(self, ReadWriteSeparationStrategy::Enable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadWriteSeparationStrategy::Enable => "enable",
            ReadWriteSeparationStrategy::Disable => "disable",
        }
    }
}

impl fmt::Display for ReadWriteSeparationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed form of a `"<strategy> <options>"` setting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadWriteSeparationStrategySetting {
    pub strategy: ReadWriteSeparationStrategy,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub options: String,
}

impl ReadWriteSeparationStrategySetting {
    pub fn new(strategy: ReadWriteSeparationStrategy, options: impl Into<String>) -> Self {
        Self {
            strategy,
            options: options.into(),
        }
    }

    /// Parse a strategy variable. The first whitespace-delimited token names
    /// the strategy; everything after the following whitespace run is kept
    /// verbatim as options. An empty value means `disable`.
    pub fn parse(value: &str) -> Result<Self> {
        let (name, options) = split_name_and_options(value);

        let strategy = match name {
            "" => ReadWriteSeparationStrategy::Disable,
            "enable" => ReadWriteSeparationStrategy::Enable,
            "disable" => ReadWriteSeparationStrategy::Disable,
            other => return Err(ShardCtlError::UnknownStrategy(other.to_string())),
        };

        Ok(Self::new(strategy, options))
    }

    pub fn is_enabled(&self) -> bool {
        self.strategy.is_enabled()
    }
}

fn split_name_and_options(value: &str) -> (&str, &str) {
    // A value starting with whitespace has no leading name token; keep it whole
    // so it is rejected as an unknown strategy.
    if value.starts_with(char::is_whitespace) {
        return (value, "");
    }
    match value.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim_start()),
        None => (value, ""),
    }
}

impl FromStr for ReadWriteSeparationStrategySetting {
    type Err = ShardCtlError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ReadWriteSeparationStrategySetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ReadWriteSeparationStrategySetting: strategy={}, options={}",
            self.strategy, self.options
        )
    }
}
