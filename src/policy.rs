//! Per-level session timeouts.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Inactivity timeouts applied to one relayed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Allowed silence while both directions are still open
    pub connection_idle: Duration,
    /// Grace period once the uplink (gateway → caller) has finished
    pub uplink_only: Duration,
    /// Grace period once the downlink (caller → gateway) has finished
    pub downlink_only: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            connection_idle: Duration::from_secs(300),
            uplink_only: Duration::from_secs(1),
            downlink_only: Duration::from_secs(1),
        }
    }
}

/// Policy for one user level as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LevelPolicy {
    #[serde(default = "default_connection_idle")]
    pub connection_idle_secs: u64,
    #[serde(default = "default_direction_only")]
    pub uplink_only_secs: u64,
    #[serde(default = "default_direction_only")]
    pub downlink_only_secs: u64,
}

fn default_connection_idle() -> u64 {
    300
}

fn default_direction_only() -> u64 {
    1
}

impl Default for LevelPolicy {
    fn default() -> Self {
        Self {
            connection_idle_secs: default_connection_idle(),
            uplink_only_secs: default_direction_only(),
            downlink_only_secs: default_direction_only(),
        }
    }
}

impl From<&LevelPolicy> for SessionPolicy {
    fn from(level: &LevelPolicy) -> Self {
        Self {
            connection_idle: Duration::from_secs(level.connection_idle_secs),
            uplink_only: Duration::from_secs(level.uplink_only_secs),
            downlink_only: Duration::from_secs(level.downlink_only_secs),
        }
    }
}

/// `[policy]` section: session timeouts keyed by user level.
///
/// TOML table keys are strings, so levels are kept as written and parsed
/// when the manager is built.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PolicyConfig {
    #[serde(default)]
    pub levels: HashMap<String, LevelPolicy>,
}

impl PolicyConfig {
    /// Level keys that are not unsigned integers
    pub fn invalid_levels(&self) -> Vec<&str> {
        let mut invalid: Vec<&str> = self
            .levels
            .keys()
            .filter(|key| key.trim().parse::<u32>().is_err())
            .map(String::as_str)
            .collect();
        invalid.sort_unstable();
        invalid
    }
}

/// Resolves the session policy for a user level
#[derive(Debug, Clone, Default)]
pub struct PolicyManager {
    levels: HashMap<u32, SessionPolicy>,
}

impl PolicyManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        let levels = config
            .levels
            .iter()
            .filter_map(|(key, policy)| match key.trim().parse::<u32>() {
                Ok(level) => Some((level, SessionPolicy::from(policy))),
                Err(_) => {
                    tracing::warn!("Ignoring policy for non-numeric level '{}'", key);
                    None
                }
            })
            .collect();
        Self { levels }
    }

    pub fn with_level(mut self, level: u32, policy: SessionPolicy) -> Self {
        self.levels.insert(level, policy);
        self
    }

    /// Unknown levels fall back to the built-in defaults.
    pub fn for_level(&self, level: u32) -> SessionPolicy {
        self.levels.get(&level).copied().unwrap_or_default()
    }
}
