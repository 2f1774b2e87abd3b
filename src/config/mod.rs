pub mod paths;
pub mod tunnel;

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::policy::PolicyConfig;
use crate::validation::ValidationError;

pub use tunnel::{ForwardConfig, OutboundConfig, TransportConfig};

/// Everything read from `sshtun.toml`
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub outbound: OutboundConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default, rename = "forward")]
    pub forwards: Vec<ForwardConfig>,
}

impl AppConfig {
    /// Read, parse and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = Self::parse(&content)?;
        tracing::debug!(
            "Loaded config from {} ({} forwards)",
            path.display(),
            config.forwards.len()
        );
        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.outbound.validate()?;

        if let Some(level) = self.policy.invalid_levels().first() {
            return Err(ValidationError {
                field: "policy.levels".to_string(),
                message: format!("level '{}' is not an unsigned integer", level),
            });
        }

        for forward in &self.forwards {
            forward.validate()?;
        }
        Ok(())
    }
}
