use std::path::PathBuf;
use thiserror::Error;

use crate::ssh::destination::Network;
use crate::ssh::retry::RetryError;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key on line {line}: {reason}")]
    InvalidPublicKey { line: usize, reason: String },

    #[error("Invalid config: {0}")]
    Validation(#[from] crate::validation::ValidationError),
}

/// Errors surfaced by the tunnel, one variant per failing stage
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("failed to connect to destination {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: RetryError<std::io::Error>,
    },

    #[error("failed to establish secure transport: {0}")]
    Auth(String),

    #[error("ssh: {0}")]
    Trust(String),

    #[error("failed to open proxy connection to {destination}: {reason}")]
    Channel { destination: String, reason: String },

    #[error("connection ends: {0}")]
    Relay(#[source] std::io::Error),

    #[error("only stream transport supported, got {0}")]
    Unsupported(Network),

    #[error("russh error: {0}")]
    Russh(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<russh::Error> for TunnelError {
    fn from(err: russh::Error) -> Self {
        TunnelError::Russh(err.to_string())
    }
}

impl TunnelError {
    /// Short name of the stage that failed, used in log fields
    pub fn stage(&self) -> &'static str {
        match self {
            TunnelError::Connect { .. } => "connect",
            TunnelError::Auth(_) | TunnelError::Russh(_) => "authenticate",
            TunnelError::Trust(_) => "verify-host",
            TunnelError::Channel { .. } => "open-channel",
            TunnelError::Relay(_) => "relay",
            TunnelError::Unsupported(_) => "route",
            TunnelError::Config(_) => "config",
        }
    }
}
