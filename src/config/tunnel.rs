use std::fmt;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;
use crate::ssh::auth::Identity;
use crate::ssh::dialer::GatewayEndpoint;
use crate::ssh::host_key_verification::TrustObserver;
use crate::validation::{self, ValidationError};

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_keepalive_interval() -> u64 {
    30
}

fn secret_opt<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.map(SecretString::from))
}

/// `[outbound]`: the gateway and how to log in to it
#[derive(Deserialize, Default)]
pub struct OutboundConfig {
    pub address: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// Blank means `root`
    #[serde(default)]
    pub user: String,
    /// Password, or the private key passphrase when `private_key` is set
    #[serde(default, deserialize_with = "secret_opt")]
    pub password: Option<SecretString>,
    /// PEM or OpenSSH private key text
    #[serde(default, deserialize_with = "secret_opt")]
    pub private_key: Option<SecretString>,
    /// Allowed gateway host keys, one authorized-keys entry per line
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub user_level: u32,
}

impl fmt::Debug for OutboundConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |s: &Option<SecretString>| s.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("OutboundConfig")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .field("private_key", &redact(&self.private_key))
            .field("public_key", &self.public_key.lines().filter(|l| !l.trim().is_empty()).count())
            .field("user_level", &self.user_level)
            .finish()
    }
}

impl OutboundConfig {
    pub fn endpoint(&self) -> GatewayEndpoint {
        GatewayEndpoint::new(self.address.trim(), self.port)
    }

    /// Resolve credentials and host key policy. Fails on unreadable keys.
    pub fn identity(&self, observer: Arc<dyn TrustObserver>) -> Result<Identity, ConfigError> {
        Identity::resolve(
            &self.user,
            self.password.as_ref(),
            self.private_key.as_ref(),
            &self.public_key,
            observer,
        )
    }

    pub fn has_credentials(&self) -> bool {
        let set = |s: &Option<SecretString>| s.as_ref().is_some_and(|s| !s.expose_secret().is_empty());
        set(&self.password) || set(&self.private_key)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_hostname("outbound.address", &self.address)?;
        validation::validate_port("outbound.port", self.port)?;
        validation::validate_username("outbound.user", &self.user)?;
        Ok(())
    }
}

/// `[transport]`: gateway connection tuning
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TransportConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// 0 disables keepalives
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            keepalive_interval_secs: default_keepalive_interval(),
        }
    }
}

/// One `[[forward]]` entry: listen locally, tunnel to a fixed target
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ForwardConfig {
    pub listen: String,
    pub target: String,
}

impl ForwardConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_host_port("forward.listen", &self.listen)?;
        validation::validate_host_port("forward.target", &self.target)?;
        Ok(())
    }
}
