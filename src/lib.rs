//! sshtun: tunnel TCP connections through a single SSH gateway
//!
//! One authenticated SSH transport is shared by every request. Each request
//! gets its own `direct-tcpip` channel and a relay bounded by inactivity
//! timeouts.

pub mod config;
pub mod error;
pub mod forward;
pub mod logging;
pub mod outbound;
pub mod policy;
pub mod security_log;
pub mod ssh;
pub mod validation;

pub use error::{ConfigError, TunnelError};
pub use outbound::Outbound;
