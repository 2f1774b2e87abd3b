//! Security event logging for audit trails.
//!
//! Structured records for authentication attempts, host key decisions and
//! gateway transport lifecycle. All events use `target: "security"` so they
//! can be filtered separately:
//!
//! ```bash
//! RUST_LOG=security=info sshtun --config tunnel.toml
//! ```

use tracing::{info, warn};

/// Log an SSH authentication attempt against the gateway.
pub fn log_auth_attempt(gateway: &str, username: &str, method: &str) {
    info!(
        target: "security",
        event = "auth_attempt",
        gateway = %gateway,
        username = %username,
        method = %method,
        "SSH authentication attempt"
    );
}

/// Log a successful SSH authentication.
pub fn log_auth_success(gateway: &str, username: &str, method: &str) {
    info!(
        target: "security",
        event = "auth_success",
        gateway = %gateway,
        username = %username,
        method = %method,
        "SSH authentication succeeded"
    );
}

/// Log a failed SSH authentication attempt.
pub fn log_auth_failure(gateway: &str, username: &str, method: &str, reason: &str) {
    warn!(
        target: "security",
        event = "auth_failure",
        gateway = %gateway,
        username = %username,
        method = %method,
        reason = %reason,
        "SSH authentication failed"
    );
}

/// Log a host key accepted without pinning (no allow-list configured).
pub fn log_host_key_presented(gateway: &str, key_type: &str, key_base64: &str) {
    info!(
        target: "security",
        event = "host_key_presented",
        gateway = %gateway,
        key_type = %key_type,
        key = %key_base64,
        "ssh: server sent {} {}",
        key_type,
        key_base64
    );
}

/// Log a host key that matched no allow-listed key.
pub fn log_host_key_rejected(gateway: &str, key_type: &str, key_base64: &str) {
    warn!(
        target: "security",
        event = "host_key_rejected",
        gateway = %gateway,
        key_type = %key_type,
        key = %key_base64,
        "Host key not in allow-list"
    );
}

/// Log a newly established gateway transport.
pub fn log_transport_established(gateway: &str, username: &str) {
    info!(
        target: "security",
        event = "transport_established",
        gateway = %gateway,
        username = %username,
        "SSH transport established"
    );
}

/// Log a gateway transport going away.
pub fn log_transport_closed(gateway: &str, by_client: bool) {
    info!(
        target: "security",
        event = "transport_closed",
        gateway = %gateway,
        by_client = by_client,
        "SSH transport closed"
    );
}
