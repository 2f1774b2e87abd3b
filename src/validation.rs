//! Checks on config values before anything touches the network.

use std::net::IpAddr;
use std::sync::LazyLock;

use regex::Regex;

use crate::ssh::destination::split_host_port;

/// A config value that failed validation, with the key it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

static DNS_LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?$").expect("static regex")
});

static USERNAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_.-]{0,31}$").expect("static regex")
});

/// Accept an IP literal or an RFC 1123 host name.
pub fn validate_hostname(field: &str, hostname: &str) -> Result<(), ValidationError> {
    let hostname = hostname.trim();

    if hostname.is_empty() {
        return Err(ValidationError::new(field, "host is required"));
    }
    if hostname.len() > 253 {
        return Err(ValidationError::new(
            field,
            "host exceeds maximum length of 253 characters",
        ));
    }
    if hostname.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    for label in hostname.split('.') {
        if !DNS_LABEL_REGEX.is_match(label) {
            return Err(ValidationError::new(
                field,
                format!("invalid host label '{}'", label),
            ));
        }
    }
    Ok(())
}

/// Port 0 is never a valid gateway or target.
pub fn validate_port(field: &str, port: u16) -> Result<u16, ValidationError> {
    if port == 0 {
        return Err(ValidationError::new(field, "port must be between 1 and 65535"));
    }
    Ok(port)
}

/// Blank is allowed and means `root`.
pub fn validate_username(field: &str, username: &str) -> Result<(), ValidationError> {
    let username = username.trim();
    if username.is_empty() {
        return Ok(());
    }
    if !USERNAME_REGEX.is_match(username) {
        return Err(ValidationError::new(
            field,
            format!("invalid user name '{}'", username),
        ));
    }
    Ok(())
}

/// Parse and check a `host:port` or `[v6]:port` address.
pub fn validate_host_port(field: &str, addr: &str) -> Result<(String, u16), ValidationError> {
    let (host, port) = split_host_port(addr)
        .ok_or_else(|| ValidationError::new(field, format!("expected host:port, got '{}'", addr)))?;
    validate_hostname(field, &host)?;
    validate_port(field, port)?;
    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostnames() {
        for ok in ["10.0.0.1", "::1", "gw.example.com", "bastion-01", "a"] {
            assert!(validate_hostname("outbound.address", ok).is_ok(), "{}", ok);
        }
        for bad in ["", "  ", "-gw", "gw-", "gw..example", "gw_1", "gw host"] {
            assert!(validate_hostname("outbound.address", bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn error_names_the_field() {
        let err = validate_hostname("outbound.address", "").unwrap_err();
        assert_eq!(err.field, "outbound.address");
        assert_eq!(err.to_string(), "outbound.address: host is required");
    }

    #[test]
    fn long_hostname_rejected() {
        let host = format!("{}.com", "a".repeat(260));
        assert!(validate_hostname("h", &host).is_err());
    }

    #[test]
    fn ports() {
        assert_eq!(validate_port("outbound.port", 22), Ok(22));
        assert!(validate_port("outbound.port", 0).is_err());
    }

    #[test]
    fn usernames() {
        assert!(validate_username("outbound.user", "").is_ok());
        assert!(validate_username("outbound.user", "root").is_ok());
        assert!(validate_username("outbound.user", "svc.tunnel").is_ok());
        assert!(validate_username("outbound.user", "1root").is_err());
        assert!(validate_username("outbound.user", "a b").is_err());
        assert!(validate_username("outbound.user", &"u".repeat(40)).is_err());
    }

    #[test]
    fn host_port_pairs() {
        assert_eq!(
            validate_host_port("forward.listen", "127.0.0.1:8080"),
            Ok(("127.0.0.1".to_string(), 8080))
        );
        assert_eq!(
            validate_host_port("forward.listen", "[::1]:1080"),
            Ok(("::1".to_string(), 1080))
        );
        assert!(validate_host_port("forward.target", "example.com").is_err());
        assert!(validate_host_port("forward.target", "example.com:0").is_err());
        assert!(validate_host_port("forward.target", "bad_host:80").is_err());
    }
}
