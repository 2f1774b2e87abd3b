//! Host key verification for the gateway.
//!
//! Either pins the gateway to an allow-list of public keys given in
//! authorized-keys format, or accepts any key and reports it through a
//! [`TrustObserver`]. Callers that want strict verification must configure
//! the allow-list.

use std::fmt;
use std::sync::Arc;

use data_encoding::BASE64;
use russh::keys::{self, HashAlg, PublicKey};

use crate::error::{ConfigError, TunnelError};
use crate::security_log;

/// Presented host key, rendered for reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostKeyInfo {
    pub key_type: String,
    pub key_base64: String,
    pub fingerprint: String,
}

impl HostKeyInfo {
    pub fn from_key(key: &PublicKey) -> Result<Self, TunnelError> {
        let encoded = canonical_bytes(key)?;
        Ok(Self {
            key_type: key.algorithm().as_str().to_string(),
            key_base64: BASE64.encode(&encoded),
            fingerprint: key.fingerprint(HashAlg::Sha256).to_string(),
        })
    }
}

/// Receives host key decisions. The verifier decides what to report, the
/// observer decides where it goes.
pub trait TrustObserver: Send + Sync {
    /// A key was accepted because no allow-list is configured
    fn host_key_presented(&self, gateway: &str, key: &HostKeyInfo);

    /// A key matched no allow-listed key
    fn host_key_rejected(&self, gateway: &str, key: &HostKeyInfo);
}

/// Default observer writing to the security audit log
#[derive(Debug, Default, Clone, Copy)]
pub struct SecurityLogObserver;

impl TrustObserver for SecurityLogObserver {
    fn host_key_presented(&self, gateway: &str, key: &HostKeyInfo) {
        security_log::log_host_key_presented(gateway, &key.key_type, &key.key_base64);
    }

    fn host_key_rejected(&self, gateway: &str, key: &HostKeyInfo) {
        security_log::log_host_key_rejected(gateway, &key.key_type, &key.key_base64);
    }
}

#[derive(Debug, Clone)]
struct AllowedKey {
    key_type: String,
    encoded: Vec<u8>,
}

/// Decides whether a presented gateway host key is trusted
#[derive(Clone)]
pub struct HostKeyVerifier {
    allowed: Vec<AllowedKey>,
    observer: Arc<dyn TrustObserver>,
}

impl fmt::Debug for HostKeyVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types: Vec<&str> = self.allowed.iter().map(|k| k.key_type.as_str()).collect();
        f.debug_struct("HostKeyVerifier")
            .field("allowed", &types)
            .field("observer", &"<observer>")
            .finish()
    }
}

impl HostKeyVerifier {
    /// Accept any host key, reporting each one to the observer
    pub fn accept_any(observer: Arc<dyn TrustObserver>) -> Self {
        Self {
            allowed: Vec::new(),
            observer,
        }
    }

    /// Pin to the given keys
    pub fn allow_list(keys: &[PublicKey], observer: Arc<dyn TrustObserver>) -> Result<Self, ConfigError> {
        let allowed = keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                let encoded = canonical_bytes(key).map_err(|e| ConfigError::InvalidPublicKey {
                    line: i + 1,
                    reason: e.to_string(),
                })?;
                Ok(AllowedKey {
                    key_type: key.algorithm().as_str().to_string(),
                    encoded,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self { allowed, observer })
    }

    /// Build from newline separated authorized-keys text. Empty text means
    /// accept-any.
    pub fn from_authorized_keys(
        text: &str,
        observer: Arc<dyn TrustObserver>,
    ) -> Result<Self, ConfigError> {
        let keys = parse_authorized_keys(text)?;
        Self::allow_list(&keys, observer)
    }

    pub fn is_pinned(&self) -> bool {
        !self.allowed.is_empty()
    }

    pub fn allowed_count(&self) -> usize {
        self.allowed.len()
    }

    /// Check a key presented by `gateway` during the handshake.
    pub fn verify(&self, gateway: &str, key: &PublicKey) -> Result<(), TunnelError> {
        if !self.is_pinned() {
            let info = HostKeyInfo::from_key(key)?;
            self.observer.host_key_presented(gateway, &info);
            return Ok(());
        }

        let presented = canonical_bytes(key)?;
        if self.allowed.iter().any(|allowed| allowed.encoded == presented) {
            tracing::debug!("Host key for {} matched allow-list", gateway);
            return Ok(());
        }

        let info = HostKeyInfo::from_key(key)?;
        self.observer.host_key_rejected(gateway, &info);
        Err(TunnelError::Trust(format!(
            "host key mismatch, server sent {} {}",
            info.key_type, info.key_base64
        )))
    }
}

fn canonical_bytes(key: &PublicKey) -> Result<Vec<u8>, TunnelError> {
    key.to_bytes()
        .map_err(|e| TunnelError::Trust(format!("cannot encode host key: {}", e)))
}

fn looks_like_key_type(token: &str) -> bool {
    token.starts_with("ssh-") || token.starts_with("ecdsa-sha2-") || token.starts_with("sk-")
}

/// Parse one authorized-keys entry: `[options] <type> <base64> [comment]`
pub fn parse_authorized_key(line: &str) -> Result<PublicKey, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let type_index = tokens
        .iter()
        .position(|token| looks_like_key_type(token))
        .ok_or_else(|| "missing key type".to_string())?;
    let key_type = tokens[type_index];
    let key_data = tokens
        .get(type_index + 1)
        .ok_or_else(|| format!("missing key data after {}", key_type))?;

    let key = keys::parse_public_key_base64(key_data).map_err(|e| e.to_string())?;
    if key.algorithm().as_str() != key_type {
        return Err(format!(
            "key type {} does not match encoded key {}",
            key_type,
            key.algorithm().as_str()
        ));
    }
    Ok(key)
}

/// Parse every non-blank line; the first bad line fails the whole list.
pub fn parse_authorized_keys(text: &str) -> Result<Vec<PublicKey>, ConfigError> {
    let mut keys = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = parse_authorized_key(trimmed).map_err(|reason| ConfigError::InvalidPublicKey {
            line: index + 1,
            reason,
        })?;
        keys.push(key);
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    const KEY_A: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIBZ43nOuFxTbzE7KWLBBermAqUJ23CX505Ineshgs3GP";
    const KEY_B: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIDyHBCDQzkABdOMepoUsRfRyFy0weuzDCgOTaRZFVxGY";

    #[derive(Default)]
    struct Recorder {
        presented: Mutex<Vec<(String, HostKeyInfo)>>,
        rejected: Mutex<Vec<(String, HostKeyInfo)>>,
    }

    impl TrustObserver for Recorder {
        fn host_key_presented(&self, gateway: &str, key: &HostKeyInfo) {
            self.presented.lock().push((gateway.to_string(), key.clone()));
        }

        fn host_key_rejected(&self, gateway: &str, key: &HostKeyInfo) {
            self.rejected.lock().push((gateway.to_string(), key.clone()));
        }
    }

    fn key(data: &str) -> PublicKey {
        keys::parse_public_key_base64(data).expect("parse key")
    }

    #[test]
    fn allow_list_accepts_matching_key() {
        let recorder = Arc::new(Recorder::default());
        let text = format!("ssh-ed25519 {KEY_B} other\nssh-ed25519 {KEY_A} gateway\n");
        let verifier = HostKeyVerifier::from_authorized_keys(&text, recorder.clone()).unwrap();

        assert!(verifier.is_pinned());
        assert_eq!(verifier.allowed_count(), 2);
        assert!(verifier.verify("gw:22", &key(KEY_A)).is_ok());
        assert!(recorder.presented.lock().is_empty());
        assert!(recorder.rejected.lock().is_empty());
    }

    #[test]
    fn allow_list_rejects_other_key() {
        let recorder = Arc::new(Recorder::default());
        let text = format!("ssh-ed25519 {KEY_A}");
        let verifier = HostKeyVerifier::from_authorized_keys(&text, recorder.clone()).unwrap();

        let err = verifier.verify("gw:22", &key(KEY_B)).unwrap_err();
        assert!(matches!(err, TunnelError::Trust(_)));
        let msg = err.to_string();
        assert!(msg.contains("host key mismatch"), "{}", msg);
        assert!(msg.contains("ssh-ed25519"), "{}", msg);
        assert!(msg.contains(KEY_B), "{}", msg);

        let rejected = recorder.rejected.lock();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].0, "gw:22");
        assert_eq!(rejected[0].1.key_base64, KEY_B);
    }

    #[test]
    fn empty_allow_list_accepts_and_reports() {
        let recorder = Arc::new(Recorder::default());
        let verifier = HostKeyVerifier::from_authorized_keys("\n  \n", recorder.clone()).unwrap();

        assert!(!verifier.is_pinned());
        assert!(verifier.verify("gw:2222", &key(KEY_B)).is_ok());

        let presented = recorder.presented.lock();
        assert_eq!(presented.len(), 1);
        assert_eq!(presented[0].0, "gw:2222");
        assert_eq!(presented[0].1.key_type, "ssh-ed25519");
        assert_eq!(presented[0].1.key_base64, KEY_B);
        assert!(presented[0].1.fingerprint.starts_with("SHA256:"));
    }

    #[test]
    fn comparison_ignores_comments() {
        let verifier = HostKeyVerifier::from_authorized_keys(
            &format!("ssh-ed25519 {KEY_A} a-comment-that-differs"),
            Arc::new(SecurityLogObserver),
        )
        .unwrap();
        assert!(verifier.verify("gw:22", &key(KEY_A)).is_ok());
    }

    #[test]
    fn parse_entry_with_options_prefix() {
        let parsed = parse_authorized_key(&format!(
            "no-port-forwarding,no-pty ssh-ed25519 {KEY_A} user@host"
        ))
        .expect("parse");
        assert_eq!(parsed, key(KEY_A));
    }

    #[test]
    fn parse_rejects_garbage_line_with_line_number() {
        let text = format!("ssh-ed25519 {KEY_A}\n\nnot a key at all\n");
        let err = parse_authorized_keys(&text).unwrap_err();
        match err {
            ConfigError::InvalidPublicKey { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_bad_base64() {
        let err = parse_authorized_keys("ssh-ed25519 !!!notbase64!!!").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPublicKey { line: 1, .. }));
        assert!(err.to_string().starts_with("invalid public key"));
    }

    #[test]
    fn parse_rejects_missing_key_data() {
        let err = parse_authorized_key("ssh-ed25519").unwrap_err();
        assert!(err.contains("missing key data"));
    }

    #[test]
    fn parse_rejects_type_mismatch() {
        let err = parse_authorized_key(&format!("ssh-rsa {KEY_A}")).unwrap_err();
        assert!(err.contains("does not match"), "{}", err);
    }

    #[test]
    fn debug_lists_key_types_only() {
        let verifier = HostKeyVerifier::from_authorized_keys(
            &format!("ssh-ed25519 {KEY_A}"),
            Arc::new(SecurityLogObserver),
        )
        .unwrap();
        let debug = format!("{:?}", verifier);
        assert!(debug.contains("ssh-ed25519"));
        assert!(!debug.contains(KEY_A));
    }
}
