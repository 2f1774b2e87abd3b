use std::fmt;
use std::sync::Arc;

use russh::keys::{HashAlg, PrivateKey, PrivateKeyWithHashAlg};
use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;

use super::host_key_verification::{HostKeyVerifier, TrustObserver};

/// Username used when the config leaves it blank
pub const DEFAULT_USERNAME: &str = "root";

/// One way of proving who we are to the gateway
pub enum AuthMethod {
    /// Password authentication with zeroized secret string
    Password(SecretString),
    /// Public key authentication with a decoded private key
    PublicKey {
        key: Arc<PrivateKey>,
        hash_alg: Option<HashAlg>,
    },
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Password(_) => f.debug_tuple("Password").field(&"[REDACTED]").finish(),
            AuthMethod::PublicKey { .. } => f.debug_tuple("PublicKey").field(&"[KEY]").finish(),
        }
    }
}

impl AuthMethod {
    /// Method name as used in the SSH protocol, for logging
    pub fn name(&self) -> &'static str {
        match self {
            AuthMethod::Password(_) => "password",
            AuthMethod::PublicKey { .. } => "publickey",
        }
    }

    /// Key paired with its signature hash, ready for `authenticate_publickey`
    pub fn key_with_hash(&self) -> Option<PrivateKeyWithHashAlg> {
        match self {
            AuthMethod::PublicKey { key, hash_alg } => {
                Some(PrivateKeyWithHashAlg::new(key.clone(), *hash_alg))
            }
            AuthMethod::Password(_) => None,
        }
    }
}

/// Who we log in as and which gateway host keys we trust
pub struct Identity {
    username: String,
    methods: Vec<AuthMethod>,
    verifier: HostKeyVerifier,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("username", &self.username)
            .field("methods", &self.methods)
            .field("verifier", &self.verifier)
            .finish()
    }
}

impl Identity {
    pub fn new(username: &str, methods: Vec<AuthMethod>, verifier: HostKeyVerifier) -> Self {
        let username = username.trim();
        let username = if username.is_empty() {
            DEFAULT_USERNAME.to_string()
        } else {
            username.to_string()
        };
        Self {
            username,
            methods,
            verifier,
        }
    }

    /// Resolve raw credential material.
    ///
    /// A private key wins over a password; when both are set the password is
    /// the key's passphrase. Neither leaves the method list empty.
    pub fn resolve(
        username: &str,
        password: Option<&SecretString>,
        private_key: Option<&SecretString>,
        authorized_keys: &str,
        observer: Arc<dyn TrustObserver>,
    ) -> Result<Self, ConfigError> {
        let password = password.filter(|p| !p.expose_secret().is_empty());
        let private_key = private_key.filter(|k| !k.expose_secret().trim().is_empty());

        let methods = match (private_key, password) {
            (Some(pem), passphrase) => {
                let passphrase = passphrase.map(|p| p.expose_secret());
                vec![decode_private_key(pem.expose_secret(), passphrase)?]
            }
            (None, Some(password)) => vec![AuthMethod::Password(SecretString::from(
                password.expose_secret().to_string(),
            ))],
            (None, None) => Vec::new(),
        };

        let verifier = HostKeyVerifier::from_authorized_keys(authorized_keys, observer)?;
        Ok(Self::new(username, methods, verifier))
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn methods(&self) -> &[AuthMethod] {
        &self.methods
    }

    pub fn verifier(&self) -> &HostKeyVerifier {
        &self.verifier
    }
}

/// Decode PEM/OpenSSH private key text, optionally encrypted
pub fn decode_private_key(text: &str, passphrase: Option<&str>) -> Result<AuthMethod, ConfigError> {
    let first_line = text.trim_start().lines().next().unwrap_or("");
    if first_line.starts_with("ssh-") || first_line.starts_with("ecdsa-") {
        return Err(ConfigError::InvalidPrivateKey(
            "value is a PUBLIC key, not a private key".to_string(),
        ));
    }

    let key = russh::keys::decode_secret_key(text.trim(), passphrase).map_err(|e| {
        let msg = e.to_string();
        let normalized = msg.to_lowercase();
        let is_passphrase_error = normalized.contains("encrypted")
            || normalized.contains("passphrase")
            || normalized.contains("cryptographic");
        if is_passphrase_error && passphrase.is_none() {
            ConfigError::InvalidPrivateKey(format!("key is encrypted and no passphrase was given ({})", msg))
        } else {
            ConfigError::InvalidPrivateKey(msg)
        }
    })?;

    // Only RSA keys take an explicit signature hash
    let hash_alg = if key.algorithm().is_rsa() {
        Some(HashAlg::Sha512)
    } else {
        None
    };

    Ok(AuthMethod::PublicKey {
        key: Arc::new(key),
        hash_alg,
    })
}
