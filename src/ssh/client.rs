use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use russh::Disconnect;
use russh::client::{self, Config, Handle};
use secrecy::ExposeSecret;
use tokio::sync::watch;

use crate::error::TunnelError;
use crate::security_log;

use super::auth::{AuthMethod, Identity};
use super::destination::{BoxedStream, Destination};
use super::dialer::GatewayEndpoint;
use super::handler::TunnelHandler;
use super::transport::{Connector, Transport};

/// Builds authenticated SSH transports to one gateway
pub struct SshConnector {
    config: Arc<Config>,
    identity: Arc<Identity>,
    gateway: String,
}

impl SshConnector {
    pub fn new(endpoint: &GatewayEndpoint, identity: Arc<Identity>, keepalive_interval: u64) -> Self {
        // Treat 0 as "no keepalive"
        let keepalive = if keepalive_interval == 0 {
            None
        } else {
            Some(Duration::from_secs(keepalive_interval))
        };

        let config = Config {
            keepalive_interval: keepalive,
            keepalive_max: 3,
            ..Default::default()
        };

        Self {
            config: Arc::new(config),
            identity,
            gateway: endpoint.to_string(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    async fn authenticate(&self, handle: &mut Handle<TunnelHandler>) -> Result<(), TunnelError> {
        let username = self.identity.username();

        if self.identity.methods().is_empty() {
            security_log::log_auth_attempt(&self.gateway, username, "none");
            let result = handle.authenticate_none(username).await.map_err(|e| {
                security_log::log_auth_failure(&self.gateway, username, "none", &e.to_string());
                TunnelError::Auth(e.to_string())
            })?;
            if result.success() {
                security_log::log_auth_success(&self.gateway, username, "none");
                return Ok(());
            }
            let reason = "no authentication method configured and server requires one";
            security_log::log_auth_failure(&self.gateway, username, "none", reason);
            return Err(TunnelError::Auth(reason.to_string()));
        }

        for method in self.identity.methods() {
            let method_name = method.name();
            security_log::log_auth_attempt(&self.gateway, username, method_name);

            let result = match method {
                AuthMethod::Password(password) => {
                    // Use expose_secret() only at the point of authentication
                    handle
                        .authenticate_password(username, password.expose_secret())
                        .await
                }
                AuthMethod::PublicKey { .. } => match method.key_with_hash() {
                    Some(key) => handle.authenticate_publickey(username, key).await,
                    None => continue,
                },
            };

            match result {
                Ok(result) if result.success() => {
                    security_log::log_auth_success(&self.gateway, username, method_name);
                    return Ok(());
                }
                Ok(_) => {
                    security_log::log_auth_failure(
                        &self.gateway,
                        username,
                        method_name,
                        "Authentication rejected by server",
                    );
                }
                Err(e) => {
                    let reason = e.to_string();
                    security_log::log_auth_failure(&self.gateway, username, method_name, &reason);
                    return Err(TunnelError::Auth(reason));
                }
            }
        }

        Err(TunnelError::Auth(
            "Authentication rejected by server".to_string(),
        ))
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Transport = SshTransport;

    async fn connect(&self, stream: BoxedStream) -> Result<SshTransport, TunnelError> {
        let (closed_tx, closed_rx) = watch::channel(false);
        let close_requested = Arc::new(AtomicBool::new(false));
        let handler = TunnelHandler::new(
            self.gateway.clone(),
            self.identity.clone(),
            closed_tx,
            close_requested.clone(),
        );

        let mut handle = client::connect_stream(self.config.clone(), stream, handler)
            .await
            .map_err(|e| match e {
                // Host key rejections keep their own variant
                TunnelError::Trust(_) => e,
                other => TunnelError::Auth(other.to_string()),
            })?;

        self.authenticate(&mut handle).await?;
        security_log::log_transport_established(&self.gateway, self.identity.username());

        Ok(SshTransport {
            handle,
            gateway: self.gateway.clone(),
            closed_rx,
            close_requested,
        })
    }
}

/// Live gateway session. Channels are opened straight on the handle, which
/// russh lets many tasks share.
pub struct SshTransport {
    handle: Handle<TunnelHandler>,
    gateway: String,
    closed_rx: watch::Receiver<bool>,
    close_requested: Arc<AtomicBool>,
}

impl std::fmt::Debug for SshTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTransport")
            .field("gateway", &self.gateway)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn open_stream(&self, destination: &Destination) -> Result<BoxedStream, TunnelError> {
        tracing::debug!("Opening direct-tcpip channel to {} via {}", destination, self.gateway);
        let channel = self
            .handle
            .channel_open_direct_tcpip(
                destination.host.clone(),
                u32::from(destination.port),
                "127.0.0.1",
                0,
            )
            .await
            .map_err(|e| TunnelError::Channel {
                destination: destination.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(channel.into_stream()))
    }

    async fn closed(&self) {
        let mut rx = self.closed_rx.clone();
        // A dropped sender also means the session is gone
        let _ = rx.wait_for(|closed| *closed).await;
    }

    async fn close(&self) -> Result<(), TunnelError> {
        if self.close_requested.swap(true, Ordering::SeqCst) || self.is_closed() {
            return Ok(());
        }
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(TunnelError::from)
    }

    fn is_closed(&self) -> bool {
        *self.closed_rx.borrow() || self.handle.is_closed()
    }
}
