//! The outbound handler the routing layer talks to.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, OutboundConfig, TransportConfig};
use crate::error::{ConfigError, TunnelError};
use crate::policy::{PolicyManager, SessionPolicy};
use crate::ssh::client::SshConnector;
use crate::ssh::destination::{Destination, Link, Network};
use crate::ssh::dialer::{Dialer, GatewayEndpoint, TcpDialer};
use crate::ssh::host_key_verification::{SecurityLogObserver, TrustObserver};
use crate::ssh::relay::relay;
use crate::ssh::transport::Connector;
use crate::ssh::transport_manager::TransportManager;

/// Tunnels logical connections through one SSH gateway.
///
/// Cheap to share behind an `Arc`; every `process` call runs independently
/// over the same gateway transport.
pub struct Outbound<C: Connector = SshConnector> {
    manager: TransportManager<C>,
    policy: SessionPolicy,
}

impl<C: Connector> std::fmt::Debug for Outbound<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbound")
            .field("manager", &self.manager)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Outbound<SshConnector> {
    /// Build from config sections. Key material is decoded here, so a bad key
    /// fails construction rather than the first request.
    pub fn from_config(
        outbound: &OutboundConfig,
        transport: &TransportConfig,
        policies: &PolicyManager,
        observer: Arc<dyn TrustObserver>,
    ) -> Result<Self, ConfigError> {
        outbound.validate()?;

        let endpoint = outbound.endpoint();
        let identity = Arc::new(outbound.identity(observer)?);
        if identity.methods().is_empty() {
            tracing::warn!(
                "No password or private key configured for {}; only 'none' authentication will be tried",
                endpoint
            );
        }
        if !identity.verifier().is_pinned() {
            tracing::warn!(
                "No host key allow-list for {}; any gateway key will be accepted",
                endpoint
            );
        }

        let connector = SshConnector::new(&endpoint, identity, transport.keepalive_interval_secs);
        let dialer = Arc::new(TcpDialer::new(Duration::from_secs(transport.connect_timeout_secs)));
        let policy = policies.for_level(outbound.user_level);

        Ok(Self::new(endpoint, dialer, connector, policy))
    }

    /// Build from a loaded config file, reporting host keys to the security log
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let policies = PolicyManager::from_config(&config.policy);
        Self::from_config(
            &config.outbound,
            &config.transport,
            &policies,
            Arc::new(SecurityLogObserver),
        )
    }
}

impl<C: Connector> Outbound<C> {
    pub fn new(
        endpoint: GatewayEndpoint,
        dialer: Arc<dyn Dialer>,
        connector: C,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            manager: TransportManager::new(endpoint, dialer, connector),
            policy,
        }
    }

    /// Replace the transport manager, e.g. to tune its retry policy
    pub fn map_manager(mut self, f: impl FnOnce(TransportManager<C>) -> TransportManager<C>) -> Self {
        self.manager = f(self.manager);
        self
    }

    pub fn manager(&self) -> &TransportManager<C> {
        &self.manager
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Carry one logical connection to `destination` until it ends.
    pub async fn process(
        &self,
        destination: Destination,
        link: Link,
        cancel: CancellationToken,
    ) -> Result<(), TunnelError> {
        // Checked before touching the gateway
        if destination.network != Network::Tcp {
            return Err(TunnelError::Unsupported(destination.network));
        }

        let result = async {
            let transport = self.manager.acquire().await?;
            relay(transport.as_ref(), &destination, link, &self.policy, &cancel).await
        }
        .await;

        if let Err(e) = &result {
            tracing::debug!(stage = e.stage(), "Request to {} failed: {}", destination, e);
        }
        result
    }

    /// Close the gateway transport. Safe to call repeatedly.
    pub async fn close(&self) -> Result<(), TunnelError> {
        self.manager.close().await
    }
}
