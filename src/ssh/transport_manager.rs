//! Lazily created, shared gateway transport.
//!
//! All callers multiplex over a single transport. It is created on first use,
//! watched for the rest of its life, and replaced by the next caller once it
//! dies.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::error::TunnelError;

use super::dialer::{Dialer, GatewayEndpoint};
use super::retry::Backoff;
use super::transport::{Connector, Transport};

type Slot<T> = Arc<RwLock<Option<Arc<T>>>>;

pub struct TransportManager<C: Connector> {
    endpoint: GatewayEndpoint,
    dialer: Arc<dyn Dialer>,
    connector: C,
    backoff: Backoff,
    slot: Slot<C::Transport>,
    create_lock: Mutex<()>,
}

impl<C: Connector> std::fmt::Debug for TransportManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportManager")
            .field("endpoint", &self.endpoint)
            .field("backoff", &self.backoff)
            .field("connected", &self.current().is_some())
            .finish()
    }
}

impl<C: Connector> TransportManager<C> {
    pub fn new(endpoint: GatewayEndpoint, dialer: Arc<dyn Dialer>, connector: C) -> Self {
        Self {
            endpoint,
            dialer,
            connector,
            backoff: Backoff::default(),
            slot: Arc::new(RwLock::new(None)),
            create_lock: Mutex::new(()),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn endpoint(&self) -> &GatewayEndpoint {
        &self.endpoint
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// The live transport, if any, without creating one
    pub fn current(&self) -> Option<Arc<C::Transport>> {
        self.slot
            .read()
            .as_ref()
            .filter(|transport| !transport.is_closed())
            .cloned()
    }

    /// Whether the slot holds a transport, live or not yet reaped
    pub fn has_transport(&self) -> bool {
        self.slot.read().is_some()
    }

    /// Return the shared transport, creating it when absent or dead.
    pub async fn acquire(&self) -> Result<Arc<C::Transport>, TunnelError> {
        if let Some(transport) = self.current() {
            return Ok(transport);
        }

        let _guard = self.create_lock.lock().await;

        // Someone may have published while we waited
        {
            let mut slot = self.slot.write();
            if let Some(transport) = slot.as_ref() {
                if !transport.is_closed() {
                    return Ok(transport.clone());
                }
            }
            if slot.take().is_some() {
                tracing::debug!("Evicting dead transport to {}", self.endpoint);
            }
        }

        let transport = Arc::new(self.establish().await?);
        *self.slot.write() = Some(transport.clone());
        self.spawn_watcher(transport.clone());

        tracing::info!("Gateway transport to {} established", self.endpoint);
        Ok(transport)
    }

    async fn establish(&self) -> Result<C::Transport, TunnelError> {
        let endpoint = &self.endpoint;
        let stream = self
            .backoff
            .run(|attempt| async move {
                tracing::debug!("Dialing gateway {} (attempt {})", endpoint, attempt + 1);
                self.dialer.dial(endpoint).await
            })
            .await
            .map_err(|source| {
                tracing::warn!("Failed to connect to gateway {}: {}", endpoint, source);
                TunnelError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                }
            })?;

        self.connector.connect(stream).await.inspect_err(|e| {
            tracing::warn!("Handshake with gateway {} failed: {}", endpoint, e);
        })
    }

    /// One watcher per transport; it only clears the slot if the slot still
    /// holds this exact instance.
    fn spawn_watcher(&self, transport: Arc<C::Transport>) {
        let slot = self.slot.clone();
        let endpoint = self.endpoint.clone();
        tokio::spawn(async move {
            transport.closed().await;
            let cleared = invalidate_if_matches(&slot, &transport);
            if cleared {
                tracing::info!("Gateway transport to {} closed, will reconnect on demand", endpoint);
            } else {
                tracing::debug!("Gateway transport to {} closed after being replaced", endpoint);
            }
        });
    }

    /// Close and forget the current transport. No transport is not an error.
    ///
    /// Waits for an in-flight `acquire` to publish first, so the transport it
    /// builds is the one closed here.
    pub async fn close(&self) -> Result<(), TunnelError> {
        let transport = {
            let _guard = self.create_lock.lock().await;
            self.slot.write().take()
        };
        match transport {
            Some(transport) => {
                tracing::info!("Closing gateway transport to {}", self.endpoint);
                transport.close().await
            }
            None => Ok(()),
        }
    }
}

fn invalidate_if_matches<T>(slot: &RwLock<Option<Arc<T>>>, transport: &Arc<T>) -> bool {
    let mut slot = slot.write();
    let matches = slot
        .as_ref()
        .is_some_and(|existing| Arc::ptr_eq(existing, transport));
    if matches {
        *slot = None;
    }
    matches
}
