use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use russh::client::Handler;
use russh::keys::PublicKey;
use tokio::sync::watch;

use crate::error::TunnelError;
use crate::security_log;

use super::auth::Identity;

/// russh callbacks for the gateway session.
///
/// The session task owns the handler, so dropping it marks the end of the
/// transport. That is reported through the `closed` watch channel.
pub struct TunnelHandler {
    gateway: String,
    identity: Arc<Identity>,
    closed_tx: watch::Sender<bool>,
    close_requested: Arc<AtomicBool>,
}

impl TunnelHandler {
    pub fn new(
        gateway: String,
        identity: Arc<Identity>,
        closed_tx: watch::Sender<bool>,
        close_requested: Arc<AtomicBool>,
    ) -> Self {
        Self {
            gateway,
            identity,
            closed_tx,
            close_requested,
        }
    }
}

impl Handler for TunnelHandler {
    type Error = TunnelError;

    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        let result = self
            .identity
            .verifier()
            .verify(&self.gateway, server_public_key)
            .map(|()| true);
        async move { result }
    }
}

impl Drop for TunnelHandler {
    fn drop(&mut self) {
        let by_client = self.close_requested.load(Ordering::SeqCst);
        self.closed_tx.send_replace(true);
        security_log::log_transport_closed(&self.gateway, by_client);
    }
}
