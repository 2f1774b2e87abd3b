//! Seams between the transport manager and the SSH library.

use async_trait::async_trait;

use crate::error::TunnelError;

use super::destination::{BoxedStream, Destination};

/// An authenticated, multiplexed session to the gateway
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a forwarded stream to `destination` over this transport.
    ///
    /// Failure here leaves the transport usable.
    async fn open_stream(&self, destination: &Destination) -> Result<BoxedStream, TunnelError>;

    /// Resolves once the transport has ended for any reason.
    async fn closed(&self);

    /// Tear the transport down. Closing an already closed transport is Ok.
    async fn close(&self) -> Result<(), TunnelError>;

    fn is_closed(&self) -> bool;
}

/// Runs the handshake and authentication over a raw gateway connection
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    async fn connect(&self, stream: BoxedStream) -> Result<Self::Transport, TunnelError>;
}
