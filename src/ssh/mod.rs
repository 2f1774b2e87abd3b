//! SSH gateway tunnel
//!
//! Dialing, handshake, the shared transport and the per-request relay.

pub mod activity;
pub mod auth;
pub mod client;
pub mod destination;
pub mod dialer;
pub mod handler;
pub mod host_key_verification;
pub mod relay;
pub mod retry;
pub mod transport;
pub mod transport_manager;

pub use auth::{AuthMethod, Identity};
pub use client::{SshConnector, SshTransport};
pub use destination::{BoxedStream, Destination, Link, Network};
pub use dialer::{Dialer, GatewayEndpoint, TcpDialer};
pub use host_key_verification::{HostKeyInfo, HostKeyVerifier, SecurityLogObserver, TrustObserver};
pub use relay::relay;
pub use retry::{Backoff, RetryError};
pub use transport::{Connector, Transport};
pub use transport_manager::TransportManager;
