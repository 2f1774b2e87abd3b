//! Raw connections to the SSH gateway.

use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::destination::{BoxedStream, write_host_port};

/// Address of the SSH server all traffic is tunnelled through. Always TCP.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GatewayEndpoint {
    pub host: String,
    pub port: u16,
}

impl GatewayEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for GatewayEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_host_port(f, &self.host, self.port)
    }
}

/// Produces raw byte connections to the gateway.
///
/// TLS, proxy chaining and socket options are the dialer's business.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, endpoint: &GatewayEndpoint) -> io::Result<BoxedStream>;
}

/// Plain TCP dialer with a connect timeout
#[derive(Debug, Clone)]
pub struct TcpDialer {
    connect_timeout: Duration,
}

impl TcpDialer {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, endpoint: &GatewayEndpoint) -> io::Result<BoxedStream> {
        let stream = timeout(
            self.connect_timeout,
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await
        .map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("timeout connecting to {}", endpoint),
            )
        })??;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY on {}: {}", endpoint, e);
        }

        Ok(Box::new(stream))
    }
}
