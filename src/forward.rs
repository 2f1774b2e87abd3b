//! Local TCP forwards: each accepted connection is tunnelled to a fixed target.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ForwardConfig;
use crate::outbound::Outbound;
use crate::ssh::destination::{Destination, Link};
use crate::ssh::transport::Connector;

/// A bound listener and the destination its connections go to
#[derive(Debug)]
pub struct LocalForward {
    listener: TcpListener,
    target: Destination,
}

impl LocalForward {
    pub async fn bind(config: &ForwardConfig) -> io::Result<Self> {
        let target = Destination::parse_tcp(&config.target).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("forward target must be host:port, got '{}'", config.target),
            )
        })?;
        let listener = TcpListener::bind(config.listen.trim()).await?;
        Ok(Self::new(listener, target))
    }

    pub fn new(listener: TcpListener, target: Destination) -> Self {
        Self { listener, target }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn target(&self) -> &Destination {
        &self.target
    }

    /// Accept until `cancel` fires. In-flight connections get a child token
    /// and are awaited before returning.
    pub async fn run<C: Connector>(self, outbound: Arc<Outbound<C>>, cancel: CancellationToken) {
        let local = self
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "?".to_string());
        info!(listen = %local, target = %self.target, "Local forward listening");

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, origin)) => {
                        stream.set_nodelay(true).ok();
                        let outbound = outbound.clone();
                        let target = self.target.clone();
                        let token = cancel.child_token();
                        connections.spawn(async move {
                            tracing::debug!("Forwarding {} to {}", origin, target);
                            if let Err(err) = outbound
                                .process(target, Link::from_stream(stream), token)
                                .await
                            {
                                warn!(%origin, stage = err.stage(), "Forwarded connection failed: {}", err);
                            }
                        });
                    }
                    Err(err) => {
                        warn!(?err, "Local forward accept error");
                        break;
                    }
                },
                // Reap finished connections so the set does not grow unbounded
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        while connections.join_next().await.is_some() {}
        info!(listen = %local, "Local forward stopped");
    }
}
