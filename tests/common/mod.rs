//! Common test utilities: scripted dialer, connector and transport fakes.

#![allow(dead_code)]

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::watch;
use tokio::time::Instant;

use sshtun::TunnelError;
use sshtun::policy::SessionPolicy;
use sshtun::ssh::{BoxedStream, Connector, Destination, Dialer, GatewayEndpoint, Transport};

pub fn endpoint() -> GatewayEndpoint {
    GatewayEndpoint::new("gw.test", 22)
}

/// Short timeouts so relay tests finish quickly
pub fn fast_policy() -> SessionPolicy {
    SessionPolicy {
        connection_idle: Duration::from_millis(200),
        uplink_only: Duration::from_millis(100),
        downlink_only: Duration::from_millis(100),
    }
}

/// Dialer that fails a scripted number of times before succeeding
#[derive(Default)]
pub struct FakeDialer {
    fail_first: u32,
    always_fail: bool,
    calls: AtomicU32,
    stamps: Mutex<Vec<Instant>>,
    peers: Mutex<Vec<DuplexStream>>,
}

impl FakeDialer {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_first(n: u32) -> Arc<Self> {
        Arc::new(Self {
            fail_first: n,
            ..Self::default()
        })
    }

    pub fn always_failing() -> Arc<Self> {
        Arc::new(Self {
            always_fail: true,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn stamps(&self) -> Vec<Instant> {
        self.stamps.lock().clone()
    }
}

#[async_trait]
impl Dialer for FakeDialer {
    async fn dial(&self, _endpoint: &GatewayEndpoint) -> io::Result<BoxedStream> {
        self.stamps.lock().push(Instant::now());
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.always_fail || n < self.fail_first {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"));
        }
        let (ours, theirs) = tokio::io::duplex(1024);
        self.peers.lock().push(theirs);
        Ok(Box::new(ours))
    }
}

/// What the far end of an opened channel does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remote {
    /// Echo every byte back and half-close after the caller does
    Echo,
    /// Accept bytes, never answer, never close
    Silent,
    /// Finish sending straight away but keep reading
    HalfClose,
}

/// Shared view of one fake transport, kept by the connector for the test
pub struct TransportState {
    pub id: u32,
    remote: Remote,
    fail_open: bool,
    closed: watch::Sender<bool>,
    close_calls: AtomicU32,
    open_calls: AtomicU32,
    silent_peers: Mutex<Vec<DuplexStream>>,
}

impl TransportState {
    /// Simulate the gateway dropping the session
    pub fn kill(&self) {
        self.closed.send_replace(true);
    }

    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn open_calls(&self) -> u32 {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

pub struct FakeTransport {
    pub state: Arc<TransportState>,
}

impl std::fmt::Debug for FakeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeTransport")
            .field("id", &self.state.id)
            .field("remote", &self.state.remote)
            .finish_non_exhaustive()
    }
}

impl FakeTransport {
    pub fn new(id: u32, remote: Remote, fail_open: bool) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            state: Arc::new(TransportState {
                id,
                remote,
                fail_open,
                closed,
                close_calls: AtomicU32::new(0),
                open_calls: AtomicU32::new(0),
                silent_peers: Mutex::new(Vec::new()),
            }),
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open_stream(&self, destination: &Destination) -> Result<BoxedStream, TunnelError> {
        self.state.open_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_open {
            return Err(TunnelError::Channel {
                destination: destination.to_string(),
                reason: "administratively prohibited".to_string(),
            });
        }

        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        match self.state.remote {
            Remote::Echo => {
                tokio::spawn(async move {
                    let (mut reader, mut writer) = tokio::io::split(theirs);
                    let _ = tokio::io::copy(&mut reader, &mut writer).await;
                    let _ = writer.shutdown().await;
                });
            }
            Remote::Silent => self.state.silent_peers.lock().push(theirs),
            Remote::HalfClose => {
                let mut theirs = theirs;
                theirs.shutdown().await.map_err(TunnelError::Relay)?;
                self.state.silent_peers.lock().push(theirs);
            }
        }
        Ok(Box::new(ours))
    }

    async fn closed(&self) {
        let mut rx = self.state.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    async fn close(&self) -> Result<(), TunnelError> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        self.state.closed.send_replace(true);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state.is_closed()
    }
}

/// Connector producing fake transports, optionally slow or failing
pub struct FakeConnector {
    delay: Duration,
    fail: bool,
    remote: Remote,
    fail_open: bool,
    calls: AtomicU32,
    transports: Mutex<Vec<Arc<TransportState>>>,
}

impl FakeConnector {
    pub fn new(remote: Remote) -> Self {
        Self {
            delay: Duration::ZERO,
            fail: false,
            remote,
            fail_open: false,
            calls: AtomicU32::new(0),
            transports: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn transports(&self) -> Vec<Arc<TransportState>> {
        self.transports.lock().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Transport = FakeTransport;

    async fn connect(&self, _stream: BoxedStream) -> Result<FakeTransport, TunnelError> {
        let id = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(TunnelError::Auth("unable to authenticate".to_string()));
        }
        let transport = FakeTransport::new(id, self.remote, self.fail_open);
        self.transports.lock().push(transport.state.clone());
        Ok(transport)
    }
}
