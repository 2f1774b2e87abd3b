//! Per-request copy loop between the caller's link and a forwarded channel.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::TunnelError;
use crate::policy::SessionPolicy;

use super::activity::ActivityTimer;
use super::destination::{Destination, Link, Network};
use super::transport::Transport;

const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Relay one logical connection over `transport`.
///
/// Returns `Ok(())` when both directions finish or the session goes idle.
/// Cancelling `parent` ends the relay with an `Interrupted` error. The
/// transport itself is never closed here.
pub async fn relay<T>(
    transport: &T,
    destination: &Destination,
    link: Link,
    policy: &SessionPolicy,
    parent: &CancellationToken,
) -> Result<(), TunnelError>
where
    T: Transport + ?Sized,
{
    if destination.network != Network::Tcp {
        return Err(TunnelError::Unsupported(destination.network));
    }

    let session_id = uuid::Uuid::new_v4();
    let span = tracing::debug_span!("relay", session = %session_id, destination = %destination);

    async move {
        let channel = transport.open_stream(destination).await?;
        tracing::debug!("Channel open");

        let token = parent.child_token();
        // Stops the timer however the relay ends
        let _stop_timer = token.clone().drop_guard();
        let timer = ActivityTimer::start(token.clone(), policy.connection_idle);

        let (mut channel_reader, mut channel_writer) = tokio::io::split(channel);
        let Link {
            mut reader,
            mut writer,
        } = link;

        // Once the caller stops sending only the downlink remains, and vice versa
        let request = async {
            let result = copy_with_activity(&mut reader, &mut channel_writer, &timer).await;
            timer.set_timeout(policy.downlink_only);
            result
        };
        let response = async {
            let result = copy_with_activity(&mut channel_reader, &mut writer, &timer).await;
            timer.set_timeout(policy.uplink_only);
            result
        };

        let outcome = tokio::select! {
            result = async { tokio::try_join!(request, response) } => result.map(|(sent, received)| {
                tracing::debug!(sent, received, "Both directions finished");
            }),
            _ = token.cancelled() => {
                if parent.is_cancelled() {
                    Err(io::Error::new(io::ErrorKind::Interrupted, "session cancelled"))
                } else {
                    tracing::debug!("Session idle, closing");
                    Ok(())
                }
            }
        };

        outcome.map_err(|e| {
            tracing::debug!("Relay ended with error: {}", e);
            TunnelError::Relay(e)
        })
    }
    .instrument(span)
    .await
}

/// Copy until EOF, recording activity per chunk, then half-close `writer`.
async fn copy_with_activity<R, W>(
    reader: &mut R,
    writer: &mut W,
    timer: &ActivityTimer,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        timer.update();
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        timer.update();
        total += n as u64;
    }

    // The peer may already be gone; that is not a relay failure
    if let Err(e) = writer.shutdown().await {
        tracing::debug!("Half-close failed: {}", e);
    }
    Ok(total)
}
