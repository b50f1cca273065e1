//! Per-connection read/decode/ack loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};
use tracklink_core::{DecodeOutcome, ProtocolDecoder, SessionRegistry};

use crate::snapshot::{is_getinfo, render_port_snapshot};
use crate::storage::StorageHandle;

/// Everything a connection needs besides its socket and decoder.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub port: u16,
    pub registry: Arc<SessionRegistry>,
    pub storage: StorageHandle,
    pub idle_timeout: Duration,
    pub max_read_bytes: usize,
}

/// Why a connection loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    PeerClosed,
    IdleTimeout,
    Shutdown,
}

/// Serve one device connection until it closes, idles out or the server
/// forces it closed.
///
/// Every read is one frame. Each frame gets at most one write: the decoder's
/// acknowledgement, skipped when it is empty.
pub async fn handle_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    mut decoder: Box<dyn ProtocolDecoder>,
    ctx: ConnectionContext,
    mut close: broadcast::Receiver<()>,
) -> Result<CloseReason>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; ctx.max_read_bytes];
    let mut deadline = Instant::now() + ctx.idle_timeout;
    let protocol = decoder.kind();

    loop {
        let read = tokio::select! {
            _ = close.recv() => return Ok(CloseReason::Shutdown),
            read = timeout_at(deadline, stream.read(&mut buf)) => read,
        };
        let len = match read {
            Err(_) => {
                info!(
                    port = ctx.port,
                    %peer,
                    device = decoder.device_name().unwrap_or("-"),
                    "Closing idle connection"
                );
                return Ok(CloseReason::IdleTimeout);
            }
            Ok(Ok(0)) => return Ok(CloseReason::PeerClosed),
            Ok(Ok(len)) => len,
            Ok(Err(e)) => return Err(e).context("Failed to read from device"),
        };
        let chunk = buf.get(..len).unwrap_or_default();

        if is_getinfo(chunk) {
            let reply = render_port_snapshot(&ctx.registry, ctx.port)
                .context("Failed to render getinfo snapshot")?;
            stream
                .write_all(reply.as_bytes())
                .await
                .context("Failed to write getinfo reply")?;
            deadline = Instant::now() + ctx.idle_timeout;
            continue;
        }

        let outcome = decoder.decode(chunk);
        if let DecodeOutcome::FramingError { reason } = &outcome {
            debug!(port = ctx.port, %peer, %protocol, %reason, "Bad frame");
        }

        match decoder.device_name().map(str::to_string) {
            Some(device) => {
                ctx.registry.upsert(ctx.port, decoder.session());
                if persists(&outcome) {
                    ctx.storage.persist(&device, outcome).await?;
                }
            }
            None if persists(&outcome) => {
                warn!(port = ctx.port, %peer, %protocol, "Dropping data from unnamed device");
            }
            None => {}
        }

        let ack = decoder.ack().to_vec();
        if !ack.is_empty() {
            stream
                .write_all(&ack)
                .await
                .context("Failed to write acknowledgement")?;
            deadline = Instant::now() + ctx.idle_timeout;
        }
    }
}

fn persists(outcome: &DecodeOutcome) -> bool {
    match outcome {
        DecodeOutcome::Records(batch) => !batch.is_empty(),
        DecodeOutcome::Events { lines } => !lines.is_empty(),
        DecodeOutcome::Handshake { .. } | DecodeOutcome::FramingError { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracklink_core::{DecoderConfig, ProtocolKind};
    use tracklink_protocols::decoder_for;

    use crate::storage::{FileStore, spawn_writer};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40000))
    }

    fn context(storage: StorageHandle) -> ConnectionContext {
        ConnectionContext {
            port: 20100,
            registry: Arc::new(SessionRegistry::new()),
            storage,
            idle_timeout: Duration::from_secs(30),
            max_read_bytes: 1024,
        }
    }

    #[tokio::test]
    async fn test_handshake_acked_and_registered() -> TestResult {
        let dir = tempfile::tempdir()?;
        let (storage, _writer) = spawn_writer(FileStore::new(dir.path()), 8);
        let ctx = context(storage);
        let registry = Arc::clone(&ctx.registry);
        let (_close_tx, close_rx) = broadcast::channel(1);

        let stream = tokio_test::io::Builder::new()
            .read(&[0x00, 0x04, b'T', b'E', b'S', b'T'])
            .write(&[0x01])
            .build();
        let decoder = decoder_for(ProtocolKind::Codec8, DecoderConfig::default());

        let reason = handle_connection(stream, peer(), decoder, ctx, close_rx).await?;
        assert_eq!(reason, CloseReason::PeerClosed);
        let entry = registry.get("TEST").ok_or("device not registered")?;
        assert_eq!(entry.port, 20100);
        assert_eq!(entry.protocol, ProtocolKind::Codec8);
        Ok(())
    }

    #[tokio::test]
    async fn test_bad_frame_gets_marker_and_connection_stays_open() -> TestResult {
        let dir = tempfile::tempdir()?;
        let (storage, _writer) = spawn_writer(FileStore::new(dir.path()), 8);
        let (_close_tx, close_rx) = broadcast::channel(1);

        let stream = tokio_test::io::Builder::new()
            .read(&[0x00, 0x04, b'T', b'E', b'S', b'T'])
            .write(&[0x01])
            .read(&[0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00])
            .write(&[0x00])
            .read(&[0xFF])
            .write(&[0x00])
            .build();
        let decoder = decoder_for(ProtocolKind::Codec8, DecoderConfig::default());

        let reason = handle_connection(stream, peer(), decoder, context(storage), close_rx).await?;
        assert_eq!(reason, CloseReason::PeerClosed);
        Ok(())
    }

    #[tokio::test]
    async fn test_wialon_writes_nothing_for_good_frames() -> TestResult {
        let dir = tempfile::tempdir()?;
        let (storage, _writer) = spawn_writer(FileStore::new(dir.path()), 8);
        let (_close_tx, close_rx) = broadcast::channel(1);

        let stream = tokio_test::io::Builder::new()
            .read(b"#L#356307042441013;NA\r\n")
            .build();
        let decoder = decoder_for(ProtocolKind::Wialon, DecoderConfig::default());

        let reason = handle_connection(stream, peer(), decoder, context(storage), close_rx).await?;
        assert_eq!(reason, CloseReason::PeerClosed);
        Ok(())
    }

    #[tokio::test]
    async fn test_idle_connection_times_out() -> TestResult {
        let dir = tempfile::tempdir()?;
        let (storage, _writer) = spawn_writer(FileStore::new(dir.path()), 8);
        let (_close_tx, close_rx) = broadcast::channel(1);
        let ctx = ConnectionContext {
            idle_timeout: Duration::from_millis(50),
            ..context(storage)
        };

        let stream = tokio_test::io::Builder::new()
            .wait(Duration::from_secs(5))
            .build();
        let decoder = decoder_for(ProtocolKind::GryphonM01, DecoderConfig::default());

        let reason = handle_connection(stream, peer(), decoder, ctx, close_rx).await?;
        assert_eq!(reason, CloseReason::IdleTimeout);
        Ok(())
    }
}
