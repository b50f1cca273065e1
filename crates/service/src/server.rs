//! TCP listeners, one per configured port, and the shutdown drain.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracklink_core::{DecoderConfig, ProtocolKind, SessionRegistry};
use tracklink_protocols::decoder_for;

use crate::config::ServiceConfig;
use crate::connection::{ConnectionContext, handle_connection};
use crate::storage::StorageHandle;

/// Decrements the open-connection count when a connection task ends.
struct OpenGuard(Arc<AtomicUsize>);

impl OpenGuard {
    fn new(open: &Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(open))
    }
}

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct PortListener {
    listener: TcpListener,
    port: u16,
    protocol: ProtocolKind,
}

/// Bound listeners plus the state shared by their connections.
pub struct Server {
    listeners: Vec<PortListener>,
    registry: Arc<SessionRegistry>,
    storage: StorageHandle,
    decoder_config: DecoderConfig,
    idle_timeout: Duration,
    max_read_bytes: usize,
    shutdown_poll: Duration,
    shutdown_max_polls: u32,
    open: Arc<AtomicUsize>,
    close_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind every configured port. Fails if any port cannot be bound.
    pub async fn bind(
        config: &ServiceConfig,
        registry: Arc<SessionRegistry>,
        storage: StorageHandle,
    ) -> Result<Self> {
        let mut listeners = Vec::new();
        for (port, protocol) in config.bindings()? {
            let listener = TcpListener::bind((config.bind_address.as_str(), port))
                .await
                .with_context(|| format!("Failed to bind {}:{port}", config.bind_address))?;
            let port = listener.local_addr().map(|addr| addr.port()).unwrap_or(port);
            info!(port, %protocol, "Listening");
            listeners.push(PortListener {
                listener,
                port,
                protocol,
            });
        }

        let (close_tx, _) = broadcast::channel(1);
        Ok(Self {
            listeners,
            registry,
            storage,
            decoder_config: config.decoder_config(),
            idle_timeout: config.idle_timeout(),
            max_read_bytes: config.max_read_bytes,
            shutdown_poll: config.shutdown_poll(),
            shutdown_max_polls: config.shutdown_max_polls,
            open: Arc::new(AtomicUsize::new(0)),
            close_tx,
        })
    }

    /// Actual listening addresses, in port order.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|l| l.listener.local_addr().ok())
            .collect()
    }

    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Accept connections until `shutdown` resolves, then drain.
    ///
    /// The drain stops accepting, polls the open-connection count every
    /// `shutdown_poll_ms` and, once `shutdown_max_polls` polls have passed,
    /// tells the remaining connections to close.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (stop_tx, _) = broadcast::channel::<()>(1);
        let accept_loops: Vec<JoinHandle<()>> = self
            .listeners
            .into_iter()
            .map(|listener| {
                let acceptor = Acceptor {
                    registry: Arc::clone(&self.registry),
                    storage: self.storage.clone(),
                    decoder_config: self.decoder_config,
                    idle_timeout: self.idle_timeout,
                    max_read_bytes: self.max_read_bytes,
                    open: Arc::clone(&self.open),
                    close_tx: self.close_tx.clone(),
                };
                tokio::spawn(acceptor.run(listener, stop_tx.subscribe()))
            })
            .collect();
        drop(self.storage);

        shutdown.await;
        info!("Shutdown requested, no longer accepting connections");
        if stop_tx.send(()).is_err() {
            debug!("No accept loops running");
        }
        for handle in accept_loops {
            if let Err(e) = handle.await {
                error!("Accept loop failed: {e}");
            }
        }

        let mut polls = 0;
        loop {
            let open = self.open.load(Ordering::SeqCst);
            if open == 0 {
                break;
            }
            if polls >= self.shutdown_max_polls {
                warn!(open, "Closing connections still open after drain");
                if self.close_tx.send(()).is_err() {
                    debug!("No connection tasks left to close");
                }
                break;
            }
            debug!(open, poll = polls + 1, "Waiting for connections to finish");
            tokio::time::sleep(self.shutdown_poll).await;
            polls += 1;
        }

        while self.open.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(self.shutdown_poll).await;
        }
        info!("All connections closed");
        Ok(())
    }
}

/// Per-listener copy of the shared state.
struct Acceptor {
    registry: Arc<SessionRegistry>,
    storage: StorageHandle,
    decoder_config: DecoderConfig,
    idle_timeout: Duration,
    max_read_bytes: usize,
    open: Arc<AtomicUsize>,
    close_tx: broadcast::Sender<()>,
}

impl Acceptor {
    async fn run(self, port: PortListener, mut stop: broadcast::Receiver<()>) {
        let PortListener {
            listener,
            port,
            protocol,
        } = port;

        loop {
            tokio::select! {
                _ = stop.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(port, %peer, %protocol, "Accepted connection");
                        let ctx = ConnectionContext {
                            port,
                            registry: Arc::clone(&self.registry),
                            storage: self.storage.clone(),
                            idle_timeout: self.idle_timeout,
                            max_read_bytes: self.max_read_bytes,
                        };
                        let decoder = decoder_for(protocol, self.decoder_config);
                        let close = self.close_tx.subscribe();
                        let guard = OpenGuard::new(&self.open);
                        tokio::spawn(async move {
                            let _guard = guard;
                            match handle_connection(stream, peer, decoder, ctx, close).await {
                                Ok(reason) => debug!(port, %peer, ?reason, "Connection closed"),
                                Err(e) => warn!(port, %peer, "Connection failed: {e:#}"),
                            }
                        });
                    }
                    Err(e) => error!(port, "Failed to accept connection: {e}"),
                },
            }
        }
        debug!(port, "Accept loop stopped");
    }
}
