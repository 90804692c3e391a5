//! Listener Set & Dispatch Loop

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::{StreamExt, StreamMap};
use tracing::{debug, error, info, warn};

use crate::config::{Config, ForwardSpec};
use crate::relay::{RelayStats, Session};
use crate::transport::DeviceTransport;
use crate::error::SessionError;
use crate::Result;

/// A set of bound local ports, each forwarding to a remote port on a device
pub struct ListenerSet {
    config: Arc<Config>,
    transport: Arc<dyn DeviceTransport>,
    listeners: Vec<(ForwardSpec, TcpListener)>,
}

impl ListenerSet {
    /// Bind one listening socket per configured forward.
    ///
    /// Fails fast when no forwards are configured or any bind fails; the
    /// configuration is expected to be validated already (distinct local
    /// ports in particular).
    pub async fn bind(config: Arc<Config>, transport: Arc<dyn DeviceTransport>) -> Result<Self> {
        if config.forwards.is_empty() {
            anyhow::bail!("no forwards configured");
        }

        let mut listeners = Vec::with_capacity(config.forwards.len());
        for spec in &config.forwards {
            let addr = SocketAddr::new(config.server.bind_host, spec.local_port);
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind local port {}", spec.local_port))?;

            info!(
                "Forwarding local port {} to remote port {} on device {}",
                spec.local_port,
                spec.remote_port,
                spec.device.as_deref().unwrap_or("<first available>")
            );
            listeners.push((spec.clone(), listener));
        }

        Ok(Self { config, transport, listeners })
    }

    /// Actual bound addresses, in forward order (useful with port 0)
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|(_, l)| l.local_addr().ok())
            .collect()
    }

    /// Run the dispatch loop until shutdown or a fatal accept error.
    ///
    /// One readiness wait spans every listening socket plus the shutdown
    /// signal. In sequential mode each accepted session relays to completion
    /// before the next accept; in concurrent mode sessions run on their own
    /// tasks and never block each other. An accept error stops the loop but
    /// already-running sessions are drained first.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let ListenerSet { config, transport, listeners } = self;

        let max_buf = config.server.buffer_size;
        let concurrent = config.server.concurrent;

        let mut specs = Vec::with_capacity(listeners.len());
        let mut incoming = StreamMap::new();
        for (idx, (spec, listener)) in listeners.into_iter().enumerate() {
            specs.push(spec);
            incoming.insert(idx, TcpListenerStream::new(listener));
        }

        let mut sessions: JoinSet<std::result::Result<RelayStats, SessionError>> = JoinSet::new();

        info!(
            "Dispatch loop started over {} listener(s) ({} mode)",
            specs.len(),
            if concurrent { "concurrent" } else { "sequential" }
        );

        let outcome = loop {
            tokio::select! {
                Some((idx, accepted)) = incoming.next() => {
                    let stream = match accepted {
                        Ok(stream) => stream,
                        Err(e) => {
                            // Listening-socket failure is fatal to the whole
                            // dispatch loop; sessions get drained below.
                            error!("Accept failed on local port {}: {}", specs[idx].local_port, e);
                            break Err(anyhow::Error::from(e).context("accept failed"));
                        }
                    };

                    let spec = specs[idx].clone();
                    info!("Incoming connection to local port {}", spec.local_port);
                    let session = Session::new(stream, spec, max_buf);

                    if concurrent {
                        let transport = Arc::clone(&transport);
                        sessions.spawn(async move { session.run(transport.as_ref()).await });
                    } else {
                        // Session errors are session-local; the session has
                        // already logged them.
                        let _ = session.run(transport.as_ref()).await;
                    }
                }
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    reap(joined);
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, no longer accepting connections");
                    break Ok(());
                }
            }
        };

        // Close the listening sockets before waiting on sessions.
        drop(incoming);
        drain(sessions, config.server.shutdown_timeout).await;

        outcome
    }
}

/// Log the outcome of one finished session task
fn reap(joined: std::result::Result<std::result::Result<RelayStats, SessionError>, tokio::task::JoinError>) {
    match joined {
        Ok(result) => debug!("Session task finished (ok: {})", result.is_ok()),
        Err(e) if e.is_cancelled() => {}
        Err(e) => error!("Session task panicked: {}", e),
    }
}

/// Wait for active sessions to finish, aborting whatever outlives the timeout
async fn drain(
    mut sessions: JoinSet<std::result::Result<RelayStats, SessionError>>,
    timeout: Duration,
) {
    if sessions.is_empty() {
        return;
    }

    info!("Draining {} active session(s) (timeout: {:?})", sessions.len(), timeout);

    let drained = tokio::time::timeout(timeout, async {
        while let Some(joined) = sessions.join_next().await {
            reap(joined);
        }
    })
    .await;

    if drained.is_err() {
        warn!("Shutdown timeout reached with {} session(s) still active, aborting", sessions.len());
        sessions.abort_all();
        while let Some(joined) = sessions.join_next().await {
            reap(joined);
        }
    } else {
        info!("All sessions closed");
    }
}
