//! Relay Session
//!
//! Turns one accepted connection into one running relay engine: resolve a
//! device through the transport, open a stream to the remote port, then pump
//! until either side closes. Every exit path leaves both streams closed.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::config::ForwardSpec;
use crate::error::SessionError;
use crate::transport::{discover_devices, DeviceInfo, DeviceTransport};

use super::{RelayEngine, RelayStats};

static SESSION_SEQ: AtomicU64 = AtomicU64::new(1);

/// Lifecycle states of a session. Failures in `Resolving` or `Connecting`
/// jump straight to `Closed` without ever relaying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Resolving,
    Connecting,
    Relaying,
    Closed,
}

/// One accepted connection on its way to (or through) a relay
pub struct Session {
    id: u64,
    client: TcpStream,
    peer_addr: Option<SocketAddr>,
    spec: ForwardSpec,
    max_buf: usize,
    state: SessionState,
}

impl Session {
    pub fn new(client: TcpStream, spec: ForwardSpec, max_buf: usize) -> Self {
        let id = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
        let peer_addr = client.peer_addr().ok();
        debug!(session = id, forward = %spec, "Creating session");

        Self {
            id,
            client,
            peer_addr,
            spec,
            max_buf,
            state: SessionState::Resolving,
        }
    }

    fn set_state(&mut self, state: SessionState) {
        debug!(session = self.id, ?state, "Session state change");
        self.state = state;
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Pick the device this session talks to.
    ///
    /// An empty stable enumeration is `NoDevicesAvailable`; a pinned serial
    /// that is not attached is `DeviceNotFound` even when other devices
    /// exist. Without a pin the first enumerated device wins.
    async fn resolve(&self, transport: &dyn DeviceTransport) -> Result<DeviceInfo, SessionError> {
        let devices = discover_devices(transport).await?;
        if devices.is_empty() {
            return Err(SessionError::NoDevicesAvailable);
        }

        match &self.spec.device {
            Some(serial) => devices
                .into_iter()
                .find(|d| &d.serial == serial)
                .ok_or_else(|| SessionError::DeviceNotFound(serial.clone())),
            None => devices
                .into_iter()
                .next()
                .ok_or(SessionError::NoDevicesAvailable),
        }
    }

    /// Close the client without having contacted any remote
    async fn abort(mut self, err: SessionError) -> Result<RelayStats, SessionError> {
        self.set_state(SessionState::Closed);
        let _ = self.client.shutdown().await;
        warn!(
            session = self.id,
            peer = ?self.peer_addr,
            forward = %self.spec,
            "Session failed before relay: {}",
            err
        );
        Err(err)
    }

    /// Run the session to completion.
    ///
    /// Consumes the session; by the time this returns, the client stream and
    /// (if one was opened) the remote stream are closed.
    pub async fn run(mut self, transport: &dyn DeviceTransport) -> Result<RelayStats, SessionError> {
        let start = Instant::now();

        let device = match self.resolve(transport).await {
            Ok(device) => device,
            Err(e) => return self.abort(e).await,
        };

        self.set_state(SessionState::Connecting);
        info!(session = self.id, device = %device, "Connecting to device");

        let remote = match transport.open_stream(&device.serial, self.spec.remote_port).await {
            Ok(remote) => remote,
            Err(e) => return self.abort(e).await,
        };

        self.set_state(SessionState::Relaying);
        info!(
            session = self.id,
            device = %device,
            remote_port = self.spec.remote_port,
            "Connection established, relaying data"
        );

        // Stream A is the client, stream B the device side. The engine owns
        // both from here and closes them on every path.
        let engine = RelayEngine::new(self.client, remote, self.max_buf);
        let result = engine.run().await;

        match &result {
            Ok(stats) => {
                info!(
                    session = self.id,
                    peer = ?self.peer_addr,
                    device = %device,
                    duration_ms = start.elapsed().as_millis() as u64,
                    bytes_up = stats.bytes_a_to_b,
                    bytes_down = stats.bytes_b_to_a,
                    "Connection closed"
                );
            }
            Err(e) => {
                warn!(
                    session = self.id,
                    peer = ?self.peer_addr,
                    device = %device,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Session ended with stream error: {}",
                    e
                );
            }
        }

        result
    }
}
