//! Device Transport Module
//!
//! The relay core never talks to devices directly; it consumes the
//! [`DeviceTransport`] capability: enumerate attached devices and open a
//! duplex byte stream to a remote port on one of them. The bundled
//! TCP-backed implementation lives in [`tcp`]; tests plug in in-memory
//! transports.

pub mod tcp;

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::error::SessionError;

pub use tcp::TcpDeviceTransport;

/// A device as seen by the relay core: identified by serial, nothing else
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub serial: String,
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.serial)
    }
}

/// A duplex byte stream to a remote port on a device
pub type DeviceStream = Box<dyn AsyncStream>;

/// Marker for boxed bidirectional streams
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Device discovery + stream-open capability supplied by a collaborator
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Enumerate currently attached devices.
    ///
    /// Enumeration may be incremental; callers that need a settled view
    /// should go through [`discover_devices`].
    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, SessionError>;

    /// Open a duplex stream to `port` on the device with the given serial
    async fn open_stream(&self, serial: &str, port: u16) -> Result<DeviceStream, SessionError>;
}

/// How long to wait between discovery polls
const DISCOVERY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on discovery polls before the snapshot is taken as-is
const DISCOVERY_MAX_POLLS: usize = 10;

/// Poll device enumeration until it is stable between two consecutive polls
/// and return the settled snapshot.
///
/// An empty snapshot is a valid result; deciding whether that is an error is
/// the caller's business (a session reports it as `NoDevicesAvailable`).
pub async fn discover_devices(
    transport: &dyn DeviceTransport,
) -> Result<Vec<DeviceInfo>, SessionError> {
    let mut devices = transport.list_devices().await?;

    for poll in 1..DISCOVERY_MAX_POLLS {
        tokio::time::sleep(DISCOVERY_POLL_INTERVAL).await;
        let next = transport.list_devices().await?;
        if next.len() <= devices.len() {
            debug!("Device enumeration stable after {} polls: {} device(s)", poll, next.len());
            return Ok(next);
        }
        devices = next;
    }

    debug!("Device enumeration still growing after {} polls, using current snapshot", DISCOVERY_MAX_POLLS);
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Transport whose enumeration grows by one device per poll up to a cap
    struct GrowingTransport {
        cap: usize,
        polls: AtomicUsize,
    }

    #[async_trait]
    impl DeviceTransport for GrowingTransport {
        async fn list_devices(&self) -> Result<Vec<DeviceInfo>, SessionError> {
            let seen = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            let count = seen.min(self.cap);
            Ok((0..count)
                .map(|i| DeviceInfo { serial: format!("dev-{}", i) })
                .collect())
        }

        async fn open_stream(&self, _: &str, _: u16) -> Result<DeviceStream, SessionError> {
            Err(SessionError::NoDevicesAvailable)
        }
    }

    #[tokio::test]
    async fn discovery_waits_until_enumeration_settles() {
        let transport = GrowingTransport { cap: 3, polls: AtomicUsize::new(0) };
        let devices = discover_devices(&transport).await.unwrap();
        assert_eq!(devices.len(), 3);
    }

    #[tokio::test]
    async fn discovery_reports_stable_empty_set() {
        let transport = GrowingTransport { cap: 0, polls: AtomicUsize::new(0) };
        let devices = discover_devices(&transport).await.unwrap();
        assert!(devices.is_empty());
    }
}
