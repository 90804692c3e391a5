//! TCP-backed Device Transport
//!
//! Maps configured device serials to host addresses and opens a plain TCP
//! connection to (host, port). This is the bundled transport; anything that
//! can enumerate devices and dial a port can stand in behind the
//! [`DeviceTransport`] trait instead.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::DeviceEntry;
use crate::error::SessionError;

use super::{DeviceInfo, DeviceStream, DeviceTransport};

/// Transport that reaches devices over the network
pub struct TcpDeviceTransport {
    devices: Vec<DeviceEntry>,
    connect_timeout: Duration,
}

impl TcpDeviceTransport {
    pub fn new(devices: Vec<DeviceEntry>, connect_timeout: Duration) -> Self {
        Self { devices, connect_timeout }
    }

    fn host_for(&self, serial: &str) -> Option<&str> {
        self.devices
            .iter()
            .find(|d| d.serial == serial)
            .map(|d| d.host.as_str())
    }
}

#[async_trait]
impl DeviceTransport for TcpDeviceTransport {
    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, SessionError> {
        Ok(self
            .devices
            .iter()
            .map(|d| DeviceInfo { serial: d.serial.clone() })
            .collect())
    }

    async fn open_stream(&self, serial: &str, port: u16) -> Result<DeviceStream, SessionError> {
        let host = self.host_for(serial).ok_or_else(|| SessionError::RemoteConnectFailed {
            serial: serial.to_string(),
            port,
            reason: "device has no configured address".to_string(),
        })?;

        debug!("Opening stream to {}:{} for device {}", host, port, serial);

        match timeout(self.connect_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => Ok(Box::new(stream) as DeviceStream),
            Ok(Err(e)) => {
                warn!("Connect to {}:{} failed: {}", host, port, e);
                Err(SessionError::RemoteConnectFailed {
                    serial: serial.to_string(),
                    port,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                warn!("Connect to {}:{} timed out after {:?}", host, port, self.connect_timeout);
                Err(SessionError::RemoteConnectFailed {
                    serial: serial.to_string(),
                    port,
                    reason: format!("connection timed out after {:?}", self.connect_timeout),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(entries: &[(&str, &str)]) -> TcpDeviceTransport {
        let devices = entries
            .iter()
            .map(|(serial, host)| DeviceEntry {
                serial: serial.to_string(),
                host: host.to_string(),
            })
            .collect();
        TcpDeviceTransport::new(devices, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn lists_configured_devices_in_order() {
        let t = transport(&[("alpha", "127.0.0.1"), ("beta", "127.0.0.1")]);
        let devices = t.list_devices().await.unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].serial, "alpha");
        assert_eq!(devices[1].serial, "beta");
    }

    #[tokio::test]
    async fn open_stream_to_unknown_serial_fails() {
        let t = transport(&[("alpha", "127.0.0.1")]);
        let err = t.open_stream("ghost", 22).await.err().unwrap();
        assert!(matches!(err, SessionError::RemoteConnectFailed { .. }));
    }

    #[tokio::test]
    async fn open_stream_reaches_listening_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let t = transport(&[("alpha", "127.0.0.1")]);
        let accept = tokio::spawn(async move { listener.accept().await });

        let stream = t.open_stream("alpha", port).await;
        assert!(stream.is_ok());
        assert!(accept.await.unwrap().is_ok());
    }
}
