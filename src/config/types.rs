//! Configuration Types

use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    /// One entry per forwarded local port
    #[serde(default, rename = "forward")]
    pub forwards: Vec<ForwardSpec>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the local listeners bind on
    pub bind_host: IpAddr,
    /// Per-direction relay buffer bound, in bytes
    pub buffer_size: usize,
    /// Run each session on its own task instead of inline in the accept loop
    pub concurrent: bool,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::from([127, 0, 0, 1]),
            // 128 KiB per direction
            buffer_size: 128 * 1024,
            concurrent: false,
            connect_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// Device transport configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Devices reachable over TCP, serial to host address
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

/// One device known to the TCP transport
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceEntry {
    pub serial: String,
    pub host: String,
}

/// One configured forward: local listening port, remote target port, and an
/// optional device pin. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ForwardSpec {
    pub local_port: u16,
    pub remote_port: u16,
    #[serde(default)]
    pub device: Option<String>,
}

impl FromStr for ForwardSpec {
    type Err = anyhow::Error;

    /// Parse the `REMOTE[:LOCAL][-SERIAL]` argument grammar.
    ///
    /// `22` forwards local 22 to remote 22 on the first device; `22:2222`
    /// listens on 2222; `22:2222-abcdef` pins the forward to device
    /// `abcdef`. The serial is everything after the first `-`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ports, device) = match s.split_once('-') {
            Some((ports, serial)) if !serial.is_empty() => (ports, Some(serial.to_string())),
            Some((ports, _)) => (ports, None),
            None => (s, None),
        };

        let (remote, local) = match ports.split_once(':') {
            Some((r, l)) => (r, l),
            None => (ports, ports),
        };

        let remote_port: u16 = remote
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid remote port in forward spec '{}'", s))?;
        let local_port: u16 = local
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid local port in forward spec '{}'", s))?;

        Ok(ForwardSpec { local_port, remote_port, device })
    }
}

impl std::fmt::Display for ForwardSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.local_port, self.remote_port)?;
        if let Some(device) = &self.device {
            write!(f, " (device {})", device)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_port() {
        let spec: ForwardSpec = "22".parse().unwrap();
        assert_eq!(spec.local_port, 22);
        assert_eq!(spec.remote_port, 22);
        assert_eq!(spec.device, None);
    }

    #[test]
    fn parses_remote_and_local() {
        let spec: ForwardSpec = "22:2222".parse().unwrap();
        assert_eq!(spec.remote_port, 22);
        assert_eq!(spec.local_port, 2222);
    }

    #[test]
    fn parses_device_pin() {
        let spec: ForwardSpec = "22:2222-abcdef123456".parse().unwrap();
        assert_eq!(spec.remote_port, 22);
        assert_eq!(spec.local_port, 2222);
        assert_eq!(spec.device.as_deref(), Some("abcdef123456"));
    }

    #[test]
    fn rejects_garbage_ports() {
        assert!("not-a-port".parse::<ForwardSpec>().is_err());
        assert!("22:high".parse::<ForwardSpec>().is_err());
        assert!("99999".parse::<ForwardSpec>().is_err());
    }
}
