//! Configuration Manager

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;

use anyhow::{bail, Context};

use crate::Result;

use super::{Config, ForwardSpec};

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            Ok(config)
        } else {
            tracing::debug!("No configuration file at {}, using defaults", path.display());
            Ok(Config::default())
        }
    }

    /// Load configuration from environment variables on top of defaults
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();
        Self::apply_env(&mut config)?;
        Ok(config)
    }

    /// Apply `MUXRELAY_*` environment overrides to an existing configuration
    pub fn apply_env(config: &mut Config) -> Result<()> {
        if let Ok(host) = std::env::var("MUXRELAY_BIND_HOST") {
            config.server.bind_host = host
                .parse::<IpAddr>()
                .with_context(|| format!("Invalid MUXRELAY_BIND_HOST: {}", host))?;
        }

        if let Ok(buffer_size) = std::env::var("MUXRELAY_BUFFER_SIZE") {
            config.server.buffer_size = buffer_size
                .parse::<usize>()
                .with_context(|| format!("Invalid MUXRELAY_BUFFER_SIZE: {}", buffer_size))?;
        }

        if let Ok(concurrent) = std::env::var("MUXRELAY_CONCURRENT") {
            config.server.concurrent = concurrent
                .parse::<bool>()
                .with_context(|| format!("Invalid MUXRELAY_CONCURRENT: {}", concurrent))?;
        }

        if let Ok(timeout) = std::env::var("MUXRELAY_CONNECT_TIMEOUT") {
            config.server.connect_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid MUXRELAY_CONNECT_TIMEOUT: {}", timeout))?;
        }

        if let Ok(timeout) = std::env::var("MUXRELAY_SHUTDOWN_TIMEOUT") {
            config.server.shutdown_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid MUXRELAY_SHUTDOWN_TIMEOUT: {}", timeout))?;
        }

        Ok(())
    }
}

impl Config {
    /// Merge CLI argument overrides (highest priority)
    pub fn merge_with_cli_args(
        &mut self,
        forwards: Vec<ForwardSpec>,
        bufsize_kib: Option<usize>,
        concurrent: bool,
    ) {
        // CLI forwards extend the configured set rather than replacing it,
        // matching the original tool's config-file-plus-arguments behavior
        self.forwards.extend(forwards);

        if let Some(kib) = bufsize_kib {
            self.server.buffer_size = kib * 1024;
        }

        if concurrent {
            self.server.concurrent = true;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.buffer_size < 1024 {
            bail!("buffer_size must be at least 1024 bytes");
        }

        if self.server.buffer_size > 64 * 1024 * 1024 {
            bail!("buffer_size cannot exceed 64 MiB");
        }

        if self.server.shutdown_timeout.is_zero() {
            bail!("shutdown_timeout must be greater than 0");
        }

        let mut local_ports = HashSet::new();
        for forward in &self.forwards {
            if forward.local_port == 0 {
                bail!("local port 0 is not a valid listening port");
            }
            if forward.remote_port == 0 {
                bail!("remote port 0 is not a valid target port");
            }
            if !local_ports.insert(forward.local_port) {
                bail!("local port {} is configured more than once", forward.local_port);
            }
        }

        let mut serials = HashSet::new();
        for device in &self.transport.devices {
            if device.serial.is_empty() {
                bail!("device serial cannot be empty");
            }
            if !serials.insert(device.serial.as_str()) {
                bail!("device serial '{}' is configured more than once", device.serial);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceEntry;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn duplicate_local_ports_rejected() {
        let mut config = Config::default();
        config.forwards.push("22:2222".parse().unwrap());
        config.forwards.push("80:2222".parse().unwrap());
        assert!(config.validate().is_err());
    }

    #[test]
    fn tiny_buffer_rejected() {
        let mut config = Config::default();
        config.server.buffer_size = 16;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_device_serials_rejected() {
        let mut config = Config::default();
        config.transport.devices.push(DeviceEntry {
            serial: "x".to_string(),
            host: "10.0.0.1".to_string(),
        });
        config.transport.devices.push(DeviceEntry {
            serial: "x".to_string(),
            host: "10.0.0.2".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn cli_merge_extends_forwards_and_sizes_buffer() {
        let mut config = Config::default();
        config.forwards.push("22:2222".parse().unwrap());
        config.merge_with_cli_args(vec!["80:8080".parse().unwrap()], Some(4), true);
        assert_eq!(config.forwards.len(), 2);
        assert_eq!(config.server.buffer_size, 4096);
        assert!(config.server.concurrent);
    }
}
