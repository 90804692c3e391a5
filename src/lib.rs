//! muxrelay Library
//!
//! TCP port forwarding over a pluggable device transport: accept connections
//! on configured local ports, open a stream to a remote port on a device via
//! the transport, and relay bytes in both directions until either side
//! closes.

pub mod config;
pub mod error;
pub mod listener;
pub mod relay;
pub mod shutdown;
pub mod transport;

pub use config::Config;
pub use error::SessionError;
pub use listener::ListenerSet;
pub use shutdown::ShutdownCoordinator;
pub use transport::{DeviceInfo, DeviceTransport};

/// Common error type for process-level failures
pub type Result<T> = anyhow::Result<T>;
