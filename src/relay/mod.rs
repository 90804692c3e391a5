//! Data Relay Module
//!
//! The bounded bidirectional relay engine and the session lifecycle that
//! drives one engine per accepted connection.

pub mod engine;
pub mod session;

pub use engine::{RelayEngine, RelayStats};
pub use session::Session;
