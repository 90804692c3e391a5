//! Listener Module
//!
//! Binds one listening socket per configured forward and dispatches accepted
//! connections to sessions, sequentially or concurrently.

pub mod set;

pub use set::ListenerSet;
