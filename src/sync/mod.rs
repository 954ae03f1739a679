//! Location synchronization client.
//!
//! [`LocationClient`] owns one hub session and the [`LocationStore`] fed by
//! it. A background driver task runs the connection state machine:
//!
//! ```text
//! Disconnected ──start──► Connecting ──ok────────────► Connected
//!                            │──network error──► LocalFallback
//!                            └──other error────► Disconnected
//!
//! Connected ──drop──► Reconnecting ──ok──► Connected
//!     │                    └──attempts exhausted──► Disconnected
//!     └──terminal close──► Disconnected
//!
//! Disconnected / LocalFallback ──reconnect()──► Connecting
//! ```
//!
//! Consumers read the store and status through watch receivers and invoke
//! only [`LocationClient::send_location`] and [`LocationClient::reconnect`].
//!
//! [`LocationStore`]: crate::location::LocationStore

// Rust guideline compliant 2026-02

pub mod backoff;
pub mod client;
mod driver;
pub mod state;

pub use backoff::ReconnectPolicy;
pub use client::{ClientOptions, LocationClient};
pub use state::{ConnectionState, SessionStatus};

/// Errors surfaced by the synchronization client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The initial handshake failed.
    HandshakeFailed {
        /// Network-class failures put the client into local fallback mode.
        network_class: bool,
        /// Transport error text.
        message: String,
    },
    /// `send_location` was called outside `Connected` / `LocalFallback`.
    NotConnected,
    /// The hub rejected or dropped a `SendLatLon` invocation.
    SendFailed(String),
    /// A manual reconnect failed.
    ReconnectFailed {
        /// Network-class failures put the client into local fallback mode.
        network_class: bool,
        /// Transport error text.
        message: String,
    },
}

impl SyncError {
    /// Whether the failure should enable local fallback mode.
    pub fn is_network_class(&self) -> bool {
        match self {
            Self::HandshakeFailed { network_class, .. }
            | Self::ReconnectFailed { network_class, .. } => *network_class,
            Self::NotConnected | Self::SendFailed(_) => false,
        }
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HandshakeFailed { message, .. } => write!(f, "Connection failed: {message}"),
            Self::NotConnected => write!(f, "Not connected to location service"),
            Self::SendFailed(msg) => write!(f, "Failed to send location: {msg}"),
            Self::ReconnectFailed { message, .. } => write!(f, "Reconnection failed: {message}"),
        }
    }
}

impl std::error::Error for SyncError {}
