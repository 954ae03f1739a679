//! Location hub transport.
//!
//! This module provides the seam between the connection state machine and a
//! concrete hub. The state machine only sees the [`HubConnector`] and
//! [`HubSession`] traits; [`SignalrConnector`] implements them against an
//! ASP.NET SignalR hub over WebSocket.
//!
//! # Architecture
//!
//! ```text
//! HubConnector (trait)
//!     │  connect(cancel) ──► Box<dyn HubSession>
//!     │
//!     └── SignalrConnector
//!         ├── negotiate (HTTP POST /negotiate)
//!         ├── ws::connect + JSON handshake
//!         └── background session task (invocations, pings, broadcasts)
//!
//! HubSession (trait)
//!     ├── invoker()     ──► HubInvoker (cloneable, usable from any task)
//!     ├── next_event()  ──► HubEvent::Invocation | HubEvent::Closed
//!     └── stop()
//! ```

// Rust guideline compliant 2026-02

pub mod connection;
pub mod negotiate;
pub mod protocol;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::ws::WsError;

pub use connection::{SignalrConnector, SignalrSession};
pub use negotiate::NegotiateResponse;

/// Substrings that mark a failure as "hub not reachable from here".
///
/// Browser-hosted clients report these for DNS failures, refused connections
/// and cross-origin rejections.
const NETWORK_FAILURE_MARKERS: [&str; 3] = ["Failed to fetch", "NetworkError", "CORS"];

/// Returns `true` if an error message names a network-class failure.
pub fn mentions_network_failure(message: &str) -> bool {
    NETWORK_FAILURE_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// Errors raised by the hub transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    /// The negotiate request failed or returned an unusable response.
    Negotiate {
        /// HTTP status, if a response was received.
        status: Option<u16>,
        /// Failure description.
        message: String,
        /// Whether the failure means the hub is unreachable.
        network_class: bool,
    },
    /// WebSocket level failure.
    Transport(WsError),
    /// The hub refused or garbled the protocol handshake.
    Handshake(String),
    /// No handshake response within the configured timeout.
    Timeout,
    /// The hub returned an error for an invocation.
    Invocation(String),
    /// A message could not be encoded or decoded.
    Protocol(String),
    /// The session is no longer running.
    Closed,
}

impl HubError {
    /// Returns `true` for failures that should trigger local fallback mode:
    /// unreachable transport, unreachable network, cross-origin rejection.
    pub fn is_network_class(&self) -> bool {
        match self {
            Self::Negotiate {
                network_class,
                message,
                ..
            } => *network_class || mentions_network_failure(message),
            Self::Transport(e) => e.is_network_class(),
            Self::Timeout => true,
            Self::Handshake(message) | Self::Invocation(message) | Self::Protocol(message) => {
                mentions_network_failure(message)
            }
            Self::Closed => false,
        }
    }
}

impl std::fmt::Display for HubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Negotiate {
                status: Some(status),
                message,
                ..
            } => write!(f, "Negotiate failed (HTTP {status}): {message}"),
            Self::Negotiate { message, .. } => write!(f, "Negotiate failed: {message}"),
            Self::Transport(e) => write!(f, "{e}"),
            Self::Handshake(msg) => write!(f, "Handshake failed: {msg}"),
            Self::Timeout => write!(f, "Handshake timed out"),
            Self::Invocation(msg) => write!(f, "Invocation failed: {msg}"),
            Self::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            Self::Closed => write!(f, "Hub session closed"),
        }
    }
}

impl std::error::Error for HubError {}

impl From<WsError> for HubError {
    fn from(e: WsError) -> Self {
        Self::Transport(e)
    }
}

/// Something the hub pushed to this client.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// Server-to-client method call (e.g. a location broadcast).
    Invocation {
        /// Client event name.
        target: String,
        /// Positional arguments.
        arguments: Vec<Value>,
    },
    /// The session ended.
    Closed {
        /// Reason, if the transport or server gave one.
        error: Option<String>,
        /// `false` when the server forbade reconnecting.
        allow_reconnect: bool,
    },
}

/// Outgoing invocation queued for the session task.
#[derive(Debug)]
pub struct Invocation {
    /// Hub method name.
    pub target: String,
    /// Positional arguments.
    pub arguments: Vec<Value>,
    /// Completion result.
    pub reply: oneshot::Sender<Result<Option<Value>, HubError>>,
}

/// Cloneable handle for invoking hub methods on a live session.
///
/// Invocations queue to the session task, which owns the socket. Once the
/// session ends, every call fails with [`HubError::Closed`].
#[derive(Debug, Clone)]
pub struct HubInvoker {
    tx: mpsc::UnboundedSender<Invocation>,
}

impl HubInvoker {
    /// Create an invoker and the receiving end a session task drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Invocation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Invoke `target` and wait for its completion.
    pub async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Result<Option<Value>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Invocation {
                target: target.to_string(),
                arguments,
                reply,
            })
            .map_err(|_session_gone| HubError::Closed)?;
        rx.await.map_err(|_reply_dropped| HubError::Closed)?
    }

    /// Returns `true` once the session task has stopped accepting work.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Establishes hub sessions.
#[async_trait]
pub trait HubConnector: Send + Sync {
    /// Negotiate, connect and handshake a new session.
    ///
    /// The session's background work stops when `cancel` (or a token derived
    /// from it) is cancelled.
    async fn connect(&self, cancel: &CancellationToken) -> Result<Box<dyn HubSession>, HubError>;
}

/// One live, handshaken hub session.
#[async_trait]
pub trait HubSession: Send {
    /// Handle for invoking hub methods.
    fn invoker(&self) -> HubInvoker;

    /// Wait for the next pushed event.
    ///
    /// Yields [`HubEvent::Closed`] once when the session ends, then `None`.
    async fn next_event(&mut self) -> Option<HubEvent>;

    /// Stop the session and release the socket.
    async fn stop(&mut self);
}
