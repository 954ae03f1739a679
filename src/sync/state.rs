//! Connection state and the session status published to observers.
//!
//! [`SessionStatus`] values are only built through the constructors below so
//! that `last_error` can never be set while `Connected` or `Connecting`.

// Rust guideline compliant 2026-01

/// Lifecycle state of the hub session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No session. Initial state, and the state after a terminal failure.
    #[default]
    Disconnected,
    /// Negotiate/handshake in progress.
    Connecting,
    /// Session established.
    Connected,
    /// Session dropped; waiting to retry.
    Reconnecting {
        /// Reconnect attempt number (0-based) about to be made.
        attempt: u32,
        /// Milliseconds until that attempt.
        next_retry_ms: u64,
    },
    /// Hub unreachable; the client simulates the hub locally.
    LocalFallback,
}

impl ConnectionState {
    /// Whether the consumer may publish locations in this state.
    pub fn is_interactive(self) -> bool {
        matches!(self, Self::Connected | Self::LocalFallback)
    }

    /// Short lowercase name, for logs and the CLI.
    pub fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::LocalFallback => "local-fallback",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reconnecting {
                attempt,
                next_retry_ms,
            } => write!(f, "reconnecting (attempt {} in {}ms)", attempt + 1, next_retry_ms),
            other => f.write_str(other.label()),
        }
    }
}

/// Observable session status: state plus the last diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionStatus {
    state: ConnectionState,
    last_error: Option<String>,
}

impl SessionStatus {
    pub(crate) fn connecting() -> Self {
        Self {
            state: ConnectionState::Connecting,
            last_error: None,
        }
    }

    pub(crate) fn connected() -> Self {
        Self {
            state: ConnectionState::Connected,
            last_error: None,
        }
    }

    pub(crate) fn reconnecting(attempt: u32, next_retry_ms: u64, reason: Option<String>) -> Self {
        Self {
            state: ConnectionState::Reconnecting {
                attempt,
                next_retry_ms,
            },
            last_error: reason,
        }
    }

    pub(crate) fn local_fallback(advisory: &str) -> Self {
        Self {
            state: ConnectionState::LocalFallback,
            last_error: Some(advisory.to_string()),
        }
    }

    pub(crate) fn disconnected(error: Option<String>) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            last_error: error,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Last diagnostic, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether the UI should treat the client as connected.
    pub fn is_interactive(&self) -> bool {
        self.state.is_interactive()
    }
}
