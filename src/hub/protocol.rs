//! SignalR JSON hub protocol (version 1).
//!
//! Every message is a JSON object followed by the ASCII record separator
//! `0x1E`. A single WebSocket text frame may carry several messages, and the
//! first frame after connect carries the handshake response.
//!
//! # Message types
//!
//! | type | meaning                                   |
//! |------|-------------------------------------------|
//! | 1    | Invocation (client→server or broadcast)   |
//! | 3    | Completion of a client invocation         |
//! | 6    | Ping                                      |
//! | 7    | Close                                     |
//!
//! Streaming types (2, 4, 5) are never used by the location hub and are
//! decoded as [`HubMessage::Other`].

// Rust guideline compliant 2026-02

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Record separator terminating every protocol message.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Protocol name sent in the handshake.
pub const PROTOCOL_NAME: &str = "json";

/// Protocol version sent in the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// Handshake request, the first frame sent after the socket opens.
#[derive(Debug, Clone, Serialize)]
pub struct HandshakeRequest {
    /// Protocol name (`json`).
    pub protocol: &'static str,
    /// Protocol version.
    pub version: u32,
}

impl Default for HandshakeRequest {
    fn default() -> Self {
        Self {
            protocol: PROTOCOL_NAME,
            version: PROTOCOL_VERSION,
        }
    }
}

/// Handshake response. An empty object means success.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandshakeResponse {
    /// Set when the server refused the handshake.
    #[serde(default)]
    pub error: Option<String>,
}

/// A decoded hub message.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// Method call. With an `invocation_id` the sender expects a completion.
    Invocation {
        /// Correlation id, absent for fire-and-forget broadcasts.
        invocation_id: Option<String>,
        /// Hub method or client event name.
        target: String,
        /// Positional arguments.
        arguments: Vec<Value>,
    },
    /// Result of an invocation.
    Completion {
        /// Id of the invocation being completed.
        invocation_id: String,
        /// Return value on success.
        result: Option<Value>,
        /// Error text on failure.
        error: Option<String>,
    },
    /// Keep-alive.
    Ping,
    /// Server is closing the session.
    Close {
        /// Reason the server closed the session.
        error: Option<String>,
        /// Whether the client may reconnect.
        allow_reconnect: bool,
    },
    /// Any message type this client does not act on.
    Other(u8),
}

/// Wire shape used for both directions. Fields irrelevant to a type are
/// omitted on encode and defaulted on decode.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(rename = "type")]
    msg_type: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invocation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arguments: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    allow_reconnect: Option<bool>,
}

const TYPE_INVOCATION: u8 = 1;
const TYPE_COMPLETION: u8 = 3;
const TYPE_PING: u8 = 6;
const TYPE_CLOSE: u8 = 7;

/// Protocol decode failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError(pub String);

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "protocol error: {}", self.0)
    }
}

impl std::error::Error for ProtocolError {}

/// Append the record separator to a serialized message.
fn frame(json: &str) -> String {
    let mut out = String::with_capacity(json.len() + 1);
    out.push_str(json);
    out.push(RECORD_SEPARATOR);
    out
}

/// Encode the handshake request frame.
pub fn encode_handshake() -> String {
    let json = serde_json::to_string(&HandshakeRequest::default())
        .unwrap_or_else(|_| format!(r#"{{"protocol":"{PROTOCOL_NAME}","version":{PROTOCOL_VERSION}}}"#));
    frame(&json)
}

/// Encode a message for the wire.
pub fn encode(message: &HubMessage) -> Result<String, ProtocolError> {
    let raw = match message {
        HubMessage::Invocation {
            invocation_id,
            target,
            arguments,
        } => RawMessage {
            msg_type: TYPE_INVOCATION,
            invocation_id: invocation_id.clone(),
            target: Some(target.clone()),
            arguments: Some(arguments.clone()),
            ..RawMessage::default()
        },
        HubMessage::Completion {
            invocation_id,
            result,
            error,
        } => RawMessage {
            msg_type: TYPE_COMPLETION,
            invocation_id: Some(invocation_id.clone()),
            result: result.clone(),
            error: error.clone(),
            ..RawMessage::default()
        },
        HubMessage::Ping => RawMessage {
            msg_type: TYPE_PING,
            ..RawMessage::default()
        },
        HubMessage::Close {
            error,
            allow_reconnect,
        } => RawMessage {
            msg_type: TYPE_CLOSE,
            error: error.clone(),
            allow_reconnect: Some(*allow_reconnect),
            ..RawMessage::default()
        },
        HubMessage::Other(msg_type) => {
            return Err(ProtocolError(format!("cannot encode message type {msg_type}")));
        }
    };
    let json = serde_json::to_string(&raw).map_err(|e| ProtocolError(e.to_string()))?;
    Ok(frame(&json))
}

/// Split a text frame into its record-separated JSON payloads.
///
/// Empty segments (the tail after the final separator) are skipped.
pub fn split_records(frame: &str) -> impl Iterator<Item = &str> {
    frame
        .split(RECORD_SEPARATOR)
        .filter(|segment| !segment.trim().is_empty())
}

/// Decode one JSON payload (without separator).
pub fn decode(payload: &str) -> Result<HubMessage, ProtocolError> {
    let raw: RawMessage =
        serde_json::from_str(payload).map_err(|e| ProtocolError(e.to_string()))?;

    match raw.msg_type {
        TYPE_INVOCATION => Ok(HubMessage::Invocation {
            invocation_id: raw.invocation_id,
            target: raw
                .target
                .ok_or_else(|| ProtocolError("invocation without target".into()))?,
            arguments: raw.arguments.unwrap_or_default(),
        }),
        TYPE_COMPLETION => Ok(HubMessage::Completion {
            invocation_id: raw
                .invocation_id
                .ok_or_else(|| ProtocolError("completion without invocationId".into()))?,
            result: raw.result,
            error: raw.error,
        }),
        TYPE_PING => Ok(HubMessage::Ping),
        TYPE_CLOSE => Ok(HubMessage::Close {
            error: raw.error,
            allow_reconnect: raw.allow_reconnect.unwrap_or(false),
        }),
        other => Ok(HubMessage::Other(other)),
    }
}

/// Decode the handshake response payload.
///
/// Returns the server's error text if it refused the handshake.
pub fn decode_handshake(payload: &str) -> Result<Option<String>, ProtocolError> {
    let response: HandshakeResponse =
        serde_json::from_str(payload).map_err(|e| ProtocolError(e.to_string()))?;
    Ok(response.error)
}
