//! Shared WebSocket transport.
//!
//! Thin wrapper around `tokio-tungstenite` providing type-isolated
//! reader/writer halves and a transport error type that knows whether a
//! failure is network-class (host unreachable, refused, cross-origin
//! rejection) or something else. The hub connection is the only consumer.
//!
//! # Architecture
//!
//! A single [`connect`] function handles URL→request building and TLS
//! negotiation. It returns a ([`WsWriter`], [`WsReader`]) pair ready for use
//! in `tokio::select!` loops.

// Rust guideline compliant 2026-02

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

/// Concrete WebSocket stream type.
type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Received WebSocket message.
#[derive(Debug)]
pub enum WsMessage {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Close frame with status code and reason.
    Close {
        /// WebSocket close code (1000 = normal, 1005 = no code).
        code: u16,
        /// Human-readable close reason.
        reason: String,
    },
}

/// WebSocket transport failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsError {
    /// The URL could not be turned into a WebSocket request.
    InvalidUrl(String),
    /// TCP/DNS/TLS level failure reaching the host.
    Unreachable(String),
    /// The server answered the upgrade with a non-101 HTTP status.
    Rejected {
        /// HTTP status code of the refusal.
        status: u16,
    },
    /// The peer violated the WebSocket protocol.
    Protocol(String),
    /// The connection is already closed.
    Closed,
}

impl WsError {
    /// Returns `true` for failures that mean "the hub cannot be reached from
    /// here": I/O failures and cross-origin style 403 refusals.
    pub fn is_network_class(&self) -> bool {
        match self {
            Self::Unreachable(_) => true,
            Self::Rejected { status } => *status == 403,
            Self::InvalidUrl(_) | Self::Protocol(_) | Self::Closed => false,
        }
    }
}

impl std::fmt::Display for WsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUrl(msg) => write!(f, "invalid WebSocket URL: {msg}"),
            Self::Unreachable(msg) => write!(f, "WebSocket unreachable: {msg}"),
            Self::Rejected { status } => write!(f, "WebSocket upgrade rejected with HTTP {status}"),
            Self::Protocol(msg) => write!(f, "WebSocket protocol error: {msg}"),
            Self::Closed => write!(f, "WebSocket closed"),
        }
    }
}

impl std::error::Error for WsError {}

impl From<tungstenite::Error> for WsError {
    fn from(e: tungstenite::Error) -> Self {
        match e {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => Self::Closed,
            tungstenite::Error::Io(io) => Self::Unreachable(io.to_string()),
            tungstenite::Error::Tls(tls) => Self::Unreachable(tls.to_string()),
            tungstenite::Error::Url(url) => Self::InvalidUrl(url.to_string()),
            tungstenite::Error::Http(response) => Self::Rejected {
                status: response.status().as_u16(),
            },
            other => Self::Protocol(other.to_string()),
        }
    }
}

/// Write half of a WebSocket connection.
#[derive(Debug)]
pub struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

impl WsWriter {
    /// Send a UTF-8 text frame.
    pub async fn send_text(&mut self, text: &str) -> Result<(), WsError> {
        self.sink
            .send(tungstenite::Message::Text(text.to_string()))
            .await
            .map_err(WsError::from)
    }

    /// Send a pong frame in response to a ping.
    pub async fn send_pong(&mut self, data: Vec<u8>) -> Result<(), WsError> {
        self.sink
            .send(tungstenite::Message::Pong(data))
            .await
            .map_err(WsError::from)
    }

    /// Flush pending writes and close the sink.
    pub async fn close(&mut self) -> Result<(), WsError> {
        self.sink.close().await.map_err(WsError::from)
    }
}

/// Read half of a WebSocket connection.
#[derive(Debug)]
pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

/// Either a message for the caller or a ping that needs a pong.
#[derive(Debug)]
pub enum WsEvent {
    /// Data or close frame.
    Message(WsMessage),
    /// Ping payload the caller should echo with [`WsWriter::send_pong`].
    Ping(Vec<u8>),
}

impl WsReader {
    /// Receive the next event, returning `None` when the stream ends.
    ///
    /// Pong and raw `Frame` variants are skipped internally.
    pub async fn recv(&mut self) -> Option<Result<WsEvent, WsError>> {
        loop {
            match self.stream.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return Some(Ok(WsEvent::Message(WsMessage::Text(text.to_string()))));
                }
                Some(Ok(tungstenite::Message::Binary(data))) => {
                    return Some(Ok(WsEvent::Message(WsMessage::Binary(data.to_vec()))));
                }
                Some(Ok(tungstenite::Message::Ping(data))) => {
                    return Some(Ok(WsEvent::Ping(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Close(close_frame))) => {
                    let (code, reason) = close_frame
                        .map(|cf| (cf.code.into(), cf.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    return Some(Ok(WsEvent::Message(WsMessage::Close { code, reason })));
                }
                Some(Ok(tungstenite::Message::Pong(_) | tungstenite::Message::Frame(_))) => {
                    continue;
                }
                Some(Err(e)) => return Some(Err(WsError::from(e))),
                None => return None,
            }
        }
    }
}

/// Connect to a WebSocket URL.
///
/// Performs the upgrade handshake and returns split (writer, reader) halves
/// for independent use in `tokio::select!` loops.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader), WsError> {
    use tungstenite::client::IntoClientRequest;

    let request = url
        .into_client_request()
        .map_err(|e| WsError::InvalidUrl(format!("{url}: {e}")))?;

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request).await?;

    let (sink, stream) = ws_stream.split();

    Ok((WsWriter { sink }, WsReader { stream }))
}

/// Convert an HTTP(S) URL to WS(S) scheme.
///
/// Passes `ws://` and `wss://` through unchanged.
#[must_use]
pub fn http_to_ws_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}
