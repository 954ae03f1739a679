//! SignalR hub session over WebSocket.
//!
//! [`SignalrConnector::connect`] runs negotiate, opens the socket, performs
//! the JSON protocol handshake and then spawns a background task that owns
//! the socket for the rest of the session.
//!
//! # Session task
//!
//! The task multiplexes, in one `tokio::select!` loop:
//!
//! - inbound frames: broadcasts are forwarded as [`HubEvent::Invocation`],
//!   completions are routed to the waiting [`HubInvoker`] call by
//!   `invocationId`, server `Close` ends the session;
//! - outbound invocations from [`HubInvoker`];
//! - a keep-alive ping every [`KEEP_ALIVE_INTERVAL`];
//! - a server timeout after [`SERVER_TIMEOUT`] without inbound traffic;
//! - cancellation.
//!
//! Exactly one [`HubEvent::Closed`] is emitted when the session ends for any
//! reason other than cancellation. Pending invocations fail with
//! [`HubError::Closed`].

// Rust guideline compliant 2026-02

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::protocol::{self, HubMessage};
use super::{negotiate, HubConnector, HubError, HubEvent, HubInvoker, HubSession, Invocation};
use crate::constants::{HANDSHAKE_TIMEOUT, KEEP_ALIVE_INTERVAL, NEGOTIATE_TIMEOUT, SERVER_TIMEOUT};
use crate::ws::{self, WsEvent, WsMessage, WsReader, WsWriter};

/// Buffer of pushed events before the session task applies backpressure.
const EVENT_BUFFER: usize = 256;

/// Connects to an ASP.NET SignalR hub.
#[derive(Debug, Clone)]
pub struct SignalrConnector {
    hub_url: String,
    http: reqwest::Client,
    handshake_timeout: Duration,
}

impl SignalrConnector {
    /// Create a connector for `hub_url` (an `http(s)://` hub endpoint).
    pub fn new(hub_url: impl Into<String>) -> Result<Self, HubError> {
        let http = reqwest::Client::builder()
            .timeout(NEGOTIATE_TIMEOUT)
            .build()
            .map_err(|e| HubError::Negotiate {
                status: None,
                message: format!("failed to build HTTP client: {e}"),
                network_class: false,
            })?;
        Ok(Self {
            hub_url: hub_url.into(),
            http,
            handshake_timeout: HANDSHAKE_TIMEOUT,
        })
    }

    /// Override the handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Hub endpoint this connector targets.
    pub fn hub_url(&self) -> &str {
        &self.hub_url
    }
}

#[async_trait]
impl HubConnector for SignalrConnector {
    async fn connect(&self, cancel: &CancellationToken) -> Result<Box<dyn HubSession>, HubError> {
        let negotiated = negotiate::negotiate(&self.http, &self.hub_url).await?;

        let ws_url = negotiate::with_access_token(&negotiated.ws_url, negotiated.access_token.as_deref())?;

        log::info!("[Hub] Connecting to {}", self.hub_url);
        let (mut writer, mut reader) = ws::connect(&ws_url).await?;

        let leftover = match tokio::time::timeout(
            self.handshake_timeout,
            handshake(&mut writer, &mut reader),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                let _ = writer.close().await;
                return Err(HubError::Timeout);
            }
        };
        log::info!("[Hub] Handshake complete");

        Ok(Box::new(SignalrSession::spawn(
            writer,
            reader,
            leftover,
            cancel.child_token(),
        )))
    }
}

/// Send the handshake request and wait for the response.
///
/// Returns any protocol messages that arrived in the same frame after the
/// handshake response.
async fn handshake(writer: &mut WsWriter, reader: &mut WsReader) -> Result<Vec<HubMessage>, HubError> {
    writer.send_text(&protocol::encode_handshake()).await?;

    loop {
        match reader.recv().await {
            Some(Ok(WsEvent::Message(WsMessage::Text(text)))) => {
                let mut records = protocol::split_records(&text);
                let Some(first) = records.next() else {
                    continue;
                };
                let refusal = protocol::decode_handshake(first)
                    .map_err(|e| HubError::Handshake(e.to_string()))?;
                if let Some(error) = refusal {
                    return Err(HubError::Handshake(error));
                }
                let mut leftover = Vec::new();
                for record in records {
                    match protocol::decode(record) {
                        Ok(message) => leftover.push(message),
                        Err(e) => log::warn!("[Hub] Dropping malformed message: {}", e),
                    }
                }
                return Ok(leftover);
            }
            Some(Ok(WsEvent::Ping(data))) => {
                writer.send_pong(data).await?;
            }
            Some(Ok(WsEvent::Message(WsMessage::Binary(_)))) => {
                return Err(HubError::Handshake("unexpected binary handshake response".into()));
            }
            Some(Ok(WsEvent::Message(WsMessage::Close { code, reason }))) => {
                return Err(HubError::Handshake(format!(
                    "socket closed during handshake ({code}): {reason}"
                )));
            }
            Some(Err(e)) => return Err(HubError::Transport(e)),
            None => return Err(HubError::Handshake("socket ended during handshake".into())),
        }
    }
}

/// A live SignalR session.
pub struct SignalrSession {
    invoker: HubInvoker,
    events: mpsc::Receiver<HubEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SignalrSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalrSession")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl SignalrSession {
    fn spawn(
        writer: WsWriter,
        reader: WsReader,
        leftover: Vec<HubMessage>,
        cancel: CancellationToken,
    ) -> Self {
        let (invoker, invocation_rx) = HubInvoker::channel();
        let (event_tx, events) = mpsc::channel(EVENT_BUFFER);

        let task = tokio::spawn(run_session_loop(
            writer,
            reader,
            leftover,
            invocation_rx,
            event_tx,
            cancel.clone(),
        ));

        Self {
            invoker,
            events,
            cancel,
            task: Some(task),
        }
    }
}

#[async_trait]
impl HubSession for SignalrSession {
    fn invoker(&self) -> HubInvoker {
        self.invoker.clone()
    }

    async fn next_event(&mut self) -> Option<HubEvent> {
        self.events.recv().await
    }

    async fn stop(&mut self) {
        // Unblocks a session task waiting for buffer space.
        self.events.close();
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SignalrSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Why the session loop ended.
enum SessionExit {
    /// Cancellation requested by the owner.
    Cancelled,
    /// Session ended; report to the owner.
    Closed {
        error: Option<String>,
        allow_reconnect: bool,
    },
}

/// Per-session bookkeeping for outstanding invocations.
#[derive(Default)]
struct PendingInvocations {
    next_id: u64,
    waiting: HashMap<String, oneshot::Sender<Result<Option<Value>, HubError>>>,
}

impl PendingInvocations {
    fn allocate_id(&mut self) -> String {
        let id = self.next_id.to_string();
        self.next_id += 1;
        id
    }

    fn complete(&mut self, invocation_id: &str, result: Option<Value>, error: Option<String>) {
        let Some(reply) = self.waiting.remove(invocation_id) else {
            log::debug!("[Hub] Completion for unknown invocation {}", invocation_id);
            return;
        };
        let outcome = match error {
            Some(error) => Err(HubError::Invocation(error)),
            None => Ok(result),
        };
        let _ = reply.send(outcome);
    }

    fn fail_all(&mut self) {
        for (_, reply) in self.waiting.drain() {
            let _ = reply.send(Err(HubError::Closed));
        }
    }
}

async fn run_session_loop(
    mut writer: WsWriter,
    mut reader: WsReader,
    leftover: Vec<HubMessage>,
    mut invocation_rx: mpsc::UnboundedReceiver<Invocation>,
    event_tx: mpsc::Sender<HubEvent>,
    cancel: CancellationToken,
) {
    let mut pending = PendingInvocations::default();
    let mut last_inbound = Instant::now();
    let mut keep_alive =
        tokio::time::interval_at(Instant::now() + KEEP_ALIVE_INTERVAL, KEEP_ALIVE_INTERVAL);
    keep_alive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut exit = None;
    for message in leftover {
        if let Some(end) = handle_message(message, &mut pending, &event_tx, &cancel).await {
            exit = Some(end);
            break;
        }
    }

    let exit = match exit {
        Some(exit) => exit,
        None => loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => break SessionExit::Cancelled,

                event = reader.recv() => {
                    last_inbound = Instant::now();
                    match event {
                        Some(Ok(WsEvent::Message(WsMessage::Text(text)))) => {
                            let mut end = None;
                            for record in protocol::split_records(&text) {
                                match protocol::decode(record) {
                                    Ok(message) => {
                                        end = handle_message(message, &mut pending, &event_tx, &cancel).await;
                                        if end.is_some() {
                                            break;
                                        }
                                    }
                                    Err(e) => log::warn!("[Hub] Dropping malformed message: {}", e),
                                }
                            }
                            if let Some(end) = end {
                                break end;
                            }
                        }
                        Some(Ok(WsEvent::Message(WsMessage::Binary(_)))) => {
                            log::warn!("[Hub] Ignoring binary frame on JSON protocol session");
                        }
                        Some(Ok(WsEvent::Ping(data))) => {
                            if let Err(e) = writer.send_pong(data).await {
                                break SessionExit::Closed { error: Some(e.to_string()), allow_reconnect: true };
                            }
                        }
                        Some(Ok(WsEvent::Message(WsMessage::Close { code, reason }))) => {
                            log::info!("[Hub] Socket closed by server ({})", code);
                            let error = if reason.is_empty() { None } else { Some(reason) };
                            break SessionExit::Closed { error, allow_reconnect: true };
                        }
                        Some(Err(e)) => {
                            log::warn!("[Hub] WebSocket error: {}", e);
                            break SessionExit::Closed { error: Some(e.to_string()), allow_reconnect: true };
                        }
                        None => {
                            log::info!("[Hub] WebSocket stream ended");
                            break SessionExit::Closed { error: None, allow_reconnect: true };
                        }
                    }
                }

                Some(invocation) = invocation_rx.recv() => {
                    let invocation_id = pending.allocate_id();
                    let message = HubMessage::Invocation {
                        invocation_id: Some(invocation_id.clone()),
                        target: invocation.target,
                        arguments: invocation.arguments,
                    };
                    let frame = match protocol::encode(&message) {
                        Ok(frame) => frame,
                        Err(e) => {
                            let _ = invocation.reply.send(Err(HubError::Protocol(e.to_string())));
                            continue;
                        }
                    };
                    if let Err(e) = writer.send_text(&frame).await {
                        let _ = invocation.reply.send(Err(HubError::Transport(e.clone())));
                        break SessionExit::Closed { error: Some(e.to_string()), allow_reconnect: true };
                    }
                    pending.waiting.insert(invocation_id, invocation.reply);
                }

                _ = keep_alive.tick() => {
                    if let Ok(frame) = protocol::encode(&HubMessage::Ping) {
                        if let Err(e) = writer.send_text(&frame).await {
                            break SessionExit::Closed { error: Some(e.to_string()), allow_reconnect: true };
                        }
                    }
                }

                () = tokio::time::sleep_until(last_inbound + SERVER_TIMEOUT) => {
                    log::warn!("[Hub] No message from server in {}s", SERVER_TIMEOUT.as_secs());
                    break SessionExit::Closed {
                        error: Some("Server timeout elapsed without receiving a message from the server.".into()),
                        allow_reconnect: true,
                    };
                }
            }
        },
    };

    pending.fail_all();
    let _ = writer.close().await;

    match exit {
        SessionExit::Cancelled => log::debug!("[Hub] Session cancelled"),
        SessionExit::Closed {
            error,
            allow_reconnect,
        } => {
            tokio::select! {
                () = cancel.cancelled() => {}
                _ = event_tx.send(HubEvent::Closed { error, allow_reconnect }) => {}
            }
        }
    }
}

/// Apply one decoded message. Returns `Some` if the session must end.
async fn handle_message(
    message: HubMessage,
    pending: &mut PendingInvocations,
    event_tx: &mpsc::Sender<HubEvent>,
    cancel: &CancellationToken,
) -> Option<SessionExit> {
    match message {
        HubMessage::Invocation {
            target, arguments, ..
        } => {
            tokio::select! {
                () = cancel.cancelled() => Some(SessionExit::Cancelled),
                sent = event_tx.send(HubEvent::Invocation { target, arguments }) => {
                    if sent.is_err() {
                        log::debug!("[Hub] Event receiver dropped");
                    }
                    None
                }
            }
        }
        HubMessage::Completion {
            invocation_id,
            result,
            error,
        } => {
            pending.complete(&invocation_id, result, error);
            None
        }
        HubMessage::Ping => None,
        HubMessage::Close {
            error,
            allow_reconnect,
        } => {
            log::info!(
                "[Hub] Server closed session (allow_reconnect={}): {}",
                allow_reconnect,
                error.as_deref().unwrap_or("no reason")
            );
            Some(SessionExit::Closed {
                error,
                allow_reconnect,
            })
        }
        HubMessage::Other(msg_type) => {
            log::trace!("[Hub] Ignoring message type {}", msg_type);
            None
        }
    }
}
