//! Connection state machine task.
//!
//! The driver is the only code that changes [`SessionStatus`], holds the
//! live [`HubSession`] or writes inbound broadcasts into the store. It runs
//! as one task and moves through [`Phase`]s until cancelled.

// Rust guideline compliant 2026-02

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::backoff::ReconnectPolicy;
use super::state::{ConnectionState, SessionStatus};
use super::SyncError;
use crate::constants::{DEMO_RECORDS, FALLBACK_ADVISORY, RECEIVE_EVENT};
use crate::hub::{HubConnector, HubError, HubEvent, HubInvoker, HubSession};
use crate::location::{LocationRecord, LocationStore};

/// State shared between the driver and [`LocationClient`] handles.
///
/// [`LocationClient`]: super::LocationClient
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) status: watch::Sender<SessionStatus>,
    pub(crate) store: LocationStore,
    pub(crate) invoker: Mutex<Option<HubInvoker>>,
    pub(crate) sending: AtomicUsize,
    pub(crate) local_send_delay: Duration,
    pub(crate) cancel: CancellationToken,
}

impl Shared {
    pub(crate) fn new(local_send_delay: Duration) -> Self {
        let (status, _) = watch::channel(SessionStatus::default());
        Self {
            status,
            store: LocationStore::new(),
            invoker: Mutex::new(None),
            sending: AtomicUsize::new(0),
            local_send_delay,
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.status.borrow().state()
    }

    pub(crate) fn invoker(&self) -> Option<HubInvoker> {
        self.invoker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_invoker(&self, invoker: Option<HubInvoker>) {
        *self.invoker.lock().unwrap_or_else(PoisonError::into_inner) = invoker;
    }

    fn publish(&self, status: SessionStatus) {
        log::debug!("[Sync] State -> {}", status.state());
        self.status.send_replace(status);
    }

    pub(crate) fn begin_send(&self) {
        self.sending.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn end_send(&self) {
        self.sending.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn is_sending(&self) -> bool {
        self.sending.load(Ordering::SeqCst) > 0
    }
}

/// Consumer request to the driver.
#[derive(Debug)]
pub(crate) enum Command {
    /// Stop any live session and run one fresh connect attempt. The reply
    /// carries the state the attempt settled in.
    Reconnect {
        reply: oneshot::Sender<ConnectionState>,
    },
}

/// Where the state machine goes next.
enum Phase {
    /// Run a connect attempt; `waiters` get the outcome.
    Connect {
        manual: bool,
        waiters: Vec<oneshot::Sender<ConnectionState>>,
    },
    /// Pump events from a live session.
    Live(Box<dyn HubSession>),
    /// Retry after an unexpected drop.
    Reconnect { reason: Option<String> },
    /// `Disconnected` or `LocalFallback`: wait for a manual reconnect.
    Idle,
    /// Teardown.
    Shutdown,
}

/// The connection state machine.
pub(crate) struct Driver {
    connector: Arc<dyn HubConnector>,
    policy: ReconnectPolicy,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Driver {
    pub(crate) fn new(
        connector: Arc<dyn HubConnector>,
        policy: ReconnectPolicy,
        shared: Arc<Shared>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            connector,
            policy,
            shared,
            commands,
        }
    }

    /// Run until the shared cancellation token fires.
    pub(crate) async fn run(mut self) {
        let mut phase = Phase::Connect {
            manual: false,
            waiters: Vec::new(),
        };

        loop {
            phase = match phase {
                Phase::Connect { manual, waiters } => self.connect(manual, waiters).await,
                Phase::Live(session) => self.live(session).await,
                Phase::Reconnect { reason } => self.reconnect(reason).await,
                Phase::Idle => self.idle().await,
                Phase::Shutdown => break,
            };
        }

        self.shared.set_invoker(None);
        self.shared.publish(SessionStatus::disconnected(None));
        log::info!("[Sync] Client stopped");
    }

    async fn connect(&mut self, manual: bool, mut waiters: Vec<oneshot::Sender<ConnectionState>>) -> Phase {
        self.shared.set_invoker(None);
        self.shared.publish(SessionStatus::connecting());

        let cancel = self.shared.cancel.clone();
        let connect = self.connector.connect(&cancel);
        tokio::pin!(connect);

        let result = loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => return Phase::Shutdown,

                result = &mut connect => break result,

                Some(Command::Reconnect { reply }) = self.commands.recv() => {
                    // Already attempting; answer with this attempt's outcome.
                    waiters.push(reply);
                }
            }
        };

        let (next, settled) = match result {
            Ok(session) => {
                self.enter_connected(session.as_ref());
                (Phase::Live(session), ConnectionState::Connected)
            }
            Err(e) => {
                let error = classify(&e, manual);
                log::warn!("[Sync] {}", error);
                if error.is_network_class() {
                    self.enter_local_fallback();
                    (Phase::Idle, ConnectionState::LocalFallback)
                } else {
                    self.shared.publish(SessionStatus::disconnected(Some(e.to_string())));
                    (Phase::Idle, ConnectionState::Disconnected)
                }
            }
        };

        for waiter in waiters {
            let _ = waiter.send(settled);
        }
        next
    }

    async fn live(&mut self, mut session: Box<dyn HubSession>) -> Phase {
        let cancel = self.shared.cancel.clone();

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    session.stop().await;
                    return Phase::Shutdown;
                }

                Some(Command::Reconnect { reply }) = self.commands.recv() => {
                    log::info!("[Sync] Manual reconnect requested while connected");
                    session.stop().await;
                    return Phase::Connect { manual: true, waiters: vec![reply] };
                }

                event = session.next_event() => match event {
                    Some(HubEvent::Invocation { target, arguments }) => {
                        self.handle_invocation(&target, arguments);
                    }
                    Some(HubEvent::Closed { error, allow_reconnect: false }) => {
                        log::info!("[Sync] Session closed: {}", error.as_deref().unwrap_or("no reason"));
                        session.stop().await;
                        self.shared.set_invoker(None);
                        self.shared.publish(SessionStatus::disconnected(error));
                        return Phase::Idle;
                    }
                    Some(HubEvent::Closed { error, allow_reconnect: true }) => {
                        log::warn!("[Sync] Session dropped: {}", error.as_deref().unwrap_or("no reason"));
                        session.stop().await;
                        return Phase::Reconnect { reason: error };
                    }
                    None => {
                        log::warn!("[Sync] Session ended without close");
                        session.stop().await;
                        return Phase::Reconnect { reason: None };
                    }
                },
            }
        }
    }

    async fn reconnect(&mut self, mut reason: Option<String>) -> Phase {
        self.shared.set_invoker(None);
        let cancel = self.shared.cancel.clone();
        let mut attempt: u32 = 0;

        loop {
            let Some(delay) = self.policy.next_delay(attempt) else {
                log::warn!("[Sync] Giving up after {} reconnect attempts", attempt);
                let error = reason.unwrap_or_else(|| "Reconnect attempts exhausted".to_string());
                self.shared.publish(SessionStatus::disconnected(Some(error)));
                return Phase::Idle;
            };

            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            log::info!("[Sync] Reconnecting in {}ms (attempt {})", delay_ms, attempt + 1);
            self.shared
                .publish(SessionStatus::reconnecting(attempt, delay_ms, reason.clone()));

            tokio::select! {
                biased;

                () = cancel.cancelled() => return Phase::Shutdown,

                Some(Command::Reconnect { reply }) = self.commands.recv() => {
                    return Phase::Connect { manual: true, waiters: vec![reply] };
                }

                () = tokio::time::sleep(delay) => {}
            }

            let result = tokio::select! {
                biased;

                () = cancel.cancelled() => return Phase::Shutdown,

                result = self.connector.connect(&cancel) => result,
            };

            match result {
                Ok(session) => {
                    log::info!("[Sync] Reconnected");
                    self.enter_connected(session.as_ref());
                    return Phase::Live(session);
                }
                Err(e) => {
                    log::warn!("[Sync] Reconnect attempt {} failed: {}", attempt + 1, e);
                    reason = Some(e.to_string());
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    async fn idle(&mut self) -> Phase {
        let cancel = self.shared.cancel.clone();

        tokio::select! {
            biased;

            () = cancel.cancelled() => Phase::Shutdown,

            command = self.commands.recv() => match command {
                Some(Command::Reconnect { reply }) => {
                    log::info!("[Sync] Manual reconnect requested");
                    Phase::Connect { manual: true, waiters: vec![reply] }
                }
                None => Phase::Shutdown,
            },
        }
    }

    fn enter_connected(&self, session: &dyn HubSession) {
        self.shared.set_invoker(Some(session.invoker()));
        self.shared.publish(SessionStatus::connected());
        log::info!("[Sync] Connected");
    }

    fn enter_local_fallback(&self) {
        self.shared.set_invoker(None);
        self.shared.store.replace_all(
            DEMO_RECORDS
                .iter()
                .map(|&(name, lat, lon)| LocationRecord::new(name, lat, lon)),
        );
        self.shared.publish(SessionStatus::local_fallback(FALLBACK_ADVISORY));
        log::warn!("[Sync] Hub unreachable, running in local demo mode");
    }

    fn handle_invocation(&self, target: &str, arguments: Vec<Value>) {
        if target != RECEIVE_EVENT {
            log::trace!("[Sync] Ignoring hub event {}", target);
            return;
        }

        let Some(payload) = arguments.into_iter().next() else {
            log::warn!("[Sync] {} without payload", RECEIVE_EVENT);
            return;
        };

        match serde_json::from_value::<LocationRecord>(payload) {
            Ok(record) => {
                log::debug!(
                    "[Sync] Received location for {}: {}, {}",
                    record.user_name,
                    record.lat,
                    record.lon
                );
                self.shared.store.upsert(record);
            }
            Err(e) => log::warn!("[Sync] Dropping malformed location: {}", e),
        }
    }
}

/// Map a transport failure onto the client error taxonomy.
fn classify(error: &HubError, manual: bool) -> SyncError {
    let network_class = error.is_network_class();
    let message = error.to_string();
    if manual {
        SyncError::ReconnectFailed {
            network_class,
            message,
        }
    } else {
        SyncError::HandshakeFailed {
            network_class,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::WsError;

    #[test]
    fn test_classify_initial_vs_manual() {
        let unreachable = HubError::Transport(WsError::Unreachable("refused".into()));
        assert!(matches!(
            classify(&unreachable, false),
            SyncError::HandshakeFailed { network_class: true, .. }
        ));
        assert!(matches!(
            classify(&unreachable, true),
            SyncError::ReconnectFailed { network_class: true, .. }
        ));

        let refused = HubError::Handshake("Unauthorized".into());
        assert!(!classify(&refused, false).is_network_class());
    }

    #[test]
    fn test_sending_counter() {
        let shared = Shared::new(Duration::ZERO);
        assert!(!shared.is_sending());
        shared.begin_send();
        shared.begin_send();
        shared.end_send();
        assert!(shared.is_sending());
        shared.end_send();
        assert!(!shared.is_sending());
    }
}
