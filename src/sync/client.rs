//! Consumer-facing handle to the synchronization client.

// Rust guideline compliant 2026-02

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::backoff::ReconnectPolicy;
use super::driver::{Command, Driver, Shared};
use super::state::{ConnectionState, SessionStatus};
use super::SyncError;
use crate::config::Config;
use crate::constants::{DEFAULT_USER_NAME, LOCAL_SEND_DELAY, SEND_METHOD};
use crate::hub::{HubConnector, HubError, SignalrConnector};
use crate::location::{LocationRecord, LocationStore};

/// Tunables for a [`LocationClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Automatic reconnect schedule.
    pub reconnect: ReconnectPolicy,
    /// Simulated propagation delay for sends in local fallback mode.
    pub local_send_delay: Duration,
    /// User name used when `send_location` is called without one.
    pub default_user_name: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            local_send_delay: LOCAL_SEND_DELAY,
            default_user_name: DEFAULT_USER_NAME.to_string(),
        }
    }
}

impl From<&Config> for ClientOptions {
    fn from(config: &Config) -> Self {
        Self {
            reconnect: config.reconnect_policy(),
            local_send_delay: Duration::from_millis(config.local_send_delay_ms),
            default_user_name: config.user_name.clone(),
        }
    }
}

/// Real-time location client.
///
/// Owns one hub session (through a background driver task) and the
/// [`LocationStore`] it feeds. Construction does not touch the network;
/// [`Self::start`] spawns the driver, which immediately begins connecting.
///
/// Dropping the client tears the session down.
pub struct LocationClient {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    pending: Option<Driver>,
    task: Option<JoinHandle<()>>,
    default_user_name: String,
}

impl std::fmt::Debug for LocationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationClient")
            .field("status", &*self.shared.status.borrow())
            .field("locations", &self.shared.store.len())
            .field("started", &self.pending.is_none())
            .finish_non_exhaustive()
    }
}

impl LocationClient {
    /// Build a client around `connector`. Starts in `Disconnected` with an
    /// empty store.
    pub fn new(connector: Arc<dyn HubConnector>, options: ClientOptions) -> Self {
        let shared = Arc::new(Shared::new(options.local_send_delay));
        let (commands, command_rx) = mpsc::unbounded_channel();
        let driver = Driver::new(connector, options.reconnect, Arc::clone(&shared), command_rx);

        Self {
            shared,
            commands,
            pending: Some(driver),
            task: None,
            default_user_name: options.default_user_name,
        }
    }

    /// Build a client for the SignalR hub named in `config`.
    pub fn from_config(config: &Config) -> Result<Self, HubError> {
        let connector = SignalrConnector::new(config.hub_url.clone())?
            .with_handshake_timeout(Duration::from_millis(config.handshake_timeout_ms));
        Ok(Self::new(Arc::new(connector), ClientOptions::from(config)))
    }

    /// Spawn the state machine on the current tokio runtime. Idempotent.
    pub fn start(&mut self) {
        if let Some(driver) = self.pending.take() {
            log::debug!("[Sync] Starting client");
            self.task = Some(tokio::spawn(driver.run()));
        }
    }

    /// Current status snapshot.
    pub fn status(&self) -> SessionStatus {
        self.shared.status.borrow().clone()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Last diagnostic message, if any.
    pub fn last_error(&self) -> Option<String> {
        self.shared.status.borrow().last_error().map(str::to_string)
    }

    /// Observe status changes.
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status.subscribe()
    }

    /// Ordered snapshot of known locations, most-recent-upsert-last.
    pub fn locations(&self) -> Vec<LocationRecord> {
        self.shared.store.all()
    }

    /// Observe location table changes.
    pub fn watch_locations(&self) -> watch::Receiver<Vec<LocationRecord>> {
        self.shared.store.subscribe()
    }

    /// Read access to the store.
    pub fn store(&self) -> &LocationStore {
        &self.shared.store
    }

    /// Whether a `send_location` call is in flight.
    pub fn is_sending(&self) -> bool {
        self.shared.is_sending()
    }

    /// Publish the local user's position.
    ///
    /// `user_name` falls back to the configured default when `None` or empty.
    ///
    /// - `Connected`: one `SendLatLon(lat, lon, user_name)` invocation; the
    ///   store is updated only by the hub's broadcast echo.
    /// - `LocalFallback`: no I/O; the record is upserted after the simulated
    ///   latency.
    /// - Any other state: [`SyncError::NotConnected`], nothing is mutated.
    pub async fn send_location(&self, lat: f64, lon: f64, user_name: Option<&str>) -> Result<(), SyncError> {
        let state = self.shared.state();
        if !state.is_interactive() {
            return Err(SyncError::NotConnected);
        }

        let user_name = user_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(self.default_user_name.as_str());

        self.shared.begin_send();
        scopeguard::defer! {
            self.shared.end_send();
        }

        if state == ConnectionState::LocalFallback {
            tokio::select! {
                () = self.shared.cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(self.shared.local_send_delay) => {}
            }
            log::info!("[Sync] Demo mode: location stored locally for {}", user_name);
            self.shared
                .store
                .upsert(LocationRecord::new(user_name, lat, lon));
            return Ok(());
        }

        let invoker = self.shared.invoker().ok_or(SyncError::NotConnected)?;
        invoker
            .invoke(SEND_METHOD, vec![json!(lat), json!(lon), json!(user_name)])
            .await
            .map_err(|e| {
                log::error!("[Sync] Failed to send location: {}", e);
                SyncError::SendFailed(e.to_string())
            })?;
        log::info!("[Sync] Location sent for {}: {}, {}", user_name, lat, lon);
        Ok(())
    }

    /// Manually reconnect.
    ///
    /// Leaves local fallback mode, stops any live session and runs one fresh
    /// connect attempt. Resolves to the state the attempt settled in. Failure
    /// is classified like the initial connect.
    pub async fn reconnect(&self) -> ConnectionState {
        if self.pending.is_some() || self.shared.cancel.is_cancelled() {
            return self.state();
        }

        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Reconnect { reply }).is_err() {
            return self.state();
        }
        rx.await.unwrap_or_else(|_| self.state())
    }

    /// Request teardown. Synchronous; safe to call more than once.
    ///
    /// After this returns the driver applies no further store updates; its
    /// last act is publishing `Disconnected`.
    pub fn shutdown(&self) {
        self.shared.cancel.cancel();
    }

    /// Shut down and wait for the driver task to exit.
    pub async fn close(mut self) {
        self.shutdown();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for LocationClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
