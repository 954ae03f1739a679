//! Integration tests for the location client state machine.
//!
//! A scripted in-process hub stands in for SignalR:
//! - each `connect` pops the next scripted outcome and records when it ran
//! - successful connects hand the test a [`SessionHandle`] for pushing hub
//!   events and answering invocations
//!
//! All tests run on a paused clock so backoff delays are exact.

// Rust guideline compliant 2026-02

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use locsync::constants::DEMO_RECORDS;
use locsync::hub::{HubConnector, HubError, HubEvent, HubInvoker, HubSession, Invocation};
use locsync::sync::{ClientOptions, ReconnectPolicy};
use locsync::ws::WsError;
use locsync::{ConnectionState, LocationClient, LocationRecord, SessionStatus, SyncError};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Test-side ends of one fake session.
struct SessionHandle {
    events: mpsc::UnboundedSender<HubEvent>,
    invocations: mpsc::UnboundedReceiver<Invocation>,
}

struct FakeSession {
    invoker: HubInvoker,
    events: mpsc::UnboundedReceiver<HubEvent>,
}

#[async_trait]
impl HubSession for FakeSession {
    fn invoker(&self) -> HubInvoker {
        self.invoker.clone()
    }

    async fn next_event(&mut self) -> Option<HubEvent> {
        self.events.recv().await
    }

    async fn stop(&mut self) {
        self.events.close();
    }
}

/// What the next `connect` call does.
enum Outcome {
    Accept,
    Fail(HubError),
}

struct FakeHub {
    script: Mutex<VecDeque<Outcome>>,
    attempts: Mutex<Vec<Instant>>,
    sessions: mpsc::UnboundedSender<SessionHandle>,
}

impl FakeHub {
    fn new(script: Vec<Outcome>) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionHandle>) {
        let (sessions, rx) = mpsc::unbounded_channel();
        let hub = Arc::new(Self {
            script: Mutex::new(script.into()),
            attempts: Mutex::new(Vec::new()),
            sessions,
        });
        (hub, rx)
    }

    fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl HubConnector for FakeHub {
    async fn connect(&self, _cancel: &CancellationToken) -> Result<Box<dyn HubSession>, HubError> {
        self.attempts.lock().unwrap().push(Instant::now());
        let outcome = self.script.lock().unwrap().pop_front();

        match outcome {
            Some(Outcome::Accept) => {
                let (invoker, invocations) = HubInvoker::channel();
                let (events, events_rx) = mpsc::unbounded_channel();
                let _ = self.sessions.send(SessionHandle {
                    events,
                    invocations,
                });
                Ok(Box::new(FakeSession {
                    invoker,
                    events: events_rx,
                }))
            }
            Some(Outcome::Fail(error)) => Err(error),
            None => Err(HubError::Closed),
        }
    }
}

fn unreachable() -> Outcome {
    Outcome::Fail(HubError::Transport(WsError::Unreachable("Connection refused".into())))
}

fn server_error() -> Outcome {
    Outcome::Fail(HubError::Negotiate {
        status: Some(500),
        message: "Internal Server Error".into(),
        network_class: false,
    })
}

fn client_with(hub: &Arc<FakeHub>, options: ClientOptions) -> LocationClient {
    let connector: Arc<dyn HubConnector> = Arc::<FakeHub>::clone(hub);
    LocationClient::new(connector, options)
}

fn started_client(hub: &Arc<FakeHub>) -> LocationClient {
    let mut client = client_with(hub, ClientOptions::default());
    client.start();
    client
}

async fn wait_for_status(client: &LocationClient, pred: impl FnMut(&SessionStatus) -> bool) -> SessionStatus {
    let mut rx = client.watch_status();
    let status = tokio::time::timeout(Duration::from_secs(600), rx.wait_for(pred))
        .await
        .expect("timed out waiting for status")
        .expect("status channel closed")
        .clone();
    status
}

async fn wait_for_state(client: &LocationClient, state: ConnectionState) -> SessionStatus {
    wait_for_status(client, |s| s.state() == state).await
}

async fn wait_for_locations(client: &LocationClient, len: usize) -> Vec<LocationRecord> {
    let mut rx = client.watch_locations();
    let records = tokio::time::timeout(Duration::from_secs(60), rx.wait_for(|records| records.len() == len))
        .await
        .expect("timed out waiting for locations")
        .expect("location channel closed")
        .clone();
    records
}

fn broadcast(user: &str, lat: f64, lon: f64) -> HubEvent {
    HubEvent::Invocation {
        target: "ReceiveLatLon".into(),
        arguments: vec![json!({ "userName": user, "lat": lat, "lon": lon })],
    }
}

fn demo_records() -> Vec<LocationRecord> {
    DEMO_RECORDS
        .iter()
        .map(|&(name, lat, lon)| LocationRecord::new(name, lat, lon))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_fresh_client_is_disconnected_and_empty() {
    let (hub, _sessions) = FakeHub::new(vec![]);
    let client = client_with(&hub, ClientOptions::default());

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client.locations().is_empty());
    assert!(client.last_error().is_none());
    assert!(!client.is_sending());
    assert!(hub.attempts().is_empty(), "construction must not connect");
}

#[tokio::test(start_paused = true)]
async fn test_network_failure_enters_local_fallback_with_demo_records() {
    let (hub, _sessions) = FakeHub::new(vec![unreachable()]);
    let client = started_client(&hub);

    let status = wait_for_state(&client, ConnectionState::LocalFallback).await;

    assert!(status.last_error().is_some());
    assert_eq!(client.locations(), demo_records());
}

#[tokio::test(start_paused = true)]
async fn test_other_failure_stays_disconnected_with_empty_store() {
    let (hub, _sessions) = FakeHub::new(vec![server_error()]);
    let client = started_client(&hub);

    let status = wait_for_status(&client, |s| {
        s.state() == ConnectionState::Disconnected && s.last_error().is_some()
    })
    .await;

    assert!(status.last_error().unwrap().contains("500"));
    assert!(client.locations().is_empty());

    // No automatic retry after a failed initial handshake.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(hub.attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_send_while_disconnected_is_rejected() {
    let (hub, _sessions) = FakeHub::new(vec![]);
    let client = client_with(&hub, ClientOptions::default());

    let result = client.send_location(25.7, 90.4, Some("TestUser")).await;

    assert_eq!(result, Err(SyncError::NotConnected));
    assert!(client.locations().is_empty());
    assert!(!client.is_sending());
}

#[tokio::test(start_paused = true)]
async fn test_local_fallback_send_updates_store_after_delay() {
    let (hub, _sessions) = FakeHub::new(vec![unreachable()]);
    let client = started_client(&hub);
    wait_for_state(&client, ConnectionState::LocalFallback).await;

    let started = Instant::now();
    client
        .send_location(25.7, 90.4, Some("TestUser"))
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(500));
    assert_eq!(client.store().get("TestUser"), Some(LocationRecord::new("TestUser", 25.7, 90.4)));
    assert_eq!(client.locations().len(), 3);
    assert!(!client.is_sending());
}

#[tokio::test(start_paused = true)]
async fn test_local_fallback_send_uses_default_name() {
    let (hub, _sessions) = FakeHub::new(vec![unreachable()]);
    let options = ClientOptions {
        default_user_name: "alice".into(),
        ..ClientOptions::default()
    };
    let mut client = client_with(&hub, options);
    client.start();
    wait_for_state(&client, ConnectionState::LocalFallback).await;

    client.send_location(1.0, 2.0, None).await.unwrap();
    client.send_location(3.0, 4.0, Some("  ")).await.unwrap();

    assert_eq!(client.store().get("alice"), Some(LocationRecord::new("alice", 3.0, 4.0)));
    assert_eq!(client.locations().last().unwrap().user_name, "alice");
}

#[tokio::test(start_paused = true)]
async fn test_connected_send_invokes_hub_once_without_touching_store() {
    let (hub, mut sessions) = FakeHub::new(vec![Outcome::Accept]);
    let client = started_client(&hub);
    wait_for_state(&client, ConnectionState::Connected).await;
    let mut session = sessions.recv().await.unwrap();

    let (result, (target, arguments)) = tokio::join!(client.send_location(25.7, 90.4, Some("TestUser")), async {
        let invocation = session.invocations.recv().await.unwrap();
        assert!(client.is_sending());
        let captured = (invocation.target.clone(), invocation.arguments.clone());
        invocation.reply.send(Ok(None)).unwrap();
        captured
    });

    result.unwrap();
    assert_eq!(target, "SendLatLon");
    assert_eq!(arguments, vec![json!(25.7), json!(90.4), json!("TestUser")]);
    assert!(session.invocations.try_recv().is_err(), "exactly one invocation");
    assert!(client.locations().is_empty(), "store waits for the broadcast echo");
    assert!(!client.is_sending());
}

#[tokio::test(start_paused = true)]
async fn test_connected_send_failure_is_reported() {
    let (hub, mut sessions) = FakeHub::new(vec![Outcome::Accept]);
    let client = started_client(&hub);
    wait_for_state(&client, ConnectionState::Connected).await;
    let mut session = sessions.recv().await.unwrap();

    let (result, ()) = tokio::join!(client.send_location(1.0, 2.0, Some("bob")), async {
        let invocation = session.invocations.recv().await.unwrap();
        let _ = invocation
            .reply
            .send(Err(HubError::Invocation("Hub method threw".into())));
    });

    assert!(matches!(result, Err(SyncError::SendFailed(msg)) if msg.contains("Hub method threw")));
    assert!(!client.is_sending());
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_inbound_broadcasts_are_last_writer_wins() {
    let (hub, mut sessions) = FakeHub::new(vec![Outcome::Accept]);
    let client = started_client(&hub);
    wait_for_state(&client, ConnectionState::Connected).await;
    let session = sessions.recv().await.unwrap();

    session.events.send(broadcast("ann", 1.0, 2.0)).unwrap();
    session.events.send(broadcast("bob", 3.0, 4.0)).unwrap();
    session
        .events
        .send(HubEvent::Invocation {
            target: "SomethingElse".into(),
            arguments: vec![json!({ "userName": "eve", "lat": 0.0, "lon": 0.0 })],
        })
        .unwrap();
    session
        .events
        .send(HubEvent::Invocation {
            target: "ReceiveLatLon".into(),
            arguments: vec![json!({ "userName": "mallory" })],
        })
        .unwrap();
    session.events.send(broadcast("ann", 5.0, 6.0)).unwrap();
    session.events.send(broadcast("carl", 7.0, 8.0)).unwrap();

    let records = wait_for_locations(&client, 3).await;

    assert_eq!(
        records,
        vec![
            LocationRecord::new("bob", 3.0, 4.0),
            LocationRecord::new("ann", 5.0, 6.0),
            LocationRecord::new("carl", 7.0, 8.0),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_backoff_schedule() {
    let mut script = vec![Outcome::Accept];
    script.extend((0..5).map(|_| unreachable()));
    script.push(Outcome::Accept);
    let (hub, mut sessions) = FakeHub::new(script);
    let client = started_client(&hub);
    wait_for_state(&client, ConnectionState::Connected).await;
    let session = sessions.recv().await.unwrap();

    let dropped_at = Instant::now();
    session
        .events
        .send(HubEvent::Closed {
            error: Some("Connection reset".into()),
            allow_reconnect: true,
        })
        .unwrap();

    let reconnecting = wait_for_status(&client, |s| {
        matches!(s.state(), ConnectionState::Reconnecting { .. })
    })
    .await;
    assert!(reconnecting.last_error().is_some());
    assert!(!client.state().is_interactive());
    assert_eq!(
        client.send_location(1.0, 2.0, None).await,
        Err(SyncError::NotConnected)
    );

    wait_for_state(&client, ConnectionState::Connected).await;
    assert!(client.last_error().is_none());

    let attempts = hub.attempts();
    assert_eq!(attempts.len(), 7);
    assert!(attempts[1] - dropped_at < Duration::from_millis(1));
    let gaps: Vec<u128> = attempts[1..]
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).as_millis())
        .collect();
    assert_eq!(gaps, vec![2000, 10000, 30000, 30000, 30000]);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_gives_up_after_max_attempts() {
    let (hub, mut sessions) = FakeHub::new(vec![Outcome::Accept]);
    let options = ClientOptions {
        reconnect: ReconnectPolicy::from_millis(&[100], Some(2)),
        ..ClientOptions::default()
    };
    let mut client = client_with(&hub, options);
    client.start();
    wait_for_state(&client, ConnectionState::Connected).await;
    let session = sessions.recv().await.unwrap();

    drop(session);

    let status = wait_for_status(&client, |s| {
        s.state() == ConnectionState::Disconnected && s.last_error().is_some()
    })
    .await;

    assert!(status.last_error().is_some());
    assert_eq!(hub.attempts().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_close_does_not_reconnect() {
    let (hub, mut sessions) = FakeHub::new(vec![Outcome::Accept, Outcome::Accept]);
    let client = started_client(&hub);
    wait_for_state(&client, ConnectionState::Connected).await;
    let session = sessions.recv().await.unwrap();

    session
        .events
        .send(HubEvent::Closed {
            error: Some("Server is shutting down".into()),
            allow_reconnect: false,
        })
        .unwrap();

    let status = wait_for_state(&client, ConnectionState::Disconnected).await;
    assert_eq!(status.last_error(), Some("Server is shutting down"));

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(hub.attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_manual_reconnect_leaves_local_fallback() {
    let (hub, _sessions) = FakeHub::new(vec![unreachable(), Outcome::Accept]);
    let client = started_client(&hub);
    wait_for_state(&client, ConnectionState::LocalFallback).await;

    let settled = client.reconnect().await;

    assert_eq!(settled, ConnectionState::Connected);
    assert_eq!(client.state(), ConnectionState::Connected);
    assert!(client.last_error().is_none());
    assert_eq!(hub.attempts().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_manual_reconnect_failure_is_classified() {
    let (hub, _sessions) = FakeHub::new(vec![server_error(), unreachable(), server_error()]);
    let client = started_client(&hub);
    wait_for_status(&client, |s| s.last_error().is_some()).await;

    assert_eq!(client.reconnect().await, ConnectionState::LocalFallback);
    assert_eq!(client.locations(), demo_records());

    assert_eq!(client.reconnect().await, ConnectionState::Disconnected);
    assert!(client.last_error().unwrap().contains("500"));
}

#[tokio::test(start_paused = true)]
async fn test_manual_reconnect_before_start_is_noop() {
    let (hub, _sessions) = FakeHub::new(vec![Outcome::Accept]);
    let client = client_with(&hub, ClientOptions::default());

    assert_eq!(client.reconnect().await, ConnectionState::Disconnected);
    assert!(hub.attempts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_ignores_later_events() {
    let (hub, mut sessions) = FakeHub::new(vec![Outcome::Accept]);
    let client = started_client(&hub);
    wait_for_state(&client, ConnectionState::Connected).await;
    let session = sessions.recv().await.unwrap();

    session.events.send(broadcast("ann", 1.0, 2.0)).unwrap();
    wait_for_locations(&client, 1).await;

    client.shutdown();
    let _ = session.events.send(broadcast("bob", 3.0, 4.0));
    wait_for_state(&client, ConnectionState::Disconnected).await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(client.locations(), vec![LocationRecord::new("ann", 1.0, 2.0)]);
    assert_eq!(client.send_location(1.0, 2.0, None).await, Err(SyncError::NotConnected));
    assert_eq!(hub.attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_backoff_stops_retries() {
    let (hub, mut sessions) = FakeHub::new(vec![Outcome::Accept, unreachable()]);
    let client = started_client(&hub);
    wait_for_state(&client, ConnectionState::Connected).await;
    let session = sessions.recv().await.unwrap();

    drop(session);
    wait_for_status(&client, |s| {
        matches!(s.state(), ConnectionState::Reconnecting { attempt: 1, .. })
    })
    .await;
    let attempts = hub.attempts().len();

    client.shutdown();
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert_eq!(hub.attempts().len(), attempts);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_fallback_send_skips_upsert() {
    let (hub, _sessions) = FakeHub::new(vec![unreachable()]);
    let client = started_client(&hub);
    wait_for_state(&client, ConnectionState::LocalFallback).await;

    let (result, ()) = tokio::join!(client.send_location(25.7, 90.4, Some("TestUser")), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.shutdown();
    });

    assert!(result.is_ok());
    assert!(client.store().get("TestUser").is_none());
    assert!(!client.is_sending());
}

#[tokio::test(start_paused = true)]
async fn test_close_waits_for_driver() {
    let (hub, mut sessions) = FakeHub::new(vec![Outcome::Accept]);
    let client = started_client(&hub);
    wait_for_state(&client, ConnectionState::Connected).await;
    let mut session = sessions.recv().await.unwrap();
    let status = client.watch_status();

    client.close().await;

    assert_eq!(status.borrow().state(), ConnectionState::Disconnected);
    // The session's invoker went away with the driver.
    assert!(session.invocations.recv().await.is_none());
}
