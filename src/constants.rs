//! Application-wide constants for locsync.
//!
//! This module centralizes the hub endpoint, protocol timings and the demo
//! data used by local fallback mode. Constants are grouped by domain.
//!
//! # Categories
//!
//! - **Hub**: Endpoint and method names
//! - **Timeouts**: Handshake and keep-alive timings
//! - **Fallback**: Demo records and simulated latency

use std::time::Duration;

// ============================================================================
// Hub
// ============================================================================

/// Default location hub endpoint.
pub const DEFAULT_HUB_URL: &str = "https://tech-test.raintor.com/Hub";

/// Hub method invoked by clients to publish a position.
pub const SEND_METHOD: &str = "SendLatLon";

/// Hub event broadcast to all clients when someone publishes a position.
pub const RECEIVE_EVENT: &str = "ReceiveLatLon";

/// User name used when the caller does not supply one.
pub const DEFAULT_USER_NAME: &str = "Default";

/// Reconnect delays in milliseconds.
///
/// Attempts past the end of the schedule reuse the last delay.
pub const DEFAULT_RECONNECT_DELAYS_MS: [u64; 4] = [0, 2_000, 10_000, 30_000];

// ============================================================================
// Timeouts
// ============================================================================

/// How long to wait for the hub handshake response after the socket opens.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// Client keep-alive ping interval.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Session is considered dropped after this long without any inbound message.
pub const SERVER_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP timeout for the negotiate request.
pub const NEGOTIATE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Fallback
// ============================================================================

/// Simulated propagation delay for sends in local fallback mode.
pub const LOCAL_SEND_DELAY: Duration = Duration::from_millis(500);

/// Advisory shown while running without a hub.
pub const FALLBACK_ADVISORY: &str =
    "SignalR hub unavailable - Running in demo mode. Location sharing will work locally only.";

/// Records seeded into the store on entering local fallback mode.
///
/// Each tuple is `(user_name, lat, lon)`.
pub const DEMO_RECORDS: [(&str, f64, f64); 2] = [
    ("Demo User 1", 25.7617, 90.3649),
    ("Demo User 2", 25.7317, 90.4117),
];

// ============================================================================
// Map
// ============================================================================

/// Map centre used before any location is known.
pub const DEFAULT_MAP_CENTER: (f64, f64) = (25.737_364_64, 90.364_474_7);

/// Initial map zoom level.
pub const DEFAULT_MAP_ZOOM: u8 = 13;
