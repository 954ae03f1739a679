//! `locsync send`: publish one position and exit.

use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::sync::{ConnectionState, LocationClient, SessionStatus};

/// Upper bound on waiting for the first connect attempt to settle.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Whether the first connect attempt has finished one way or the other.
pub fn is_settled(status: &SessionStatus) -> bool {
    match status.state() {
        ConnectionState::Connected | ConnectionState::LocalFallback => true,
        ConnectionState::Disconnected => status.last_error().is_some(),
        ConnectionState::Connecting | ConnectionState::Reconnecting { .. } => false,
    }
}

/// Connect, publish `(lat, lon)` under `user_name`, then disconnect.
pub async fn send(config: &Config, lat: f64, lon: f64, user_name: Option<&str>) -> Result<()> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        bail!("Coordinates out of range: {lat}, {lon}");
    }

    let mut client = LocationClient::from_config(config).context("Failed to create location client")?;
    let mut status_rx = client.watch_status();
    client.start();

    let status = tokio::time::timeout(SETTLE_TIMEOUT, status_rx.wait_for(is_settled))
        .await
        .context("Timed out waiting for the hub")?
        .context("Client stopped before connecting")?
        .clone();

    if status.state() == ConnectionState::LocalFallback {
        eprintln!("{}", status.last_error().unwrap_or_default());
    }

    let result = client.send_location(lat, lon, user_name).await;
    let state = client.state();
    client.close().await;

    result.with_context(|| format!("Send failed while {state}"))?;
    println!("Sent {lat:.6}, {lon:.6} ({state})");
    Ok(())
}
