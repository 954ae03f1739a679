//! `locsync watch`: print status changes and marker updates.

// Rust guideline compliant 2026-02

use anyhow::{Context, Result};

use crate::config::Config;
use crate::map::{MarkerId, MarkerLayer, MarkerOp};
use crate::sync::{LocationClient, SessionStatus};

/// Render one status line.
pub fn format_status(status: &SessionStatus) -> String {
    match status.last_error() {
        Some(error) => format!("status: {} ({})", status.state(), error),
        None => format!("status: {}", status.state()),
    }
}

/// Render one marker operation.
pub fn format_op(op: &MarkerOp) -> String {
    fn label(id: &MarkerId) -> &str {
        match id {
            MarkerId::Peer(name) => name,
            MarkerId::CurrentUser => "you",
        }
    }

    match op {
        MarkerOp::Add { popup, .. } => format!("+ {popup}"),
        MarkerOp::Move { popup, .. } => format!("~ {popup}"),
        MarkerOp::Remove { id } => format!("- {}", label(id)),
        MarkerOp::Recenter { lat, lon, zoom } => format!("@ {lat:.6}, {lon:.6} (zoom {zoom})"),
    }
}

/// Follow the hub until ctrl-c.
pub async fn watch(config: &Config) -> Result<()> {
    let mut client = LocationClient::from_config(config).context("Failed to create location client")?;
    let mut status_rx = client.watch_status();
    let mut locations_rx = client.watch_locations();
    let mut layer = MarkerLayer::new();

    client.start();
    println!("Watching {} (ctrl-c to stop)", config.hub_url);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("Failed to listen for ctrl-c")?;
                break;
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                println!("{}", format_status(&status));
            }
            changed = locations_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let records = locations_rx.borrow_and_update().clone();
                for op in layer.reconcile(&records) {
                    println!("{}", format_op(&op));
                }
            }
        }
    }

    client.close().await;
    Ok(())
}
