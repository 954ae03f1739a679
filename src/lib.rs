//! locsync - real-time location sharing client.
//!
//! This crate connects to a SignalR location hub, keeps the latest position
//! of every user who broadcasts, and publishes the local user's position.
//! When the hub cannot be reached it degrades to a local demo mode.
//!
//! # Architecture
//!
//! - **Sync** - Connection state machine and the consumer handle
//! - **Hub** - SignalR negotiate, handshake and session transport
//! - **Location** - Latest-position-per-user table with change observation
//! - **Map** - Renderer-agnostic marker reconciliation
//!
//! # Modules
//!
//! - [`sync`] - [`LocationClient`] and its state machine
//! - [`hub`] - Hub transport traits and the SignalR implementation
//! - [`location`] - [`LocationRecord`] and [`LocationStore`]
//! - [`map`] - [`MarkerLayer`]
//! - [`config`] - Configuration loading/saving

pub mod commands;
pub mod config;
pub mod constants;
pub mod hub;
pub mod location;
pub mod map;
pub mod sync;
pub mod ws;

// Re-export commonly used types
pub use config::Config;
pub use location::{LocationRecord, LocationStore};
pub use map::{MarkerLayer, MarkerOp};
pub use sync::{ConnectionState, LocationClient, SessionStatus, SyncError};
