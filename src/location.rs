//! Latest-known-position table.
//!
//! [`LocationStore`] keeps at most one [`LocationRecord`] per user name.
//! Upserting a record for a name that is already present removes the old
//! entry and appends the new one, so [`LocationStore::all`] is ordered
//! most-recent-upsert-last.
//!
//! Observers receive the full ordered snapshot through a
//! [`tokio::sync::watch`] channel. The snapshot is replaced before
//! `upsert` returns, so a subscriber that checks immediately after an
//! upsert always sees it.
//!
//! There is no delete. A user who stops publishing stays at their last
//! position.

// Rust guideline compliant 2026-02

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Last known position of one user, as broadcast by the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    /// Identity key. Not authenticated; last writer for a name wins.
    #[serde(rename = "userName")]
    pub user_name: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl LocationRecord {
    /// Build a record.
    pub fn new(user_name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            user_name: user_name.into(),
            lat,
            lon,
        }
    }
}

/// Ordered `user_name -> LocationRecord` table with change notification.
#[derive(Debug)]
pub struct LocationStore {
    records: watch::Sender<Vec<LocationRecord>>,
}

impl Default for LocationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (records, _) = watch::channel(Vec::new());
        Self { records }
    }

    /// Insert or replace the record for `record.user_name`.
    ///
    /// The replaced record (if any) is removed from its position and the new
    /// one is appended. Other records keep their relative order.
    pub fn upsert(&self, record: LocationRecord) {
        self.records.send_modify(|records| {
            records.retain(|existing| existing.user_name != record.user_name);
            records.push(record);
        });
    }

    /// Replace the whole table.
    ///
    /// Duplicate names in `records` collapse to the last occurrence.
    pub fn replace_all(&self, records: impl IntoIterator<Item = LocationRecord>) {
        let mut table: Vec<LocationRecord> = Vec::new();
        for record in records {
            table.retain(|existing| existing.user_name != record.user_name);
            table.push(record);
        }
        self.records.send_replace(table);
    }

    /// Snapshot of all records, most-recent-upsert-last.
    pub fn all(&self) -> Vec<LocationRecord> {
        self.records.borrow().clone()
    }

    /// Look up a single user's record.
    pub fn get(&self, user_name: &str) -> Option<LocationRecord> {
        self.records
            .borrow()
            .iter()
            .find(|record| record.user_name == user_name)
            .cloned()
    }

    /// Number of distinct users in the table.
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    /// Returns `true` if no records are present.
    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// Subscribe to snapshot changes.
    ///
    /// The receiver starts with the current snapshot marked as seen.
    pub fn subscribe(&self) -> watch::Receiver<Vec<LocationRecord>> {
        self.records.subscribe()
    }
}
