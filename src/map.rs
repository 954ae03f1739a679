//! Map marker reconciliation.
//!
//! [`MarkerLayer`] tracks which markers a renderer currently shows and turns
//! each new snapshot of the location table into a minimal list of
//! [`MarkerOp`]s. It knows nothing about any particular map widget; the
//! renderer applies the ops.
//!
//! Per snapshot:
//!
//! 1. markers for users no longer in the snapshot are removed;
//! 2. each record moves its existing marker (if the position changed) or
//!    adds a new one;
//! 3. the view recentres on the last record, keeping the current zoom.
//!
//! The local user's own marker is tracked separately through
//! [`MarkerLayer::set_current_user`] and is never touched by step 1.

// Rust guideline compliant 2026-02

use std::collections::BTreeMap;

use crate::constants::{DEFAULT_MAP_CENTER, DEFAULT_MAP_ZOOM};
use crate::location::LocationRecord;

/// Which marker an op applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerId {
    /// A peer's marker, keyed by user name.
    Peer(String),
    /// The distinguished marker for the local user.
    CurrentUser,
}

/// A change the renderer must apply.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerOp {
    /// Create a marker.
    Add {
        /// Marker identity.
        id: MarkerId,
        /// Latitude.
        lat: f64,
        /// Longitude.
        lon: f64,
        /// Popup label.
        popup: String,
    },
    /// Reposition an existing marker and refresh its popup.
    Move {
        /// Marker identity.
        id: MarkerId,
        /// Latitude.
        lat: f64,
        /// Longitude.
        lon: f64,
        /// Popup label.
        popup: String,
    },
    /// Delete a marker.
    Remove {
        /// Marker identity.
        id: MarkerId,
    },
    /// Pan the view.
    Recenter {
        /// Latitude.
        lat: f64,
        /// Longitude.
        lon: f64,
        /// Zoom level to keep.
        zoom: u8,
    },
}

/// Popup label for a peer marker.
pub fn peer_popup(user_name: &str, lat: f64, lon: f64) -> String {
    format!("{user_name}: {lat:.6}, {lon:.6}")
}

/// Popup label for the local user's marker.
pub fn current_user_popup(user_name: &str, lat: f64, lon: f64) -> String {
    format!("{user_name} (You): {lat:.6}, {lon:.6}")
}

/// Callback invoked when the user clicks the map.
pub type ClickHandler = Box<dyn Fn(f64, f64) + Send + Sync>;

/// Renderer-agnostic marker state.
pub struct MarkerLayer {
    peers: BTreeMap<String, (f64, f64)>,
    current_user: Option<(f64, f64)>,
    center: (f64, f64),
    zoom: u8,
    on_click: Option<ClickHandler>,
}

impl std::fmt::Debug for MarkerLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerLayer")
            .field("peers", &self.peers.len())
            .field("current_user", &self.current_user)
            .field("center", &self.center)
            .field("zoom", &self.zoom)
            .finish_non_exhaustive()
    }
}

impl Default for MarkerLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerLayer {
    /// Empty layer at the default view.
    pub fn new() -> Self {
        Self {
            peers: BTreeMap::new(),
            current_user: None,
            center: DEFAULT_MAP_CENTER,
            zoom: DEFAULT_MAP_ZOOM,
            on_click: None,
        }
    }

    /// Register a click-to-set-coordinate callback.
    #[must_use]
    pub fn with_click_handler(mut self, handler: ClickHandler) -> Self {
        self.on_click = Some(handler);
        self
    }

    /// Forward a map click to the registered callback, if any.
    pub fn click(&self, lat: f64, lon: f64) {
        if let Some(handler) = &self.on_click {
            handler(lat, lon);
        }
    }

    /// Current view centre.
    pub fn center(&self) -> (f64, f64) {
        self.center
    }

    /// Current zoom level.
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Change the zoom kept across recentres.
    pub fn set_zoom(&mut self, zoom: u8) {
        self.zoom = zoom;
    }

    /// Number of peer markers shown.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Reconcile peer markers against an ordered snapshot.
    pub fn reconcile(&mut self, records: &[LocationRecord]) -> Vec<MarkerOp> {
        let mut ops = Vec::new();

        let stale: Vec<String> = self
            .peers
            .keys()
            .filter(|name| !records.iter().any(|r| &r.user_name == *name))
            .cloned()
            .collect();
        for name in stale {
            self.peers.remove(&name);
            ops.push(MarkerOp::Remove {
                id: MarkerId::Peer(name),
            });
        }

        for record in records {
            let position = (record.lat, record.lon);
            let popup = peer_popup(&record.user_name, record.lat, record.lon);
            match self.peers.insert(record.user_name.clone(), position) {
                Some(previous) if previous == position => {}
                Some(_) => ops.push(MarkerOp::Move {
                    id: MarkerId::Peer(record.user_name.clone()),
                    lat: record.lat,
                    lon: record.lon,
                    popup,
                }),
                None => ops.push(MarkerOp::Add {
                    id: MarkerId::Peer(record.user_name.clone()),
                    lat: record.lat,
                    lon: record.lon,
                    popup,
                }),
            }
        }

        if let Some(latest) = records.last() {
            let target = (latest.lat, latest.lon);
            if target != self.center {
                self.center = target;
                ops.push(MarkerOp::Recenter {
                    lat: latest.lat,
                    lon: latest.lon,
                    zoom: self.zoom,
                });
            }
        }

        ops
    }

    /// Show, move or hide the local user's marker.
    pub fn set_current_user(&mut self, location: Option<(f64, f64, &str)>) -> Option<MarkerOp> {
        match (location, self.current_user) {
            (Some((lat, lon, user_name)), None) => {
                self.current_user = Some((lat, lon));
                Some(MarkerOp::Add {
                    id: MarkerId::CurrentUser,
                    lat,
                    lon,
                    popup: current_user_popup(user_name, lat, lon),
                })
            }
            (Some((lat, lon, user_name)), Some(_)) => {
                self.current_user = Some((lat, lon));
                Some(MarkerOp::Move {
                    id: MarkerId::CurrentUser,
                    lat,
                    lon,
                    popup: current_user_popup(user_name, lat, lon),
                })
            }
            (None, Some(_)) => {
                self.current_user = None;
                Some(MarkerOp::Remove {
                    id: MarkerId::CurrentUser,
                })
            }
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn record(name: &str, lat: f64, lon: f64) -> LocationRecord {
        LocationRecord::new(name, lat, lon)
    }

    #[test]
    fn test_popup_format() {
        assert_eq!(peer_popup("Demo User 1", 25.7617, 90.3649), "Demo User 1: 25.761700, 90.364900");
        assert_eq!(current_user_popup("me", 1.0, -2.5), "me (You): 1.000000, -2.500000");
    }

    #[test]
    fn test_first_snapshot_adds_markers_and_recenters_on_latest() {
        let mut layer = MarkerLayer::new();
        let ops = layer.reconcile(&[record("a", 1.0, 2.0), record("b", 3.0, 4.0)]);

        assert_eq!(ops.len(), 3);
        assert!(matches!(&ops[0], MarkerOp::Add { id: MarkerId::Peer(n), .. } if n == "a"));
        assert!(matches!(&ops[1], MarkerOp::Add { id: MarkerId::Peer(n), .. } if n == "b"));
        assert_eq!(
            ops[2],
            MarkerOp::Recenter {
                lat: 3.0,
                lon: 4.0,
                zoom: DEFAULT_MAP_ZOOM
            }
        );
        assert_eq!(layer.center(), (3.0, 4.0));
    }

    #[test]
    fn test_unchanged_snapshot_produces_no_ops() {
        let mut layer = MarkerLayer::new();
        let snapshot = [record("a", 1.0, 2.0)];
        layer.reconcile(&snapshot);

        assert!(layer.reconcile(&snapshot).is_empty());
    }

    #[test]
    fn test_moved_and_removed_markers() {
        let mut layer = MarkerLayer::new();
        layer.reconcile(&[record("a", 1.0, 2.0), record("b", 3.0, 4.0)]);

        let ops = layer.reconcile(&[record("a", 5.0, 6.0)]);

        assert_eq!(
            ops,
            vec![
                MarkerOp::Remove {
                    id: MarkerId::Peer("b".into())
                },
                MarkerOp::Move {
                    id: MarkerId::Peer("a".into()),
                    lat: 5.0,
                    lon: 6.0,
                    popup: "a: 5.000000, 6.000000".into(),
                },
                MarkerOp::Recenter {
                    lat: 5.0,
                    lon: 6.0,
                    zoom: DEFAULT_MAP_ZOOM
                },
            ]
        );
        assert_eq!(layer.peer_count(), 1);
    }

    #[test]
    fn test_recenter_keeps_user_zoom() {
        let mut layer = MarkerLayer::new();
        layer.set_zoom(9);
        let ops = layer.reconcile(&[record("a", 1.0, 2.0)]);
        assert!(ops.contains(&MarkerOp::Recenter {
            lat: 1.0,
            lon: 2.0,
            zoom: 9
        }));
    }

    #[test]
    fn test_current_user_marker_lifecycle() {
        let mut layer = MarkerLayer::new();
        assert!(layer.set_current_user(None).is_none());

        let add = layer.set_current_user(Some((1.0, 2.0, "me"))).unwrap();
        assert!(matches!(add, MarkerOp::Add { id: MarkerId::CurrentUser, .. }));

        let moved = layer.set_current_user(Some((3.0, 4.0, "me"))).unwrap();
        assert_eq!(
            moved,
            MarkerOp::Move {
                id: MarkerId::CurrentUser,
                lat: 3.0,
                lon: 4.0,
                popup: "me (You): 3.000000, 4.000000".into(),
            }
        );

        // Peer reconciliation never removes the local user's marker.
        let ops = layer.reconcile(&[]);
        assert!(ops.is_empty());

        let removed = layer.set_current_user(None).unwrap();
        assert_eq!(removed, MarkerOp::Remove { id: MarkerId::CurrentUser });
    }

    #[test]
    fn test_click_forwards_to_handler() {
        let clicks = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&clicks);
        let layer = MarkerLayer::new().with_click_handler(Box::new(move |lat, lon| {
            sink.lock().unwrap().push((lat, lon));
        }));

        layer.click(25.7, 90.4);

        assert_eq!(*clicks.lock().unwrap(), vec![(25.7, 90.4)]);
    }

    #[test]
    fn test_default_view() {
        let layer = MarkerLayer::default();
        assert_eq!(layer.center(), DEFAULT_MAP_CENTER);
        assert_eq!(layer.zoom(), 13);
    }
}
