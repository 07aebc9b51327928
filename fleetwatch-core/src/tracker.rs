/**
 * STATUS TRACKER - Latest known state of every node in the fleet
 *
 * ROLE:
 * Keeps the most recent snapshot received on the state feed as a table
 * sorted by full name, plus the snapshot stamp used for freshness.
 *
 * OPERATION:
 * - The feed listener calls `ingest` whenever a snapshot arrives
 * - Readers (HTTP handlers, panel) call `records` / `view` at any time
 * - A snapshot replaces the whole table: nodes missing from it are dropped
 *
 * CONCURRENCY:
 * The retained table is an immutable `FleetView` behind an `Arc`. `ingest`
 * sorts the new table outside the lock and swaps the `Arc` in a single
 * write, so a reader holds either the old table or the new one.
 */

use crate::models::{FleetSnapshot, NodeRecord};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

pub const DEFAULT_FRESHNESS: Duration = Duration::seconds(5);

/// Immutable result of one ingest.
#[derive(Debug, Clone, Default)]
pub struct FleetView {
    records: Vec<NodeRecord>,
    stamp: Option<OffsetDateTime>,
}

impl FleetView {
    pub fn records(&self) -> &[NodeRecord] {
        &self.records
    }

    /// `None` until the first snapshot (or after a reset).
    pub fn stamp(&self) -> Option<OffsetDateTime> {
        self.stamp
    }

    pub fn has_data(&self) -> bool {
        self.stamp.is_some()
    }

    pub fn is_fresh_within(&self, now: OffsetDateTime, threshold: Duration) -> bool {
        match self.stamp {
            Some(stamp) => now - stamp <= threshold,
            None => false,
        }
    }

    /// Looks a node up by full name.
    pub fn get(&self, full_name: &str) -> Option<&NodeRecord> {
        self.records
            .binary_search_by(|r| r.full_name().cmp(full_name))
            .ok()
            .map(|i| &self.records[i])
    }
}

pub struct StatusTracker {
    current: RwLock<Arc<FleetView>>,
    threshold: Duration,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_FRESHNESS)
    }

    pub fn with_threshold(threshold: Duration) -> Self {
        Self {
            current: RwLock::new(Arc::new(FleetView::default())),
            threshold,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Forgets every record and the stamp.
    pub fn reset(&self) {
        *self.current.write() = Arc::new(FleetView::default());
    }

    /// Replaces the retained table with `snapshot`.
    ///
    /// When two nodes share a full name the later one in the snapshot wins.
    pub fn ingest(&self, snapshot: FleetSnapshot) {
        let received = snapshot.nodes.len();
        let mut by_name: BTreeMap<String, NodeRecord> = BTreeMap::new();
        for record in snapshot.nodes {
            if let Some(previous) = by_name.insert(record.full_name().to_string(), record) {
                warn!(
                    "duplicate node '{}' in snapshot, keeping the last entry",
                    previous.full_name()
                );
            }
        }

        let view = FleetView {
            records: by_name.into_values().collect(),
            stamp: Some(snapshot.stamp),
        };
        debug!("ingested snapshot: {} nodes ({} received)", view.records.len(), received);

        *self.current.write() = Arc::new(view);
    }

    pub fn has_data(&self) -> bool {
        self.current.read().has_data()
    }

    pub fn is_fresh(&self, now: OffsetDateTime) -> bool {
        self.is_fresh_within(now, self.threshold)
    }

    pub fn is_fresh_within(&self, now: OffsetDateTime, threshold: Duration) -> bool {
        self.current.read().is_fresh_within(now, threshold)
    }

    /// Sorted records of the latest snapshot.
    pub fn records(&self) -> Vec<NodeRecord> {
        self.view().records().to_vec()
    }

    /// Records and stamp taken from the same snapshot.
    pub fn view(&self) -> Arc<FleetView> {
        self.current.read().clone()
    }

    pub fn len(&self) -> usize {
        self.current.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type SharedStatusTracker = Arc<StatusTracker>;
