/*!
Test harness for the fleet monitor.

Wires a tracker, a `FleetMonitor` and a `StubResponder` so a test can feed
state messages and send commands in a few lines.
*/

use crate::mqtt_stub::FleetMessageBuilder;
use crate::responder::StubResponder;
use anyhow::{Context, Result};
use fleetwatch_core::{
    CommandDispatcher, FleetMonitor, FleetTable, SharedStatusTracker, StatusTracker,
};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::info;

pub struct TestHarness {
    pub tracker: SharedStatusTracker,
    pub monitor: Arc<FleetMonitor>,
    pub responder: StubResponder,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_responder(StubResponder::new())
    }

    pub fn with_responder(responder: StubResponder) -> Self {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();

        let tracker: SharedStatusTracker = Arc::new(StatusTracker::new());
        let dispatcher = CommandDispatcher::new(Arc::new(responder.clone()));
        let monitor = Arc::new(FleetMonitor::new(tracker.clone(), dispatcher));
        Self {
            tracker,
            monitor,
            responder,
        }
    }

    /// Selects `topic` as the feed, failing on an invalid name.
    pub fn follow(&self, topic: &str) -> Result<()> {
        self.monitor
            .select_feed(topic)
            .with_context(|| format!("selecting feed {topic}"))?;
        Ok(())
    }

    /// Delivers a state message as the transport would. Returns whether it was ingested.
    pub fn deliver(&self, topic: &str, message: &FleetMessageBuilder) -> Result<bool> {
        let ingested = self
            .monitor
            .handle_state_payload(topic, &message.to_vec())
            .with_context(|| format!("decoding state message on {topic}"))?;
        info!("delivered state message on {topic} (ingested: {ingested})");
        Ok(ingested)
    }

    /// Full names of the rows currently displayed, in display order.
    pub fn row_names(&self, now: OffsetDateTime) -> Vec<String> {
        match self.monitor.table(now) {
            FleetTable::NoMessage => Vec::new(),
            FleetTable::Live { rows, .. } => rows.into_iter().map(|r| r.full_name).collect(),
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
