//! Headless fleet panel: feed selection, table view and node commands.
//!
//! This is what a UI host drives. It owns no transport; the host feeds it
//! payloads from the selected topic and gives it a [`CommandDispatcher`].

use crate::channel::ChannelError;
use crate::dispatcher::{CommandDispatcher, NodeAction};
use crate::messages::{MessageError, StateMessage};
use crate::models::{FleetSnapshot, NodeIdentity, NodeRecord, Rgba};
use crate::topic::{FeedTopic, TopicError};
use crate::tracker::SharedStatusTracker;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("no state feed selected")]
    NoFeed,
    #[error("no state message received yet")]
    NoData,
    #[error("node data is stale")]
    Stale,
    #[error("node {0} is not in the table")]
    UnknownNode(String),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Outcome of a feed switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedChange {
    pub previous: Option<FeedTopic>,
    pub selected: Result<Option<FeedTopic>, TopicError>,
}

/// Settings a host persists between sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelSettings {
    pub topic: String,
}

/// One display row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRow {
    pub full_name: String,
    pub namespace: String,
    pub name: String,
    pub state: &'static str,
    pub color: Option<Rgba>,
    pub restart_count: u32,
    pub cpu_load: String,
    pub memory: String,
}

impl From<&NodeRecord> for NodeRow {
    fn from(record: &NodeRecord) -> Self {
        Self {
            full_name: record.full_name().to_string(),
            namespace: record.identity().namespace.clone(),
            name: record.identity().name.clone(),
            state: record.state.label(),
            color: record.state.color(),
            restart_count: record.restart_count,
            cpu_load: format!("{:.2}", record.cpu_load),
            memory: record.memory.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FleetTable {
    /// Nothing received on the current feed yet.
    NoMessage,
    Live {
        /// false once the data is stale; the table stays visible but read-only
        interactive: bool,
        #[serde(with = "time::serde::rfc3339")]
        stamp: OffsetDateTime,
        rows: Vec<NodeRow>,
    },
}

pub struct FleetMonitor {
    tracker: SharedStatusTracker,
    dispatcher: CommandDispatcher,
    feed: Mutex<Option<FeedTopic>>,
}

impl FleetMonitor {
    pub fn new(tracker: SharedStatusTracker, dispatcher: CommandDispatcher) -> Self {
        Self {
            tracker,
            dispatcher,
            feed: Mutex::new(None),
        }
    }

    pub fn tracker(&self) -> &SharedStatusTracker {
        &self.tracker
    }

    /// Switches to `topic`. The table is cleared whatever the outcome;
    /// an empty topic unsubscribes.
    pub fn select_feed(&self, topic: &str) -> Result<Option<FeedTopic>, TopicError> {
        self.replace_feed(topic).selected
    }

    /// Same as [`select_feed`](Self::select_feed), also returning the feed it
    /// replaced. Both are read under one lock.
    pub fn replace_feed(&self, topic: &str) -> FeedChange {
        let mut feed = self.feed.lock();
        let previous = feed.take();
        self.tracker.reset();

        if topic.is_empty() {
            info!("state feed cleared");
            return FeedChange {
                previous,
                selected: Ok(None),
            };
        }

        let selected = FeedTopic::parse(topic).inspect_err(|e| error!("{e}"));
        if let Ok(parsed) = &selected {
            info!(
                "state feed set to {} (commands via {})",
                parsed.topic(),
                parsed.base_address()
            );
            *feed = Some(parsed.clone());
        }
        FeedChange {
            previous,
            selected: selected.map(Some),
        }
    }

    pub fn feed(&self) -> Option<FeedTopic> {
        self.feed.lock().clone()
    }

    pub fn base_address(&self) -> Option<String> {
        self.feed.lock().as_ref().map(|f| f.base_address().to_string())
    }

    /// Ingests `snapshot` if it came from the current feed.
    ///
    /// Holding the feed lock keeps a late message from an old feed out of a
    /// table that was just reset.
    pub fn ingest_from(&self, topic: &str, snapshot: FleetSnapshot) -> bool {
        let feed = self.feed.lock();
        match feed.as_ref() {
            Some(current) if current.topic() == topic => {
                self.tracker.ingest(snapshot);
                true
            }
            _ => false,
        }
    }

    /// Decodes a raw feed payload and ingests it.
    pub fn handle_state_payload(&self, topic: &str, payload: &[u8]) -> Result<bool, MessageError> {
        let snapshot = StateMessage::from_slice(payload)?.into_snapshot()?;
        Ok(self.ingest_from(topic, snapshot))
    }

    pub fn table(&self, now: OffsetDateTime) -> FleetTable {
        let view = self.tracker.view();
        match view.stamp() {
            None => FleetTable::NoMessage,
            Some(stamp) => FleetTable::Live {
                interactive: view.is_fresh_within(now, self.tracker.threshold()),
                stamp,
                rows: view.records().iter().map(NodeRow::from).collect(),
            },
        }
    }

    /// Sends `action` for a node shown in the table.
    ///
    /// Like the table's context menu, this needs a received message that is
    /// still fresh at `now` and a row for `node`.
    pub async fn send_command(
        &self,
        node: &NodeIdentity,
        action: NodeAction,
        now: OffsetDateTime,
    ) -> Result<(), CommandError> {
        // feed and table read together; ingest and feed switches hold the same lock
        let (base, view) = {
            let feed = self.feed.lock();
            let base = feed.as_ref().map(|f| f.base_address().to_string());
            (base.ok_or(CommandError::NoFeed)?, self.tracker.view())
        };

        if !view.has_data() {
            return Err(CommandError::NoData);
        }
        if !view.is_fresh_within(now, self.tracker.threshold()) {
            return Err(CommandError::Stale);
        }
        let full_name = node.full_name();
        if view.get(&full_name).is_none() {
            return Err(CommandError::UnknownNode(full_name));
        }

        self.dispatcher.try_send(&base, node, action).await?;
        Ok(())
    }

    pub fn settings(&self) -> PanelSettings {
        PanelSettings {
            topic: self.feed().map(|f| f.topic().to_string()).unwrap_or_default(),
        }
    }

    pub fn restore(&self, settings: &PanelSettings) -> Result<Option<FeedTopic>, TopicError> {
        self.select_feed(&settings.topic)
    }
}
