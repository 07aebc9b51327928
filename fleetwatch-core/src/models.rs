use crate::format::formatted_data_size;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Precision used for the memory column.
pub const MEMORY_PRECISION: usize = 2;

/// Namespace + name of a supervised node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub namespace: String,
    pub name: String,
}

impl NodeIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key used for ordering and uniqueness: `namespace/name`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Lifecycle state reported by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeLifecycle {
    Running,
    Idle,
    Crashed,
    Waiting,
}

/// Row background color, RGBA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba(pub u8, pub u8, pub u8, pub u8);

impl NodeLifecycle {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Idle => "IDLE",
            Self::Crashed => "CRASHED",
            Self::Waiting => "WAITING",
        }
    }

    /// `None` keeps the default row background.
    pub fn color(&self) -> Option<Rgba> {
        match self {
            Self::Running => None,
            Self::Idle => Some(Rgba(128, 128, 128, 128)),
            Self::Crashed => Some(Rgba(255, 0, 0, 255)),
            Self::Waiting => Some(Rgba(128, 255, 255, 255)),
        }
    }
}

impl std::fmt::Display for NodeLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Latest known state of one node. Replaced wholesale on every snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRecord {
    identity: NodeIdentity,
    full_name: String,
    pub state: NodeLifecycle,
    pub restart_count: u32,
    /// user + system load
    pub cpu_load: f64,
    pub memory_bytes: u64,
    pub memory: String,
}

impl NodeRecord {
    pub fn new(
        identity: NodeIdentity,
        state: NodeLifecycle,
        restart_count: u32,
        user_load: f64,
        system_load: f64,
        memory_bytes: u64,
    ) -> Self {
        let full_name = identity.full_name();
        Self {
            identity,
            full_name,
            state,
            restart_count,
            cpu_load: user_load + system_load,
            memory_bytes,
            memory: formatted_data_size(memory_bytes, MEMORY_PRECISION),
        }
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }
}

/// One full report of the fleet. Consumed by [`crate::tracker::StatusTracker::ingest`].
#[derive(Debug, Clone)]
pub struct FleetSnapshot {
    pub stamp: OffsetDateTime,
    pub nodes: Vec<NodeRecord>,
}

impl FleetSnapshot {
    pub fn new(stamp: OffsetDateTime, nodes: Vec<NodeRecord>) -> Self {
        Self { stamp, nodes }
    }
}
