//! Payloads exchanged with the supervisor.
//!
//! The state feed and the `start_stop` call are fixed contracts owned by the
//! supervisor; this module only decodes/encodes them as JSON.

use crate::dispatcher::NodeAction;
use crate::models::{FleetSnapshot, NodeIdentity, NodeLifecycle, NodeRecord};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown node state code {code} for {node}")]
    UnknownState { node: String, code: u8 },
}

/// Supervisor state codes.
pub mod state_code {
    pub const IDLE: u8 = 0;
    pub const RUNNING: u8 = 1;
    pub const CRASHED: u8 = 2;
    pub const WAITING: u8 = 3;
}

impl TryFrom<u8> for NodeLifecycle {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            state_code::IDLE => Ok(Self::Idle),
            state_code::RUNNING => Ok(Self::Running),
            state_code::CRASHED => Ok(Self::Crashed),
            state_code::WAITING => Ok(Self::Waiting),
            other => Err(other),
        }
    }
}

impl From<NodeLifecycle> for u8 {
    fn from(state: NodeLifecycle) -> Self {
        match state {
            NodeLifecycle::Idle => state_code::IDLE,
            NodeLifecycle::Running => state_code::RUNNING,
            NodeLifecycle::Crashed => state_code::CRASHED,
            NodeLifecycle::Waiting => state_code::WAITING,
        }
    }
}

/// One message of the `.../state` feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMessage {
    #[serde(with = "time::serde::rfc3339")]
    pub stamp: OffsetDateTime,
    pub nodes: Vec<NodeStateMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStateMessage {
    pub ns: String,
    pub name: String,
    pub state: u8,
    pub restart_count: u32,
    pub user_load: f64,
    pub system_load: f64,
    /// bytes
    pub memory: u64,
}

impl StateMessage {
    pub fn from_slice(payload: &[u8]) -> Result<Self, MessageError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Converts the message into a snapshot, rejecting unknown state codes.
    pub fn into_snapshot(self) -> Result<FleetSnapshot, MessageError> {
        let nodes = self
            .nodes
            .into_iter()
            .map(NodeStateMessage::into_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FleetSnapshot::new(self.stamp, nodes))
    }
}

impl NodeStateMessage {
    fn into_record(self) -> Result<NodeRecord, MessageError> {
        let identity = NodeIdentity::new(self.ns, self.name);
        let state = NodeLifecycle::try_from(self.state).map_err(|code| MessageError::UnknownState {
            node: identity.full_name(),
            code,
        })?;
        Ok(NodeRecord::new(
            identity,
            state,
            self.restart_count,
            self.user_load,
            self.system_load,
            self.memory,
        ))
    }
}

/// Body of the `start_stop` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartStopRequest {
    pub action: NodeAction,
    pub node: String,
    pub ns: String,
}

impl StartStopRequest {
    pub fn new(node: &NodeIdentity, action: NodeAction) -> Self {
        Self {
            action,
            node: node.name.clone(),
            ns: node.namespace.clone(),
        }
    }
}

/// `start_stop` request as carried over publish/subscribe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub request_id: String,
    pub reply_to: String,
    #[serde(flatten)]
    pub request: StartStopRequest,
}

/// Acknowledgement published on `reply_to`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandReply {
    pub request_id: String,
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATE_JSON: &str = r#"{
        "stamp": "2024-05-01T12:00:00Z",
        "nodes": [
            {"ns": "/robot", "name": "lidar", "state": 2, "restart_count": 4,
             "user_load": 0.1, "system_load": 0.05, "memory": 1048576},
            {"ns": "/robot", "name": "camera", "state": 1, "restart_count": 0,
             "user_load": 0.5, "system_load": 0.25, "memory": 0}
        ]
    }"#;

    #[test]
    fn test_decode_state_message() {
        let snapshot = StateMessage::from_slice(STATE_JSON.as_bytes())
            .unwrap()
            .into_snapshot()
            .unwrap();

        assert_eq!(snapshot.stamp.unix_timestamp(), 1_714_564_800);
        assert_eq!(snapshot.nodes.len(), 2);
        let lidar = &snapshot.nodes[0];
        assert_eq!(lidar.full_name(), "/robot/lidar");
        assert_eq!(lidar.state, NodeLifecycle::Crashed);
        assert_eq!(lidar.restart_count, 4);
        assert_eq!(lidar.memory, "1.00 MiB");
        assert_eq!(snapshot.nodes[1].state, NodeLifecycle::Running);
        assert_eq!(snapshot.nodes[1].cpu_load, 0.75);
    }

    #[test]
    fn test_unknown_state_code_is_rejected() {
        let json = r#"{"stamp": "2024-05-01T12:00:00Z", "nodes": [
            {"ns": "/a", "name": "b", "state": 9, "restart_count": 0,
             "user_load": 0.0, "system_load": 0.0, "memory": 0}]}"#;
        let err = StateMessage::from_slice(json.as_bytes())
            .unwrap()
            .into_snapshot()
            .unwrap_err();
        assert!(matches!(err, MessageError::UnknownState { code: 9, .. }));
    }

    #[test]
    fn test_garbage_payload() {
        assert!(matches!(
            StateMessage::from_slice(b"not json"),
            Err(MessageError::Json(_))
        ));
    }

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = CommandEnvelope {
            request_id: "r1".into(),
            reply_to: "fleetwatch/replies".into(),
            request: StartStopRequest::new(&NodeIdentity::new("/robot", "lidar"), NodeAction::Restart),
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "request_id": "r1",
                "reply_to": "fleetwatch/replies",
                "action": 3,
                "node": "lidar",
                "ns": "/robot"
            })
        );
    }
}
