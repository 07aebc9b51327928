/*!
Mock MQTT publisher for tests without a broker.

Records every publication so tests can assert on `start_stop` requests, and
builds the payloads the supervisor would send back.
*/

use anyhow::Result;
use async_trait::async_trait;
use fleetwatch_core::messages::{state_code, CommandEnvelope};
use fleetwatch_core::{ChannelError, Publisher};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Stands in for the rumqttc client behind a `RequestReplyChannel`.
#[derive(Clone, Default)]
pub struct MockMqttClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    offline: Arc<AtomicBool>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every publish fails with `ChannelError::Unreachable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().clone()
    }

    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    pub fn get_last_json_message<T>(&self, topic: &str) -> Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        match self.find_messages_by_topic(topic).last() {
            Some(msg) => Ok(Some(serde_json::from_slice(&msg.payload)?)),
            None => Ok(None),
        }
    }

    /// Polls until a `start_stop` envelope shows up on `topic`, returning its request id.
    pub async fn wait_for_request(&self, topic: &str, timeout: Duration) -> Option<String> {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if let Ok(Some(envelope)) = self.get_last_json_message::<CommandEnvelope>(topic) {
                return Some(envelope.request_id);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }

    pub fn clear(&self) {
        self.published_messages.lock().clear();
    }
}

#[async_trait]
impl Publisher for MockMqttClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ChannelError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ChannelError::Unreachable(topic.to_string()));
        }
        debug!("[mock] published to {topic}: {} bytes", payload.len());
        self.published_messages.lock().push(MockMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }
}

/// Builds `.../state` feed payloads and `start_stop` replies.
pub struct FleetMessageBuilder {
    stamp: OffsetDateTime,
    nodes: Vec<Value>,
}

impl Default for FleetMessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetMessageBuilder {
    pub const IDLE: u8 = state_code::IDLE;
    pub const RUNNING: u8 = state_code::RUNNING;
    pub const CRASHED: u8 = state_code::CRASHED;
    pub const WAITING: u8 = state_code::WAITING;

    /// Message stamped now.
    pub fn new() -> Self {
        Self {
            stamp: OffsetDateTime::now_utc(),
            nodes: Vec::new(),
        }
    }

    pub fn at(mut self, stamp: OffsetDateTime) -> Self {
        self.stamp = stamp;
        self
    }

    /// Node with zero load and memory.
    pub fn node(self, ns: &str, name: &str, state: u8) -> Self {
        self.node_with(ns, name, state, 0, 0.0, 0.0, 0)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn node_with(
        mut self,
        ns: &str,
        name: &str,
        state: u8,
        restart_count: u32,
        user_load: f64,
        system_load: f64,
        memory: u64,
    ) -> Self {
        self.nodes.push(serde_json::json!({
            "ns": ns,
            "name": name,
            "state": state,
            "restart_count": restart_count,
            "user_load": user_load,
            "system_load": system_load,
            "memory": memory,
        }));
        self
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "stamp": self.stamp.format(&Rfc3339).unwrap_or_default(),
            "nodes": self.nodes,
        })
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.to_json().to_string().into_bytes()
    }

    /// Supervisor acknowledgement for `request_id`.
    pub fn reply(request_id: &str, success: bool) -> Vec<u8> {
        serde_json::json!({ "request_id": request_id, "success": success })
            .to_string()
            .into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetwatch_core::StateMessage;
    use time::macros::datetime;

    #[tokio::test]
    async fn test_mock_client_records_and_fails_offline() {
        let client = MockMqttClient::new();
        client.publish("robot/start_stop", b"{}".to_vec()).await.unwrap();
        assert_eq!(client.find_messages_by_topic("robot/start_stop").len(), 1);

        client.set_offline(true);
        let err = client.publish("robot/start_stop", b"{}".to_vec()).await.unwrap_err();
        assert_eq!(err, ChannelError::Unreachable("robot/start_stop".into()));
        assert_eq!(client.get_published_messages().len(), 1);

        client.clear();
        assert!(client.get_published_messages().is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_request_times_out() {
        let client = MockMqttClient::new();
        client.publish("robot/start_stop", b"not an envelope".to_vec()).await.unwrap();
        assert_eq!(
            client.wait_for_request("robot/start_stop", Duration::from_millis(30)).await,
            None
        );
    }

    #[test]
    fn test_state_builder_decodes() {
        let payload = FleetMessageBuilder::new()
            .at(datetime!(2024-05-01 12:00 UTC))
            .node("/robot", "lidar", FleetMessageBuilder::WAITING)
            .node_with("/robot", "camera", FleetMessageBuilder::RUNNING, 3, 0.5, 0.25, 2048)
            .to_vec();

        let msg = StateMessage::from_slice(&payload).unwrap();
        assert_eq!(msg.stamp, datetime!(2024-05-01 12:00 UTC));
        assert_eq!(msg.nodes.len(), 2);
        assert_eq!(msg.nodes[1].restart_count, 3);
        assert_eq!(msg.nodes[1].memory, 2048);
    }
}
