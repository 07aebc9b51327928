/**
 * MQTT TRANSPORT - State feed and start_stop calls over the broker
 *
 * ROLE:
 * Binds the transport-agnostic core to rumqttc: one event loop task that
 * feeds `<base>/state` publishes to the monitor and `start_stop` replies to
 * the request/reply channel.
 *
 * OPERATION:
 * - ConnAck: (re)subscribe the reply topic and the current feed
 * - Publish on the reply topic: complete the pending call
 * - Publish on any other topic: decode as a state message, ingest if it
 *   matches the current feed
 * - Connection errors: counted in HealthTracker, retried after 2s
 */

use crate::config::MonitorConfig;
use crate::health::HealthTracker;
use async_trait::async_trait;
use fleetwatch_core::{
    ChannelError, FeedTopic, FleetMonitor, Publisher, RequestReplyChannel, TopicError,
};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tracing::{debug, error, info, warn};

pub type MqttCommandChannel = RequestReplyChannel<MqttPublisher>;

/// rumqttc client as a core `Publisher`.
#[derive(Clone)]
pub struct MqttPublisher(pub AsyncClient);

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ChannelError> {
        self.0
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| {
                debug!("publish to {topic} failed: {e:?}");
                ChannelError::Unreachable(topic.to_string())
            })
    }
}

pub fn reply_topic(client_id: &str) -> String {
    format!("fleetwatch/{client_id}/start_stop/reply")
}

pub fn create_mqtt_client(cfg: &MonitorConfig, client_id: &str) -> (AsyncClient, EventLoop) {
    let mut opts = MqttOptions::new(client_id, &cfg.mqtt.host, cfg.mqtt.port);
    opts.set_keep_alive(Duration::from_secs(cfg.mqtt.keep_alive_secs));
    AsyncClient::new(opts, 10)
}

/// Routes one incoming publish. Returns true when it changed monitor state.
pub fn route_publish<P: Publisher>(
    topic: &str,
    payload: &[u8],
    monitor: &FleetMonitor,
    channel: &RequestReplyChannel<P>,
) -> bool {
    if topic == channel.reply_to() {
        channel.handle_payload(payload);
        return false;
    }

    match monitor.handle_state_payload(topic, payload) {
        Ok(true) => true,
        Ok(false) => {
            debug!("ignoring message on {topic}: not the current feed");
            false
        }
        Err(e) => {
            warn!("invalid state message on {topic}: {e}");
            false
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error(transparent)]
    Topic(#[from] TopicError),
    #[error("could not subscribe to {0}")]
    Subscribe(String),
}

/// Moves the broker subscription along with the monitor's feed.
///
/// Switches run one at a time so that each unsubscribe matches the
/// subscription it replaces.
pub struct FeedSwitcher {
    client: AsyncClient,
    lock: tokio::sync::Mutex<()>,
}

impl FeedSwitcher {
    pub fn new(client: AsyncClient) -> Self {
        Self {
            client,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Selects `topic` on the monitor, then unsubscribes the old feed and
    /// subscribes the new one. A failed subscribe leaves no feed selected.
    pub async fn switch(
        &self,
        monitor: &FleetMonitor,
        topic: &str,
    ) -> Result<Option<FeedTopic>, FeedError> {
        let _guard = self.lock.lock().await;
        let change = monitor.replace_feed(topic);

        if let Some(old) = &change.previous {
            if let Err(e) = self.client.unsubscribe(old.topic()).await {
                warn!("unsubscribe {} failed: {e:?}", old.topic());
            }
        }

        let Some(feed) = change.selected? else {
            return Ok(None);
        };
        if let Err(e) = self.client.subscribe(feed.topic(), QoS::AtMostOnce).await {
            error!("subscribe {} failed: {e:?}", feed.topic());
            monitor.replace_feed("");
            return Err(FeedError::Subscribe(feed.topic().to_string()));
        }
        Ok(Some(feed))
    }
}

pub fn spawn_mqtt_listener(
    client: AsyncClient,
    mut eventloop: EventLoop,
    monitor: Arc<FleetMonitor>,
    channel: Arc<MqttCommandChannel>,
    health: HealthTracker,
) {
    task::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("connected to MQTT broker");
                    health.mark_mqtt_connected();
                    if let Err(e) = client.try_subscribe(channel.reply_to(), QoS::AtLeastOnce) {
                        error!("subscribe {} failed: {e:?}", channel.reply_to());
                    }
                    if let Some(feed) = monitor.feed() {
                        if let Err(e) = client.try_subscribe(feed.topic(), QoS::AtMostOnce) {
                            error!("subscribe {} failed: {e:?}", feed.topic());
                        }
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    route_publish(&p.topic, &p.payload, &monitor, &*channel);
                }
                Ok(Event::Incoming(Incoming::Disconnect)) => {
                    warn!("broker closed the connection");
                    health.mark_mqtt_disconnected();
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT error: {e:?}");
                    health.increment_reconnects();
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetwatch_core::{CommandDispatcher, StatusTracker};
    use fleetwatch_devkit::{FleetMessageBuilder, MockMqttClient, StubResponder};

    fn monitor() -> FleetMonitor {
        FleetMonitor::new(
            Arc::new(StatusTracker::new()),
            CommandDispatcher::new(Arc::new(StubResponder::new())),
        )
    }

    #[test]
    fn test_reply_topic() {
        assert_eq!(reply_topic("panel-1"), "fleetwatch/panel-1/start_stop/reply");
    }

    #[test]
    fn test_route_state_message() {
        let monitor = monitor();
        let channel = RequestReplyChannel::new(MockMqttClient::new(), reply_topic("m"));
        monitor.select_feed("robot/rosmon/state").unwrap();

        let payload = FleetMessageBuilder::new()
            .node("/robot", "lidar", FleetMessageBuilder::RUNNING)
            .node("/robot", "camera", FleetMessageBuilder::CRASHED)
            .to_vec();

        assert!(route_publish("robot/rosmon/state", &payload, &monitor, &channel));
        assert_eq!(monitor.tracker().len(), 2);

        // other feeds and garbage leave the table alone
        assert!(!route_publish("other/state", &payload, &monitor, &channel));
        assert!(!route_publish("robot/rosmon/state", b"{oops", &monitor, &channel));
        assert_eq!(monitor.tracker().len(), 2);
    }

    #[tokio::test]
    async fn test_route_reply_completes_call() {
        let monitor = monitor();
        let mqtt = MockMqttClient::new();
        let channel = Arc::new(RequestReplyChannel::new(mqtt.clone(), reply_topic("m")));
        let node = fleetwatch_core::NodeIdentity::new("/robot", "lidar");

        let dispatcher = CommandDispatcher::new(channel.clone());
        let call = tokio::spawn(async move {
            dispatcher.send("robot/rosmon", &node, fleetwatch_core::NodeAction::Stop).await
        });

        let request_id = mqtt
            .wait_for_request("robot/rosmon/start_stop", Duration::from_secs(1))
            .await
            .expect("request published");
        let reply = FleetMessageBuilder::reply(&request_id, true);
        route_publish(&reply_topic("m"), &reply, &monitor, &*channel);

        assert!(call.await.unwrap());
    }

    #[tokio::test]
    async fn test_switch_moves_subscription() {
        let monitor = monitor();
        let (client, _eventloop) = create_mqtt_client(&MonitorConfig::default(), "switch-test");
        let feeds = FeedSwitcher::new(client);

        let feed = feeds.switch(&monitor, "robot/state").await.unwrap();
        assert_eq!(feed.map(|f| f.base_address().to_string()), Some("robot".into()));

        let err = feeds.switch(&monitor, "robot/#/state").await.unwrap_err();
        assert!(matches!(err, FeedError::Topic(TopicError::Wildcard(_))));
        assert_eq!(monitor.feed(), None);

        assert_eq!(feeds.switch(&monitor, "").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_subscribe_clears_feed() {
        let monitor = monitor();
        let (client, eventloop) = create_mqtt_client(&MonitorConfig::default(), "switch-test");
        // no event loop left to take the request
        drop(eventloop);
        let feeds = FeedSwitcher::new(client);

        let err = feeds.switch(&monitor, "robot/state").await.unwrap_err();
        assert!(matches!(err, FeedError::Subscribe(ref t) if t == "robot/state"));
        assert_eq!(monitor.feed(), None);
        assert!(!monitor.tracker().has_data());
    }
}
