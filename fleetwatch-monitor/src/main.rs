/**
 * FLEETWATCH MONITOR - Entry point
 *
 * ROLE: Wires config, the MQTT feed listener, the start_stop command channel
 * and the REST API around one `FleetMonitor`.
 */

mod config;
mod health;
mod http;
mod mqtt;

use crate::config::load_config;
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::mqtt::{FeedSwitcher, MqttPublisher};
use anyhow::Context;
use fleetwatch_core::{CommandDispatcher, FleetMonitor, RequestReplyChannel, StatusTracker};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = load_config().await;
    let client_id = cfg.mqtt.client_id();
    info!("starting as {client_id}, broker {}:{}", cfg.mqtt.host, cfg.mqtt.port);

    let tracker = Arc::new(StatusTracker::with_threshold(cfg.freshness()));
    let (mqtt_client, eventloop) = mqtt::create_mqtt_client(&cfg, &client_id);

    let channel = Arc::new(
        RequestReplyChannel::new(MqttPublisher(mqtt_client.clone()), mqtt::reply_topic(&client_id))
            .with_timeout(Duration::from_secs(cfg.command_timeout_secs)),
    );
    let dispatcher = CommandDispatcher::new(channel.clone());
    let monitor = Arc::new(FleetMonitor::new(tracker, dispatcher));

    // the listener subscribes the selected feed on ConnAck
    if let Some(topic) = &cfg.feed_topic {
        if let Err(e) = monitor.select_feed(topic) {
            warn!("ignoring configured feed: {e}");
        }
    }

    let health = HealthTracker::new();
    mqtt::spawn_mqtt_listener(
        mqtt_client.clone(),
        eventloop,
        monitor.clone(),
        channel,
        health.clone(),
    );

    let app = http::build_router(AppState {
        monitor,
        health,
        feeds: Arc::new(FeedSwitcher::new(mqtt_client)),
    });

    let listener = TcpListener::bind(&cfg.http_bind)
        .await
        .with_context(|| format!("binding {}", cfg.http_bind))?;
    info!("listening on http://{}", cfg.http_bind);
    axum::serve(listener, app).await.context("http server")?;
    Ok(())
}
