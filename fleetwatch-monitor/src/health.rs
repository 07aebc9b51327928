use fleetwatch_core::FleetMonitor;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;

#[derive(Debug, Serialize, Deserialize)]
pub struct MonitorHealth {
    pub uptime_seconds: u64,
    pub mqtt_status: String,
    pub mqtt_reconnects: u32,
    pub feed_topic: Option<String>,
    pub nodes_tracked: u32,
    pub has_data: bool,
    pub fresh: bool,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    mqtt_reconnects: Arc<AtomicU32>,
    mqtt_status: Arc<Mutex<String>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            mqtt_reconnects: Arc::new(AtomicU32::new(0)),
            mqtt_status: Arc::new(Mutex::new("connecting".to_string())),
        }
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = "connected".to_string();
    }

    pub fn mark_mqtt_disconnected(&self) {
        *self.mqtt_status.lock() = "disconnected".to_string();
    }

    pub fn increment_reconnects(&self) {
        self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.mqtt_status.lock() = "reconnecting".to_string();
    }

    pub fn get_health(&self, monitor: &FleetMonitor, now: OffsetDateTime) -> MonitorHealth {
        let tracker = monitor.tracker();
        let view = tracker.view();

        MonitorHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            mqtt_status: self.mqtt_status.lock().clone(),
            mqtt_reconnects: self.mqtt_reconnects.load(Ordering::Relaxed),
            feed_topic: monitor.feed().map(|f| f.topic().to_string()),
            nodes_tracked: view.records().len() as u32,
            has_data: view.has_data(),
            fresh: view.is_fresh_within(now, tracker.threshold()),
        }
    }
}
