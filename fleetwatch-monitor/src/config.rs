use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MonitorConfig {
    pub mqtt: MqttConf,
    /// `<base>/state` topic to follow at startup
    pub feed_topic: Option<String>,
    pub freshness_secs: u64,
    pub command_timeout_secs: u64,
    pub http_bind: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    /// generated when absent so that two monitors never share reply topics
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: None,
            keep_alive_secs: 15,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConf::default(),
            feed_topic: None,
            freshness_secs: 5,
            command_timeout_secs: 5,
            http_bind: "0.0.0.0:8080".into(),
        }
    }
}

impl MqttConf {
    pub fn client_id(&self) -> String {
        self.client_id.clone().unwrap_or_else(|| {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            format!("fleetwatch-monitor-{}", &suffix[..8])
        })
    }
}

impl MonitorConfig {
    /// Freshness threshold; values beyond `i64` seconds saturate.
    pub fn freshness(&self) -> time::Duration {
        time::Duration::seconds(i64::try_from(self.freshness_secs).unwrap_or(i64::MAX))
    }
}

pub fn parse_config(txt: &str) -> MonitorConfig {
    if txt.trim().is_empty() {
        return MonitorConfig::default();
    }
    serde_yaml::from_str(txt).unwrap_or_else(|e| {
        warn!("invalid config: {e}");
        MonitorConfig::default()
    })
}

pub async fn load_config() -> MonitorConfig {
    let path = std::env::var("FLEETWATCH_CONFIG").unwrap_or_else(|_| "fleetwatch.yaml".into());
    if Path::new(&path).exists() {
        match fs::read_to_string(&path).await {
            Ok(txt) => parse_config(&txt),
            Err(e) => {
                warn!("cannot read {path}: {e}, using default config");
                MonitorConfig::default()
            }
        }
    } else {
        warn!("no {path}, using default config");
        MonitorConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg = parse_config(
            "mqtt:\n  host: broker.lan\nfeed_topic: robot/rosmon/state\nfreshness_secs: 10\n",
        );
        assert_eq!(cfg.mqtt.host, "broker.lan");
        assert_eq!(cfg.mqtt.port, 1883);
        assert_eq!(cfg.feed_topic.as_deref(), Some("robot/rosmon/state"));
        assert_eq!(cfg.freshness_secs, 10);
        assert_eq!(cfg.command_timeout_secs, 5);
    }

    #[test]
    fn test_invalid_yaml_falls_back() {
        let cfg = parse_config("mqtt: [not, a, map]");
        assert_eq!(cfg.mqtt.host, "localhost");
        assert!(parse_config("   ").feed_topic.is_none());
    }

    #[test]
    fn test_client_id() {
        let mut mqtt = MqttConf::default();
        assert!(mqtt.client_id().starts_with("fleetwatch-monitor-"));
        mqtt.client_id = Some("panel-1".into());
        assert_eq!(mqtt.client_id(), "panel-1");
    }

    #[test]
    fn test_freshness_saturates() {
        assert_eq!(MonitorConfig::default().freshness(), time::Duration::seconds(5));
        let cfg = parse_config(&format!("freshness_secs: {}\n", u64::MAX));
        assert_eq!(cfg.freshness(), time::Duration::seconds(i64::MAX));
        assert!(cfg.freshness().is_positive());
    }

    #[tokio::test]
    async fn test_unreadable_config_falls_back() {
        // a directory exists but cannot be read as a file
        let dir = std::env::temp_dir();
        std::env::set_var("FLEETWATCH_CONFIG", &dir);
        let cfg = load_config().await;
        std::env::remove_var("FLEETWATCH_CONFIG");
        assert_eq!(cfg.mqtt.host, "localhost");
        assert_eq!(cfg.freshness_secs, 5);
    }
}
