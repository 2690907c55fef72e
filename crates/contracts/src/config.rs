//! StreamerConfig - Config Loader output
//!
//! Describes the full streamer configuration: stream transport, activity
//! detection, session policy and output routing. Every field has a default,
//! so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Complete streamer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamerConfig {
    /// Upstream stream settings
    #[serde(default)]
    pub stream: StreamConfig,

    /// Activity classification settings
    #[serde(default)]
    pub activity: ActivityConfig,

    /// Session and pre-roll policy
    #[serde(default)]
    pub session: SessionConfig,

    /// Output routing
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// Upstream stream (consumer group) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Transport URL (e.g. `redis://redis:6379/0`)
    pub url: String,

    /// Stream key
    pub key: String,

    /// Consumer group name
    pub group: String,

    /// Consumer identity within the group
    pub consumer: String,

    /// Field holding a JSON-encoded frame, if the producer wraps frames
    pub payload_field: String,

    /// Max entries per batch
    pub batch_size: usize,

    /// Max time a batch read may block (ms)
    pub block_ms: u64,

    /// Pause after an empty iteration or a failed delivery (ms)
    pub idle_sleep_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "redis://redis:6379/0".to_string(),
            key: "can:frames".to_string(),
            group: "streamer".to_string(),
            consumer: format!("streamer-{}", default_host_name()),
            payload_field: "payload".to_string(),
            batch_size: 100,
            block_ms: 2000,
            idle_sleep_ms: 100,
        }
    }
}

impl StreamConfig {
    /// Batch read timeout
    pub fn block(&self) -> Duration {
        Duration::from_millis(self.block_ms)
    }

    /// Idle pause
    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }
}

/// Activity classification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// Speed field name
    pub speed_field: String,

    /// Engine RPM field name
    pub rpm_field: String,

    /// Timestamp field name (ms since epoch)
    pub timestamp_field: String,

    /// Speed strictly above this counts as active (m/s)
    pub min_speed: f64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            speed_field: "vehicle_speed".to_string(),
            rpm_field: "rpm".to_string(),
            timestamp_field: "ts_ms".to_string(),
            min_speed: 0.5,
        }
    }
}

/// Session policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Stable device identifier, prefix of every session id
    pub device_id: String,

    /// Seconds of lead-in forwarded on drive start
    pub pre_roll_seconds: f64,

    /// Seconds of inactivity tolerated before a drive ends
    pub inactive_grace_seconds: f64,

    /// Forward inactive frames that arrive during the grace period
    pub forward_trailing_inactive: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_id: default_host_name(),
            pre_roll_seconds: 5.0,
            inactive_grace_seconds: 10.0,
            forward_trailing_inactive: false,
        }
    }
}

impl SessionConfig {
    /// Pre-roll horizon in milliseconds, converted once
    pub fn pre_roll_ms(&self) -> i64 {
        (self.pre_roll_seconds * 1000.0) as i64
    }

    /// Grace period as a duration (negative or non-finite values become zero)
    pub fn grace_period(&self) -> Duration {
        Duration::try_from_secs_f64(self.inactive_grace_seconds).unwrap_or(Duration::ZERO)
    }
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl SinkConfig {
    /// A log sink with no parameters
    pub fn log(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sink_type: SinkType::Log,
            params: HashMap::new(),
        }
    }
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log summary via tracing
    Log,
    /// NDJSON files, one per partition key
    File,
    /// HTTP POST with retries
    Http,
}

/// Host name used for default consumer and device ids
pub fn default_host_name() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_streamer_conventions() {
        let config = StreamerConfig::default();
        assert_eq!(config.stream.key, "can:frames");
        assert_eq!(config.stream.group, "streamer");
        assert!(config.stream.consumer.starts_with("streamer-"));
        assert_eq!(config.activity.speed_field, "vehicle_speed");
        assert_eq!(config.activity.rpm_field, "rpm");
        assert_eq!(config.activity.timestamp_field, "ts_ms");
        assert_eq!(config.session.pre_roll_ms(), 5000);
        assert_eq!(config.session.grace_period(), Duration::from_secs(10));
        assert!(!config.session.forward_trailing_inactive);
        assert!(config.sinks.is_empty());
    }

    #[test]
    fn test_fractional_pre_roll() {
        let session = SessionConfig {
            pre_roll_seconds: 2.5,
            ..Default::default()
        };
        assert_eq!(session.pre_roll_ms(), 2500);
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: StreamerConfig =
            serde_json::from_str(r#"{"activity": {"min_speed": 1.5}}"#).unwrap();
        assert_eq!(config.activity.min_speed, 1.5);
        assert_eq!(config.activity.rpm_field, "rpm");
        assert_eq!(config.stream.batch_size, 100);
    }
}
