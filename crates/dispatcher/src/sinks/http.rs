//! HttpSink - POSTs deliveries as JSON arrays with retries

use contracts::{ContractError, OutgoingRecord, TelemetrySink};
use reqwest::header::CONTENT_TYPE;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Header carrying the delivery's partition key
pub const PARTITION_KEY_HEADER: &str = "x-partition-key";

/// Configuration for HttpSink
#[derive(Debug, Clone, PartialEq)]
pub struct HttpSinkConfig {
    /// Endpoint receiving the POST
    pub url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Total attempts per delivery (at least 1)
    pub max_retries: u32,
    /// Delay before the second attempt; doubles afterwards
    pub initial_backoff: Duration,
    /// Upper bound for the delay between attempts
    pub max_backoff: Duration,
}

impl HttpSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let url = params
            .get("url")
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| "missing 'url' parameter".to_string())?
            .clone();

        let millis = |key: &str, default: u64| -> Result<Duration, String> {
            match params.get(key) {
                Some(raw) => raw
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|e| format!("invalid '{}' value '{}': {}", key, raw, e)),
                None => Ok(Duration::from_millis(default)),
            }
        };

        let max_retries = match params.get("max_retries") {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|e| format!("invalid 'max_retries' value '{}': {}", raw, e))?,
            None => 3,
        };

        Ok(Self {
            url,
            timeout: millis("timeout_ms", 5_000)?,
            max_retries: max_retries.max(1),
            initial_backoff: millis("initial_backoff_ms", 200)?,
            max_backoff: millis("max_backoff_ms", 5_000)?,
        })
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Sink that POSTs each delivery unit to an HTTP endpoint
pub struct HttpSink {
    name: String,
    config: HttpSinkConfig,
    client: reqwest::Client,
}

impl HttpSink {
    /// Create a new HttpSink
    pub fn new(name: impl Into<String>, config: HttpSinkConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            name: name.into(),
            config,
            client,
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, String> {
        let config = HttpSinkConfig::from_params(params)?;
        Self::new(name, config).map_err(|e| e.to_string())
    }

    pub fn config(&self) -> &HttpSinkConfig {
        &self.config
    }

    async fn post_once(&self, body: &[u8], partition_key: &str) -> Result<(), String> {
        let response = self
            .client
            .post(&self.config.url)
            .header(CONTENT_TYPE, "application/json")
            .header(PARTITION_KEY_HEADER, partition_key)
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("unexpected status {}", status))
        }
    }
}

impl TelemetrySink for HttpSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "http_sink_send",
        skip(self, records),
        fields(sink = %self.name, records = records.len())
    )]
    async fn send(
        &mut self,
        records: &[OutgoingRecord],
        partition_key: &str,
    ) -> Result<(), ContractError> {
        if records.is_empty() {
            return Ok(());
        }

        let body = serde_json::to_vec(records)
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;

        let mut attempt = 1;
        loop {
            match self.post_once(&body, partition_key).await {
                Ok(()) => {
                    debug!(attempt, "Delivery accepted");
                    return Ok(());
                }
                Err(message) if attempt < self.config.max_retries => {
                    let delay = self.config.backoff_after(attempt);
                    warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "HTTP delivery failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(message) => {
                    error!(attempt, error = %message, "HTTP delivery failed, giving up");
                    return Err(ContractError::sink_write(
                        &self.name,
                        format!("{} after {} attempts", message, attempt),
                    ));
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(sink = %self.name, "HttpSink closed");
        Ok(())
    }
}
