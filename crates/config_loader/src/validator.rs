//! Configuration validation
//!
//! Rules:
//! - stream key / group / consumer / payload field are non-empty
//! - batch_size > 0
//! - pre-roll and grace seconds are finite and >= 0
//! - min_speed is finite, activity field names are non-empty
//! - device_id is non-empty
//! - sink names are non-empty and unique, required sink params are present

use std::collections::HashSet;

use contracts::{ContractError, SinkType, StreamerConfig};

/// Validate a StreamerConfig
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &StreamerConfig) -> Result<(), ContractError> {
    validate_stream(config)?;
    validate_activity(config)?;
    validate_session(config)?;
    validate_sinks(config)?;
    Ok(())
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ContractError> {
    if value.trim().is_empty() {
        return Err(ContractError::config_validation(field, "cannot be empty"));
    }
    Ok(())
}

fn require_non_negative(field: &str, value: f64) -> Result<(), ContractError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ContractError::config_validation(
            field,
            format!("must be a finite number >= 0, got {value}"),
        ));
    }
    Ok(())
}

fn validate_stream(config: &StreamerConfig) -> Result<(), ContractError> {
    let stream = &config.stream;
    require_non_empty("stream.key", &stream.key)?;
    require_non_empty("stream.group", &stream.group)?;
    require_non_empty("stream.consumer", &stream.consumer)?;
    require_non_empty("stream.payload_field", &stream.payload_field)?;

    if stream.batch_size == 0 {
        return Err(ContractError::config_validation(
            "stream.batch_size",
            "batch_size must be > 0",
        ));
    }
    Ok(())
}

fn validate_activity(config: &StreamerConfig) -> Result<(), ContractError> {
    let activity = &config.activity;
    require_non_empty("activity.speed_field", &activity.speed_field)?;
    require_non_empty("activity.rpm_field", &activity.rpm_field)?;
    require_non_empty("activity.timestamp_field", &activity.timestamp_field)?;

    if !activity.min_speed.is_finite() {
        return Err(ContractError::config_validation(
            "activity.min_speed",
            format!("min_speed must be finite, got {}", activity.min_speed),
        ));
    }
    Ok(())
}

fn validate_session(config: &StreamerConfig) -> Result<(), ContractError> {
    let session = &config.session;
    require_non_empty("session.device_id", &session.device_id)?;
    require_non_negative("session.pre_roll_seconds", session.pre_roll_seconds)?;
    require_non_negative(
        "session.inactive_grace_seconds",
        session.inactive_grace_seconds,
    )?;
    Ok(())
}

fn validate_sinks(config: &StreamerConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in config.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }

        let required: &[&str] = match sink.sink_type {
            SinkType::Log => &[],
            SinkType::File => &["base_path"],
            SinkType::Http => &["url"],
        };
        for param in required {
            if !sink.params.contains_key(*param) {
                return Err(ContractError::config_validation(
                    format!("sinks[{}].params.{}", sink.name, param),
                    format!("{:?} sink requires '{}'", sink.sink_type, param),
                ));
            }
        }
    }
    Ok(())
}
