//! Effective configuration: file (or defaults) plus CLI/env overrides.

use std::path::Path;

use contracts::StreamerConfig;
use tracing::{debug, info};

use crate::cli::OverrideArgs;
use crate::error::{CliError, Result};

/// Load the configuration file, or defaults when no path is given, then apply
/// overrides and validate the result
pub fn load_config(path: Option<&Path>, overrides: &OverrideArgs) -> Result<StreamerConfig> {
    let mut config = match path {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::config_not_found(path.display().to_string()));
            }
            info!(config = %path.display(), "Loading configuration");
            config_loader::ConfigLoader::load_from_path(path)?
        }
        None => {
            info!("No configuration file given, using defaults");
            StreamerConfig::default()
        }
    };

    apply_overrides(&mut config, overrides);
    config_loader::ConfigLoader::validate(&config)?;
    Ok(config)
}

/// Overwrite configuration fields with any override that is set
pub fn apply_overrides(config: &mut StreamerConfig, overrides: &OverrideArgs) {
    fn set<T: Clone>(target: &mut T, value: &Option<T>, name: &str) {
        if let Some(value) = value {
            debug!(field = name, "Applying override");
            *target = value.clone();
        }
    }

    set(&mut config.stream.url, &overrides.redis_url, "stream.url");
    set(&mut config.stream.key, &overrides.stream_key, "stream.key");
    set(&mut config.stream.group, &overrides.consumer_group, "stream.group");
    set(&mut config.stream.consumer, &overrides.consumer_name, "stream.consumer");
    set(
        &mut config.session.pre_roll_seconds,
        &overrides.pre_roll_seconds,
        "session.pre_roll_seconds",
    );
    set(
        &mut config.session.inactive_grace_seconds,
        &overrides.inactive_grace_seconds,
        "session.inactive_grace_seconds",
    );
    set(&mut config.activity.min_speed, &overrides.min_speed, "activity.min_speed");
    set(&mut config.activity.speed_field, &overrides.speed_field, "activity.speed_field");
    set(&mut config.activity.rpm_field, &overrides.rpm_field, "activity.rpm_field");
    set(&mut config.activity.timestamp_field, &overrides.ts_field, "activity.timestamp_field");
    set(&mut config.session.device_id, &overrides.device_id, "session.device_id");
}
