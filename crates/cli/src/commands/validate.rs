//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{SinkType, StreamerConfig};

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    stream_key: String,
    consumer_group: String,
    device_id: String,
    pre_roll_seconds: f64,
    inactive_grace_seconds: f64,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    stream_key: config.stream.key.clone(),
                    consumer_group: config.stream.group.clone(),
                    device_id: config.session.device_id.clone(),
                    pre_roll_seconds: config.session.pre_roll_seconds,
                    inactive_grace_seconds: config.session.inactive_grace_seconds,
                    sink_count: config.sinks.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &StreamerConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.sinks.is_empty() {
        warnings.push("No sinks configured - deliveries will only be logged".to_string());
    } else if config.sinks.iter().all(|s| s.sink_type == SinkType::Log) {
        warnings.push("Only log sinks configured - no data leaves this process".to_string());
    }

    if config.session.pre_roll_seconds == 0.0 {
        warnings.push("session.pre_roll_seconds is 0 - sessions start without lead-in".to_string());
    }

    if config.session.inactive_grace_seconds == 0.0 {
        warnings.push(
            "session.inactive_grace_seconds is 0 - every pause ends the session".to_string(),
        );
    }

    if config.activity.min_speed <= 0.0 {
        warnings.push(format!(
            "activity.min_speed is {} - any non-zero speed starts a session",
            config.activity.min_speed
        ));
    }

    if config.stream.block_ms == 0 {
        warnings.push("stream.block_ms is 0 - the loop polls without blocking".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Stream: {}", summary.stream_key);
            println!("  Group: {}", summary.consumer_group);
            println!("  Device: {}", summary.device_id);
            println!("  Pre-roll: {}s", summary.pre_roll_seconds);
            println!("  Grace: {}s", summary.inactive_grace_seconds);
            println!("  Sinks: {}", summary.sink_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
