//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::StreamerConfig;

use crate::cli::InfoArgs;
use crate::settings::load_config;

/// Effective configuration for JSON output
#[derive(Serialize)]
struct ConfigInfo<'a> {
    version: &'static str,
    redis_support: bool,
    #[serde(flatten)]
    config: &'a StreamerConfig,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!("Loading configuration info");

    let config = load_config(args.config.as_deref(), &args.overrides)
        .context("Failed to load configuration")?;

    if args.json {
        let info = ConfigInfo {
            version: env!("CARGO_PKG_VERSION"),
            redis_support: cfg!(feature = "redis"),
            config: &config,
        };
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config, args);
    }

    Ok(())
}

fn print_config_info(config: &StreamerConfig, args: &InfoArgs) {
    println!("\n=== CAN Streamer ===\n");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "Redis support: {}",
        if cfg!(feature = "redis") { "yes" } else { "no (mock mode only)" }
    );

    println!("\nStream:");
    println!("  URL: {}", config.stream.url);
    println!("  Key: {}", config.stream.key);
    println!("  Group: {}", config.stream.group);
    println!("  Consumer: {}", config.stream.consumer);
    println!("  Payload field: {}", config.stream.payload_field);
    println!("  Batch size: {}", config.stream.batch_size);
    println!("  Block: {} ms, idle sleep: {} ms", config.stream.block_ms, config.stream.idle_sleep_ms);

    println!("\nActivity:");
    println!("  Speed field: {} (active above {} m/s)", config.activity.speed_field, config.activity.min_speed);
    println!("  RPM field: {} (active above 0)", config.activity.rpm_field);
    println!("  Timestamp field: {}", config.activity.timestamp_field);

    println!("\nSession:");
    println!("  Device id: {}", config.session.device_id);
    println!("  Pre-roll: {}s", config.session.pre_roll_seconds);
    println!("  Inactive grace: {}s", config.session.inactive_grace_seconds);
    println!(
        "  Trailing inactive frames: {}",
        if config.session.forward_trailing_inactive { "forwarded" } else { "dropped" }
    );

    if args.sinks {
        println!("\nSinks ({}):", config.sinks.len());
        if config.sinks.is_empty() {
            println!("  - log (default)");
        }
        for sink in &config.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
            let mut params: Vec<_> = sink.params.iter().collect();
            params.sort();
            for (key, value) in params {
                println!("      {} = {}", key, value);
            }
        }
    }

    println!();
}
