//! `run` command implementation.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use contracts::{StreamerConfig, TelemetrySink, TelemetryStream};
use ingestion::{spawn_feeder, FakeTelemetry, MemoryStream};
use session_engine::Streamer;

use crate::cli::RunArgs;
use crate::settings::load_config;
use crate::shutdown::shutdown_signal;

/// Execute the `run` command
pub async fn run_streamer(args: &RunArgs) -> Result<()> {
    let config = load_config(args.config.as_deref(), &args.overrides)
        .context("Failed to load configuration")?;

    info!(
        stream = %config.stream.key,
        group = %config.stream.group,
        consumer = %config.stream.consumer,
        device_id = %config.session.device_id,
        sinks = config.sinks.len(),
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)
            .context("Failed to start metrics exporter")?;
    }

    let sink = dispatcher::create_dispatcher(&config.sinks).context("Failed to create sinks")?;
    let max_iterations = (args.max_iterations != 0).then_some(args.max_iterations);

    // Setup graceful shutdown handler
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let signal_tx = Arc::clone(&shutdown_tx);
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Received shutdown signal, stopping streamer...");
        signal_tx.send_replace(true);
    });

    #[cfg(feature = "redis")]
    if !args.mock {
        let stream = ingestion::RedisStream::connect(&config.stream)
            .await
            .with_context(|| format!("Failed to connect to {}", config.stream.url))?;
        return drive(config, stream, sink, shutdown_rx, max_iterations).await;
    }

    #[cfg(not(feature = "redis"))]
    if !args.mock {
        info!("Built without Redis support, running in mock mode");
    }

    info!("Mock mode: in-memory stream fed with synthetic telemetry");
    let stream = MemoryStream::new(config.stream.key.clone());
    let feeder = spawn_feeder(
        stream.clone(),
        config.stream.payload_field.clone(),
        FakeTelemetry::starting_now(),
        shutdown_rx.clone(),
    );

    let result = drive(config, stream, sink, shutdown_rx, max_iterations).await;

    shutdown_tx.send_replace(true);
    match feeder.await {
        Ok(published) => info!(published, "Synthetic feeder finished"),
        Err(e) => warn!(error = %e, "Synthetic feeder task failed"),
    }
    result
}

/// Start the streamer, run it to completion and print its statistics
async fn drive<S, K>(
    config: StreamerConfig,
    stream: S,
    sink: K,
    shutdown: watch::Receiver<bool>,
    max_iterations: Option<u64>,
) -> Result<()>
where
    S: TelemetryStream,
    K: TelemetrySink,
{
    let mut streamer = Streamer::new(config, stream, sink);
    streamer.start().await.context("Failed to start streamer")?;

    info!("Starting streamer...");
    let result = streamer.run(shutdown, max_iterations).await;

    println!("\n{}", streamer.stats().summary());
    result.context("Streamer execution failed")?;

    info!("CAN Streamer finished");
    Ok(())
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &StreamerConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Stream:");
    println!("  URL: {}", config.stream.url);
    println!("  Key: {}", config.stream.key);
    println!(
        "  Group/consumer: {}/{}",
        config.stream.group, config.stream.consumer
    );
    println!(
        "  Batch: {} entries, block {} ms",
        config.stream.batch_size, config.stream.block_ms
    );

    println!("\nActivity:");
    println!(
        "  {} > {} or {} > 0",
        config.activity.speed_field, config.activity.min_speed, config.activity.rpm_field
    );
    println!("  Timestamp field: {}", config.activity.timestamp_field);

    println!("\nSession:");
    println!("  Device: {}", config.session.device_id);
    println!("  Pre-roll: {}s", config.session.pre_roll_seconds);
    println!("  Grace: {}s", config.session.inactive_grace_seconds);

    if config.sinks.is_empty() {
        println!("\nSinks: none configured, logging deliveries");
    } else {
        println!("\nSinks ({}):", config.sinks.len());
        for sink in &config.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!();
}
