//! `generate` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use contracts::{Frame, StreamerConfig};
use ingestion::{FakeTelemetry, FRAME_INTERVAL_MS};

use crate::cli::GenerateArgs;
use crate::settings::load_config;
use crate::shutdown::shutdown_signal;

/// Where generated frames go
enum FrameOutput {
    Stdout,
    #[cfg(feature = "redis")]
    Redis(ingestion::RedisPublisher),
}

impl FrameOutput {
    async fn emit(&mut self, frame: &Frame) -> Result<()> {
        match self {
            Self::Stdout => {
                let line = serde_json::to_string(frame).context("Failed to encode frame")?;
                println!("{}", line);
            }
            #[cfg(feature = "redis")]
            Self::Redis(publisher) => {
                publisher
                    .publish(frame)
                    .await
                    .context("Failed to publish frame")?;
            }
        }
        Ok(())
    }
}

/// Execute the `generate` command
pub async fn run_generate(args: &GenerateArgs) -> Result<()> {
    if args.fast && args.count == 0 {
        anyhow::bail!("--fast needs a frame count (--count)");
    }

    let mut output = open_output(args).await?;
    let mut telemetry = match args.start_ms {
        Some(start_ms) => FakeTelemetry::new(start_ms),
        None => FakeTelemetry::starting_now(),
    };

    let mut ticker = tokio::time::interval(Duration::from_millis(FRAME_INTERVAL_MS as u64));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut emitted = 0u64;
    while args.count == 0 || emitted < args.count {
        if !args.fast {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping generator...");
                    break;
                }
            }
        }

        output.emit(&telemetry.next_frame()).await?;
        emitted += 1;
    }

    info!(emitted, "Generator finished");
    Ok(())
}

async fn open_output(args: &GenerateArgs) -> Result<FrameOutput> {
    if args.stdout {
        return Ok(FrameOutput::Stdout);
    }

    let config = load_config(args.config.as_deref(), &args.overrides)
        .context("Failed to load configuration")?;

    connect_publisher(&config).await
}

#[cfg(feature = "redis")]
async fn connect_publisher(config: &StreamerConfig) -> Result<FrameOutput> {
    let publisher = ingestion::RedisPublisher::connect(&config.stream)
        .await
        .with_context(|| format!("Failed to connect to {}", config.stream.url))?;
    info!(stream = %config.stream.key, "Publishing synthetic frames");
    Ok(FrameOutput::Redis(publisher))
}

#[cfg(not(feature = "redis"))]
async fn connect_publisher(_config: &StreamerConfig) -> Result<FrameOutput> {
    Err(crate::error::CliError::missing_feature("redis", "use --stdout to print frames instead").into())
}
