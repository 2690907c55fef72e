//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CAN Streamer - drive-session detection for vehicle telemetry streams
#[derive(Parser, Debug)]
#[command(
    name = "can-streamer",
    author,
    version,
    about = "Drive-session detection for CAN telemetry streams",
    long_about = "Consumes decoded CAN frames from a Redis stream consumer group, detects \n\
                  drive sessions from speed and RPM, and forwards each session with \n\
                  pre-roll context and start/stop boundary events to the configured sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "CAN_STREAMER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "CAN_STREAMER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the streamer until interrupted
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display the effective configuration
    Info(InfoArgs),

    /// Produce synthetic telemetry frames
    Generate(GenerateArgs),
}

/// Configuration overrides, named after the streamer's environment variables
#[derive(Args, Debug, Clone, Default)]
pub struct OverrideArgs {
    /// Redis connection URL
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Stream key to consume
    #[arg(long, env = "REDIS_STREAM_KEY")]
    pub stream_key: Option<String>,

    /// Consumer group name
    #[arg(long, env = "REDIS_CONSUMER_GROUP")]
    pub consumer_group: Option<String>,

    /// Consumer name within the group
    #[arg(long, env = "REDIS_CONSUMER_NAME")]
    pub consumer_name: Option<String>,

    /// Seconds of lead-in forwarded when a drive starts
    #[arg(long, env = "PRE_ROLL_SECONDS")]
    pub pre_roll_seconds: Option<f64>,

    /// Seconds of inactivity before a drive ends
    #[arg(long, env = "INACTIVE_GRACE_SECONDS")]
    pub inactive_grace_seconds: Option<f64>,

    /// Speed above which the vehicle counts as moving (m/s)
    #[arg(long, env = "MIN_SPEED_MPS")]
    pub min_speed: Option<f64>,

    /// Frame field holding the speed
    #[arg(long, env = "SPEED_FIELD")]
    pub speed_field: Option<String>,

    /// Frame field holding the engine RPM
    #[arg(long, env = "RPM_FIELD")]
    pub rpm_field: Option<String>,

    /// Frame field holding the timestamp (ms since epoch)
    #[arg(long, env = "TS_FIELD")]
    pub ts_field: Option<String>,

    /// Device identifier used in session ids
    #[arg(long, env = "PI_ID")]
    pub device_id: Option<String>,
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); defaults apply when omitted
    #[arg(short, long, env = "CAN_STREAMER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Stop after this many loop iterations (0 = unlimited)
    #[arg(long, default_value = "0", env = "CAN_STREAMER_MAX_ITERATIONS")]
    pub max_iterations: u64,

    /// Use the in-memory stream with synthetic telemetry instead of Redis
    #[arg(long)]
    pub mock: bool,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9100", env = "CAN_STREAMER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "streamer.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file; defaults apply when omitted
    #[arg(short, long, env = "CAN_STREAMER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
}

/// Arguments for the `generate` command
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Path to configuration file; only the stream settings are used
    #[arg(short, long, env = "CAN_STREAMER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Number of frames to produce (0 = until interrupted)
    #[arg(short = 'n', long, default_value = "0")]
    pub count: u64,

    /// Print frames as NDJSON instead of publishing to Redis
    #[arg(long)]
    pub stdout: bool,

    /// Produce frames as fast as possible instead of at 5 Hz
    #[arg(long)]
    pub fast: bool,

    /// Timestamp to start from (ms since epoch); defaults to now
    #[arg(long)]
    pub start_ms: Option<i64>,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
