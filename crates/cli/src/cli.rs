//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CARLA Capture - synchronized multi-camera dataset capture for CARLA
#[derive(Parser, Debug)]
#[command(
    name = "carla-capture",
    author,
    version,
    about = "Synchronized multi-camera dataset capture for CARLA",
    long_about = "Drives a CARLA world in fixed-step synchronous mode, attaches camera rigs \n\
                  to an autopilot ego vehicle among traffic and pedestrians, and writes one \n\
                  image per camera for every recorded step."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "CARLA_CAPTURE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "CARLA_CAPTURE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a capture
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Show the camera rig plan and output layout without connecting
    Info(InfoArgs),
}

/// Configuration source and per-run overrides
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Configuration file (TOML or JSON); built-in defaults when omitted
    #[arg(short, long, env = "CARLA_CAPTURE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Map to load
    #[arg(long, env = "CARLA_TOWN")]
    pub town: Option<String>,

    /// Simulator host
    #[arg(long, env = "CARLA_HOST")]
    pub host: Option<String>,

    /// Simulator port
    #[arg(long, env = "CARLA_PORT")]
    pub port: Option<u16>,

    /// Weather preset: 0 ClearNoon, 1 Default, 2 CloudyNoon, 3 ClearSunset
    #[arg(long, env = "CARLA_WEATHER_ID")]
    pub weather_id: Option<u8>,

    /// Camera group to attach ("all" or a group name)
    #[arg(long, env = "CARLA_CAMERA_GROUP")]
    pub camera_group: Option<String>,

    /// Test split: different seed, output root gets a `_test` suffix
    #[arg(long)]
    pub test_mode: bool,

    /// Number of frames to record
    #[arg(long, env = "CARLA_CAPTURE_SAMPLES")]
    pub samples: Option<u64>,

    /// Output root directory
    #[arg(short, long, env = "CARLA_CAPTURE_OUTPUT")]
    pub output: Option<PathBuf>,
}

/// Arguments for the `run` command
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Prometheus metrics port (disabled when omitted)
    #[arg(long, env = "CARLA_CAPTURE_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// List every camera with its output directory
    #[arg(long)]
    pub sensors: bool,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
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
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}
