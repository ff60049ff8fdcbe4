//! Command implementations.

mod info;
mod run;
mod validate;

pub use info::run_info;
pub use run::run_capture;
pub use validate::run_validate;

use anyhow::{Context, Result};
use config_loader::ConfigLoader;
use contracts::{CameraSelection, CaptureConfig, RunMode};
use tracing::info;

use crate::cli::ConfigArgs;

/// Load the configuration file (or the defaults) and apply CLI overrides.
///
/// Validation runs after the overrides, so an override can't sneak past it.
pub(crate) fn load_config(args: &ConfigArgs) -> Result<CaptureConfig> {
    let mut config = match &args.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            info!(config = %path.display(), "Loading configuration");
            ConfigLoader::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => {
            info!("No configuration file, using defaults");
            CaptureConfig::default()
        }
    };

    apply_overrides(&mut config, args);
    ConfigLoader::validate(&config).context("Invalid configuration")?;
    Ok(config)
}

fn apply_overrides(config: &mut CaptureConfig, args: &ConfigArgs) {
    if let Some(town) = &args.town {
        info!(town = %town, "Overriding town from CLI");
        config.simulator.town = town.clone();
    }
    if let Some(host) = &args.host {
        info!(host = %host, "Overriding simulator host from CLI");
        config.simulator.host = host.clone();
    }
    if let Some(port) = args.port {
        info!(port, "Overriding simulator port from CLI");
        config.simulator.port = port;
    }
    if let Some(weather_id) = args.weather_id {
        config.weather_id = weather_id;
    }
    if let Some(group) = &args.camera_group {
        config.camera_group = CameraSelection::parse(group);
    }
    if args.test_mode {
        config.mode = RunMode::Test;
    }
    if let Some(samples) = args.samples {
        config.capture.samples = samples;
    }
    if let Some(output) = &args.output {
        config.output.root = output.clone();
    }
}
