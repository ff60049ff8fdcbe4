//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::CaptureConfig;
use serde::Serialize;
use tracing::info;

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
    version: String,
    town: String,
    weather_id: u8,
    camera_group: String,
    camera_count: usize,
    total_steps: u64,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    let config_path = args
        .config
        .config
        .as_ref()
        .map_or_else(|| "<defaults>".to_string(), |p| p.display().to_string());
    info!(config = %config_path, "Validating configuration");

    let result = match super::load_config(&args.config) {
        Ok(config) => valid_result(config_path, &config),
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("{e:#}")),
            warnings: None,
            summary: None,
        },
    };

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

fn valid_result(config_path: String, config: &CaptureConfig) -> ValidationResult {
    let warnings = collect_warnings(config);
    let camera_count = config.selected_rigs().map(|r| r.camera_count()).sum();
    let capture = &config.capture;

    ValidationResult {
        valid: true,
        config_path,
        error: None,
        warnings: (!warnings.is_empty()).then_some(warnings),
        summary: Some(ConfigSummary {
            version: format!("{:?}", config.version),
            town: config.simulator.town.clone(),
            weather_id: config.weather_id,
            camera_group: config.camera_group.to_string(),
            camera_count,
            total_steps: capture.offset + capture.samples * capture.stride,
            sink_count: config.sinks.len(),
        }),
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &CaptureConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.sinks.is_empty() {
        warnings.push("No sinks configured - recorded frames go nowhere".to_string());
    }

    if config.capture.samples == 0 {
        warnings.push("capture.samples is 0 - only warm-up steps will run".to_string());
    }

    // 每个 step 的等待预算小于一个仿真步长时几乎一定超时
    if config.capture.step_timeout_s < config.capture.fixed_delta_seconds() {
        warnings.push(format!(
            "capture.step_timeout_s ({}) is shorter than one simulation step ({:.4}s)",
            config.capture.step_timeout_s,
            config.capture.fixed_delta_seconds()
        ));
    }

    if config.population.pedestrians > 0 && config.population.vehicles == 0 {
        warnings.push("pedestrians without traffic - the ego vehicle drives alone".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Town: {}", summary.town);
            println!("  Weather: {}", summary.weather_id);
            println!("  Camera group: {}", summary.camera_group);
            println!("  Cameras: {}", summary.camera_count);
            println!("  Steps: {}", summary.total_steps);
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
