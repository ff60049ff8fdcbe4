//! `run` command implementation.

use anyhow::{Context, Result};
use carla_capture_cli::Pipeline;
use contracts::CaptureConfig;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::RunArgs;

/// Execute the `run` command
pub async fn run_capture(args: &RunArgs) -> Result<()> {
    let config = super::load_config(&args.config)?;

    info!(
        town = %config.simulator.town,
        host = %config.simulator.host,
        port = config.simulator.port,
        weather_id = config.weather_id,
        camera_group = %config.camera_group,
        samples = config.capture.samples,
        output = %config.output_layout().run_dir().display(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    let pipeline = Pipeline::new(config, simulator_client());
    spawn_shutdown_listener(pipeline.cancellation_token());

    info!("Starting capture...");
    let stats = pipeline.run().await.context("Capture failed")?;

    if stats.cancelled {
        warn!(
            frames_recorded = stats.frames_recorded,
            "Capture stopped by shutdown signal"
        );
    } else {
        info!(
            frames_recorded = stats.frames_recorded,
            steps = stats.steps_run,
            duration_secs = stats.duration.as_secs_f64(),
            "Capture completed successfully"
        );
    }
    stats.print_summary();

    info!("CARLA Capture finished");
    Ok(())
}

#[cfg(feature = "real-carla")]
fn simulator_client() -> actor_factory::RealCarlaClient {
    info!("Using real CARLA client");
    actor_factory::RealCarlaClient::new()
}

#[cfg(not(feature = "real-carla"))]
fn simulator_client() -> actor_factory::MockSimulator {
    info!("Running in MOCK mode (no CARLA server required)");
    actor_factory::MockSimulator::new()
}

/// Cancel `token` on Ctrl+C or SIGTERM
fn spawn_shutdown_listener(token: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Received shutdown signal, stopping after the current step...");
        token.cancel();
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &CaptureConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Simulator:");
    println!("  Town: {}", config.simulator.town);
    println!("  CARLA: {}:{}", config.simulator.host, config.simulator.port);
    println!(
        "  Weather: {} ({:?})",
        config.weather_id,
        config.weather()
    );
    println!("  Mode: {:?} (seed {})", config.mode, config.seed());

    let capture = &config.capture;
    println!("\nCapture:");
    println!("  FPS: {}", capture.fps);
    println!(
        "  Samples: {} every {} steps after {} warm-up steps",
        capture.samples, capture.stride, capture.offset
    );
    println!("  Step timeout: {}s", capture.step_timeout_s);

    let rigs: Vec<_> = config.selected_rigs().collect();
    let cameras: usize = rigs.iter().map(|r| r.camera_count()).sum();
    println!("\nCameras ({cameras}):");
    for rig in rigs {
        println!(
            "  - {} ({} positions x {:?})",
            rig.name,
            rig.positions(),
            rig.sensor_types
        );
    }

    println!(
        "\nPopulation: {} vehicles, {} pedestrians",
        config.population.vehicles, config.population.pedestrians
    );

    if !config.sinks.is_empty() {
        println!("\nSinks ({}):", config.sinks.len());
        for sink in &config.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!("\nOutput: {}", config.output_layout().run_dir().display());
    println!();
}
