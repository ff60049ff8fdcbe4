//! Real CARLA Capture Demo
//!
//! Runs a short capture against a live CARLA server through the same
//! orchestrator the CLI uses.
//!
//! Run with: cargo run -p capture_demos --bin real_carla_capture --features real-carla -- [config.toml]

use std::path::Path;

use actor_factory::RealCarlaClient;
use carla_capture_cli::Pipeline;
use config_loader::ConfigLoader;
use contracts::CaptureConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init()?;

    let config = match std::env::args().nth(1) {
        Some(path) => ConfigLoader::load_from_path(Path::new(&path))?,
        None => {
            let mut config = CaptureConfig::default();
            config.capture.samples = 20;
            config.population.vehicles = 30;
            config.population.pedestrians = 30;
            config
        }
    };

    tracing::info!(
        host = %config.simulator.host,
        port = config.simulator.port,
        town = %config.simulator.town,
        "Connecting to CARLA"
    );

    let pipeline = Pipeline::new(config, RealCarlaClient::new());
    let token = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl+C, stopping after the current step");
            token.cancel();
        }
    });

    let stats = pipeline.run().await?;
    stats.print_summary();
    Ok(())
}
