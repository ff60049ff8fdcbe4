//! Mock Capture Demo
//!
//! Wires the capture chain by hand against the in-process mock simulator:
//! world -> camera rig -> step synchronizer -> capture scheduler -> image sink.
//! No CARLA server required.
//!
//! Run with: cargo run -p capture_demos --bin mock_capture [config.toml]

use std::path::Path;
use std::time::Duration;

use actor_factory::{ActorFactory, MockConfig, MockSimulator, SimulatorClient};
use anyhow::Context;
use config_loader::ConfigLoader;
use contracts::{CaptureConfig, RigSpec};
use dispatcher::{create_dispatcher, FrameSink};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sync_engine::{CaptureScheduler, StepSynchronizer};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init()?;

    tracing::info!("Starting Mock Capture Demo");

    // ==== Stage 1: Use default config or load from file ====
    let config = match std::env::args().nth(1) {
        Some(path) => {
            tracing::info!(path = %path, "Loading capture config");
            ConfigLoader::load_from_path(Path::new(&path))?
        }
        None => demo_config(),
    };

    // ==== Stage 2: Connect and populate the mock world ====
    let mut sim = MockSimulator::with_config(MockConfig {
        delivery_delay: Duration::from_millis(2),
        max_jitter: Duration::from_millis(5),
        ..Default::default()
    });
    sim.connect(&config.simulator.host, config.simulator.port, Duration::from_secs(1))
        .await?;
    sim.load_world(&config.simulator.town).await?;

    let factory = ActorFactory::new(sim.clone());
    let mut rng = StdRng::seed_from_u64(config.seed());
    let (graph, rig) = factory.spawn_world(&config, &mut rng).await?;
    tracing::info!(cameras = rig.len(), actors = graph.actor_count(), "World ready");

    // ==== Stage 3: Sinks and synchronous mode ====
    let mut sink = create_dispatcher(&config, rig.slots.clone())?;
    let sources = rig.sources(&sim)?;
    let mut sync = StepSynchronizer::enter(sim.clone(), sources, config.capture.fps).await?;

    // ==== Stage 4: Capture ====
    let result = CaptureScheduler::from_settings(&config.capture)
        .run(&mut sync, &mut sink, &CancellationToken::new())
        .await;

    // ==== Stage 5: Cleanup, whatever happened ====
    sync.exit().await?;
    sink.close().await?;
    factory.teardown(&graph).await?;

    let report = result.context("capture failed")?;
    println!("\n{}", report.summary);
    println!(
        "Recorded {} frames into {}",
        report.frames_recorded,
        config.output_layout().run_dir().display()
    );

    Ok(())
}

/// Small rig and short run so the demo finishes in seconds
fn demo_config() -> CaptureConfig {
    let mut config = CaptureConfig::default();
    config.output.root = std::env::temp_dir().join("carla_capture_demo");
    config.rigs.truncate(1);
    config.rigs = config
        .rigs
        .into_iter()
        .map(|rig| RigSpec {
            x_locs: rig.x_locs[..2].to_vec(),
            y_locs: rig.y_locs[..2].to_vec(),
            z_locs: rig.z_locs[..2].to_vec(),
            ..rig
        })
        .collect();
    config.camera.image_width = 160;
    config.camera.image_height = 120;
    config.capture.samples = 10;
    config.capture.stride = 5;
    config.capture.offset = 20;
    config.capture.progress_every = 10;
    config.population.vehicles = 20;
    config.population.pedestrians = 20;
    config
}
