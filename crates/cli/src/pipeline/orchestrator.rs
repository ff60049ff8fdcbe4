//! Pipeline orchestrator - coordinates all components.
//!
//! Generic over the simulator client; the binary picks the real CARLA client
//! when built with `real-carla` and the in-process mock otherwise.

use std::panic::{resume_unwind, AssertUnwindSafe};
use std::time::Instant;

use actor_factory::{ActorFactory, Rig, SimulatorClient};
use anyhow::{Context, Result};
use contracts::CaptureConfig;
use dispatcher::{create_dispatcher, FrameSink};
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sync_engine::{CaptureReport, CaptureScheduler, StepSynchronizer};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use super::PipelineStats;

/// Main pipeline orchestrator
pub struct Pipeline<C> {
    config: CaptureConfig,
    client: C,
    cancel: CancellationToken,
}

impl<C> Pipeline<C>
where
    C: SimulatorClient + Clone + 'static,
{
    /// `config` must already be validated
    pub fn new(config: CaptureConfig, client: C) -> Self {
        Self {
            config,
            client,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancelling stops the capture between two steps; teardown still runs
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the capture to completion.
    ///
    /// World settings and spawned actors are released on every exit path,
    /// errors and panics included.
    #[instrument(
        name = "pipeline_run",
        skip(self),
        fields(town = %self.config.simulator.town, weather_id = self.config.weather_id)
    )]
    pub async fn run(mut self) -> Result<PipelineStats> {
        let started = Instant::now();
        self.prepare_world().await?;

        let mut rng = StdRng::seed_from_u64(self.config.seed());
        info!(seed = self.config.seed(), mode = ?self.config.mode, "world seeded");

        let factory = ActorFactory::new(self.client.clone());
        let (graph, rig) = factory
            .spawn_world(&self.config, &mut rng)
            .await
            .context("Failed to spawn world")?;

        info!(
            cameras = rig.len(),
            vehicles = graph.vehicles.len(),
            walkers = graph.walkers.len(),
            "World spawned"
        );

        let outcome = AssertUnwindSafe(self.capture(&rig)).catch_unwind().await;

        if let Err(e) = factory.teardown(&graph).await {
            warn!(error = %e, "Error during actor teardown");
        }

        let report = match outcome {
            Ok(report) => report?,
            Err(panic) => {
                error!("Capture panicked, actors destroyed");
                resume_unwind(panic)
            }
        };

        Ok(PipelineStats::new(
            report,
            rig.len(),
            graph.actor_count(),
            started.elapsed(),
        ))
    }

    async fn prepare_world(&mut self) -> Result<()> {
        let sim = &self.config.simulator;
        info!(host = %sim.host, port = sim.port, "Connecting to simulator...");
        self.client
            .connect(&sim.host, sim.port, sim.timeout())
            .await
            .with_context(|| {
                format!("Failed to connect to simulator at {}:{}", sim.host, sim.port)
            })?;

        self.client
            .load_world(&sim.town)
            .await
            .with_context(|| format!("Failed to load {}", sim.town))?;

        let preset = self
            .config
            .weather()
            .with_context(|| format!("No weather preset {}", self.config.weather_id))?;
        self.client
            .set_weather(preset)
            .await
            .context("Failed to set weather")?;
        info!(town = %sim.town, weather = ?preset, "World loaded");
        Ok(())
    }

    /// Synchronous capture over an attached rig.
    ///
    /// A panic inside the loop is re-raised only after the synchronizer has
    /// exited and the sinks are closed.
    async fn capture(&self, rig: &Rig) -> Result<CaptureReport> {
        let sources = rig
            .sources(&self.client)
            .context("Failed to subscribe cameras")?;
        let mut dispatcher = create_dispatcher(&self.config, rig.slots.clone())
            .context("Failed to create dispatcher")?;
        info!(sinks = dispatcher.sink_count(), "Dispatcher ready");

        let mut sync =
            StepSynchronizer::enter(self.client.clone(), sources, self.config.capture.fps)
                .await
                .context("Failed to enter synchronous mode")?;

        let scheduler = CaptureScheduler::from_settings(&self.config.capture);
        let run = AssertUnwindSafe(scheduler.run(&mut sync, &mut dispatcher, &self.cancel))
            .catch_unwind()
            .await;

        let exited = sync.exit().await;
        if let Err(e) = &exited {
            error!(error = %e, "Failed to restore world settings");
        }
        let closed = dispatcher.close().await;
        if let Err(e) = &closed {
            warn!(error = %e, "Failed to close sinks");
        }

        let report = match run {
            Ok(report) => report.context("Capture failed")?,
            Err(panic) => resume_unwind(panic),
        };
        exited.context("Failed to exit synchronous mode")?;
        closed.context("Failed to close sinks")?;

        for (sink, metrics) in dispatcher.metrics() {
            info!(
                sink = %sink,
                frames = metrics.write_count,
                images = metrics.images_written,
                "Sink finished"
            );
        }
        Ok(report)
    }
}
