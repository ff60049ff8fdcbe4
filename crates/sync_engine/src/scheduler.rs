//! Capture loop: step the world per plan, persist the recorded frames.

use std::time::Duration;

use contracts::{CaptureSettings, FrameSink, SteppedWorld};
use observability::metrics::record_frame_recorded;
use observability::{CaptureStatsAggregator, CaptureSummary};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::engine::StepSynchronizer;
use crate::error::CaptureError;
use crate::schedule::CapturePlan;

/// Outcome of a capture run
#[derive(Debug, Clone)]
pub struct CaptureReport {
    /// World steps run
    pub steps_run: u64,
    pub frames_recorded: u64,
    /// Highest recorded frame number
    pub last_index: Option<u64>,
    pub elapsed: Duration,
    /// Stopped early by the cancellation token
    pub cancelled: bool,
    pub summary: CaptureSummary,
}

impl CaptureReport {
    /// Whether every planned frame was recorded
    pub fn is_complete(&self, plan: &CapturePlan) -> bool {
        !self.cancelled && self.frames_recorded == plan.samples
    }
}

/// Runs a [`CapturePlan`] against a synchronizer and a sink.
#[derive(Debug, Clone)]
pub struct CaptureScheduler {
    plan: CapturePlan,
    step_timeout: Duration,
    progress_every: u64,
}

impl CaptureScheduler {
    pub fn new(plan: CapturePlan, step_timeout: Duration) -> Self {
        Self {
            plan,
            step_timeout,
            progress_every: 100,
        }
    }

    pub fn from_settings(settings: &CaptureSettings) -> Self {
        Self::new(
            CapturePlan::from_settings(settings),
            settings.step_timeout(),
        )
        .with_progress_every(settings.progress_every)
    }

    /// Log progress every `n` steps (0 = never)
    pub fn with_progress_every(mut self, n: u64) -> Self {
        self.progress_every = n;
        self
    }

    pub fn plan(&self) -> &CapturePlan {
        &self.plan
    }

    pub fn step_timeout(&self) -> Duration {
        self.step_timeout
    }

    /// Run the plan to completion, cancellation or the first failure.
    ///
    /// Every step is ticked; only recorded steps wait for samples. A step
    /// timeout or a sink failure aborts the run. Frames already handed to
    /// the sink stay there.
    #[instrument(
        name = "capture_run",
        skip_all,
        fields(
            samples = self.plan.samples,
            stride = self.plan.stride,
            offset = self.plan.offset,
            sink = sink.name()
        )
    )]
    pub async fn run<W, S>(
        &self,
        sync: &mut StepSynchronizer<W>,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<CaptureReport, CaptureError>
    where
        W: SteppedWorld + Sync,
        S: FrameSink,
    {
        let started = Instant::now();
        let total = self.plan.total_steps();
        let mut stats = CaptureStatsAggregator::new();
        let mut report = CaptureReport {
            steps_run: 0,
            frames_recorded: 0,
            last_index: None,
            elapsed: Duration::ZERO,
            cancelled: false,
            summary: CaptureSummary::default(),
        };

        info!(total_steps = total, "capture started");

        for (counter, index) in self.plan.steps() {
            if cancel.is_cancelled() {
                warn!(counter, recorded = report.frames_recorded, "capture cancelled");
                report.cancelled = true;
                break;
            }

            let frame = sync
                .step(self.step_timeout, index.is_some())
                .await
                .map_err(|source| CaptureError::Step { counter, source })?;
            report.steps_run += 1;
            if let Some(meta) = sync.last_meta() {
                stats.update(&meta);
            }

            if let (Some(index), Some(frame)) = (index, frame) {
                if let Err(source) = sink.write(index, &frame).await {
                    stats.record_dispatch_failure(sink.name());
                    return Err(CaptureError::Persist { index, source });
                }
                record_frame_recorded(index);
                report.frames_recorded += 1;
                report.last_index = Some(index);
                debug!(index, step = %frame.step, samples = frame.len(), "frame recorded");
            }

            if self.progress_every > 0 && (counter + 1) % self.progress_every == 0 {
                info!(
                    step = counter + 1,
                    total,
                    recorded = report.frames_recorded,
                    elapsed_s = started.elapsed().as_secs_f64(),
                    "capture progress"
                );
            }
        }

        sink.flush()
            .await
            .map_err(|source| CaptureError::Persist {
                index: report.last_index.unwrap_or(0),
                source,
            })?;

        report.elapsed = started.elapsed();
        report.summary = stats.summary();
        info!(
            steps = report.steps_run,
            recorded = report.frames_recorded,
            elapsed_s = report.elapsed.as_secs_f64(),
            cancelled = report.cancelled,
            "capture finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actor_factory::{MockConfig, MockSimulator, SensorSilence, SimulatorClient};
    use contracts::{
        CapturedFrame, ContractError, Modality, SensorHandle, SensorId, SensorSource, StepId,
        Transform,
    };

    #[derive(Default)]
    struct MemorySink {
        frames: Vec<(u64, StepId, usize)>,
        fail_at: Option<u64>,
        flushed: bool,
    }

    impl FrameSink for MemorySink {
        fn name(&self) -> &str {
            "memory"
        }

        async fn write(&mut self, index: u64, frame: &CapturedFrame) -> Result<(), ContractError> {
            if self.fail_at == Some(index) {
                return Err(ContractError::sink_write("memory", "disk full"));
            }
            self.frames.push((index, frame.step, frame.len()));
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            self.flushed = true;
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    /// Entered synchronizer over one car carrying an rgb camera per role
    async fn synchronizer(
        config: MockConfig,
        roles: &[&str],
    ) -> (MockSimulator, StepSynchronizer<MockSimulator>) {
        let mut sim = MockSimulator::with_config(config);
        sim.connect("localhost", 2000, Duration::from_secs(1))
            .await
            .unwrap();
        let ego = sim
            .spawn_vehicle("vehicle.audi.tt", &[], Transform::default(), true)
            .await
            .unwrap();

        let mut sources: Vec<Box<dyn SensorSource>> = Vec::new();
        for role in roles {
            let attributes = vec![
                ("image_size_x".to_string(), "4".to_string()),
                ("image_size_y".to_string(), "2".to_string()),
                ("role_name".to_string(), role.to_string()),
            ];
            let actor = sim
                .spawn_sensor(Modality::Rgb.blueprint(), &attributes, Transform::default(), ego)
                .await
                .unwrap();
            let handle = SensorHandle {
                actor,
                name: SensorId::from(*role),
                modality: Modality::Rgb,
            };
            sources.push(sim.sensor_source(&handle).unwrap());
        }
        let sync = StepSynchronizer::enter(sim.clone(), sources, 20.0)
            .await
            .unwrap();
        (sim, sync)
    }

    fn scheduler(samples: u64, stride: u64, offset: u64) -> CaptureScheduler {
        CaptureScheduler::new(
            CapturePlan::new(samples, stride, offset),
            Duration::from_secs(2),
        )
        .with_progress_every(0)
    }

    #[test]
    fn test_out_of_range_timeout_clamped() {
        let settings = CaptureSettings {
            step_timeout_s: 1e30,
            ..Default::default()
        };
        let scheduler = CaptureScheduler::from_settings(&settings);
        assert_eq!(scheduler.step_timeout(), Duration::from_secs(3600));
        assert_eq!(scheduler.plan().total_steps(), 10_100);
    }

    #[tokio::test]
    async fn test_records_planned_indices() {
        let (sim, mut sync) = synchronizer(MockConfig::default(), &["a", "b"]).await;
        let mut sink = MemorySink::default();
        let scheduler = scheduler(3, 4, 5);

        let report = scheduler
            .run(&mut sync, &mut sink, &CancellationToken::new())
            .await
            .unwrap();
        sync.exit().await.unwrap();

        assert_eq!(report.steps_run, 17);
        assert_eq!(report.frames_recorded, 3);
        assert_eq!(report.last_index, Some(2));
        assert!(report.is_complete(scheduler.plan()));
        assert!(sink.flushed);
        assert_eq!(sim.tick_count(), 17);

        let indices: Vec<u64> = sink.frames.iter().map(|f| f.0).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(sink.frames.iter().all(|f| f.2 == 2));
        // recorded steps are stride apart
        let steps: Vec<u64> = sink.frames.iter().map(|f| f.1.value()).collect();
        assert_eq!(steps[1] - steps[0], 4);
        assert_eq!(steps[2] - steps[1], 4);
        assert_eq!(report.summary.collected_frames, 3);
        assert_eq!(report.summary.total_steps, 17);
    }

    #[tokio::test]
    async fn test_silent_sensor_aborts_run() {
        let config = MockConfig {
            silent_sensors: vec![SensorSilence {
                role_name: "b".to_string(),
                after_samples: 6,
            }],
            ..Default::default()
        };
        let (_sim, mut sync) = synchronizer(config, &["a", "b"]).await;
        let mut sink = MemorySink::default();
        let scheduler = CaptureScheduler::new(CapturePlan::new(5, 2, 0), Duration::from_millis(200))
            .with_progress_every(0);

        let err = scheduler
            .run(&mut sync, &mut sink, &CancellationToken::new())
            .await
            .unwrap_err();
        sync.exit().await.unwrap();

        assert!(err.is_timeout());
        // b delivers steps 0..=5, so indices 0, 1, 2 made it
        let indices: Vec<u64> = sink.frames.iter().map(|f| f.0).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        match err {
            CaptureError::Step { counter, .. } => assert_eq!(counter, 6),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_sink_failure_is_persist_error() {
        let (_sim, mut sync) = synchronizer(MockConfig::default(), &["a"]).await;
        let mut sink = MemorySink {
            fail_at: Some(1),
            ..Default::default()
        };

        let err = scheduler(3, 1, 0)
            .run(&mut sync, &mut sink, &CancellationToken::new())
            .await
            .unwrap_err();
        sync.exit().await.unwrap();

        assert!(matches!(err, CaptureError::Persist { index: 1, .. }));
        assert_eq!(sink.frames.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (sim, mut sync) = synchronizer(MockConfig::default(), &["a"]).await;
        let mut sink = MemorySink::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = scheduler(3, 1, 0).run(&mut sync, &mut sink, &cancel).await.unwrap();
        sync.exit().await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.steps_run, 0);
        assert!(sink.frames.is_empty());
        assert_eq!(sim.tick_count(), 0);
    }
}
