//! Step synchronizer.
//!
//! Drives an externally stepped world one tick at a time and, when asked,
//! collects exactly one sample per registered sensor for that tick.

use std::time::Duration;

use contracts::{
    CapturedFrame, SensorId, SensorSample, SensorSource, StepId, StepMeta, SteppedWorld,
    WorldSettings,
};
use observability::metrics::{record_buffer_depth, record_step_metrics, record_step_timeout};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::buffer::StreamBuffer;
use crate::error::SyncError;

/// Running counters of a synchronizer
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SyncStats {
    pub steps: u64,
    pub collected_frames: u64,
    pub stale_discarded: u64,
    pub last_wait_ms: f64,
    pub max_wait_ms: f64,
}

/// Multi-camera step synchronizer
///
/// Owns one [`StreamBuffer`] per sensor; buffer `i` belongs to source `i`,
/// so collected samples come back in registration order.
pub struct StepSynchronizer<W: SteppedWorld> {
    world: W,
    sources: Vec<Box<dyn SensorSource>>,
    buffers: Vec<StreamBuffer>,
    /// Settings to restore on exit; `None` once exited
    saved_settings: Option<WorldSettings>,
    current_step: Option<StepId>,
    stats: SyncStats,
    last_meta: Option<StepMeta>,
}

impl<W: SteppedWorld + Sync> StepSynchronizer<W> {
    /// Switch the world to fixed-step synchronous mode and subscribe every
    /// sensor.
    ///
    /// The settings found on entry are restored by [`Self::exit`].
    #[instrument(name = "sync_enter", skip(world, sources), fields(sensors = sources.len()))]
    pub async fn enter(
        world: W,
        sources: Vec<Box<dyn SensorSource>>,
        fps: f64,
    ) -> Result<Self, SyncError> {
        let saved = world.settings().await?;
        world.apply_settings(&WorldSettings::synchronous(fps)).await?;

        let buffers = sources
            .iter()
            .map(|source| {
                let mut buffer = StreamBuffer::new(source.sensor_id().clone());
                source.listen(buffer.pusher());
                buffer.seal();
                buffer
            })
            .collect();

        info!(
            fixed_delta_seconds = 1.0 / fps,
            previous_sync = saved.synchronous_mode,
            "synchronous mode entered"
        );

        Ok(Self {
            world,
            sources,
            buffers,
            saved_settings: Some(saved),
            current_step: None,
            stats: SyncStats::default(),
            last_meta: None,
        })
    }

    /// Advance the world by exactly one step.
    ///
    /// With `collect == false` returns `Ok(None)` right after the tick.
    /// Otherwise waits for every sensor's sample of this step; `timeout`
    /// runs from the start of the call and is shared by all sensors.
    ///
    /// # Panics
    /// If a collected sample is attributed to another step. That is a
    /// synchronizer bug, never a runtime condition.
    pub async fn step(
        &mut self,
        timeout: Duration,
        collect: bool,
    ) -> Result<Option<CapturedFrame>, SyncError> {
        if !self.is_entered() {
            return Err(SyncError::NotEntered);
        }

        let started = Instant::now();
        let deadline = started + timeout;

        let step = self.world.tick().await?;
        if let Some(previous) = self.current_step {
            if step <= previous {
                warn!(step = %step, previous = %previous, "simulator returned a non-increasing step id");
            }
        }
        self.current_step = Some(step);
        self.stats.steps += 1;

        if !collect {
            self.finish_step(StepMeta {
                step,
                collected: false,
                wait_ms: 0.0,
                stale_discarded: 0,
                sensors: self.buffers.len(),
            });
            return Ok(None);
        }

        let discarded_before = self.discarded_total();
        let mut samples = Vec::with_capacity(self.buffers.len());
        for buffer in &mut self.buffers {
            match buffer.drain_until(step, deadline).await {
                Ok(sample) => samples.push(sample),
                Err(e) => {
                    if let Some(sensor) = e.sensor() {
                        record_step_timeout(sensor.as_str());
                    }
                    warn!(step = %step, error = %e, "step collection failed");
                    return Err(e);
                }
            }
        }

        assert_attribution(step, &self.buffers, &samples);

        let wait_ms = started.elapsed().as_secs_f64() * 1000.0;
        let stale_discarded = self.discarded_total() - discarded_before;
        self.stats.collected_frames += 1;
        self.stats.stale_discarded += stale_discarded;
        self.stats.last_wait_ms = wait_ms;
        self.stats.max_wait_ms = self.stats.max_wait_ms.max(wait_ms);

        self.finish_step(StepMeta {
            step,
            collected: true,
            wait_ms,
            stale_discarded,
            sensors: samples.len(),
        });
        debug!(step = %step, wait_ms, stale_discarded, "frame collected");

        Ok(Some(CapturedFrame { step, samples }))
    }

    /// Stop every subscription and restore the settings found by `enter`.
    ///
    /// Idempotent once the restore went through; a failed restore is
    /// attempted again by the next call.
    #[instrument(name = "sync_exit", skip(self), fields(steps = self.stats.steps))]
    pub async fn exit(&mut self) -> Result<(), SyncError> {
        for source in &self.sources {
            source.stop();
        }
        for buffer in &mut self.buffers {
            buffer.close();
        }

        if let Some(saved) = &self.saved_settings {
            self.world.apply_settings(saved).await?;
            info!(synchronous_mode = saved.synchronous_mode, "world settings restored");
            self.saved_settings = None;
        }
        Ok(())
    }

    pub fn is_entered(&self) -> bool {
        self.saved_settings.is_some()
    }

    /// StepId of the latest tick
    pub fn current_step(&self) -> Option<StepId> {
        self.current_step
    }

    pub fn sensor_count(&self) -> usize {
        self.buffers.len()
    }

    /// Sensor names in registration order
    pub fn sensors(&self) -> impl Iterator<Item = &SensorId> {
        self.buffers.iter().map(StreamBuffer::sensor)
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Diagnostics of the latest step
    pub fn last_meta(&self) -> Option<StepMeta> {
        self.last_meta
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    fn discarded_total(&self) -> u64 {
        self.buffers.iter().map(StreamBuffer::discarded).sum()
    }

    fn finish_step(&mut self, meta: StepMeta) {
        record_step_metrics(&meta);
        if meta.collected {
            for buffer in &self.buffers {
                record_buffer_depth(buffer.sensor().as_str(), buffer.len());
            }
        }
        self.last_meta = Some(meta);
    }
}

/// Every collected sample must carry the step's own id and come from the
/// sensor of its buffer, one per sensor.
fn assert_attribution(step: StepId, buffers: &[StreamBuffer], samples: &[SensorSample]) {
    assert_eq!(
        samples.len(),
        buffers.len(),
        "step {step}: collected {} samples for {} sensors",
        samples.len(),
        buffers.len()
    );
    for (sample, buffer) in samples.iter().zip(buffers) {
        assert_eq!(
            sample.step, step,
            "sample of '{}' attributed to step {} while collecting step {step}",
            sample.sensor, sample.step
        );
        assert_eq!(
            &sample.sensor,
            buffer.sensor(),
            "step {step}: sample from '{}' arrived on the stream of '{}'",
            sample.sensor,
            buffer.sensor()
        );
    }
}
