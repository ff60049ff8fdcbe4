//! Pipeline statistics and metrics.

use std::time::Duration;

use observability::CaptureSummary;
use sync_engine::CaptureReport;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// World steps advanced
    pub steps_run: u64,

    /// Frames written to the sinks
    pub frames_recorded: u64,

    /// Highest recorded frame number
    pub last_index: Option<u64>,

    /// Cameras attached to the ego vehicle
    pub cameras: usize,

    /// Actors spawned for the run (ego, cameras, traffic, walkers)
    pub actors: usize,

    /// Stopped early by a shutdown signal
    pub cancelled: bool,

    /// Time spent in the capture loop
    pub capture_time: Duration,

    /// Total duration, world setup and teardown included
    pub duration: Duration,

    pub summary: CaptureSummary,
}

impl PipelineStats {
    pub fn new(report: CaptureReport, cameras: usize, actors: usize, duration: Duration) -> Self {
        Self {
            steps_run: report.steps_run,
            frames_recorded: report.frames_recorded,
            last_index: report.last_index,
            cameras,
            actors,
            cancelled: report.cancelled,
            capture_time: report.elapsed,
            duration,
            summary: report.summary,
        }
    }

    /// Simulation steps per wall-clock second of capture
    pub fn steps_per_second(&self) -> f64 {
        let secs = self.capture_time.as_secs_f64();
        if secs > 0.0 {
            self.steps_run as f64 / secs
        } else {
            0.0
        }
    }

    /// Images written across all cameras
    pub fn images(&self) -> u64 {
        self.frames_recorded * self.cameras as u64
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Capture Statistics ===\n");
        println!("Overview");
        println!("   Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   Capture loop: {:.2}s", self.capture_time.as_secs_f64());
        println!("   Steps: {} ({:.2}/s)", self.steps_run, self.steps_per_second());
        println!("   Frames recorded: {}", self.frames_recorded);
        if let Some(last) = self.last_index {
            println!("   Last frame index: {last:06}");
        }
        println!("   Cameras: {}", self.cameras);
        println!("   Images: {}", self.images());
        println!("   Actors spawned: {}", self.actors);
        if self.cancelled {
            println!("   Stopped early by shutdown signal");
        }

        println!("\n{}", self.summary);
    }
}
