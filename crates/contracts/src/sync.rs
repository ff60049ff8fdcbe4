//! Step model shared by the simulator client and the step synchronizer.

use serde::{Deserialize, Serialize};

use crate::{ContractError, SensorSample, StepId};

/// Samples collected for one step, ordered like the synchronizer's sensor
/// list (and therefore like the rig's output slots).
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub step: StepId,
    pub samples: Vec<SensorSample>,
}

impl CapturedFrame {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Simulation time of the step (first sample), if any
    pub fn timestamp(&self) -> Option<f64> {
        self.samples.first().map(|s| s.timestamp)
    }
}

/// Diagnostics of one synchronizer step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepMeta {
    pub step: StepId,
    /// Whether samples were collected for this step
    pub collected: bool,
    /// Time spent waiting for samples (0 for non-collecting steps)
    pub wait_ms: f64,
    /// Samples of earlier steps discarded while draining
    pub stale_discarded: u64,
    pub sensors: usize,
}

/// Process-wide stepping configuration of the simulator
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldSettings {
    /// The world only advances when a client ticks it
    pub synchronous_mode: bool,

    pub no_rendering_mode: bool,

    /// Simulated seconds per step; `None` = variable time step
    pub fixed_delta_seconds: Option<f64>,
}

impl WorldSettings {
    /// Externally stepped world at `fps` steps per simulated second
    pub fn synchronous(fps: f64) -> Self {
        Self {
            synchronous_mode: true,
            no_rendering_mode: false,
            fixed_delta_seconds: Some(1.0 / fps),
        }
    }
}

/// A world that advances one discrete step per request.
#[trait_variant::make(SteppedWorld: Send)]
pub trait LocalSteppedWorld {
    /// Current stepping configuration
    async fn settings(&self) -> Result<WorldSettings, ContractError>;

    /// Replace the stepping configuration
    async fn apply_settings(&self, settings: &WorldSettings) -> Result<(), ContractError>;

    /// Advance the world by exactly one step and return its StepId
    async fn tick(&self) -> Result<StepId, ContractError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synchronous_settings() {
        let settings = WorldSettings::synchronous(30.0);
        assert!(settings.synchronous_mode);
        assert!(!settings.no_rendering_mode);
        let delta = settings.fixed_delta_seconds.unwrap();
        assert!((delta - 1.0 / 30.0).abs() < 1e-12);
    }
}
