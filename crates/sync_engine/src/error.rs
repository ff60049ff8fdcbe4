//! Sync Engine error types

use contracts::{ContractError, SensorId, StepId};
use thiserror::Error;

/// Failure of one synchronizer step. Every variant is fatal for the run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A sensor did not deliver the step's sample before the deadline
    #[error("sensor '{sensor}' delivered no sample for step {step} within {waited_ms} ms")]
    Timeout {
        sensor: SensorId,
        step: StepId,
        waited_ms: u64,
    },

    /// Every producer of a sensor stream is gone
    #[error("stream of sensor '{sensor}' closed while waiting for step {step}")]
    StreamClosed { sensor: SensorId, step: StepId },

    /// A sensor delivered a later step first; the wanted sample never comes
    #[error("sensor '{sensor}' skipped step {expected} (got {got})")]
    SkippedStep {
        sensor: SensorId,
        expected: StepId,
        got: StepId,
    },

    /// `step` or `exit` before `enter`
    #[error("synchronizer has not entered synchronous mode")]
    NotEntered,

    #[error(transparent)]
    World(#[from] ContractError),
}

impl SyncError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Sensor the error is attributed to, if any
    pub fn sensor(&self) -> Option<&SensorId> {
        match self {
            Self::Timeout { sensor, .. }
            | Self::StreamClosed { sensor, .. }
            | Self::SkippedStep { sensor, .. } => Some(sensor),
            _ => None,
        }
    }
}

/// Failure of the capture loop
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("step {counter} failed: {source}")]
    Step {
        counter: u64,
        #[source]
        source: SyncError,
    },

    #[error("failed to persist frame {index}: {source}")]
    Persist {
        index: u64,
        #[source]
        source: ContractError,
    },
}

impl CaptureError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Step { source, .. } if source.is_timeout())
    }
}
