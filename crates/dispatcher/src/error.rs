//! Dispatcher error types

use std::path::PathBuf;

use contracts::{ContractError, SensorId};
use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Sink creation error
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// Frame does not line up with the sink's output slots
    #[error("frame has {got} samples, sink expects {expected}")]
    SlotCount { expected: usize, got: usize },

    /// Sample `position` belongs to another sensor than its slot
    #[error("sample {position} is from '{got}', slot belongs to '{expected}'")]
    SlotMismatch {
        position: usize,
        expected: SensorId,
        got: SensorId,
    },

    /// Pixel payload shorter than the declared image size
    #[error("sample from '{sensor}' is truncated: expected {expected} bytes, got {got}")]
    PayloadSize {
        sensor: SensorId,
        expected: usize,
        got: usize,
    },

    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("sink error: {0}")]
    Contract(#[from] ContractError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest serialization failed: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl DispatcherError {
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Wrap as the sink-write error of `sink`
    pub fn into_sink_write(self, sink: &str) -> ContractError {
        match self {
            DispatcherError::Contract(e) => e,
            other => ContractError::sink_write(sink, other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatcherError>;
