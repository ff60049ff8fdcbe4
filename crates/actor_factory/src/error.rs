//! Actor Factory error types

use contracts::{ActorId, ContractError};
use thiserror::Error;

/// Actor Factory specific error
#[derive(Debug, Error)]
pub enum ActorFactoryError {
    /// Simulator connection error
    #[error("failed to connect to simulator: {message}")]
    ConnectionFailed { message: String },

    /// Simulator rejected a world-level request
    #[error("simulator request '{operation}' failed: {message}")]
    RequestFailed { operation: String, message: String },

    /// Actor spawn error
    #[error("failed to spawn '{blueprint}': {message}")]
    SpawnFailed { blueprint: String, message: String },

    /// Sensor attach error
    #[error("failed to attach sensor '{sensor_id}' to actor {parent}: {message}")]
    AttachFailed {
        sensor_id: String,
        parent: ActorId,
        message: String,
    },

    /// No usable blueprint or spawn point
    #[error("no {what} available for '{filter}'")]
    NothingAvailable { what: &'static str, filter: String },

    /// Destroy error
    #[error("failed to destroy actor {actor_id}: {message}")]
    DestroyFailed { actor_id: ActorId, message: String },

    /// Wrapped ContractError
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl ActorFactoryError {
    pub fn spawn(blueprint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            blueprint: blueprint.into(),
            message: message.into(),
        }
    }

    pub fn request(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn not_connected() -> Self {
        Self::ConnectionFailed {
            message: "not connected to simulator".into(),
        }
    }
}

impl From<ActorFactoryError> for ContractError {
    fn from(err: ActorFactoryError) -> Self {
        match err {
            ActorFactoryError::Contract(inner) => inner,
            ActorFactoryError::ConnectionFailed { message } => {
                ContractError::SimulatorConnection { message }
            }
            ActorFactoryError::SpawnFailed { blueprint, message } => {
                ContractError::spawn(blueprint, message)
            }
            other => ContractError::Other(other.to_string()),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, ActorFactoryError>;
