//! # Actor Factory
//!
//! Simulator session and world lifecycle.
//!
//! Responsibilities:
//! - Simulator client abstraction (`SimulatorClient`) with a mock and a real
//!   CARLA implementation
//! - Ego vehicle spawn and teardown
//! - Camera rig planning and attachment (`plan_rig`, `RigEnumerator`)
//! - Background traffic and pedestrians (`WorldPopulation`)
//!
//! ## Feature Flags
//!
//! - `real-carla`: Enable real CARLA client (requires carla crate)

pub mod client;
pub mod error;
pub mod factory;
pub mod mock_client;
pub mod mock_sensor;
pub mod population;
pub mod rig;

#[cfg(feature = "real-carla")]
pub mod carla_client;
#[cfg(feature = "real-carla")]
pub mod carla_sensor_source;
#[cfg(feature = "real-carla")]
pub mod sensor_data_converter;

pub use client::{BlueprintInfo, SimulatorClient, SpawnRequest, WALKER_CONTROLLER_BLUEPRINT};
pub use contracts::{ActorId, RuntimeGraph, SensorSource};
pub use error::{ActorFactoryError, Result};
pub use factory::ActorFactory;
pub use mock_client::{
    MockActorKind, MockConfig, MockSimulator, SensorCrossWire, SensorSilence,
};
pub use mock_sensor::{MockCamera, MockCameraBehavior, StepTick};
pub use population::{Population, WorldPopulation};
pub use rig::{plan_rig, CameraPlacement, Rig, RigEnumerator};

#[cfg(feature = "real-carla")]
pub use carla_client::RealCarlaClient;
#[cfg(feature = "real-carla")]
pub use carla_sensor_source::CarlaSensorSource;
