//! # Contracts
//!
//! Shared data model and traits of the capture pipeline. Every other crate
//! depends on this one; it depends on none of them.
//!
//! ## Step model
//! - The simulator is the only source of [`StepId`]s (one per `tick`)
//! - A sensor sample carries the StepId of the world advance that produced it
//! - The simulation timestamp is kept for diagnostics only

mod config;
mod error;
mod geometry;
mod rig;
mod runtime;
mod sensor;
mod sensor_id;
mod sensor_source;
mod sink;
mod sync;

pub use config::*;
pub use error::*;
pub use geometry::*;
pub use rig::*;
pub use runtime::*;
pub use sensor::*;
pub use sensor_id::SensorId;
pub use sensor_source::{SensorDataCallback, SensorSource};
pub use sink::*;
pub use sync::*;
