//! Simulator geometry (meters / degrees, simulator left-handed frame).

use serde::{Deserialize, Serialize};

/// Location + rotation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub location: Location,
    pub rotation: Rotation,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// pitch / yaw / roll in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

impl Transform {
    pub fn new(location: Location, rotation: Rotation) -> Self {
        Self { location, rotation }
    }

    /// Mount pose of a camera: translation plus heading, no pitch or roll
    pub fn mount(x: f64, y: f64, z: f64, yaw: f64) -> Self {
        Self {
            location: Location { x, y, z },
            rotation: Rotation {
                pitch: 0.0,
                yaw,
                roll: 0.0,
            },
        }
    }

    pub fn at(location: Location) -> Self {
        Self {
            location,
            rotation: Rotation::default(),
        }
    }
}
