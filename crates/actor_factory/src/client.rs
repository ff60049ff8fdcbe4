//! Simulator client abstraction
//!
//! Defines the session interface used by the factory, the rig enumerator and
//! the step synchronizer. Implemented by the in-process mock and, behind the
//! `real-carla` feature, by the CARLA client.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use contracts::{
    ActorId, Location, SensorHandle, SensorSource, SteppedWorld, Transform, WeatherPreset,
};

use crate::error::Result;

/// Blueprint id reserved for walker AI controllers
pub const WALKER_CONTROLLER_BLUEPRINT: &str = "controller.ai.walker";

/// Blueprint metadata needed to randomize spawns
#[derive(Debug, Clone, PartialEq)]
pub struct BlueprintInfo {
    pub id: String,

    /// attribute name -> recommended values
    pub recommended: HashMap<String, Vec<String>>,
}

impl BlueprintInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            recommended: HashMap::new(),
        }
    }

    pub fn with_values(mut self, attribute: &str, values: &[&str]) -> Self {
        self.recommended.insert(
            attribute.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    pub fn recommended_values(&self, attribute: &str) -> &[String] {
        self.recommended
            .get(attribute)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// One item of a batch spawn
#[derive(Debug, Clone, PartialEq)]
pub enum SpawnRequest {
    Vehicle {
        blueprint: String,
        attributes: Vec<(String, String)>,
        transform: Transform,
        autopilot: bool,
    },
    Walker {
        blueprint: String,
        attributes: Vec<(String, String)>,
        transform: Transform,
    },
    /// AI controller attached to an already spawned walker
    WalkerController { walker: ActorId },
}

impl SpawnRequest {
    pub fn blueprint(&self) -> &str {
        match self {
            SpawnRequest::Vehicle { blueprint, .. } | SpawnRequest::Walker { blueprint, .. } => {
                blueprint
            }
            SpawnRequest::WalkerController { .. } => WALKER_CONTROLLER_BLUEPRINT,
        }
    }
}

/// Simulator session.
///
/// Stepping (`settings` / `apply_settings` / `tick`) comes from
/// [`SteppedWorld`]; everything else manages the world and its actors.
pub trait SimulatorClient: SteppedWorld + Send + Sync {
    /// Open the session; `timeout` bounds every later request
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Load a map, replacing the current world
    fn load_world(&self, town: &str) -> impl Future<Output = Result<()>> + Send;

    fn set_weather(&self, preset: WeatherPreset) -> impl Future<Output = Result<()>> + Send;

    /// Blueprints whose id matches a wildcard `filter` (e.g. "vehicle.*")
    fn blueprints(&self, filter: &str) -> impl Future<Output = Result<Vec<BlueprintInfo>>> + Send;

    /// Map-recommended vehicle spawn points
    fn spawn_points(&self) -> impl Future<Output = Result<Vec<Transform>>> + Send;

    /// Random point on the pedestrian navigation mesh, `None` on a miss
    fn random_navigation_location(
        &self,
    ) -> impl Future<Output = Result<Option<Location>>> + Send;

    fn spawn_vehicle(
        &self,
        blueprint: &str,
        attributes: &[(String, String)],
        transform: Transform,
        autopilot: bool,
    ) -> impl Future<Output = Result<ActorId>> + Send;

    /// Spawn a sensor rigidly attached to `parent`
    fn spawn_sensor(
        &self,
        blueprint: &str,
        attributes: &[(String, String)],
        transform: Transform,
        parent: ActorId,
    ) -> impl Future<Output = Result<ActorId>> + Send;

    /// Spawn many actors in one request; one result per request, in order
    fn spawn_batch(
        &self,
        requests: Vec<SpawnRequest>,
    ) -> impl Future<Output = Result<Vec<Result<ActorId>>>> + Send;

    /// Start an AI controller walking towards `destination`
    fn start_walker(
        &self,
        controller: ActorId,
        destination: Location,
        max_speed: f64,
    ) -> impl Future<Output = Result<()>> + Send;

    fn stop_walker(&self, controller: ActorId) -> impl Future<Output = Result<()>> + Send;

    /// Destroy an actor.
    ///
    /// Idempotent operation: returns Ok if actor doesn't exist
    fn destroy_actor(&self, actor_id: ActorId) -> impl Future<Output = Result<()>> + Send;

    /// Notification channel of an attached camera, `None` if the actor is
    /// not a live sensor
    fn sensor_source(&self, handle: &SensorHandle) -> Option<Box<dyn SensorSource>>;
}
