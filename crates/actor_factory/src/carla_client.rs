//! Real CARLA client implementation
//!
//! Connects to CARLA server using carla-rust crate. Calls into the simulator
//! are blocking RPCs issued from the control task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use carla::client::{ActorBase, Client, Sensor, Vehicle, Walker, WalkerAIController, World};
use carla::geom::{Location as CarlaLocation, Rotation, Transform as CarlaTransform};
use contracts::{
    ActorId, ContractError, Location, SensorHandle, SensorSource, StepId, Transform,
    WeatherPreset, WorldSettings,
};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::carla_sensor_source::CarlaSensorSource;
use crate::client::{BlueprintInfo, SimulatorClient, SpawnRequest, WALKER_CONTROLLER_BLUEPRINT};
use crate::error::{ActorFactoryError, Result};

/// Timeout for settings round-trips
const SETTINGS_TIMEOUT: Duration = Duration::from_secs(10);

/// Actor type enumeration
#[derive(Clone)]
enum ActorType {
    Vehicle(Vehicle),
    Sensor(Sensor),
    Walker(Walker),
    Controller(WalkerAIController),
}

/// Real CARLA client
///
/// Wraps carla-rust's Client. Mutex for interior mutability, allowing `&self`
/// methods to modify World.
#[derive(Default, Clone)]
pub struct RealCarlaClient {
    client: Arc<Mutex<Option<Client>>>,
    world: Arc<Mutex<Option<World>>>,
    /// Created actors (for teardown)
    actors: Arc<Mutex<HashMap<ActorId, ActorType>>>,
}

impl RealCarlaClient {
    /// Create new client (disconnected state)
    pub fn new() -> Self {
        Self::default()
    }

    /// Access World with mutable reference, ensuring connected
    fn with_world<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut World) -> Result<R>,
    {
        let mut guard = self.world.lock();
        let world = guard.as_mut().ok_or_else(ActorFactoryError::not_connected)?;
        f(world)
    }

    fn store_actor(&self, actor_id: ActorId, actor: ActorType) {
        self.actors.lock().insert(actor_id, actor);
    }

    fn to_carla_transform(transform: Transform) -> CarlaTransform {
        CarlaTransform {
            location: Self::to_carla_location(transform.location),
            rotation: Rotation {
                pitch: transform.rotation.pitch as f32,
                yaw: transform.rotation.yaw as f32,
                roll: transform.rotation.roll as f32,
            },
        }
    }

    fn to_carla_location(location: Location) -> CarlaLocation {
        CarlaLocation {
            x: location.x as f32,
            y: location.y as f32,
            z: location.z as f32,
        }
    }

    fn from_carla_transform(transform: &CarlaTransform) -> Transform {
        Transform::mount(
            transform.location.x as f64,
            transform.location.y as f64,
            transform.location.z as f64,
            transform.rotation.yaw as f64,
        )
    }

    fn spawn_raw(
        world: &mut World,
        blueprint: &str,
        attributes: &[(String, String)],
        transform: Transform,
        parent: Option<&carla::client::Actor>,
    ) -> Result<carla::client::Actor> {
        let mut bp = world
            .blueprint_library()
            .find(blueprint)
            .ok_or_else(|| ActorFactoryError::spawn(blueprint, "blueprint not found"))?;

        for (key, value) in attributes {
            if !bp.set_attribute(key, value) {
                warn!(blueprint, key = %key, value = %value, "failed to set blueprint attribute");
            }
        }

        let transform = Self::to_carla_transform(transform);
        let spawned = match parent {
            Some(parent) => world.spawn_actor_attached(&bp, &transform, parent, None),
            None => world.spawn_actor(&bp, &transform),
        };
        spawned.map_err(|e| ActorFactoryError::spawn(blueprint, e.to_string()))
    }

    fn parent_actor(&self, parent: ActorId) -> Option<carla::client::Actor> {
        match self.actors.lock().get(&parent) {
            Some(ActorType::Vehicle(v)) => Some(v.clone().into()),
            Some(ActorType::Walker(w)) => Some(w.clone().into()),
            _ => None,
        }
    }

    fn spawn_request(&self, request: SpawnRequest) -> Result<ActorId> {
        match request {
            SpawnRequest::Vehicle {
                blueprint,
                attributes,
                transform,
                autopilot,
            } => {
                let actor = self.with_world(|world| {
                    Self::spawn_raw(world, &blueprint, &attributes, transform, None)
                })?;
                let vehicle = Vehicle::try_from(actor)
                    .map_err(|_| ActorFactoryError::spawn(&blueprint, "not a vehicle"))?;
                vehicle.set_autopilot(autopilot);
                let actor_id = vehicle.id();
                self.store_actor(actor_id, ActorType::Vehicle(vehicle));
                Ok(actor_id)
            }
            SpawnRequest::Walker {
                blueprint,
                attributes,
                transform,
            } => {
                let actor = self.with_world(|world| {
                    Self::spawn_raw(world, &blueprint, &attributes, transform, None)
                })?;
                let walker = Walker::try_from(actor)
                    .map_err(|_| ActorFactoryError::spawn(&blueprint, "not a walker"))?;
                let actor_id = walker.id();
                self.store_actor(actor_id, ActorType::Walker(walker));
                Ok(actor_id)
            }
            SpawnRequest::WalkerController { walker } => {
                let parent = self.parent_actor(walker).ok_or_else(|| {
                    ActorFactoryError::spawn(
                        WALKER_CONTROLLER_BLUEPRINT,
                        format!("walker {walker} not found"),
                    )
                })?;
                let actor = self.with_world(|world| {
                    Self::spawn_raw(
                        world,
                        WALKER_CONTROLLER_BLUEPRINT,
                        &[],
                        Transform::default(),
                        Some(&parent),
                    )
                })?;
                let controller = WalkerAIController::try_from(actor).map_err(|_| {
                    ActorFactoryError::spawn(WALKER_CONTROLLER_BLUEPRINT, "not a walker controller")
                })?;
                let actor_id = controller.id();
                self.store_actor(actor_id, ActorType::Controller(controller));
                Ok(actor_id)
            }
        }
    }

    fn controller(&self, actor_id: ActorId) -> Result<WalkerAIController> {
        match self.actors.lock().get(&actor_id) {
            Some(ActorType::Controller(c)) => Ok(c.clone()),
            _ => Err(ActorFactoryError::request(
                "walker_controller",
                format!("actor {actor_id} is not a walker controller"),
            )),
        }
    }
}

impl contracts::SteppedWorld for RealCarlaClient {
    async fn settings(&self) -> std::result::Result<WorldSettings, ContractError> {
        let settings = self.with_world(|world| Ok(world.settings()))?;
        Ok(WorldSettings {
            synchronous_mode: settings.synchronous_mode,
            no_rendering_mode: settings.no_rendering_mode,
            fixed_delta_seconds: settings.fixed_delta_seconds,
        })
    }

    #[instrument(name = "real_carla_apply_settings", skip(self))]
    async fn apply_settings(
        &self,
        settings: &WorldSettings,
    ) -> std::result::Result<(), ContractError> {
        self.with_world(|world| {
            let mut episode = world.settings();
            episode.synchronous_mode = settings.synchronous_mode;
            episode.no_rendering_mode = settings.no_rendering_mode;
            episode.fixed_delta_seconds = settings.fixed_delta_seconds;
            world.apply_settings(&episode, SETTINGS_TIMEOUT);
            Ok(())
        })?;
        Ok(())
    }

    async fn tick(&self) -> std::result::Result<StepId, ContractError> {
        let frame = self.with_world(|world| Ok(world.tick()))?;
        Ok(StepId(frame as u64))
    }
}

impl SimulatorClient for RealCarlaClient {
    #[instrument(name = "real_carla_connect", skip(self))]
    async fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> Result<()> {
        let mut client = Client::connect(host, port, None);
        client.set_timeout(timeout);
        let world = client.world();

        info!(map = %world.map().name(), "connected to CARLA server");

        *self.client.lock() = Some(client);
        *self.world.lock() = Some(world);
        Ok(())
    }

    #[instrument(name = "real_carla_load_world", skip(self))]
    async fn load_world(&self, town: &str) -> Result<()> {
        let mut guard = self.client.lock();
        let client = guard.as_mut().ok_or_else(ActorFactoryError::not_connected)?;
        let world = client.load_world(town);
        *self.world.lock() = Some(world);
        Ok(())
    }

    async fn set_weather(&self, preset: WeatherPreset) -> Result<()> {
        let Some(params) = preset.params() else {
            // Default keeps the map's own weather
            return Ok(());
        };
        self.with_world(|world| {
            let mut weather = world.weather();
            weather.cloudiness = params.cloudiness;
            weather.precipitation = params.precipitation;
            weather.precipitation_deposits = params.precipitation_deposits;
            weather.wind_intensity = params.wind_intensity;
            weather.sun_azimuth_angle = params.sun_azimuth_angle;
            weather.sun_altitude_angle = params.sun_altitude_angle;
            world.set_weather(&weather);
            Ok(())
        })
    }

    async fn blueprints(&self, filter: &str) -> Result<Vec<BlueprintInfo>> {
        self.with_world(|world| {
            Ok(world
                .blueprint_library()
                .filter(filter)
                .iter()
                .map(|bp| BlueprintInfo::new(bp.id()))
                .collect())
        })
    }

    async fn spawn_points(&self) -> Result<Vec<Transform>> {
        self.with_world(|world| {
            let points = world.map().recommended_spawn_points();
            Ok((0..points.len())
                .filter_map(|i| points.get(i).map(Self::from_carla_transform))
                .collect())
        })
    }

    async fn random_navigation_location(&self) -> Result<Option<Location>> {
        self.with_world(|world| {
            Ok(world.random_location_from_navigation().map(|l| Location {
                x: l.x as f64,
                y: l.y as f64,
                z: l.z as f64,
            }))
        })
    }

    #[instrument(name = "real_carla_spawn_vehicle", skip(self, attributes, transform))]
    async fn spawn_vehicle(
        &self,
        blueprint: &str,
        attributes: &[(String, String)],
        transform: Transform,
        autopilot: bool,
    ) -> Result<ActorId> {
        let actor_id = self.spawn_request(SpawnRequest::Vehicle {
            blueprint: blueprint.to_string(),
            attributes: attributes.to_vec(),
            transform,
            autopilot,
        })?;
        debug!(actor_id, autopilot, "vehicle spawned");
        Ok(actor_id)
    }

    #[instrument(name = "real_carla_spawn_sensor", skip(self, attributes, transform))]
    async fn spawn_sensor(
        &self,
        blueprint: &str,
        attributes: &[(String, String)],
        transform: Transform,
        parent: ActorId,
    ) -> Result<ActorId> {
        let parent_actor = self.parent_actor(parent).ok_or_else(|| {
            ActorFactoryError::AttachFailed {
                sensor_id: blueprint.to_string(),
                parent,
                message: "parent actor not found".into(),
            }
        })?;

        let actor = self
            .with_world(|world| {
                Self::spawn_raw(world, blueprint, attributes, transform, Some(&parent_actor))
            })
            .map_err(|e| ActorFactoryError::AttachFailed {
                sensor_id: blueprint.to_string(),
                parent,
                message: e.to_string(),
            })?;
        let sensor = Sensor::try_from(actor)
            .map_err(|_| ActorFactoryError::spawn(blueprint, "not a sensor"))?;

        let actor_id = sensor.id();
        debug!(actor_id, parent, "sensor spawned and attached");
        self.store_actor(actor_id, ActorType::Sensor(sensor));
        Ok(actor_id)
    }

    /// Issued one request at a time; each item keeps its own result
    #[instrument(name = "real_carla_spawn_batch", skip(self, requests), fields(count = requests.len()))]
    async fn spawn_batch(&self, requests: Vec<SpawnRequest>) -> Result<Vec<Result<ActorId>>> {
        if self.world.lock().is_none() {
            return Err(ActorFactoryError::not_connected());
        }
        Ok(requests
            .into_iter()
            .map(|request| self.spawn_request(request))
            .collect())
    }

    async fn start_walker(
        &self,
        controller: ActorId,
        destination: Location,
        max_speed: f64,
    ) -> Result<()> {
        let controller = self.controller(controller)?;
        controller.start();
        controller.go_to_location(&Self::to_carla_location(destination));
        controller.set_max_speed(max_speed as f32);
        Ok(())
    }

    async fn stop_walker(&self, controller: ActorId) -> Result<()> {
        if let Ok(controller) = self.controller(controller) {
            controller.stop();
        }
        Ok(())
    }

    #[instrument(name = "real_carla_destroy_actor", skip(self))]
    async fn destroy_actor(&self, actor_id: ActorId) -> Result<()> {
        let Some(actor) = self.actors.lock().remove(&actor_id) else {
            // Idempotent: return Ok even if not exists
            return Ok(());
        };

        let destroyed = match actor {
            ActorType::Vehicle(v) => v.destroy(),
            ActorType::Walker(w) => w.destroy(),
            ActorType::Controller(c) => c.destroy(),
            ActorType::Sensor(s) => {
                if s.is_listening() {
                    s.stop();
                }
                s.destroy()
            }
        };
        if !destroyed {
            warn!(actor_id, "destroy returned false");
        }
        Ok(())
    }

    fn sensor_source(&self, handle: &SensorHandle) -> Option<Box<dyn SensorSource>> {
        let sensor = match self.actors.lock().get(&handle.actor) {
            Some(ActorType::Sensor(sensor)) => sensor.clone(),
            _ => return None,
        };
        Some(Box::new(CarlaSensorSource::new(
            handle.name.clone(),
            handle.modality,
            sensor,
        )))
    }
}
