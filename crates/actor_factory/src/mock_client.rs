//! Mock simulator 客户端
//!
//! 用于单元测试和无 CARLA 环境运行的进程内实现，支持注入失败场景。
//! Stepping follows the synchronous-mode contract: every `tick` advances the
//! frame counter by one and feeds the new StepId to every listening camera.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{
    ActorId, ContractError, Location, Modality, SensorHandle, SensorId, SensorSource, StepId,
    Transform, WeatherPreset, WorldSettings,
};
use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use crate::client::{BlueprintInfo, SimulatorClient, SpawnRequest, WALKER_CONTROLLER_BLUEPRINT};
use crate::error::{ActorFactoryError, Result};
use crate::mock_sensor::{MockCamera, MockCameraBehavior, StepTick};

/// Frame counter value before the first tick; non-zero so tests never
/// confuse a StepId with a loop counter.
const FIRST_FRAME: u64 = 40_000;

/// A camera that stops delivering after a number of samples
#[derive(Debug, Clone)]
pub struct SensorSilence {
    /// `role_name` attribute of the camera (its sensor name)
    pub role_name: String,
    pub after_samples: u64,
}

/// A camera whose samples carry another camera's name
#[derive(Debug, Clone)]
pub struct SensorCrossWire {
    pub role_name: String,
    pub reports_as: String,
}

/// Mock 客户端配置
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Blueprints whose spawns always fail
    pub fail_blueprints: Vec<String>,
    /// Sensor `role_name`s whose spawn fails
    pub fail_sensor_roles: Vec<String>,
    /// Positions inside every batch that fail
    pub fail_batch_items: Vec<usize>,
    /// 应该失败的 destroy actor IDs
    pub fail_destroy: Vec<ActorId>,
    /// Refuse the connection
    pub fail_connect: bool,
    /// Number of recommended spawn points on the map
    pub spawn_points: usize,
    /// Every n-th navigation query misses (0 = never)
    pub navigation_miss_every: usize,
    pub silent_sensors: Vec<SensorSilence>,
    pub crossed_sensors: Vec<SensorCrossWire>,
    /// Cameras re-send the previous step before each new one
    pub replay_previous: bool,
    pub delivery_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            fail_blueprints: Vec::new(),
            fail_sensor_roles: Vec::new(),
            fail_batch_items: Vec::new(),
            fail_destroy: Vec::new(),
            fail_connect: false,
            spawn_points: 200,
            navigation_miss_every: 0,
            silent_sensors: Vec::new(),
            crossed_sensors: Vec::new(),
            replay_previous: false,
            delivery_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }
}

/// Actor kind as tracked by the mock world
#[derive(Debug, Clone, PartialEq)]
pub enum MockActorKind {
    Vehicle { autopilot: bool },
    Sensor { parent: ActorId },
    Walker,
    WalkerController { walker: ActorId },
}

/// One live actor of the mock world
#[derive(Debug, Clone)]
pub struct MockActor {
    pub blueprint: String,
    pub kind: MockActorKind,
    pub transform: Transform,
    pub attributes: HashMap<String, String>,
}

/// AI controller state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkerTarget {
    pub destination: Location,
    pub max_speed: f64,
}

struct Inner {
    config: MockConfig,
    connected: AtomicBool,
    next_actor_id: AtomicU32,
    frame: AtomicU64,
    nav_queries: AtomicUsize,
    /// Remaining `apply_settings` calls that fail
    failing_settings: AtomicUsize,
    actors: Mutex<HashMap<ActorId, MockActor>>,
    settings: Mutex<WorldSettings>,
    settings_history: Mutex<Vec<WorldSettings>>,
    feeds: Mutex<HashMap<ActorId, async_channel::Sender<StepTick>>>,
    walkers: Mutex<HashMap<ActorId, WalkerTarget>>,
    town: Mutex<Option<String>>,
    weather: Mutex<Option<WeatherPreset>>,
}

/// Mock simulator
///
/// Cheap to clone; clones share the same world, so a test can keep one
/// handle for inspection while the pipeline owns another.
#[derive(Clone)]
pub struct MockSimulator {
    inner: Arc<Inner>,
}

impl MockSimulator {
    /// 创建默认 mock 客户端
    pub fn new() -> Self {
        Self::with_config(MockConfig::default())
    }

    /// 使用配置创建 mock 客户端
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                connected: AtomicBool::new(false),
                next_actor_id: AtomicU32::new(1000), // 从 1000 开始，便于识别
                frame: AtomicU64::new(FIRST_FRAME),
                nav_queries: AtomicUsize::new(0),
                failing_settings: AtomicUsize::new(0),
                actors: Mutex::new(HashMap::new()),
                settings: Mutex::new(WorldSettings::default()),
                settings_history: Mutex::new(Vec::new()),
                feeds: Mutex::new(HashMap::new()),
                walkers: Mutex::new(HashMap::new()),
                town: Mutex::new(None),
                weather: Mutex::new(None),
            }),
        }
    }

    /// 获取当前已创建的 actor 数量
    pub fn actor_count(&self) -> usize {
        self.inner.actors.lock().len()
    }

    pub fn actor(&self, actor_id: ActorId) -> Option<MockActor> {
        self.inner.actors.lock().get(&actor_id).cloned()
    }

    /// Live actors matching a predicate on their kind
    pub fn count_actors(&self, pred: impl Fn(&MockActorKind) -> bool) -> usize {
        self.inner
            .actors
            .lock()
            .values()
            .filter(|a| pred(&a.kind))
            .count()
    }

    /// Current stepping configuration
    pub fn current_settings(&self) -> WorldSettings {
        self.inner.settings.lock().clone()
    }

    /// The next `n` settings writes are rejected
    pub fn fail_next_settings(&self, n: usize) {
        self.inner.failing_settings.store(n, Ordering::SeqCst);
    }

    /// Every settings value applied so far, in order
    pub fn settings_history(&self) -> Vec<WorldSettings> {
        self.inner.settings_history.lock().clone()
    }

    /// Number of ticks served
    pub fn tick_count(&self) -> u64 {
        self.inner.frame.load(Ordering::SeqCst) - FIRST_FRAME
    }

    pub fn last_step(&self) -> StepId {
        StepId(self.inner.frame.load(Ordering::SeqCst))
    }

    pub fn walker_target(&self, controller: ActorId) -> Option<WalkerTarget> {
        self.inner.walkers.lock().get(&controller).copied()
    }

    pub fn town(&self) -> Option<String> {
        self.inner.town.lock().clone()
    }

    pub fn weather(&self) -> Option<WeatherPreset> {
        *self.inner.weather.lock()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.inner.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ActorFactoryError::not_connected())
        }
    }

    fn allocate_actor_id(&self) -> ActorId {
        self.inner.next_actor_id.fetch_add(1, Ordering::SeqCst)
    }

    fn insert_actor(&self, actor: MockActor) -> ActorId {
        let actor_id = self.allocate_actor_id();
        self.inner.actors.lock().insert(actor_id, actor);
        actor_id
    }

    fn check_blueprint(&self, blueprint: &str) -> Result<()> {
        if self.inner.config.fail_blueprints.iter().any(|b| b == blueprint) {
            return Err(ActorFactoryError::spawn(blueprint, "mock failure"));
        }
        Ok(())
    }

    fn spawn_one(&self, request: SpawnRequest) -> Result<ActorId> {
        self.check_blueprint(request.blueprint())?;
        let actor = match request {
            SpawnRequest::Vehicle {
                blueprint,
                attributes,
                transform,
                autopilot,
            } => MockActor {
                blueprint,
                kind: MockActorKind::Vehicle { autopilot },
                transform,
                attributes: attributes.into_iter().collect(),
            },
            SpawnRequest::Walker {
                blueprint,
                attributes,
                transform,
            } => MockActor {
                blueprint,
                kind: MockActorKind::Walker,
                transform,
                attributes: attributes.into_iter().collect(),
            },
            SpawnRequest::WalkerController { walker } => {
                let parent_ok = matches!(
                    self.actor(walker).map(|a| a.kind),
                    Some(MockActorKind::Walker)
                );
                if !parent_ok {
                    return Err(ActorFactoryError::spawn(
                        WALKER_CONTROLLER_BLUEPRINT,
                        format!("walker {walker} not found"),
                    ));
                }
                MockActor {
                    blueprint: WALKER_CONTROLLER_BLUEPRINT.to_string(),
                    kind: MockActorKind::WalkerController { walker },
                    transform: Transform::default(),
                    attributes: HashMap::new(),
                }
            }
        };
        Ok(self.insert_actor(actor))
    }

    fn behavior_for(&self, role_name: &str, actor_id: ActorId) -> MockCameraBehavior {
        let config = &self.inner.config;
        MockCameraBehavior {
            delivery_delay: config.delivery_delay,
            max_jitter: config.max_jitter,
            silence_after: config
                .silent_sensors
                .iter()
                .find(|s| s.role_name == role_name)
                .map(|s| s.after_samples),
            replay_previous: config.replay_previous,
            report_as: config
                .crossed_sensors
                .iter()
                .find(|c| c.role_name == role_name)
                .map(|c| SensorId::new(&c.reports_as)),
            seed: u64::from(actor_id),
        }
    }

    fn stock_blueprints() -> Vec<BlueprintInfo> {
        let colors = ["255,255,255", "0,0,0", "180,20,20", "20,60,160"];
        vec![
            BlueprintInfo::new("vehicle.audi.tt").with_values("color", &colors),
            BlueprintInfo::new("vehicle.tesla.model3")
                .with_values("color", &colors)
                .with_values("driver_id", &["0", "1"]),
            BlueprintInfo::new("vehicle.lincoln.mkz_2017").with_values("color", &colors),
            BlueprintInfo::new("walker.pedestrian.0001"),
            BlueprintInfo::new("walker.pedestrian.0002"),
            BlueprintInfo::new("walker.pedestrian.0003"),
            BlueprintInfo::new("sensor.camera.rgb"),
            BlueprintInfo::new("sensor.camera.depth"),
            BlueprintInfo::new("sensor.camera.semantic_segmentation"),
            BlueprintInfo::new(WALKER_CONTROLLER_BLUEPRINT),
        ]
    }
}

impl Default for MockSimulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Wildcard match supporting `*` anywhere in the pattern
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }
    let mut rest = text;
    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

impl contracts::SteppedWorld for MockSimulator {
    async fn settings(&self) -> std::result::Result<WorldSettings, ContractError> {
        self.ensure_connected()?;
        Ok(self.current_settings())
    }

    #[instrument(name = "mock_sim_apply_settings", skip(self), fields(sync = settings.synchronous_mode))]
    async fn apply_settings(
        &self,
        settings: &WorldSettings,
    ) -> std::result::Result<(), ContractError> {
        self.ensure_connected()?;
        let failing = self.inner.failing_settings.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |n| n.checked_sub(1),
        );
        if failing.is_ok() {
            return Err(ContractError::simulator(
                "apply_settings",
                "settings rejected by the server",
            ));
        }
        *self.inner.settings.lock() = settings.clone();
        self.inner.settings_history.lock().push(settings.clone());
        Ok(())
    }

    async fn tick(&self) -> std::result::Result<StepId, ContractError> {
        self.ensure_connected()?;
        let frame = self.inner.frame.fetch_add(1, Ordering::SeqCst) + 1;
        let step = StepId(frame);
        let delta = self
            .inner
            .settings
            .lock()
            .fixed_delta_seconds
            .unwrap_or(0.05);
        let tick = StepTick {
            step,
            timestamp: (frame - FIRST_FRAME) as f64 * delta,
        };

        let feeds = self.inner.feeds.lock();
        for (actor_id, feed) in feeds.iter() {
            if feed.try_send(tick).is_err() {
                debug!(actor_id, "camera feed closed");
            }
        }
        Ok(step)
    }
}

impl SimulatorClient for MockSimulator {
    #[instrument(name = "mock_sim_connect", skip(self, timeout))]
    async fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> Result<()> {
        let _ = timeout;
        if self.inner.config.fail_connect {
            return Err(ActorFactoryError::ConnectionFailed {
                message: format!("mock refused connection to {host}:{port}"),
            });
        }
        self.inner.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn load_world(&self, town: &str) -> Result<()> {
        self.ensure_connected()?;
        *self.inner.town.lock() = Some(town.to_string());
        Ok(())
    }

    async fn set_weather(&self, preset: WeatherPreset) -> Result<()> {
        self.ensure_connected()?;
        *self.inner.weather.lock() = Some(preset);
        Ok(())
    }

    async fn blueprints(&self, filter: &str) -> Result<Vec<BlueprintInfo>> {
        self.ensure_connected()?;
        Ok(Self::stock_blueprints()
            .into_iter()
            .filter(|bp| wildcard_match(filter, &bp.id))
            .collect())
    }

    async fn spawn_points(&self) -> Result<Vec<Transform>> {
        self.ensure_connected()?;
        Ok((0..self.inner.config.spawn_points)
            .map(|i| {
                Transform::mount(
                    (i % 20) as f64 * 10.0,
                    (i / 20) as f64 * 10.0,
                    0.3,
                    ((i * 90) % 360) as f64,
                )
            })
            .collect())
    }

    async fn random_navigation_location(&self) -> Result<Option<Location>> {
        self.ensure_connected()?;
        let n = self.inner.nav_queries.fetch_add(1, Ordering::SeqCst) + 1;
        let every = self.inner.config.navigation_miss_every;
        if every > 0 && n % every == 0 {
            return Ok(None);
        }
        Ok(Some(Location {
            x: (n % 50) as f64 * 2.0,
            y: (n / 50) as f64 * 2.0,
            z: 0.5,
        }))
    }

    #[instrument(name = "mock_sim_spawn_vehicle", skip(self, attributes, transform))]
    async fn spawn_vehicle(
        &self,
        blueprint: &str,
        attributes: &[(String, String)],
        transform: Transform,
        autopilot: bool,
    ) -> Result<ActorId> {
        self.ensure_connected()?;
        self.spawn_one(SpawnRequest::Vehicle {
            blueprint: blueprint.to_string(),
            attributes: attributes.to_vec(),
            transform,
            autopilot,
        })
    }

    #[instrument(name = "mock_sim_spawn_sensor", skip(self, attributes, transform))]
    async fn spawn_sensor(
        &self,
        blueprint: &str,
        attributes: &[(String, String)],
        transform: Transform,
        parent: ActorId,
    ) -> Result<ActorId> {
        self.ensure_connected()?;
        self.check_blueprint(blueprint)?;

        // 验证 parent 存在
        if self.actor(parent).is_none() {
            return Err(ActorFactoryError::AttachFailed {
                sensor_id: blueprint.to_string(),
                parent,
                message: "parent actor not found".into(),
            });
        }

        let attributes: HashMap<String, String> = attributes.iter().cloned().collect();
        if let Some(role) = attributes.get("role_name") {
            if self.inner.config.fail_sensor_roles.contains(role) {
                return Err(ActorFactoryError::AttachFailed {
                    sensor_id: role.clone(),
                    parent,
                    message: "mock failure".into(),
                });
            }
        }

        Ok(self.insert_actor(MockActor {
            blueprint: blueprint.to_string(),
            kind: MockActorKind::Sensor { parent },
            transform,
            attributes,
        }))
    }

    #[instrument(name = "mock_sim_spawn_batch", skip(self, requests), fields(count = requests.len()))]
    async fn spawn_batch(&self, requests: Vec<SpawnRequest>) -> Result<Vec<Result<ActorId>>> {
        self.ensure_connected()?;
        let fail = &self.inner.config.fail_batch_items;
        Ok(requests
            .into_iter()
            .enumerate()
            .map(|(i, request)| {
                if fail.contains(&i) {
                    Err(ActorFactoryError::spawn(request.blueprint(), "mock batch failure"))
                } else {
                    self.spawn_one(request)
                }
            })
            .collect())
    }

    async fn start_walker(
        &self,
        controller: ActorId,
        destination: Location,
        max_speed: f64,
    ) -> Result<()> {
        self.ensure_connected()?;
        match self.actor(controller).map(|a| a.kind) {
            Some(MockActorKind::WalkerController { .. }) => {
                self.inner.walkers.lock().insert(
                    controller,
                    WalkerTarget {
                        destination,
                        max_speed,
                    },
                );
                Ok(())
            }
            _ => Err(ActorFactoryError::request(
                "start_walker",
                format!("actor {controller} is not a walker controller"),
            )),
        }
    }

    async fn stop_walker(&self, controller: ActorId) -> Result<()> {
        self.inner.walkers.lock().remove(&controller);
        Ok(())
    }

    #[instrument(name = "mock_sim_destroy_actor", skip(self))]
    async fn destroy_actor(&self, actor_id: ActorId) -> Result<()> {
        if self.inner.config.fail_destroy.contains(&actor_id) {
            return Err(ActorFactoryError::DestroyFailed {
                actor_id,
                message: "mock failure".into(),
            });
        }

        // 幂等：即使不存在也返回 Ok；关闭 feed 让相机线程退出
        self.inner.feeds.lock().remove(&actor_id);
        self.inner.walkers.lock().remove(&actor_id);
        self.inner.actors.lock().remove(&actor_id);
        Ok(())
    }

    fn sensor_source(&self, handle: &SensorHandle) -> Option<Box<dyn SensorSource>> {
        let actor = self.actor(handle.actor)?;
        if !matches!(actor.kind, MockActorKind::Sensor { .. }) {
            warn!(actor_id = handle.actor, "actor is not a sensor");
            return None;
        }
        if Modality::from_blueprint(&actor.blueprint) != Some(handle.modality) {
            warn!(actor_id = handle.actor, blueprint = %actor.blueprint, "modality mismatch");
            return None;
        }

        let dim = |key: &str, fallback: u32| {
            actor
                .attributes
                .get(key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(fallback)
        };
        let size = (dim("image_size_x", 800), dim("image_size_y", 600));

        let (tx, rx) = async_channel::unbounded();
        self.inner.feeds.lock().insert(handle.actor, tx);

        Some(Box::new(MockCamera::new(
            handle.name.clone(),
            handle.modality,
            size,
            rx,
            self.behavior_for(handle.name.as_str(), handle.actor),
        )))
    }
}
