//! ActorFactory 核心实现
//!
//! 负责 ego 车辆、相机 rig 和背景交通的 spawn，以及整体 teardown。

use contracts::{ActorId, CaptureConfig, RuntimeGraph};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use tracing::{error, info, instrument, warn};

use crate::client::SimulatorClient;
use crate::error::{ActorFactoryError, Result};
use crate::population::{recommended, Population, WorldPopulation};
use crate::rig::{plan_rig, Rig, RigEnumerator};

/// Actor Factory
///
/// Owns the simulator session for the duration of a run and records every
/// actor it creates in a [`RuntimeGraph`].
pub struct ActorFactory<C: SimulatorClient> {
    client: C,
}

impl<C: SimulatorClient> ActorFactory<C> {
    /// 创建新的 ActorFactory
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Random vehicle blueprint with a random recommended colour, dropped at
    /// a random spawn point with autopilot on.
    #[instrument(name = "actor_factory_spawn_ego", skip(self, rng))]
    pub async fn spawn_ego(&self, filter: &str, rng: &mut StdRng) -> Result<ActorId> {
        let blueprints = self.client.blueprints(filter).await?;
        let blueprint = blueprints
            .choose(rng)
            .ok_or_else(|| ActorFactoryError::NothingAvailable {
                what: "vehicle blueprint",
                filter: filter.to_string(),
            })?;

        let spawn_points = self.client.spawn_points().await?;
        let transform = *spawn_points
            .choose(rng)
            .ok_or_else(|| ActorFactoryError::NothingAvailable {
                what: "spawn point",
                filter: filter.to_string(),
            })?;

        let mut attributes: Vec<(String, String)> =
            recommended(blueprint, "color", rng).into_iter().collect();
        attributes.push(("role_name".to_string(), "hero".to_string()));

        info!(blueprint = %blueprint.id, "spawning ego vehicle");
        let actor_id = self
            .client
            .spawn_vehicle(&blueprint.id, &attributes, transform, true)
            .await?;

        info!(actor_id, "ego vehicle spawned");
        Ok(actor_id)
    }

    /// Spawn the ego vehicle, its camera rig and the background population.
    ///
    /// # 原子性保证
    /// The graph is all-or-nothing up to the population: if the rig fails
    /// the ego vehicle is destroyed again. Individual traffic and walker
    /// failures only shrink the population.
    #[instrument(name = "actor_factory_spawn_world", skip(self, config, rng))]
    pub async fn spawn_world(
        &self,
        config: &CaptureConfig,
        rng: &mut StdRng,
    ) -> Result<(RuntimeGraph, Rig)> {
        let placements = plan_rig(
            &config.rigs,
            &config.camera_group,
            &config.output_layout(),
            &config.camera,
        )?;

        let ego = self.spawn_ego(&config.population.ego_filter, rng).await?;
        let mut graph = RuntimeGraph::new();
        graph.ego = Some(ego);

        let rig = match RigEnumerator::attach(&self.client, ego, &placements).await {
            Ok(rig) => rig,
            Err(e) => {
                warn!(error = %e, "rig failed, rolling back ego vehicle");
                self.destroy_actor_safe(ego).await;
                return Err(e);
            }
        };
        graph.sensors = rig.actor_ids();

        let population = WorldPopulation::new(&self.client)
            .spawn(
                config.population.vehicles,
                config.population.pedestrians,
                &config.population.vehicle_filter,
                &config.population.walker_filter,
                rng,
            )
            .await;

        match population {
            Ok(Population { vehicles, walkers }) => {
                graph.vehicles = vehicles;
                graph.walkers = walkers;
            }
            Err(e) => {
                warn!(error = %e, "population failed, rolling back");
                self.teardown(&graph).await?;
                return Err(e);
            }
        }

        info!(actors = graph.actor_count(), cameras = rig.len(), "world ready");
        Ok((graph, rig))
    }

    /// 销毁 RuntimeGraph 中的所有 actors
    ///
    /// Order: sensors, ego, walker controllers (stopped first), walkers,
    /// traffic.
    ///
    /// # 幂等性
    /// 多次调用安全，不存在的 actor 会被忽略。
    #[instrument(
        name = "actor_factory_teardown",
        skip(self, graph),
        fields(actors = graph.actor_count())
    )]
    pub async fn teardown(&self, graph: &RuntimeGraph) -> Result<()> {
        info!("starting teardown");

        for pair in &graph.walkers {
            if let Err(e) = self.client.stop_walker(pair.controller).await {
                warn!(controller = pair.controller, error = %e, "failed to stop walker");
            }
        }

        for actor_id in graph.teardown_order() {
            self.destroy_actor_safe(actor_id).await;
        }

        info!("teardown completed");
        Ok(())
    }

    /// 安全销毁 actor（忽略错误，仅记录日志）
    async fn destroy_actor_safe(&self, actor_id: ActorId) {
        if let Err(e) = self.client.destroy_actor(actor_id).await {
            error!(actor_id, error = %e, "failed to destroy actor");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_client::{MockActorKind, MockConfig, MockSimulator};
    use contracts::{CameraSelection, WalkerPair};
    use rand::SeedableRng;
    use std::time::Duration;

    async fn factory(config: MockConfig) -> (ActorFactory<MockSimulator>, MockSimulator) {
        let mut sim = MockSimulator::with_config(config);
        sim.connect("localhost", 2000, Duration::from_secs(1))
            .await
            .unwrap();
        (ActorFactory::new(sim.clone()), sim)
    }

    fn small_config() -> CaptureConfig {
        let mut config = CaptureConfig::default();
        config.camera_group = CameraSelection::Group("ForwardCameras".into());
        config.population.vehicles = 4;
        config.population.pedestrians = 3;
        config
    }

    #[tokio::test]
    async fn test_spawn_ego() {
        let (factory, sim) = factory(MockConfig::default()).await;
        let mut rng = StdRng::seed_from_u64(1234);

        let ego = factory.spawn_ego("vehicle.*", &mut rng).await.unwrap();
        let actor = sim.actor(ego).unwrap();
        assert_eq!(actor.kind, MockActorKind::Vehicle { autopilot: true });
        assert!(actor.blueprint.starts_with("vehicle."));
        assert!(actor.attributes.contains_key("color"));
    }

    #[tokio::test]
    async fn test_spawn_ego_without_blueprint() {
        let (factory, _sim) = factory(MockConfig::default()).await;
        let mut rng = StdRng::seed_from_u64(1);
        let err = factory.spawn_ego("truck.*", &mut rng).await.unwrap_err();
        assert!(matches!(err, ActorFactoryError::NothingAvailable { .. }));
    }

    #[tokio::test]
    async fn test_spawn_world_and_teardown() {
        let (factory, sim) = factory(MockConfig::default()).await;
        let mut rng = StdRng::seed_from_u64(1234);

        let (graph, rig) = factory.spawn_world(&small_config(), &mut rng).await.unwrap();
        assert_eq!(rig.len(), 15);
        assert_eq!(graph.sensors.len(), 15);
        assert_eq!(graph.vehicles.len(), 4);
        assert_eq!(graph.walkers.len(), 3);
        assert_eq!(sim.actor_count(), graph.actor_count());

        factory.teardown(&graph).await.unwrap();
        assert_eq!(sim.actor_count(), 0);

        // Second teardown should also succeed
        factory.teardown(&graph).await.unwrap();
    }

    #[tokio::test]
    async fn test_rig_failure_rolls_back_ego() {
        let (factory, sim) = factory(MockConfig {
            fail_sensor_roles: vec!["ForwardCameras_03/depth".into()],
            ..Default::default()
        })
        .await;
        let mut rng = StdRng::seed_from_u64(1234);

        assert!(factory.spawn_world(&small_config(), &mut rng).await.is_err());
        assert_eq!(sim.actor_count(), 0);
    }

    #[tokio::test]
    async fn test_teardown_survives_destroy_failure() {
        let (factory, sim) = factory(MockConfig {
            fail_destroy: vec![1000],
            ..Default::default()
        })
        .await;

        let first = sim
            .spawn_vehicle("vehicle.audi.tt", &[], contracts::Transform::default(), true)
            .await
            .unwrap();
        let second = sim
            .spawn_vehicle("vehicle.audi.tt", &[], contracts::Transform::default(), true)
            .await
            .unwrap();
        assert_eq!(first, 1000);

        let graph = RuntimeGraph {
            vehicles: vec![first, second],
            ..Default::default()
        };
        factory.teardown(&graph).await.unwrap();
        assert_eq!(sim.actor_count(), 1);
        assert!(sim.actor(first).is_some());
    }

    #[tokio::test]
    async fn test_teardown_stops_walkers() {
        let (factory, sim) = factory(MockConfig::default()).await;
        let mut rng = StdRng::seed_from_u64(5);
        let walkers = WorldPopulation::new(&sim)
            .spawn_walkers(2, "walker.pedestrian.*", &mut rng)
            .await
            .unwrap();
        let controller = walkers[0].controller;
        assert!(sim.walker_target(controller).is_some());

        let graph = RuntimeGraph {
            walkers: walkers.clone(),
            ..Default::default()
        };
        factory.teardown(&graph).await.unwrap();
        assert!(sim.walker_target(controller).is_none());
        assert!(walkers
            .iter()
            .all(|WalkerPair { walker, .. }| sim.actor(*walker).is_none()));
    }
}
