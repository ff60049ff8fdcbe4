//! World Population
//!
//! Autopilot traffic and AI-driven pedestrians around the ego vehicle.
//! Individual spawn failures are logged and the actor is left out; only a
//! failed batch request as a whole is an error.

use contracts::{ActorId, Location, Transform, WalkerPair};
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use tracing::{error, info, instrument, warn};

use crate::client::{BlueprintInfo, SimulatorClient, SpawnRequest};
use crate::error::{ActorFactoryError, Result};

/// Role name CARLA's traffic manager uses for background vehicles
pub const TRAFFIC_ROLE: &str = "autopilot";

/// Navigation queries per walker destination before the walker is left idle
const DESTINATION_ATTEMPTS: usize = 3;

/// Walkers and controllers that spawned successfully
#[derive(Debug, Clone, Default)]
pub struct Population {
    pub vehicles: Vec<ActorId>,
    pub walkers: Vec<WalkerPair>,
}

impl Population {
    pub fn actor_count(&self) -> usize {
        self.vehicles.len() + self.walkers.len() * 2
    }
}

/// Random blueprint attribute value among the recommended ones
pub(crate) fn recommended(
    blueprint: &BlueprintInfo,
    attribute: &str,
    rng: &mut StdRng,
) -> Option<(String, String)> {
    blueprint
        .recommended_values(attribute)
        .choose(rng)
        .map(|v| (attribute.to_string(), v.clone()))
}

/// Spawns and despawns the background population
pub struct WorldPopulation<'a, C: SimulatorClient> {
    client: &'a C,
}

impl<'a, C: SimulatorClient> WorldPopulation<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Spawn `vehicles` autopilot cars and `pedestrians` walkers.
    #[instrument(name = "population_spawn", skip(self, rng))]
    pub async fn spawn(
        &self,
        vehicles: usize,
        pedestrians: usize,
        vehicle_filter: &str,
        walker_filter: &str,
        rng: &mut StdRng,
    ) -> Result<Population> {
        let vehicles = self.spawn_traffic(vehicles, vehicle_filter, rng).await?;
        let walkers = self.spawn_walkers(pedestrians, walker_filter, rng).await?;

        let population = Population { vehicles, walkers };
        info!(
            vehicles = population.vehicles.len(),
            walkers = population.walkers.len(),
            "world populated"
        );
        Ok(population)
    }

    /// Autopilot traffic, one car per spawn point at most
    pub async fn spawn_traffic(
        &self,
        count: usize,
        filter: &str,
        rng: &mut StdRng,
    ) -> Result<Vec<ActorId>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let blueprints = self.client.blueprints(filter).await?;
        if blueprints.is_empty() {
            return Err(ActorFactoryError::NothingAvailable {
                what: "vehicle blueprint",
                filter: filter.to_string(),
            });
        }

        let mut spawn_points = self.client.spawn_points().await?;
        spawn_points.shuffle(rng);
        if count > spawn_points.len() {
            warn!(
                requested = count,
                available = spawn_points.len(),
                "not enough spawn points for traffic"
            );
        }

        let mut requests = Vec::with_capacity(count.min(spawn_points.len()));
        for transform in spawn_points.into_iter().take(count) {
            let Some(blueprint) = blueprints.choose(rng) else {
                break;
            };
            let mut attributes: Vec<(String, String)> = ["color", "driver_id"]
                .iter()
                .filter_map(|attr| recommended(blueprint, attr, rng))
                .collect();
            attributes.push(("role_name".to_string(), TRAFFIC_ROLE.to_string()));

            requests.push(SpawnRequest::Vehicle {
                blueprint: blueprint.id.clone(),
                attributes,
                transform,
                autopilot: true,
            });
        }

        Ok(self.collect_batch("vehicle", requests).await?.into_iter().flatten().collect())
    }

    /// Pedestrians with AI controllers walking to random destinations
    pub async fn spawn_walkers(
        &self,
        count: usize,
        filter: &str,
        rng: &mut StdRng,
    ) -> Result<Vec<WalkerPair>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let blueprints = self.client.blueprints(filter).await?;
        if blueprints.is_empty() {
            return Err(ActorFactoryError::NothingAvailable {
                what: "walker blueprint",
                filter: filter.to_string(),
            });
        }

        let mut requests = Vec::with_capacity(count);
        for _ in 0..count {
            // misses on the navigation mesh are skipped
            let Some(location) = self.client.random_navigation_location().await? else {
                continue;
            };
            let Some(blueprint) = blueprints.choose(rng) else {
                break;
            };
            requests.push(SpawnRequest::Walker {
                blueprint: blueprint.id.clone(),
                attributes: vec![("is_invincible".to_string(), "false".to_string())],
                transform: Transform::at(location),
            });
        }

        let walkers: Vec<ActorId> = self
            .collect_batch("walker", requests)
            .await?
            .into_iter()
            .flatten()
            .collect();

        let controller_requests = walkers
            .iter()
            .map(|&walker| SpawnRequest::WalkerController { walker })
            .collect();
        let controllers = self.collect_batch("walker controller", controller_requests).await?;

        let mut pairs = Vec::with_capacity(walkers.len());
        for (walker, controller) in walkers.into_iter().zip(controllers) {
            match controller {
                Some(controller) => pairs.push(WalkerPair { walker, controller }),
                // no controller, no walker
                None => self.destroy_logged(walker).await,
            }
        }

        for pair in &pairs {
            let max_speed = 1.0 + rng.random::<f64>();
            let Some(destination) = self.walker_destination().await? else {
                warn!(
                    controller = pair.controller,
                    "no navigation point for walker, left standing"
                );
                metrics::counter!("carla_capture_idle_walkers_total").increment(1);
                continue;
            };
            if let Err(e) = self
                .client
                .start_walker(pair.controller, destination, max_speed)
                .await
            {
                error!(controller = pair.controller, error = %e, "failed to start walker");
            }
        }

        Ok(pairs)
    }

    /// Stop controllers, then destroy controllers, walkers and traffic
    #[instrument(name = "population_despawn", skip(self, population), fields(actors = population.actor_count()))]
    pub async fn despawn(&self, population: &Population) {
        for pair in &population.walkers {
            if let Err(e) = self.client.stop_walker(pair.controller).await {
                warn!(controller = pair.controller, error = %e, "failed to stop walker");
            }
        }
        for pair in &population.walkers {
            self.destroy_logged(pair.controller).await;
        }
        for pair in &population.walkers {
            self.destroy_logged(pair.walker).await;
        }
        for &vehicle in &population.vehicles {
            self.destroy_logged(vehicle).await;
        }
    }

    /// Submit a batch; failed items are logged and become `None`
    async fn collect_batch(
        &self,
        what: &'static str,
        requests: Vec<SpawnRequest>,
    ) -> Result<Vec<Option<ActorId>>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let results = self.client.spawn_batch(requests).await?;
        let mut failures = 0usize;
        let ids = results
            .into_iter()
            .map(|result| match result {
                Ok(id) => Some(id),
                Err(e) => {
                    failures += 1;
                    error!(what, error = %e, "batch spawn failed");
                    None
                }
            })
            .collect();

        if failures > 0 {
            metrics::counter!("carla_capture_spawn_failures_total", "kind" => what)
                .increment(failures as u64);
        }
        Ok(ids)
    }

    /// Random point on the sidewalk mesh; `None` after repeated misses
    async fn walker_destination(&self) -> Result<Option<Location>> {
        for _ in 0..DESTINATION_ATTEMPTS {
            if let Some(location) = self.client.random_navigation_location().await? {
                return Ok(Some(location));
            }
        }
        Ok(None)
    }

    async fn destroy_logged(&self, actor_id: ActorId) {
        if let Err(e) = self.client.destroy_actor(actor_id).await {
            error!(actor_id, error = %e, "failed to destroy actor");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_client::{MockActorKind, MockConfig, MockSimulator};
    use rand::SeedableRng;
    use std::time::Duration;

    async fn sim(config: MockConfig) -> MockSimulator {
        let mut sim = MockSimulator::with_config(config);
        sim.connect("localhost", 2000, Duration::from_secs(1))
            .await
            .unwrap();
        sim
    }

    #[tokio::test]
    async fn test_traffic_batch_with_one_failure() {
        let sim = sim(MockConfig {
            fail_batch_items: vec![4],
            ..Default::default()
        })
        .await;
        let mut rng = StdRng::seed_from_u64(1234);

        let vehicles = WorldPopulation::new(&sim)
            .spawn_traffic(10, "vehicle.*", &mut rng)
            .await
            .unwrap();

        assert_eq!(vehicles.len(), 9);
        assert_eq!(sim.actor_count(), 9);
        let car = sim.actor(vehicles[0]).unwrap();
        assert_eq!(car.kind, MockActorKind::Vehicle { autopilot: true });
        assert_eq!(car.attributes.get("role_name").map(String::as_str), Some(TRAFFIC_ROLE));
        assert!(car.attributes.contains_key("color"));
    }

    #[tokio::test]
    async fn test_traffic_capped_by_spawn_points() {
        let sim = sim(MockConfig {
            spawn_points: 5,
            ..Default::default()
        })
        .await;
        let mut rng = StdRng::seed_from_u64(1);
        let vehicles = WorldPopulation::new(&sim)
            .spawn_traffic(20, "vehicle.*", &mut rng)
            .await
            .unwrap();
        assert_eq!(vehicles.len(), 5);
    }

    #[tokio::test]
    async fn test_unknown_filter() {
        let sim = sim(MockConfig::default()).await;
        let mut rng = StdRng::seed_from_u64(1);
        let err = WorldPopulation::new(&sim)
            .spawn_traffic(3, "bicycle.*", &mut rng)
            .await
            .unwrap_err();
        assert!(matches!(err, ActorFactoryError::NothingAvailable { .. }));
    }

    #[tokio::test]
    async fn test_walkers_get_controllers() {
        let sim = sim(MockConfig {
            navigation_miss_every: 4,
            ..Default::default()
        })
        .await;
        let mut rng = StdRng::seed_from_u64(7);

        let walkers = WorldPopulation::new(&sim)
            .spawn_walkers(8, "walker.pedestrian.*", &mut rng)
            .await
            .unwrap();

        // 2 of 8 navigation queries miss
        assert_eq!(walkers.len(), 6);
        for pair in &walkers {
            let walker = sim.actor(pair.walker).unwrap();
            assert_eq!(
                walker.attributes.get("is_invincible").map(String::as_str),
                Some("false")
            );
            let target = sim.walker_target(pair.controller).unwrap();
            assert!((1.0..2.0).contains(&target.max_speed));
            // destination query 12 misses and is asked again
            assert_ne!(target.destination, Location::default());
        }
    }

    #[tokio::test]
    async fn test_no_destination_after_repeated_misses() {
        let blind = sim(MockConfig {
            navigation_miss_every: 1,
            ..Default::default()
        })
        .await;
        let destination = WorldPopulation::new(&blind).walker_destination().await;
        assert_eq!(destination.unwrap(), None);

        let normal = sim(MockConfig::default()).await;
        let destination = WorldPopulation::new(&normal).walker_destination().await;
        assert!(destination.unwrap().is_some_and(|l| l != Location::default()));
    }

    #[tokio::test]
    async fn test_despawn_removes_everything() {
        let sim = sim(MockConfig::default()).await;
        let mut rng = StdRng::seed_from_u64(3);
        let population = WorldPopulation::new(&sim);

        let spawned = population
            .spawn(5, 4, "vehicle.*", "walker.pedestrian.*", &mut rng)
            .await
            .unwrap();
        assert_eq!(spawned.actor_count(), 5 + 4 * 2);
        assert_eq!(sim.actor_count(), spawned.actor_count());

        population.despawn(&spawned).await;
        assert_eq!(sim.actor_count(), 0);
        assert!(sim.walker_target(spawned.walkers[0].controller).is_none());
    }
}
