//! RuntimeGraph - actors owned by one capture run

/// Simulator actor handle type
pub type ActorId = u32;

/// A pedestrian and the AI controller steering it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkerPair {
    pub walker: ActorId,
    pub controller: ActorId,
}

/// Every actor spawned for the run, grouped by teardown stage.
#[derive(Debug, Clone, Default)]
pub struct RuntimeGraph {
    pub ego: Option<ActorId>,

    /// Cameras, in rig order
    pub sensors: Vec<ActorId>,

    /// Autopilot traffic
    pub vehicles: Vec<ActorId>,

    pub walkers: Vec<WalkerPair>,
}

impl RuntimeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of managed actors
    pub fn actor_count(&self) -> usize {
        usize::from(self.ego.is_some())
            + self.sensors.len()
            + self.vehicles.len()
            + self.walkers.len() * 2
    }

    /// All actor ids in teardown order: sensors, ego, controllers, walkers,
    /// traffic.
    pub fn teardown_order(&self) -> Vec<ActorId> {
        let mut ids = Vec::with_capacity(self.actor_count());
        ids.extend(&self.sensors);
        ids.extend(self.ego);
        ids.extend(self.walkers.iter().map(|p| p.controller));
        ids.extend(self.walkers.iter().map(|p| p.walker));
        ids.extend(&self.vehicles);
        ids
    }
}
