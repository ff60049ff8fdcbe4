//! Rig Enumerator
//!
//! Expands declarative camera groups into concrete placements, attaches them
//! to the ego vehicle and yields the index-aligned sensor and slot lists the
//! synchronizer and the sinks share.

use std::path::PathBuf;

use contracts::{
    ActorId, CameraIntrinsics, CameraSelection, ContractError, Modality, OutputLayout, OutputSlot,
    RigSpec, SensorHandle, SensorId, SensorSource, Transform,
};
use tracing::{error, info, instrument, warn};

use crate::client::SimulatorClient;
use crate::error::{ActorFactoryError, Result};

/// One camera to attach
#[derive(Debug, Clone, PartialEq)]
pub struct CameraPlacement {
    pub group: String,
    pub position: usize,
    pub modality: Modality,
    pub name: SensorId,
    pub transform: Transform,
    /// Blueprint attributes, including `role_name = name`
    pub attributes: Vec<(String, String)>,
    pub dir: PathBuf,
}

impl CameraPlacement {
    pub fn blueprint(&self) -> &'static str {
        self.modality.blueprint()
    }
}

/// Plan every camera of the selected groups.
///
/// Order: group (as declared) → modality (as declared) → position.
/// An unknown group name is a configuration error.
pub fn plan_rig(
    rigs: &[RigSpec],
    selection: &CameraSelection,
    layout: &OutputLayout,
    camera: &CameraIntrinsics,
) -> std::result::Result<Vec<CameraPlacement>, ContractError> {
    if let CameraSelection::Group(name) = selection {
        if !rigs.iter().any(|r| &r.name == name) {
            return Err(ContractError::config_validation(
                "camera_group",
                format!("unknown camera group '{name}'"),
            ));
        }
    }

    let mut placements = Vec::new();
    for rig in rigs.iter().filter(|r| selection.includes(&r.name)) {
        if !rig.has_consistent_axes() {
            return Err(ContractError::config_validation(
                format!("rigs[{}]", rig.name),
                "x_locs, y_locs and z_locs differ in length",
            ));
        }

        for &modality in &rig.sensor_types {
            for position in 0..rig.positions() {
                let name = SensorId::for_camera(&rig.name, position, modality.as_str());
                let mut attributes = camera.attributes();
                attributes.push(("role_name".to_string(), name.to_string()));

                placements.push(CameraPlacement {
                    group: rig.name.clone(),
                    position,
                    modality,
                    transform: Transform::mount(
                        rig.x_locs[position],
                        rig.y_locs[position],
                        rig.z_locs[position],
                        rig.rot_yaw,
                    ),
                    attributes,
                    dir: layout.camera_dir(&rig.name, position, modality),
                    name,
                });
            }
        }
    }

    Ok(placements)
}

/// Attached cameras, index-aligned with their output slots
#[derive(Debug, Clone, Default)]
pub struct Rig {
    pub sensors: Vec<SensorHandle>,
    pub slots: Vec<OutputSlot>,
}

impl Rig {
    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn actor_ids(&self) -> Vec<ActorId> {
        self.sensors.iter().map(|s| s.actor).collect()
    }

    /// Notification channels, in sensor order
    pub fn sources<C: SimulatorClient>(&self, client: &C) -> Result<Vec<Box<dyn SensorSource>>> {
        self.sensors
            .iter()
            .map(|handle| {
                client.sensor_source(handle).ok_or_else(|| {
                    ActorFactoryError::request(
                        "sensor_source",
                        format!("actor {} ({}) is not a live camera", handle.actor, handle.name),
                    )
                })
            })
            .collect()
    }
}

/// Attaches planned cameras to the ego vehicle
pub struct RigEnumerator;

impl RigEnumerator {
    /// Spawn every placement attached to `ego`.
    ///
    /// All-or-nothing: on the first failure the cameras attached so far are
    /// destroyed and the error is returned.
    #[instrument(name = "rig_attach", skip(client, placements), fields(cameras = placements.len()))]
    pub async fn attach<C: SimulatorClient>(
        client: &C,
        ego: ActorId,
        placements: &[CameraPlacement],
    ) -> Result<Rig> {
        let mut rig = Rig::default();

        for placement in placements {
            let spawned = client
                .spawn_sensor(
                    placement.blueprint(),
                    &placement.attributes,
                    placement.transform,
                    ego,
                )
                .await;

            match spawned {
                Ok(actor) => {
                    let handle = SensorHandle {
                        actor,
                        name: placement.name.clone(),
                        modality: placement.modality,
                    };
                    rig.slots.push(OutputSlot {
                        sensor: handle.clone(),
                        dir: placement.dir.clone(),
                    });
                    rig.sensors.push(handle);
                }
                Err(e) => {
                    warn!(sensor = %placement.name, error = %e, "camera attach failed, rolling back rig");
                    Self::rollback(client, &rig).await;
                    return Err(e);
                }
            }
        }

        info!(cameras = rig.len(), "rig attached");
        Ok(rig)
    }

    async fn rollback<C: SimulatorClient>(client: &C, rig: &Rig) {
        for handle in &rig.sensors {
            if let Err(e) = client.destroy_actor(handle.actor).await {
                error!(actor_id = handle.actor, sensor = %handle.name, error = %e, "failed to destroy camera");
            }
        }
    }
}
