//! Moves models by their velocity.

use components::{Pose, Velocity};
use sim_component::{Entity, EntityComponentManager};
use sim_system::{Capabilities, System, SystemError, UpdateInfo};

/// Integrates [`Pose`] by [`Velocity`] every unpaused step.
#[derive(Debug, Default)]
pub struct Kinematics;

impl System for Kinematics {
    fn name(&self) -> &str {
        "kinematics"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE.with_update()
    }

    fn update(
        &mut self,
        info: &UpdateInfo,
        ecm: &mut EntityComponentManager,
    ) -> Result<(), SystemError> {
        if info.paused {
            return Ok(());
        }
        let dt = info.dt.as_secs_f32();
        let moving: Vec<(Entity, Velocity)> = ecm
            .each::<Velocity>()
            .filter(|(_, v)| **v != Velocity::ZERO)
            .map(|(e, v)| (e, *v))
            .collect();
        for (entity, velocity) in moving {
            if let Some(pose) = ecm.component_mut::<Pose>(entity) {
                *pose = pose.integrated(&velocity, dt);
            }
        }
        Ok(())
    }
}
