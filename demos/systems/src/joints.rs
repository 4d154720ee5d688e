//! Joint state systems.
//!
//! [`JointResetApplier`] consumes reset commands in pre-update so that
//! [`JointIntegrator`] integrates from the commanded state in the same step.

use components::{JointAxis, JointAxis2, JointPosition, JointPositionReset, JointVelocity, JointVelocityReset};
use sim_component::{Entity, EntityComponentManager};
use sim_system::{Capabilities, System, SystemError, UpdateInfo};
use tracing::debug;

/// Applies [`JointPositionReset`] and [`JointVelocityReset`] commands, then
/// removes them.
#[derive(Debug, Default)]
pub struct JointResetApplier;

impl System for JointResetApplier {
    fn name(&self) -> &str {
        "joint_reset"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE.with_pre_update()
    }

    fn pre_update(
        &mut self,
        info: &UpdateInfo,
        ecm: &mut EntityComponentManager,
    ) -> Result<(), SystemError> {
        let positions: Vec<(Entity, Vec<f64>)> = ecm
            .each::<JointPositionReset>()
            .map(|(e, r)| (e, r.0.clone()))
            .collect();
        for (joint, mut values) in positions {
            clamp_to_axes(ecm, joint, &mut values);
            ecm.set_component(joint, JointPosition(values));
            ecm.remove_component::<JointPositionReset>(joint);
            debug!(iteration = info.iterations, %joint, "applied joint position reset");
        }

        let velocities: Vec<(Entity, Vec<f64>)> = ecm
            .each::<JointVelocityReset>()
            .map(|(e, r)| (e, r.0.clone()))
            .collect();
        for (joint, values) in velocities {
            ecm.set_component(joint, JointVelocity(values));
            ecm.remove_component::<JointVelocityReset>(joint);
            debug!(iteration = info.iterations, %joint, "applied joint velocity reset");
        }
        Ok(())
    }
}

/// Advances joint positions by their velocities, respecting axis limits.
#[derive(Debug, Default)]
pub struct JointIntegrator;

impl System for JointIntegrator {
    fn name(&self) -> &str {
        "joint_integrator"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE.with_update()
    }

    fn update(
        &mut self,
        info: &UpdateInfo,
        ecm: &mut EntityComponentManager,
    ) -> Result<(), SystemError> {
        if info.paused || info.dt.is_zero() {
            return Ok(());
        }
        let dt = info.dt.as_secs_f64();

        let moving: Vec<(Entity, Vec<f64>)> = ecm
            .each::<JointVelocity>()
            .filter(|(_, v)| v.0.iter().any(|x| *x != 0.0))
            .map(|(e, v)| (e, v.0.clone()))
            .collect();

        for (joint, velocity) in moving {
            let Some(current) = ecm.get_component::<JointPosition>(joint) else {
                continue;
            };
            let mut next: Vec<f64> = current
                .0
                .iter()
                .zip(velocity.iter().chain(std::iter::repeat(&0.0)))
                .map(|(p, v)| p + v * dt)
                .collect();
            clamp_to_axes(ecm, joint, &mut next);
            if next != current.0 {
                ecm.set_component(joint, JointPosition(next));
            }
        }
        Ok(())
    }
}

fn clamp_to_axes(ecm: &EntityComponentManager, joint: Entity, values: &mut [f64]) {
    if let (Some(value), Some(axis)) = (values.get_mut(0), ecm.component::<JointAxis>(joint)) {
        *value = axis.clamp(*value);
    }
    if let (Some(value), Some(axis)) = (values.get_mut(1), ecm.component::<JointAxis2>(joint)) {
        *value = axis.0.clamp(*value);
    }
}
