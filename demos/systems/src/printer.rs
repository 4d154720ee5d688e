//! Periodic state logging.

use components::{JointPosition, Model, Pose};
use sim_component::components::Name;
use sim_component::{Entity, EntityComponentManager};
use sim_system::{Capabilities, PluginConfig, System, SystemError, UpdateInfo};
use tracing::info;

const DEFAULT_EVERY: u64 = 1000;

/// Logs model poses and joint positions every `every` iterations, plus
/// every entity created or removed.
///
/// Configuration: `{ "every": 100 }`.
#[derive(Debug)]
pub struct StatePrinter {
    every: u64,
    reports: u64,
}

impl Default for StatePrinter {
    fn default() -> Self {
        Self {
            every: DEFAULT_EVERY,
            reports: 0,
        }
    }
}

impl StatePrinter {
    /// Number of periodic reports written so far.
    #[must_use]
    pub fn reports(&self) -> u64 {
        self.reports
    }
}

fn name_of(ecm: &EntityComponentManager, entity: Entity) -> String {
    ecm.component::<Name>(entity)
        .map(|n| n.as_str().to_string())
        .unwrap_or_else(|| entity.to_string())
}

impl System for StatePrinter {
    fn name(&self) -> &str {
        "state_printer"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE.with_configure().with_post_update()
    }

    fn configure(
        &mut self,
        _entity: Entity,
        config: &PluginConfig,
        _ecm: &mut EntityComponentManager,
    ) -> Result<(), SystemError> {
        if let Some(every) = config.get_as::<u64>("every")? {
            if every == 0 {
                return Err(SystemError::Rejected("every must be at least 1".into()));
            }
            self.every = every;
        }
        Ok(())
    }

    fn post_update(
        &mut self,
        info: &UpdateInfo,
        ecm: &EntityComponentManager,
    ) -> Result<(), SystemError> {
        for entity in ecm.each_new_entity() {
            info!(iteration = info.iterations, entity = %name_of(ecm, entity), "entity created");
        }
        for entity in ecm.each_removed_entity() {
            info!(iteration = info.iterations, %entity, "entity removed");
        }

        if info.iterations % self.every != 0 {
            return Ok(());
        }
        self.reports += 1;
        for (model, _) in ecm.each::<Model>() {
            if let Some(pose) = ecm.component::<Pose>(model) {
                info!(
                    iteration = info.iterations,
                    sim_time_s = info.sim_time.as_secs_f64(),
                    model = %name_of(ecm, model),
                    x = pose.position.x,
                    y = pose.position.y,
                    z = pose.position.z,
                    "model pose"
                );
            }
        }
        for (joint, position) in ecm.each::<JointPosition>() {
            info!(
                iteration = info.iterations,
                joint = %name_of(ecm, joint),
                position = ?position.0,
                "joint position"
            );
        }
        Ok(())
    }
}
