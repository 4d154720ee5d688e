//! Sets initial joint positions and velocities of a model.
//!
//! Attach to a model entity. The configuration lists joint states; each
//! axis value is radians unless written as `{ "value": .., "degrees": true }`.
//!
//! ```json
//! {
//!   "model_state": {
//!     "joint_state": [
//!       { "name": "shoulder", "axis": { "position": { "value": 30, "degrees": true }, "velocity": 0.5 } },
//!       { "name": "wrist", "axis2": { "position": 0.2 } }
//!     ]
//!   }
//! }
//! ```
//!
//! On configure the values are written as [`JointPositionReset`] /
//! [`JointVelocityReset`] commands on the joints. On reset the same commands
//! are written again.

use components::{Joint, JointAxis, JointAxis2, JointPositionReset, JointVelocityReset, Model};
use serde::Deserialize;
use sim_component::components::Name;
use sim_component::{Entity, EntityComponentManager};
use sim_system::{Capabilities, PluginConfig, System, SystemError, UpdateInfo};
use tracing::{debug, error};

#[derive(Debug, Deserialize)]
struct SetModelStateConfig {
    #[serde(default)]
    model_state: Option<ModelState>,
}

#[derive(Debug, Deserialize)]
struct ModelState {
    #[serde(default)]
    joint_state: Vec<JointState>,
}

#[derive(Debug, Deserialize)]
struct JointState {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    axis: Option<AxisState>,
    #[serde(default)]
    axis2: Option<AxisState>,
}

#[derive(Debug, Default, Deserialize)]
struct AxisState {
    #[serde(default)]
    position: Option<Angle>,
    #[serde(default)]
    velocity: Option<Angle>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum Angle {
    Radians(f64),
    Tagged {
        value: f64,
        #[serde(default)]
        degrees: bool,
    },
}

impl Angle {
    fn radians(self) -> f64 {
        match self {
            Self::Radians(value) => value,
            Self::Tagged { value, degrees: true } => value.to_radians(),
            Self::Tagged { value, degrees: false } => value,
        }
    }
}

/// Commands for one joint.
#[derive(Debug, Clone, PartialEq)]
struct JointCommand {
    joint: Entity,
    position: Option<Vec<f64>>,
    velocity: Option<Vec<f64>>,
}

/// Writes configured joint states as reset commands.
#[derive(Debug, Default)]
pub struct SetModelState {
    model: Entity,
    commands: Vec<JointCommand>,
}

impl SetModelState {
    /// Number of joints this plugin issues commands for.
    #[must_use]
    pub fn joint_count(&self) -> usize {
        self.commands.len()
    }

    fn apply(&self, ecm: &mut EntityComponentManager) {
        for command in &self.commands {
            if let Some(position) = &command.position {
                ecm.set_component(command.joint, JointPositionReset(position.clone()));
            }
            if let Some(velocity) = &command.velocity {
                ecm.set_component(command.joint, JointVelocityReset(velocity.clone()));
            }
        }
    }
}

impl System for SetModelState {
    fn name(&self) -> &str {
        "set_model_state"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE.with_configure().with_reset()
    }

    fn configure(
        &mut self,
        entity: Entity,
        config: &PluginConfig,
        ecm: &mut EntityComponentManager,
    ) -> Result<(), SystemError> {
        if !ecm.has_component::<Model>(entity) {
            return Err(SystemError::Rejected(
                "set_model_state should be attached to a model entity".into(),
            ));
        }
        self.model = entity;
        let model_name = ecm
            .component::<Name>(entity)
            .map(|n| n.as_str().to_string())
            .unwrap_or_default();

        let parsed: Option<SetModelStateConfig> = if config.is_empty() {
            None
        } else {
            Some(config.parse()?)
        };
        let Some(state) = parsed.and_then(|c| c.model_state) else {
            error!(model = %model_name, "no model_state specified; the model state is unchanged");
            return Ok(());
        };

        for joint_state in &state.joint_state {
            let Some(joint_name) = &joint_state.name else {
                error!(model = %model_name, "no name specified for joint_state, skipping");
                continue;
            };
            let Some(joint) = find_joint(ecm, entity, joint_name) else {
                error!(model = %model_name, joint = %joint_name, "unable to find joint, skipping");
                continue;
            };
            if !ecm.has_component::<JointAxis>(joint) {
                error!(
                    model = %model_name,
                    joint = %joint_name,
                    "joint has no axis (is it a fixed joint?), skipping"
                );
                continue;
            }

            let mut position = Vec::new();
            let mut velocity = Vec::new();
            let first = joint_state.axis.as_ref();
            if let Some(axis) = first {
                if let Some(p) = axis.position {
                    position.push(p.radians());
                }
                if let Some(v) = axis.velocity {
                    velocity.push(v.radians());
                }
            }
            if ecm.has_component::<JointAxis2>(joint)
                && let Some(axis2) = &joint_state.axis2
            {
                if let Some(p) = axis2.position {
                    if position.is_empty() {
                        position.push(0.0);
                    }
                    position.push(p.radians());
                }
                if let Some(v) = axis2.velocity {
                    if velocity.is_empty() {
                        velocity.push(0.0);
                    }
                    velocity.push(v.radians());
                }
            }

            let command = JointCommand {
                joint,
                position: (!position.is_empty()).then_some(position),
                velocity: (!velocity.is_empty()).then_some(velocity),
            };
            debug!(model = %model_name, joint = %joint_name, ?command, "joint state parsed");
            self.commands.push(command);
        }

        self.apply(ecm);
        Ok(())
    }

    fn reset(
        &mut self,
        _info: &UpdateInfo,
        ecm: &mut EntityComponentManager,
    ) -> Result<(), SystemError> {
        if !ecm.has_entity(self.model) {
            return Ok(());
        }
        self.apply(ecm);
        Ok(())
    }
}

fn find_joint(ecm: &EntityComponentManager, model: Entity, name: &str) -> Option<Entity> {
    ecm.descendants(model).into_iter().find(|e| {
        ecm.has_component::<Joint>(*e)
            && ecm.component::<Name>(*e).is_some_and(|n| n.as_str() == name)
    })
}
