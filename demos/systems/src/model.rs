//! Builds a model's components from its plugin configuration.
//!
//! ```json
//! {
//!   "pose": [0.0, 0.0, 1.0],
//!   "velocity": { "linear": [0.0, 0.0, -1.0], "angular": [0.0, 0.0, 0.0] },
//!   "joints": [
//!     { "name": "shoulder", "axis": { "xyz": [0, 0, 1], "lower": -1.57, "upper": 1.57 } },
//!     { "name": "mount" }
//!   ]
//! }
//! ```
//!
//! A joint with no `axis` is fixed. Joints already present as named children
//! of the model are reused; missing ones are created.

use components::{Joint, JointAxis, JointAxis2, JointPosition, JointVelocity, Model, Pose, Velocity};
use glam::Vec3;
use serde::Deserialize;
use sim_component::components::{Name, ParentEntity};
use sim_component::{Entity, EntityComponentManager};
use sim_system::{Capabilities, PluginConfig, System, SystemError};
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
struct ModelConfig {
    #[serde(default)]
    pose: Option<Vec3>,
    #[serde(default)]
    velocity: Option<Velocity>,
    #[serde(default)]
    joints: Vec<JointConfig>,
}

#[derive(Debug, Deserialize)]
struct JointConfig {
    name: String,
    #[serde(default)]
    axis: Option<AxisConfig>,
    #[serde(default)]
    axis2: Option<AxisConfig>,
}

#[derive(Debug, Deserialize)]
struct AxisConfig {
    #[serde(default = "default_axis")]
    xyz: Vec3,
    #[serde(default)]
    lower: Option<f64>,
    #[serde(default)]
    upper: Option<f64>,
}

fn default_axis() -> Vec3 {
    Vec3::Z
}

impl AxisConfig {
    fn to_axis(&self) -> JointAxis {
        JointAxis {
            axis: self.xyz.normalize_or_zero(),
            lower: self.lower.unwrap_or(f64::NEG_INFINITY),
            upper: self.upper.unwrap_or(f64::INFINITY),
        }
    }
}

/// Configure-only plugin that turns its entity into a model.
#[derive(Debug, Default)]
pub struct ModelBuilder;

impl System for ModelBuilder {
    fn name(&self) -> &str {
        "model"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE.with_configure()
    }

    fn configure(
        &mut self,
        entity: Entity,
        config: &PluginConfig,
        ecm: &mut EntityComponentManager,
    ) -> Result<(), SystemError> {
        if !ecm.has_entity(entity) {
            return Err(SystemError::InvalidEntity(entity));
        }
        let config: ModelConfig = if config.is_empty() {
            ModelConfig::default()
        } else {
            config.parse()?
        };

        ecm.set_component(entity, Model);
        ecm.set_component(entity, Pose::from_position(config.pose.unwrap_or(Vec3::ZERO)));
        if let Some(velocity) = config.velocity {
            ecm.set_component(entity, velocity);
        }

        for joint in &config.joints {
            let joint_entity = find_child(ecm, entity, &joint.name).unwrap_or_else(|| {
                let created = ecm.create_entity();
                ecm.set_component(created, Name::new(joint.name.clone()));
                ecm.set_component(created, ParentEntity(entity));
                created
            });
            ecm.set_component(joint_entity, Joint);

            let mut axes = 0;
            if let Some(axis) = &joint.axis {
                ecm.set_component(joint_entity, axis.to_axis());
                axes = 1;
                if let Some(axis2) = &joint.axis2 {
                    ecm.set_component(joint_entity, JointAxis2(axis2.to_axis()));
                    axes = 2;
                }
            }
            if axes > 0 {
                ecm.set_component(joint_entity, JointPosition(vec![0.0; axes]));
                ecm.set_component(joint_entity, JointVelocity(vec![0.0; axes]));
            }
            debug!(model = %entity, joint = %joint.name, axes, "built joint");
        }
        Ok(())
    }
}

fn find_child(ecm: &EntityComponentManager, parent: Entity, name: &str) -> Option<Entity> {
    ecm.children(parent).into_iter().find(|child| {
        ecm.component::<Name>(*child)
            .is_some_and(|n| n.as_str() == name)
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_builds_joints() {
        let mut ecm = EntityComponentManager::new();
        let arm = ecm.create_entity();
        let existing = ecm.create_entity();
        ecm.set_component(existing, Name::new("mount"));
        ecm.set_component(existing, ParentEntity(arm));

        let config = PluginConfig::new(json!({
            "pose": [1.0, 2.0, 3.0],
            "joints": [
                { "name": "shoulder", "axis": { "lower": -1.0, "upper": 1.0 } },
                { "name": "wrist", "axis": { "xyz": [1, 0, 0] }, "axis2": { "xyz": [0, 1, 0] } },
                { "name": "mount" }
            ]
        }));
        ModelBuilder.configure(arm, &config, &mut ecm).unwrap();

        assert!(ecm.has_component::<Model>(arm));
        assert_eq!(
            ecm.get_component::<Pose>(arm).map(|p| p.position),
            Some(Vec3::new(1.0, 2.0, 3.0))
        );

        let shoulder = ecm.entity_by_name("shoulder").unwrap();
        assert_eq!(ecm.parent(shoulder), Some(arm));
        assert_eq!(ecm.get_component::<JointAxis>(shoulder).map(|a| a.upper), Some(1.0));
        assert_eq!(ecm.get_component::<JointPosition>(shoulder), Some(JointPosition(vec![0.0])));

        let wrist = ecm.entity_by_name("wrist").unwrap();
        assert!(ecm.has_component::<JointAxis2>(wrist));
        assert_eq!(ecm.get_component::<JointVelocity>(wrist), Some(JointVelocity(vec![0.0, 0.0])));

        assert!(ecm.has_component::<Joint>(existing));
        assert!(!ecm.has_component::<JointAxis>(existing));
        assert_eq!(ecm.children(arm).len(), 3);
    }

    #[test]
    fn test_bad_config_rejected() {
        let mut ecm = EntityComponentManager::new();
        let arm = ecm.create_entity();
        let config = PluginConfig::new(json!({ "joints": "not a list" }));
        assert!(matches!(
            ModelBuilder.configure(arm, &config, &mut ecm),
            Err(SystemError::InvalidConfig(_))
        ));
        assert!(ModelBuilder
            .configure(Entity::NULL, &PluginConfig::default(), &mut ecm)
            .is_err());
    }
}
