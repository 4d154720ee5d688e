//! Example system plugins for the simulation host.
//!
//! | Plugin name | System | Phases |
//! |---|---|---|
//! | `model` | [`ModelBuilder`] | configure |
//! | `set_model_state` | [`SetModelState`] | configure, reset |
//! | `joint_reset` | [`JointResetApplier`] | pre-update |
//! | `joint_integrator` | [`JointIntegrator`] | update |
//! | `kinematics` | [`Kinematics`] | update |
//! | `state_printer` | [`StatePrinter`] | configure, post-update |

pub mod joints;
pub mod kinematics;
pub mod model;
pub mod printer;
pub mod set_model_state;

use serde_json::json;
use sim_system::SystemLoader;
use sim_world::{EntityDescription, PluginDescription, SceneDescription, WorldDescription};

pub use joints::{JointIntegrator, JointResetApplier};
pub use kinematics::Kinematics;
pub use model::ModelBuilder;
pub use printer::StatePrinter;
pub use set_model_state::SetModelState;

/// A loader with every demo plugin registered.
#[must_use]
pub fn loader() -> SystemLoader {
    SystemLoader::new()
        .with("model", || Box::new(ModelBuilder))
        .with("set_model_state", || Box::new(SetModelState::default()))
        .with("joint_reset", || Box::new(JointResetApplier))
        .with("joint_integrator", || Box::new(JointIntegrator))
        .with("kinematics", || Box::new(Kinematics))
        .with("state_printer", || Box::new(StatePrinter::default()))
}

/// An arm whose shoulder starts at 30 degrees and swings until its limit,
/// next to a falling ball.
#[must_use]
pub fn demo_scene() -> SceneDescription {
    let world = WorldDescription::new("joint_demo")
        .with_plugin(PluginDescription::new("joint_reset"))
        .with_plugin(PluginDescription::new("joint_integrator"))
        .with_plugin(PluginDescription::new("kinematics"))
        .with_plugin(PluginDescription::new("state_printer").with_config(json!({ "every": 250 })))
        .with_entity(
            EntityDescription::new("arm")
                .with_child(EntityDescription::new("base_link"))
                .with_child(EntityDescription::new("upper_link"))
                .with_plugin(PluginDescription::new("model").with_config(json!({
                    "pose": [0.0, 0.0, 0.5],
                    "joints": [
                        { "name": "shoulder", "axis": { "xyz": [0, 1, 0], "lower": -1.0, "upper": 1.0 } },
                        { "name": "wrist", "axis": { "xyz": [1, 0, 0] }, "axis2": { "xyz": [0, 0, 1] } }
                    ]
                })))
                .with_plugin(PluginDescription::new("set_model_state").with_config(json!({
                    "model_state": { "joint_state": [
                        { "name": "shoulder", "axis": {
                            "position": { "value": 30, "degrees": true },
                            "velocity": 0.5
                        } },
                        { "name": "wrist", "axis2": { "velocity": -0.25 } }
                    ] }
                }))),
        )
        .with_entity(
            EntityDescription::new("ball").with_plugin(PluginDescription::new("model").with_config(json!({
                "pose": [2.0, 0.0, 10.0],
                "velocity": { "linear": [0.0, 0.0, -1.0], "angular": [0.0, 0.0, 0.0] }
            }))),
        );
    SceneDescription {
        worlds: vec![world],
    }
}
