//! Example component definitions for the simulation demos.
//!
//! Models own joints through the [`ParentEntity`](sim_component::components::ParentEntity)
//! relation. A joint that can move carries a [`JointAxis`]; joints with a
//! second degree of freedom also carry a [`JointAxis2`]. Per-axis state is
//! stored as one value per axis in [`JointPosition`] and [`JointVelocity`],
//! and pending overrides arrive as [`JointPositionReset`] /
//! [`JointVelocityReset`] commands.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use sim_component::Component;

macro_rules! component {
    ($ty:ident) => {
        impl Component for $ty {
            fn type_name() -> &'static str {
                stringify!($ty)
            }
        }
    };
}

/// Marks an entity as a model.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Model;

component!(Model);

/// Marks an entity as a joint.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Joint;

component!(Joint);

/// Position and orientation in the world frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Pose {
    /// World-space position.
    pub position: Vec3,
    /// Rotation as a unit quaternion.
    pub rotation: Quat,
}

impl Pose {
    /// Origin, no rotation.
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    /// A pose at `position` with no rotation.
    #[must_use]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Advance the pose by `velocity` over `dt` seconds.
    #[must_use]
    pub fn integrated(self, velocity: &Velocity, dt: f32) -> Self {
        let spin = velocity.angular * dt;
        let rotation = if spin.length_squared() > 0.0 {
            (Quat::from_scaled_axis(spin) * self.rotation).normalize()
        } else {
            self.rotation
        };
        Self {
            position: self.position + velocity.linear * dt,
            rotation,
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

component!(Pose);

/// Linear and angular velocity in the world frame.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Velocity {
    /// Metres per second.
    pub linear: Vec3,
    /// Radians per second about each world axis.
    pub angular: Vec3,
}

impl Velocity {
    /// Zero velocity.
    pub const ZERO: Self = Self {
        linear: Vec3::ZERO,
        angular: Vec3::ZERO,
    };

    /// Pure linear velocity.
    #[must_use]
    pub fn linear(x: f32, y: f32, z: f32) -> Self {
        Self {
            linear: Vec3::new(x, y, z),
            angular: Vec3::ZERO,
        }
    }
}

component!(Velocity);

/// Motion axis and position limits of a joint's first degree of freedom.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct JointAxis {
    /// Unit axis in the joint frame.
    pub axis: Vec3,
    /// Lower position limit in radians.
    pub lower: f64,
    /// Upper position limit in radians.
    pub upper: f64,
}

impl JointAxis {
    /// An unlimited axis.
    #[must_use]
    pub fn unlimited(axis: Vec3) -> Self {
        Self {
            axis,
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    /// Clamp `position` into the limits.
    #[must_use]
    pub fn clamp(&self, position: f64) -> f64 {
        position.max(self.lower).min(self.upper)
    }
}

component!(JointAxis);

/// Motion axis and limits of a joint's second degree of freedom.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct JointAxis2(pub JointAxis);

component!(JointAxis2);

/// Current joint position, one value per axis, in radians.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JointPosition(pub Vec<f64>);

component!(JointPosition);

/// Current joint velocity, one value per axis, in radians per second.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JointVelocity(pub Vec<f64>);

component!(JointVelocity);

/// Command to overwrite a joint's position on the next step.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JointPositionReset(pub Vec<f64>);

component!(JointPositionReset);

/// Command to overwrite a joint's velocity on the next step.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JointVelocityReset(pub Vec<f64>);

component!(JointVelocityReset);
