use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::physics::Shape;

/// Collision layer bits
pub mod layers {
    pub const DEFAULT: u32 = 1;
    /// Bodies carrying this bit collide with solid blocks
    pub const TERRAIN: u32 = 1 << 1;
    pub const ENTITY: u32 = 1 << 2;
    pub const PLAYER: u32 = 1 << 3;
    pub const SENSOR: u32 = 1 << 4;
    pub const ALL: u32 = u32::MAX;
}

/// Stable reference to a registered shape.
///
/// The generation changes whenever a slot is reused, so stale handles
/// never alias a newer shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShapeHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl ShapeHandle {
    /// Stand-in for the voxel grid in manifolds
    pub const TERRAIN: ShapeHandle = ShapeHandle {
        index: u32::MAX,
        generation: 0,
    };

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn is_terrain(&self) -> bool {
        *self == Self::TERRAIN
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyKind {
    /// Position fixed at registration
    Static,
    Dynamic,
}

/// What a body does when it touches something
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsePolicy {
    /// Pushed out along the contact normal
    #[default]
    Block,
    /// Loses the velocity component into the contact
    Slide,
    /// Reflects the velocity component into the contact
    Bounce,
    /// Reports an event and passes through
    Trigger,
    Ignore,
}

impl ResponsePolicy {
    /// Policies that move bodies apart
    pub fn is_solid(self) -> bool {
        matches!(self, ResponsePolicy::Block | ResponsePolicy::Slide | ResponsePolicy::Bounce)
    }
}

/// Registration parameters for a shape
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyDesc {
    pub shape: Shape,
    pub kind: BodyKind,
    pub layers: u32,
    pub policy: ResponsePolicy,
    pub velocity: Vec3,
    pub mass: f32,
    pub restitution: f32,
    pub friction: f32,
}

impl BodyDesc {
    pub fn dynamic(shape: impl Into<Shape>) -> Self {
        Self {
            shape: shape.into(),
            kind: BodyKind::Dynamic,
            layers: layers::DEFAULT,
            policy: ResponsePolicy::Block,
            velocity: Vec3::ZERO,
            mass: 1.0,
            restitution: 0.0,
            friction: 0.5,
        }
    }

    pub fn fixed(shape: impl Into<Shape>) -> Self {
        Self {
            kind: BodyKind::Static,
            ..Self::dynamic(shape)
        }
    }

    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers;
        self
    }

    pub fn with_policy(mut self, policy: ResponsePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }
}

/// Registered shape plus its response parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub shape: Shape,
    pub kind: BodyKind,
    pub layers: u32,
    pub policy: ResponsePolicy,
    pub velocity: Vec3,
    /// Zero for static bodies
    pub inv_mass: f32,
    pub restitution: f32,
    pub friction: f32,
}

impl Body {
    pub fn from_desc(desc: &BodyDesc) -> Self {
        let inv_mass = match desc.kind {
            BodyKind::Static => 0.0,
            BodyKind::Dynamic if desc.mass > 0.0 && desc.mass.is_finite() => 1.0 / desc.mass,
            BodyKind::Dynamic => 1.0,
        };
        Self {
            shape: desc.shape,
            kind: desc.kind,
            layers: desc.layers,
            policy: desc.policy,
            velocity: if desc.kind == BodyKind::Static { Vec3::ZERO } else { desc.velocity },
            inv_mass,
            restitution: desc.restitution.clamp(0.0, 1.0),
            friction: desc.friction.max(0.0),
        }
    }

    pub fn is_static(&self) -> bool {
        self.kind == BodyKind::Static
    }
}
