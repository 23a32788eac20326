use glam::Vec3;

use crate::constants::physics::{CORRECTION_PERCENT, MAX_CORRECTION};
use crate::physics::{ResponsePolicy, ShapeHandle};

/// Detected contact, valid for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Manifold {
    pub a: ShapeHandle,
    pub b: ShapeHandle,
    /// Points from `a` into `b`
    pub normal: Vec3,
    pub depth: f32,
    pub point: Vec3,
    pub restitution: f32,
    pub friction: f32,
}

/// Combined material response of two surfaces
pub fn combine_materials(restitution: (f32, f32), friction: (f32, f32)) -> (f32, f32) {
    (restitution.0.max(restitution.1), (friction.0 * friction.1).max(0.0).sqrt())
}

/// Response inputs for one side of a manifold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Participant {
    pub policy: ResponsePolicy,
    pub inv_mass: f32,
    pub velocity: Vec3,
}

impl Participant {
    /// Immovable block-policy stand-in for terrain
    pub fn terrain() -> Self {
        Self {
            policy: ResponsePolicy::Block,
            inv_mass: 0.0,
            velocity: Vec3::ZERO,
        }
    }
}

/// Translation and new velocity for one side
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Response {
    pub translation: Vec3,
    pub velocity: Vec3,
}

/// Whether a manifold only reports an event
pub fn is_trigger(a: ResponsePolicy, b: ResponsePolicy) -> bool {
    (a == ResponsePolicy::Trigger || b == ResponsePolicy::Trigger)
        && a != ResponsePolicy::Ignore
        && b != ResponsePolicy::Ignore
}

/// Resolve one manifold.
///
/// Solid policies push the bodies apart in proportion to inverse mass,
/// removing `CORRECTION_PERCENT` of the depth and never more than
/// `MAX_CORRECTION`. Slide then drops and bounce reflects the velocity
/// component into the contact. Trigger and ignore leave both sides alone.
pub fn resolve(manifold: &Manifold, a: Participant, b: Participant) -> (Response, Response) {
    let unchanged = (
        Response {
            translation: Vec3::ZERO,
            velocity: a.velocity,
        },
        Response {
            translation: Vec3::ZERO,
            velocity: b.velocity,
        },
    );
    if !a.policy.is_solid() || !b.policy.is_solid() {
        return unchanged;
    }
    let total = a.inv_mass + b.inv_mass;
    if total <= 0.0 {
        return unchanged;
    }

    let n = manifold.normal;
    let correction = (manifold.depth * CORRECTION_PERCENT).min(MAX_CORRECTION);
    let response = |side: Participant, toward: Vec3| {
        let translation = -toward * correction * side.inv_mass / total;
        let approach = side.velocity.dot(toward);
        let velocity = if approach <= 0.0 || side.inv_mass == 0.0 {
            side.velocity
        } else {
            match side.policy {
                ResponsePolicy::Slide => side.velocity - toward * approach,
                ResponsePolicy::Bounce => side.velocity - toward * approach * (1.0 + manifold.restitution),
                _ => side.velocity,
            }
        };
        Response { translation, velocity }
    };
    (response(a, n), response(b, -n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifold(depth: f32) -> Manifold {
        Manifold {
            a: ShapeHandle { index: 0, generation: 0 },
            b: ShapeHandle::TERRAIN,
            normal: Vec3::NEG_Y,
            depth,
            point: Vec3::ZERO,
            restitution: 0.5,
            friction: 0.5,
        }
    }

    fn falling(policy: ResponsePolicy) -> Participant {
        Participant {
            policy,
            inv_mass: 1.0,
            velocity: Vec3::new(2.0, -4.0, 0.0),
        }
    }

    #[test]
    fn test_block_pushes_out_without_touching_velocity() {
        let (a, b) = resolve(&manifold(0.1), falling(ResponsePolicy::Block), Participant::terrain());
        assert!((a.translation - Vec3::new(0.0, 0.08, 0.0)).length() < 1e-6);
        assert_eq!(a.velocity, Vec3::new(2.0, -4.0, 0.0));
        assert_eq!(b.translation, Vec3::ZERO);
    }

    #[test]
    fn test_correction_is_clamped() {
        let (a, _) = resolve(&manifold(3.0), falling(ResponsePolicy::Block), Participant::terrain());
        assert!((a.translation.y - MAX_CORRECTION).abs() < 1e-6);
    }

    #[test]
    fn test_slide_and_bounce() {
        let (slide, _) = resolve(&manifold(0.1), falling(ResponsePolicy::Slide), Participant::terrain());
        assert_eq!(slide.velocity, Vec3::new(2.0, 0.0, 0.0));
        let (bounce, _) = resolve(&manifold(0.1), falling(ResponsePolicy::Bounce), Participant::terrain());
        assert!((bounce.velocity - Vec3::new(2.0, 2.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_trigger_and_ignore_do_nothing() {
        for policy in [ResponsePolicy::Trigger, ResponsePolicy::Ignore] {
            let (a, _) = resolve(&manifold(0.1), falling(policy), Participant::terrain());
            assert_eq!(a.translation, Vec3::ZERO);
            assert_eq!(a.velocity, Vec3::new(2.0, -4.0, 0.0));
        }
        assert!(is_trigger(ResponsePolicy::Trigger, ResponsePolicy::Block));
        assert!(!is_trigger(ResponsePolicy::Trigger, ResponsePolicy::Ignore));
    }
}
