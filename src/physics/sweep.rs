//! Time of impact for a shape moving along a straight displacement.

use glam::Vec3;

use crate::constants::physics::SWEEP_REFINE_STEPS;
use crate::physics::aabb::aabb_sweep;
use crate::physics::narrowphase::collide;
use crate::physics::{Shape, ShapeHandle};

/// First contact of a sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepHit {
    pub handle: ShapeHandle,
    /// Fraction of the displacement travelled before contact, in [0, 1]
    pub fraction: f32,
    /// Surface normal of the shape that was hit
    pub normal: Vec3,
    pub point: Vec3,
}

/// Number of samples for a sweep; never more than `max_samples`.
///
/// Enough that no step advances further than half the moving shape's
/// inner radius, so targets at least that thick cannot be skipped.
pub fn sample_count(moving: &Shape, displacement: Vec3, max_samples: u32) -> u32 {
    let max_samples = max_samples.max(1);
    let radius = moving.inner_radius().max(1e-3);
    let needed = (displacement.length() / (radius * 0.5)).ceil();
    if needed.is_finite() {
        (needed as u32).clamp(1, max_samples)
    } else {
        max_samples
    }
}

/// Outcome of a single pair sweep along with the narrowphase calls it cost
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairSweep {
    pub hit: Option<(f32, Vec3, Vec3)>,
    pub evaluations: usize,
}

/// Sweep `moving` against `target`.
///
/// Box against box is solved exactly. Everything else samples the path and
/// bisects between the last free sample and the first overlapping one.
pub fn sweep_pair(moving: &Shape, displacement: Vec3, target: &Shape, max_samples: u32) -> PairSweep {
    if let (Shape::Aabb(a), Shape::Aabb(b)) = (moving, target) {
        let hit = aabb_sweep(a, displacement, b).map(|(fraction, normal)| {
            let at = a.translated(displacement * fraction);
            let point = (at.min.max(b.min) + at.max.min(b.max)) * 0.5;
            (fraction, normal, point)
        });
        return PairSweep { hit, evaluations: 1 };
    }

    let at = |f: f32| moving.translated(displacement * f);
    let mut evaluations = 1;
    if let Some(contact) = collide(&at(0.0), target) {
        return PairSweep {
            hit: Some((0.0, -contact.normal, contact.point)),
            evaluations,
        };
    }

    let samples = sample_count(moving, displacement, max_samples);
    let mut free = 0.0;
    for i in 1..=samples {
        let f = i as f32 / samples as f32;
        evaluations += 1;
        let Some(mut contact) = collide(&at(f), target) else {
            free = f;
            continue;
        };

        let mut blocked = f;
        for _ in 0..SWEEP_REFINE_STEPS {
            let mid = (free + blocked) * 0.5;
            evaluations += 1;
            match collide(&at(mid), target) {
                Some(c) => {
                    blocked = mid;
                    contact = c;
                }
                None => free = mid,
            }
        }
        return PairSweep {
            hit: Some((blocked, -contact.normal, contact.point)),
            evaluations,
        };
    }
    PairSweep { hit: None, evaluations }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{Aabb, Sphere};

    #[test]
    fn test_sampled_sphere_sweep_refines_fraction() {
        let moving = Shape::Sphere(Sphere::new(Vec3::new(5.0, 0.5, 0.5), 0.5));
        let wall = Shape::Aabb(Aabb::new(Vec3::ZERO, Vec3::ONE));
        let result = sweep_pair(&moving, Vec3::new(-10.0, 0.0, 0.0), &wall, 10);
        let (fraction, normal, _) = result.hit.expect("hit");
        // Contact when the centre reaches x = 1.5
        assert!((fraction - 0.35).abs() < 1e-3);
        assert!((normal - Vec3::X).length() < 1e-3);
        assert!(result.evaluations <= 1 + 10 + SWEEP_REFINE_STEPS as usize);
    }

    #[test]
    fn test_thin_target_not_tunnelled() {
        let moving = Shape::Sphere(Sphere::new(Vec3::new(0.0, 0.0, 0.0), 0.5));
        let slab = Shape::Aabb(Aabb::new(Vec3::new(3.0, -1.0, -1.0), Vec3::new(3.3, 1.0, 1.0)));
        let result = sweep_pair(&moving, Vec3::new(6.0, 0.0, 0.0), &slab, 32);
        assert!(result.hit.is_some());
    }

    #[test]
    fn test_sample_count_is_capped() {
        let moving = Shape::Sphere(Sphere::new(Vec3::ZERO, 0.1));
        assert_eq!(sample_count(&moving, Vec3::new(100.0, 0.0, 0.0), 10), 10);
        assert_eq!(sample_count(&moving, Vec3::new(0.01, 0.0, 0.0), 10), 1);
    }
}
