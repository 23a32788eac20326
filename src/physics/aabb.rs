/// Axis-aligned bounding boxes.
///
/// Plain data plus pure functions; every other shape reduces to an `Aabb`
/// for the broadphase.
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::constants::physics::CONTACT_EPSILON;

/// Axis-Aligned Bounding Box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Unit cube occupying a block cell
    pub fn unit_block(x: i32, y: i32, z: i32) -> Self {
        let min = Vec3::new(x as f32, y as f32, z as f32);
        Self { min, max: min + Vec3::ONE }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Finite with `min <= max` on every axis
    pub fn is_valid(&self) -> bool {
        self.is_finite() && self.min.cmple(self.max).all()
    }

    /// Closed overlap test; touching boxes count
    pub fn intersects(&self, other: &Aabb) -> bool {
        aabb_intersects(self, other)
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    pub fn translated(&self, offset: Vec3) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    pub fn expanded(&self, margin: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(margin),
            max: self.max + Vec3::splat(margin),
        }
    }

    pub fn union(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        other.min.cmpge(self.min).all() && other.max.cmple(self.max).all()
    }

    /// Half the surface area, used as the BVH insertion cost
    pub fn half_area(&self) -> f32 {
        let d = (self.max - self.min).max(Vec3::ZERO);
        d.x * d.y + d.y * d.z + d.z * d.x
    }

    /// Box covering the motion of `self` along `displacement`
    pub fn swept(&self, displacement: Vec3) -> Self {
        self.union(&self.translated(displacement))
    }
}

/// Closed overlap test on all three axes
pub fn aabb_intersects(a: &Aabb, b: &Aabb) -> bool {
    a.min.x <= b.max.x
        && a.max.x >= b.min.x
        && a.min.y <= b.max.y
        && a.max.y >= b.min.y
        && a.min.z <= b.max.z
        && a.max.z >= b.min.z
}

/// Unit vector along axis `i`
pub(crate) fn axis_unit(i: usize) -> Vec3 {
    match i {
        0 => Vec3::X,
        1 => Vec3::Y,
        _ => Vec3::Z,
    }
}

/// Pick the contact axis among near-minimal overlaps.
///
/// Y wins a tie, then the axis with the largest centre separation.
pub(crate) fn pick_contact_axis(overlap: Vec3, delta: Vec3) -> usize {
    let least = overlap.min_element();
    let tied = |i: usize| (overlap[i] - least).abs() <= CONTACT_EPSILON;
    if tied(1) {
        return 1;
    }
    let mut best = None::<usize>;
    for i in [0, 2] {
        if !tied(i) {
            continue;
        }
        best = match best {
            Some(b) if delta[b].abs() >= delta[i].abs() => Some(b),
            _ => Some(i),
        };
    }
    best.unwrap_or(1)
}

/// Exact time of impact of `moving` travelling along `displacement` into `target`.
///
/// Returns the fraction of the displacement at first contact and the
/// surface normal of `target` at that point. Boxes already overlapping at
/// the start report fraction 0 along the minimum-penetration axis.
pub fn aabb_sweep(moving: &Aabb, displacement: Vec3, target: &Aabb) -> Option<(f32, Vec3)> {
    let mut t_enter = f32::NEG_INFINITY;
    let mut t_exit = f32::INFINITY;
    let mut normal = Vec3::ZERO;

    for i in 0..3 {
        let d = displacement[i];
        if d == 0.0 {
            if moving.max[i] <= target.min[i] || moving.min[i] >= target.max[i] {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d;
        let (enter, exit, face) = if d > 0.0 {
            (
                (target.min[i] - moving.max[i]) * inv,
                (target.max[i] - moving.min[i]) * inv,
                -axis_unit(i),
            )
        } else {
            (
                (target.max[i] - moving.min[i]) * inv,
                (target.min[i] - moving.max[i]) * inv,
                axis_unit(i),
            )
        };
        if enter > t_enter {
            t_enter = enter;
            normal = face;
        }
        t_exit = t_exit.min(exit);
    }

    if t_enter >= t_exit || t_exit <= 0.0 || t_enter > 1.0 {
        return None;
    }
    if t_enter < 0.0 || t_enter == f32::NEG_INFINITY {
        // Started inside; push out along the shallowest axis
        let delta = moving.center() - target.center();
        let overlap = moving.half_extents() + target.half_extents() - delta.abs();
        if overlap.min_element() <= 0.0 {
            return None;
        }
        let axis = pick_contact_axis(overlap, delta);
        let sign = if delta[axis] < 0.0 { -1.0 } else { 1.0 };
        return Some((0.0, axis_unit(axis) * sign));
    }
    Some((t_enter, normal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersects_is_closed() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));
        let c = Aabb::new(Vec3::new(1.5, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_sweep_hits_face() {
        let target = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let moving = Aabb::new(Vec3::new(3.0, 0.0, 0.0), Vec3::new(4.0, 1.0, 1.0));
        let (t, normal) = aabb_sweep(&moving, Vec3::new(-10.0, 0.0, 0.0), &target).expect("hit");
        assert!((t - 0.2).abs() < 1e-5);
        assert_eq!(normal, Vec3::X);
    }

    #[test]
    fn test_sweep_misses_when_offset() {
        let target = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let moving = Aabb::new(Vec3::new(3.0, 2.0, 0.0), Vec3::new(4.0, 3.0, 1.0));
        assert!(aabb_sweep(&moving, Vec3::new(-10.0, 0.0, 0.0), &target).is_none());
        // Too short to reach
        let near = Aabb::new(Vec3::new(3.0, 0.0, 0.0), Vec3::new(4.0, 1.0, 1.0));
        assert!(aabb_sweep(&near, Vec3::new(-1.0, 0.0, 0.0), &target).is_none());
    }

    #[test]
    fn test_tie_break_prefers_vertical() {
        assert_eq!(pick_contact_axis(Vec3::splat(0.5), Vec3::new(0.3, 0.1, 0.2)), 1);
        assert_eq!(pick_contact_axis(Vec3::new(0.5, 0.9, 0.5), Vec3::new(0.1, 0.0, 0.4)), 2);
        assert_eq!(pick_contact_axis(Vec3::new(0.9, 0.9, 0.2), Vec3::ZERO), 2);
    }
}
