use std::cmp::Ordering;

use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{invalid_geometry, WorldResult};
use crate::physics::Aabb;

/// Oriented bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obb {
    pub center: Vec3,
    pub half_extents: Vec3,
    pub rotation: Quat,
}

impl Obb {
    pub fn new(center: Vec3, half_extents: Vec3, rotation: Quat) -> Self {
        Self {
            center,
            half_extents,
            rotation: rotation.normalize(),
        }
    }

    /// Local X, Y and Z axes in world space
    pub fn axes(&self) -> [Vec3; 3] {
        let m = Mat3::from_quat(self.rotation);
        [m.x_axis, m.y_axis, m.z_axis]
    }

    pub fn to_local(&self, point: Vec3) -> Vec3 {
        self.rotation.inverse() * (point - self.center)
    }

    pub fn to_world(&self, local: Vec3) -> Vec3 {
        self.center + self.rotation * local
    }

    /// Box in its own frame
    pub fn local_aabb(&self) -> Aabb {
        Aabb::new(-self.half_extents, self.half_extents)
    }

    pub fn bounds(&self) -> Aabb {
        let [x, y, z] = self.axes();
        let extent = x.abs() * self.half_extents.x + y.abs() * self.half_extents.y + z.abs() * self.half_extents.z;
        Aabb::from_center_half_extents(self.center, extent)
    }
}

impl From<Aabb> for Obb {
    fn from(aabb: Aabb) -> Self {
        Self {
            center: aabb.center(),
            half_extents: aabb.half_extents(),
            rotation: Quat::IDENTITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }
}

/// Segment `a..b` swept by a sphere
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Capsule {
    pub a: Vec3,
    pub b: Vec3,
    pub radius: f32,
}

impl Capsule {
    pub fn new(a: Vec3, b: Vec3, radius: f32) -> Self {
        Self { a, b, radius }
    }

    /// Upright capsule standing on `feet` with total height `height`
    pub fn upright(feet: Vec3, height: f32, radius: f32) -> Self {
        let a = feet + Vec3::Y * radius;
        let b = feet + Vec3::Y * (height - radius).max(radius);
        Self { a, b, radius }
    }
}

/// Shape kinds, in the order used to canonicalise pair tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
    Aabb,
    Sphere,
    Capsule,
    Obb,
}

/// Collision geometry in world space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Aabb(Aabb),
    Obb(Obb),
    Sphere(Sphere),
    Capsule(Capsule),
}

impl Shape {
    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Aabb(_) => ShapeKind::Aabb,
            Shape::Obb(_) => ShapeKind::Obb,
            Shape::Sphere(_) => ShapeKind::Sphere,
            Shape::Capsule(_) => ShapeKind::Capsule,
        }
    }

    pub fn bounds(&self) -> Aabb {
        match self {
            Shape::Aabb(b) => *b,
            Shape::Obb(o) => o.bounds(),
            Shape::Sphere(s) => Aabb::from_center_half_extents(s.center, Vec3::splat(s.radius)),
            Shape::Capsule(c) => Aabb::new(c.a.min(c.b), c.a.max(c.b)).expanded(c.radius),
        }
    }

    pub fn center(&self) -> Vec3 {
        match self {
            Shape::Aabb(b) => b.center(),
            Shape::Obb(o) => o.center,
            Shape::Sphere(s) => s.center,
            Shape::Capsule(c) => (c.a + c.b) * 0.5,
        }
    }

    /// Smallest distance from the centre to the surface
    pub fn inner_radius(&self) -> f32 {
        match self {
            Shape::Aabb(b) => b.half_extents().min_element(),
            Shape::Obb(o) => o.half_extents.min_element(),
            Shape::Sphere(s) => s.radius,
            Shape::Capsule(c) => c.radius,
        }
    }

    pub fn translated(&self, offset: Vec3) -> Shape {
        match *self {
            Shape::Aabb(b) => Shape::Aabb(b.translated(offset)),
            Shape::Obb(o) => Shape::Obb(Obb { center: o.center + offset, ..o }),
            Shape::Sphere(s) => Shape::Sphere(Sphere { center: s.center + offset, ..s }),
            Shape::Capsule(c) => Shape::Capsule(Capsule {
                a: c.a + offset,
                b: c.b + offset,
                radius: c.radius,
            }),
        }
    }

    /// Reject non-finite coordinates and negative extents
    pub fn validate(&self) -> WorldResult<()> {
        let ok = match self {
            Shape::Aabb(b) => b.is_valid(),
            Shape::Obb(o) => {
                o.center.is_finite()
                    && o.half_extents.is_finite()
                    && o.half_extents.cmpge(Vec3::ZERO).all()
                    && o.rotation.is_finite()
                    && o.rotation.length_squared() > 0.0
            }
            Shape::Sphere(s) => s.center.is_finite() && s.radius.is_finite() && s.radius >= 0.0,
            Shape::Capsule(c) => {
                c.a.is_finite() && c.b.is_finite() && c.radius.is_finite() && c.radius >= 0.0
            }
        };
        if ok {
            Ok(())
        } else {
            Err(invalid_geometry(format!("malformed {:?} shape", self.kind())))
        }
    }

    /// Parameters flattened for a total ordering between shapes
    fn sort_key(&self) -> [f32; 10] {
        match self {
            Shape::Aabb(b) => [b.min.x, b.min.y, b.min.z, b.max.x, b.max.y, b.max.z, 0.0, 0.0, 0.0, 0.0],
            Shape::Obb(o) => {
                let c = o.center;
                let h = o.half_extents;
                let r = o.rotation;
                [c.x, c.y, c.z, h.x, h.y, h.z, r.x, r.y, r.z, r.w]
            }
            Shape::Sphere(s) => {
                let c = s.center;
                [c.x, c.y, c.z, s.radius, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
            }
            Shape::Capsule(cap) => {
                let (a, b) = (cap.a, cap.b);
                [a.x, a.y, a.z, b.x, b.y, b.z, cap.radius, 0.0, 0.0, 0.0]
            }
        }
    }

    /// Total order used so that pair tests run the same way regardless of argument order
    pub(crate) fn canonical_cmp(&self, other: &Shape) -> Ordering {
        self.kind().cmp(&other.kind()).then_with(|| {
            let a = self.sort_key();
            let b = other.sort_key();
            a.iter()
                .zip(b.iter())
                .map(|(x, y)| x.total_cmp(y))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        })
    }
}

impl From<Aabb> for Shape {
    fn from(aabb: Aabb) -> Self {
        Shape::Aabb(aabb)
    }
}

impl From<Obb> for Shape {
    fn from(obb: Obb) -> Self {
        Shape::Obb(obb)
    }
}

impl From<Sphere> for Shape {
    fn from(sphere: Sphere) -> Self {
        Shape::Sphere(sphere)
    }
}

impl From<Capsule> for Shape {
    fn from(capsule: Capsule) -> Self {
        Shape::Capsule(capsule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotated_obb_bounds_grow() {
        let obb = Obb::new(Vec3::ZERO, Vec3::ONE, Quat::from_rotation_y(std::f32::consts::FRAC_PI_4));
        let bounds = obb.bounds();
        assert!((bounds.max.x - std::f32::consts::SQRT_2).abs() < 1e-4);
        assert!((bounds.max.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_validate_rejects_nan() {
        let bad = Shape::Sphere(Sphere::new(Vec3::new(f32::NAN, 0.0, 0.0), 1.0));
        assert!(bad.validate().is_err());
        let inverted = Shape::Aabb(Aabb::new(Vec3::ONE, Vec3::ZERO));
        assert!(inverted.validate().is_err());
        let fine = Shape::Capsule(Capsule::upright(Vec3::ZERO, 1.8, 0.3));
        assert!(fine.validate().is_ok());
    }

    #[test]
    fn test_canonical_order_is_antisymmetric() {
        let a = Shape::Sphere(Sphere::new(Vec3::ZERO, 1.0));
        let b = Shape::Sphere(Sphere::new(Vec3::X, 1.0));
        let c = Shape::Aabb(Aabb::new(Vec3::ZERO, Vec3::ONE));
        assert_eq!(a.canonical_cmp(&b), Ordering::Less);
        assert_eq!(b.canonical_cmp(&a), Ordering::Greater);
        assert_eq!(c.canonical_cmp(&a), Ordering::Less);
    }
}
