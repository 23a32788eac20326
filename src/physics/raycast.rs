use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::constants::physics::CONTACT_EPSILON;
use crate::error::{invalid_geometry, WorldResult};
use crate::physics::aabb::axis_unit;
use crate::physics::narrowphase::closest_on_segment;
use crate::physics::{Aabb, Capsule, Obb, Shape, Sphere};

/// Ray with a normalised direction and a finite reach
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub max_distance: f32,
}

impl Ray {
    /// Validates and normalises; non-finite input is `InvalidGeometry`
    pub fn new(origin: Vec3, direction: Vec3, max_distance: f32) -> WorldResult<Self> {
        if !origin.is_finite() || !direction.is_finite() || !max_distance.is_finite() {
            return Err(invalid_geometry("ray has non-finite components"));
        }
        if max_distance < 0.0 {
            return Err(invalid_geometry("ray has negative reach"));
        }
        let direction = direction.try_normalize().ok_or_else(|| invalid_geometry("ray direction is zero"))?;
        Ok(Self {
            origin,
            direction,
            max_distance,
        })
    }

    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }

    /// Box covering the whole ray
    pub fn bounds(&self) -> Aabb {
        let end = self.at(self.max_distance);
        Aabb::new(self.origin.min(end), self.origin.max(end))
    }

    pub fn is_valid(&self) -> bool {
        self.origin.is_finite()
            && self.direction.is_finite()
            && self.max_distance.is_finite()
            && self.max_distance >= 0.0
            && (self.direction.length_squared() - 1.0).abs() < 1e-3
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub distance: f32,
    pub point: Vec3,
    pub normal: Vec3,
}

/// Normal reported when the ray starts inside a shape
fn inside_normal(direction: Vec3) -> Vec3 {
    let abs = direction.abs();
    let axis = if abs.x >= abs.y && abs.x >= abs.z {
        0
    } else if abs.y >= abs.z {
        1
    } else {
        2
    };
    -axis_unit(axis) * direction[axis].signum()
}

/// Slab method
pub fn ray_aabb(ray: &Ray, aabb: &Aabb) -> Option<RayHit> {
    let mut t_enter = f32::NEG_INFINITY;
    let mut t_exit = f32::INFINITY;
    let mut normal = Vec3::ZERO;

    for i in 0..3 {
        let o = ray.origin[i];
        let d = ray.direction[i];
        if d.abs() < 1e-8 {
            // Parallel to this slab
            if o < aabb.min[i] || o > aabb.max[i] {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d;
        let t1 = (aabb.min[i] - o) * inv;
        let t2 = (aabb.max[i] - o) * inv;
        let (near, far) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
        if near > t_enter {
            t_enter = near;
            normal = -axis_unit(i) * d.signum();
        }
        t_exit = t_exit.min(far);
        if t_enter > t_exit {
            return None;
        }
    }

    if t_exit < 0.0 {
        return None;
    }
    if t_enter < 0.0 {
        return Some(RayHit {
            distance: 0.0,
            point: ray.origin,
            normal: inside_normal(ray.direction),
        });
    }
    if t_enter > ray.max_distance {
        return None;
    }
    Some(RayHit {
        distance: t_enter,
        point: ray.at(t_enter),
        normal,
    })
}

/// Slab method in the box's own frame
pub fn ray_obb(ray: &Ray, obb: &Obb) -> Option<RayHit> {
    let inverse = obb.rotation.inverse();
    let local = Ray {
        origin: inverse * (ray.origin - obb.center),
        direction: inverse * ray.direction,
        max_distance: ray.max_distance,
    };
    ray_aabb(&local, &obb.local_aabb()).map(|hit| RayHit {
        distance: hit.distance,
        point: ray.at(hit.distance),
        normal: obb.rotation * hit.normal,
    })
}

pub fn ray_sphere(ray: &Ray, sphere: &Sphere) -> Option<RayHit> {
    let m = ray.origin - sphere.center;
    let b = m.dot(ray.direction);
    let c = m.length_squared() - sphere.radius * sphere.radius;
    if c <= 0.0 {
        return Some(RayHit {
            distance: 0.0,
            point: ray.origin,
            normal: -ray.direction,
        });
    }
    if b > 0.0 {
        return None;
    }
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let t = -b - discriminant.sqrt();
    if t > ray.max_distance {
        return None;
    }
    let point = ray.at(t);
    Some(RayHit {
        distance: t,
        point,
        normal: (point - sphere.center) / sphere.radius.max(CONTACT_EPSILON),
    })
}

/// Nearest of the cylinder body and the two end caps
pub fn ray_capsule(ray: &Ray, capsule: &Capsule) -> Option<RayHit> {
    let on_axis = closest_on_segment(capsule.a, capsule.b, ray.origin);
    if ray.origin.distance_squared(on_axis) <= capsule.radius * capsule.radius {
        return Some(RayHit {
            distance: 0.0,
            point: ray.origin,
            normal: -ray.direction,
        });
    }

    let mut best = [capsule.a, capsule.b]
        .iter()
        .filter_map(|end| ray_sphere(ray, &Sphere::new(*end, capsule.radius)))
        .min_by(|x, y| x.distance.total_cmp(&y.distance));

    let axis_vec = capsule.b - capsule.a;
    let length = axis_vec.length();
    if length > CONTACT_EPSILON {
        let axis = axis_vec / length;
        let rel = ray.origin - capsule.a;
        let d_perp = ray.direction - axis * ray.direction.dot(axis);
        let o_perp = rel - axis * rel.dot(axis);
        let a = d_perp.length_squared();
        let b = d_perp.dot(o_perp);
        let c = o_perp.length_squared() - capsule.radius * capsule.radius;
        let discriminant = b * b - a * c;
        if a > 1e-10 && discriminant >= 0.0 {
            let t = (-b - discriminant.sqrt()) / a;
            let along = (rel + ray.direction * t).dot(axis);
            if t >= 0.0 && t <= ray.max_distance && (0.0..=length).contains(&along) {
                let closer = best.map_or(true, |hit| t < hit.distance);
                if closer {
                    let normal = (o_perp + d_perp * t) / capsule.radius.max(CONTACT_EPSILON);
                    best = Some(RayHit {
                        distance: t,
                        point: ray.at(t),
                        normal,
                    });
                }
            }
        }
    }
    best
}

pub fn ray_shape(ray: &Ray, shape: &Shape) -> Option<RayHit> {
    match shape {
        Shape::Aabb(b) => ray_aabb(ray, b),
        Shape::Obb(o) => ray_obb(ray, o),
        Shape::Sphere(s) => ray_sphere(ray, s),
        Shape::Capsule(c) => ray_capsule(ray, c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn ray(origin: [f32; 3], direction: [f32; 3]) -> Ray {
        Ray::new(Vec3::from(origin), Vec3::from(direction), 100.0).expect("valid ray")
    }

    #[test]
    fn test_ray_rejects_bad_input() {
        assert!(Ray::new(Vec3::new(f32::NAN, 0.0, 0.0), Vec3::X, 1.0).is_err());
        assert!(Ray::new(Vec3::ZERO, Vec3::ZERO, 1.0).is_err());
        assert!(Ray::new(Vec3::ZERO, Vec3::X, f32::INFINITY).is_err());
    }

    #[test]
    fn test_ray_aabb_face_normal() {
        let hit = ray_aabb(&ray([-5.0, 0.5, 0.5], [1.0, 0.0, 0.0]), &Aabb::new(Vec3::ZERO, Vec3::ONE)).expect("hit");
        assert!((hit.distance - 5.0).abs() < 1e-5);
        assert_eq!(hit.normal, -Vec3::X);
        assert!(ray_aabb(&ray([-5.0, 2.0, 0.5], [1.0, 0.0, 0.0]), &Aabb::new(Vec3::ZERO, Vec3::ONE)).is_none());
    }

    #[test]
    fn test_ray_respects_reach() {
        let short = Ray::new(Vec3::new(-5.0, 0.5, 0.5), Vec3::X, 2.0).expect("valid ray");
        assert!(ray_aabb(&short, &Aabb::new(Vec3::ZERO, Vec3::ONE)).is_none());
        assert!(ray_sphere(&short, &Sphere::new(Vec3::ZERO, 1.0)).is_none());
    }

    #[test]
    fn test_ray_sphere_and_rotated_box() {
        let hit = ray_sphere(&ray([0.0, 10.0, 0.0], [0.0, -1.0, 0.0]), &Sphere::new(Vec3::ZERO, 2.0)).expect("hit");
        assert!((hit.distance - 8.0).abs() < 1e-5);
        assert!((hit.normal - Vec3::Y).length() < 1e-5);

        let obb = Obb::new(Vec3::ZERO, Vec3::splat(1.0), Quat::from_rotation_y(std::f32::consts::FRAC_PI_4));
        let hit = ray_obb(&ray([-5.0, 0.0, 0.0], [1.0, 0.0, 0.0]), &obb).expect("hit");
        assert!((hit.distance - (5.0 - std::f32::consts::SQRT_2)).abs() < 1e-4);
    }

    #[test]
    fn test_ray_capsule_side_and_cap() {
        let capsule = Capsule::new(Vec3::ZERO, Vec3::new(0.0, 4.0, 0.0), 0.5);
        let side = ray_capsule(&ray([-5.0, 2.0, 0.0], [1.0, 0.0, 0.0]), &capsule).expect("side");
        assert!((side.distance - 4.5).abs() < 1e-4);
        assert!((side.normal + Vec3::X).length() < 1e-4);
        let cap = ray_capsule(&ray([0.0, 10.0, 0.0], [0.0, -1.0, 0.0]), &capsule).expect("cap");
        assert!((cap.distance - 5.5).abs() < 1e-4);
    }
}
