//! Exact shape-vs-shape contact tests.
//!
//! Every pair is evaluated in a canonical argument order and flipped back, so
//! `collide(a, b)` and `collide(b, a)` agree with negated normals.

use std::cmp::Ordering;

use glam::Vec3;

use crate::constants::physics::CONTACT_EPSILON;
use crate::physics::aabb::{axis_unit, pick_contact_axis};
use crate::physics::{Aabb, Capsule, Obb, Shape, Sphere};

/// Iterations refining the closest segment point against a box
const CAPSULE_BOX_ITERATIONS: usize = 4;

/// Contact between two shapes; `normal` points from the first into the second
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub normal: Vec3,
    pub depth: f32,
    pub point: Vec3,
}

impl Contact {
    pub fn flipped(self) -> Self {
        Self {
            normal: -self.normal,
            ..self
        }
    }
}

/// Contact between `a` and `b`, if they overlap with positive depth
pub fn collide(a: &Shape, b: &Shape) -> Option<Contact> {
    if a.canonical_cmp(b) == Ordering::Greater {
        dispatch(b, a).map(Contact::flipped)
    } else {
        dispatch(a, b)
    }
}

fn dispatch(a: &Shape, b: &Shape) -> Option<Contact> {
    match (a, b) {
        (Shape::Aabb(x), Shape::Aabb(y)) => aabb_aabb(x, y),
        (Shape::Aabb(x), Shape::Sphere(y)) => aabb_sphere(x, y),
        (Shape::Aabb(x), Shape::Capsule(y)) => aabb_capsule(x, y),
        (Shape::Aabb(x), Shape::Obb(y)) => obb_obb(&Obb::from(*x), y),
        (Shape::Sphere(x), Shape::Sphere(y)) => sphere_sphere(x, y),
        (Shape::Sphere(x), Shape::Capsule(y)) => sphere_capsule(x, y),
        (Shape::Sphere(x), Shape::Obb(y)) => obb_sphere(y, x).map(Contact::flipped),
        (Shape::Capsule(x), Shape::Capsule(y)) => capsule_capsule(x, y),
        (Shape::Capsule(x), Shape::Obb(y)) => obb_capsule(y, x).map(Contact::flipped),
        (Shape::Obb(x), Shape::Obb(y)) => obb_obb(x, y),
        // Remaining combinations are the mirrored ones above
        _ => dispatch(b, a).map(Contact::flipped),
    }
}

/// Separating axis per coordinate
pub fn aabb_aabb(a: &Aabb, b: &Aabb) -> Option<Contact> {
    let delta = b.center() - a.center();
    let overlap = a.half_extents() + b.half_extents() - delta.abs();
    if overlap.min_element() <= 0.0 {
        return None;
    }
    let axis = pick_contact_axis(overlap, delta);
    let sign = if delta[axis] < 0.0 { -1.0 } else { 1.0 };
    Some(Contact {
        normal: axis_unit(axis) * sign,
        depth: overlap[axis],
        point: (a.min.max(b.min) + a.max.min(b.max)) * 0.5,
    })
}

pub fn sphere_sphere(a: &Sphere, b: &Sphere) -> Option<Contact> {
    let delta = b.center - a.center;
    let distance = delta.length();
    let reach = a.radius + b.radius;
    if distance >= reach {
        return None;
    }
    let normal = if distance > CONTACT_EPSILON { delta / distance } else { Vec3::Y };
    let depth = reach - distance;
    Some(Contact {
        normal,
        depth,
        point: a.center + normal * (a.radius - depth * 0.5),
    })
}

/// Clamp the sphere centre into the box, then test against the clamp point
pub fn aabb_sphere(a: &Aabb, s: &Sphere) -> Option<Contact> {
    let closest = s.center.clamp(a.min, a.max);
    let offset = s.center - closest;
    let distance_sq = offset.length_squared();

    if distance_sq > CONTACT_EPSILON * CONTACT_EPSILON {
        let distance = distance_sq.sqrt();
        if distance >= s.radius {
            return None;
        }
        return Some(Contact {
            normal: offset / distance,
            depth: s.radius - distance,
            point: closest,
        });
    }

    // Centre inside the box: leave through the nearest face
    let to_min = s.center - a.min;
    let to_max = a.max - s.center;
    let face = to_min.min(to_max);
    let axis = pick_contact_axis(face, s.center - a.center());
    let sign = if to_max[axis] <= to_min[axis] { 1.0 } else { -1.0 };
    Some(Contact {
        normal: axis_unit(axis) * sign,
        depth: s.radius + face[axis],
        point: s.center,
    })
}

pub fn sphere_capsule(s: &Sphere, c: &Capsule) -> Option<Contact> {
    let on_axis = closest_on_segment(c.a, c.b, s.center);
    sphere_sphere(s, &Sphere::new(on_axis, c.radius))
}

pub fn capsule_capsule(a: &Capsule, b: &Capsule) -> Option<Contact> {
    let (p, q) = closest_between_segments(a.a, a.b, b.a, b.b);
    sphere_sphere(&Sphere::new(p, a.radius), &Sphere::new(q, b.radius))
}

/// Conservative: the segment point nearest the box stands in for the capsule
pub fn aabb_capsule(a: &Aabb, c: &Capsule) -> Option<Contact> {
    let mut on_axis = closest_on_segment(c.a, c.b, a.center());
    for _ in 0..CAPSULE_BOX_ITERATIONS {
        let in_box = on_axis.clamp(a.min, a.max);
        on_axis = closest_on_segment(c.a, c.b, in_box);
    }
    aabb_sphere(a, &Sphere::new(on_axis, c.radius))
}

pub fn obb_sphere(o: &Obb, s: &Sphere) -> Option<Contact> {
    let local = Sphere::new(o.to_local(s.center), s.radius);
    aabb_sphere(&o.local_aabb(), &local).map(|c| to_world(o, c))
}

pub fn obb_capsule(o: &Obb, c: &Capsule) -> Option<Contact> {
    let local = Capsule::new(o.to_local(c.a), o.to_local(c.b), c.radius);
    aabb_capsule(&o.local_aabb(), &local).map(|contact| to_world(o, contact))
}

fn to_world(o: &Obb, local: Contact) -> Contact {
    Contact {
        normal: o.rotation * local.normal,
        depth: local.depth,
        point: o.to_world(local.point),
    }
}

/// Separating axis test over the 15 candidate axes
pub fn obb_obb(a: &Obb, b: &Obb) -> Option<Contact> {
    let axes_a = a.axes();
    let axes_b = b.axes();
    let delta = b.center - a.center;

    let mut candidates = Vec::with_capacity(15);
    candidates.extend_from_slice(&axes_a);
    candidates.extend_from_slice(&axes_b);
    for u in &axes_a {
        for v in &axes_b {
            let cross = u.cross(*v);
            // Parallel edges give no new axis
            if cross.length_squared() > 1e-6 {
                candidates.push(cross.normalize());
            }
        }
    }

    let project = |axes: &[Vec3; 3], half: Vec3, l: Vec3| {
        axes[0].dot(l).abs() * half.x + axes[1].dot(l).abs() * half.y + axes[2].dot(l).abs() * half.z
    };

    let mut best: Option<(Vec3, f32, f32, f32)> = None;
    for axis in candidates {
        let ra = project(&axes_a, a.half_extents, axis);
        let rb = project(&axes_b, b.half_extents, axis);
        let distance = delta.dot(axis);
        let overlap = ra + rb - distance.abs();
        if overlap <= 0.0 {
            return None;
        }
        let better = match best {
            None => true,
            Some((current, least, _, current_distance)) => {
                if overlap < least - CONTACT_EPSILON {
                    true
                } else if (overlap - least).abs() <= CONTACT_EPSILON {
                    let (vy, cy) = (axis.y.abs(), current.y.abs());
                    vy > cy + CONTACT_EPSILON
                        || ((vy - cy).abs() <= CONTACT_EPSILON && distance.abs() > current_distance.abs())
                } else {
                    false
                }
            }
        };
        if better {
            best = Some((axis, overlap, ra, distance));
        }
    }

    let (axis, depth, ra, distance) = best?;
    let normal = if distance < 0.0 { -axis } else { axis };
    Some(Contact {
        normal,
        depth,
        point: a.center + normal * (ra - depth * 0.5),
    })
}

/// Closest point to `p` on segment `a..b`
pub fn closest_on_segment(a: Vec3, b: Vec3, p: Vec3) -> Vec3 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= CONTACT_EPSILON {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Closest points between segments `p1..q1` and `p2..q2`
pub fn closest_between_segments(p1: Vec3, q1: Vec3, p2: Vec3, q2: Vec3) -> (Vec3, Vec3) {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.dot(d1);
    let e = d2.dot(d2);
    let f = d2.dot(r);

    if a <= CONTACT_EPSILON && e <= CONTACT_EPSILON {
        return (p1, p2);
    }
    let (s, t) = if a <= CONTACT_EPSILON {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(r);
        if e <= CONTACT_EPSILON {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            let mut s = if denom > CONTACT_EPSILON {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };
    (p1 + d1 * s, p2 + d2 * t)
}
