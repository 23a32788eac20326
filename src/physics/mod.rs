//! Collision core: shape registry, broadphase backends, narrowphase contact
//! tests, response policies, raycasts and swept tests.

pub mod aabb;
pub mod body;
pub mod broadphase;
pub mod bvh;
pub mod narrowphase;
pub mod raycast;
pub mod resolution;
pub mod shapes;
pub mod spatial_hash;
pub mod sweep;
pub mod sweep_prune;
pub mod voxel;
pub mod world;

pub use aabb::Aabb;
pub use body::{layers, Body, BodyDesc, BodyKind, ResponsePolicy, ShapeHandle};
pub use broadphase::{create_broadphase, Broadphase, BroadphaseStats, Proxy};
pub use bvh::DynamicBvh;
pub use narrowphase::{collide, Contact};
pub use raycast::{ray_shape, Ray, RayHit};
pub use resolution::{resolve, Manifold, Participant, Response};
pub use shapes::{Capsule, Obb, Shape, ShapeKind, Sphere};
pub use spatial_hash::SpatialHash;
pub use sweep::SweepHit;
pub use sweep_prune::SweepAndPrune;
pub use voxel::{solid_blocks_in, voxel_raycast, VoxelHit, VoxelSource};
pub use world::{CollisionStats, CollisionWorld, PhysicsSettings, ShapeRayHit, StepReport, TriggerEvent};
