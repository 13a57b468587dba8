//! Half-space brush
//!
//! Author: Moroya Sakamoto

use crate::aabb::Aabb;
use glam::Vec3;

/// Signed distance to the half space below the plane through the origin
///
/// `normal` must be unit length; the factory normalizes it.
#[inline(always)]
pub fn sdf_plane(point: Vec3, normal: Vec3) -> f32 {
    point.dot(normal)
}

/// Canonical bounds of the half space
///
/// Infinite except along an exactly axis-aligned normal, where the solid
/// side is bounded at the plane. The caller decides whether infinite
/// bounds are acceptable (octree construction rejects them unless an
/// intersection shrinks them first).
pub fn plane_bounds(normal: Vec3) -> Aabb {
    let mut bounds = Aabb::infinite();
    if normal.x == -1.0 {
        bounds.min.x = 0.0;
    } else if normal.x == 1.0 {
        bounds.max.x = 0.0;
    } else if normal.y == -1.0 {
        bounds.min.y = 0.0;
    } else if normal.y == 1.0 {
        bounds.max.y = 0.0;
    } else if normal.z == -1.0 {
        bounds.min.z = 0.0;
    } else if normal.z == 1.0 {
        bounds.max.z = 0.0;
    }
    bounds
}
