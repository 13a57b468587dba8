//! Sphere brush
//!
//! Author: Moroya Sakamoto

use crate::aabb::Aabb;
use glam::Vec3;

/// Signed distance to a sphere centered at origin
///
/// # Arguments
/// * `point` - Point to evaluate
/// * `radius` - Sphere radius
///
/// # Returns
/// Signed distance (negative inside, positive outside)
#[inline(always)]
pub fn sdf_sphere(point: Vec3, radius: f32) -> f32 {
    point.length() - radius
}

/// Canonical bounds of the sphere brush
#[inline]
pub fn sphere_bounds(radius: f32) -> Aabb {
    Aabb::symmetric(Vec3::splat(radius))
}
