//! Torus brush (z symmetry axis, ring in the xy plane)
//!
//! Author: Moroya Sakamoto

use crate::aabb::Aabb;
use glam::{Vec2, Vec3};

/// Signed distance to a torus centered at origin, around the z axis
///
/// # Arguments
/// * `major_radius` - Ring radius (center of tube circle)
/// * `minor_radius` - Tube radius
#[inline(always)]
pub fn sdf_torus(point: Vec3, major_radius: f32, minor_radius: f32) -> f32 {
    let q = Vec2::new(
        Vec2::new(point.x, point.y).length() - major_radius,
        point.z,
    );
    q.length() - minor_radius
}

/// Canonical bounds of the torus brush
#[inline]
pub fn torus_bounds(major_radius: f32, minor_radius: f32) -> Aabb {
    let radius = major_radius + minor_radius;
    Aabb::symmetric(Vec3::new(radius, radius, minor_radius))
}
