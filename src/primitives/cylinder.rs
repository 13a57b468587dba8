//! Cylinder brush (z symmetry axis)
//!
//! Author: Moroya Sakamoto

use crate::aabb::Aabb;
use glam::{Vec2, Vec3};

/// Signed distance to a capped cylinder centered at origin, along z
///
/// # Arguments
/// * `radius` - Cap radius
/// * `half_height` - Half the cylinder height
#[inline(always)]
pub fn sdf_cylinder(point: Vec3, radius: f32, half_height: f32) -> f32 {
    let d = Vec2::new(
        Vec2::new(point.x, point.y).length() - radius,
        point.z.abs() - half_height,
    );
    // Branchless: combine interior (negative) and exterior (positive)
    d.x.max(d.y).min(0.0) + d.max(Vec2::ZERO).length()
}

/// Canonical bounds of the cylinder brush
#[inline]
pub fn cylinder_bounds(radius: f32, half_height: f32) -> Aabb {
    Aabb::symmetric(Vec3::new(radius, radius, half_height))
}
