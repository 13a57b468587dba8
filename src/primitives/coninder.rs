//! Coninder brush — a capped cone with two cap radii (z symmetry axis)
//!
//! Author: Moroya Sakamoto

use crate::aabb::Aabb;
use glam::{Vec2, Vec3};

/// Signed distance to a capped cone centered at origin, along z
///
/// # Arguments
/// * `radius_low` - Cap radius at z = -half_height
/// * `radius_high` - Cap radius at z = +half_height
/// * `half_height` - Half the total height
#[inline(always)]
pub fn sdf_coninder(point: Vec3, radius_low: f32, radius_high: f32, half_height: f32) -> f32 {
    let q = Vec2::new(Vec2::new(point.x, point.y).length(), point.z);
    let k1 = Vec2::new(radius_high, half_height);
    let k2 = Vec2::new(radius_high - radius_low, 2.0 * half_height);

    let cap_radius = if q.y < 0.0 { radius_low } else { radius_high };
    let ca = Vec2::new(q.x - q.x.min(cap_radius), q.y.abs() - half_height);
    let k2_len_sq = k2.dot(k2).max(1e-10);
    let cb = q - k1 + k2 * ((k1 - q).dot(k2) / k2_len_sq).clamp(0.0, 1.0);

    let sign = if cb.x < 0.0 && ca.y < 0.0 { -1.0 } else { 1.0 };
    sign * ca.dot(ca).min(cb.dot(cb)).sqrt()
}

/// Canonical bounds of the coninder brush
#[inline]
pub fn coninder_bounds(radius_low: f32, radius_high: f32, half_height: f32) -> Aabb {
    let max_radius = radius_low.max(radius_high);
    Aabb::symmetric(Vec3::new(max_radius, max_radius, half_height))
}
