//! Ellipsoid brush
//!
//! Author: Moroya Sakamoto

use crate::aabb::Aabb;
use glam::Vec3;

/// Approximate signed distance to an ellipsoid centered at origin
///
/// Uses the scaled-gradient approximation; exact on the axes, slightly
/// conservative elsewhere, which is what CSG clipping wants.
#[inline(always)]
pub fn sdf_ellipsoid(point: Vec3, radii: Vec3) -> f32 {
    // Guard against zero radii (prevents division by zero in point/radii)
    let radii = radii.max(Vec3::splat(1e-10));
    let k0 = (point / radii).length();
    let k1 = (point / (radii * radii)).length();
    if k1 < 1e-10 {
        return -radii.min_element();
    }
    k0 * (k0 - 1.0) / k1
}

/// Canonical bounds of the ellipsoid brush
#[inline]
pub fn ellipsoid_bounds(radii: Vec3) -> Aabb {
    Aabb::symmetric(radii)
}
