//! Box brush
//!
//! Author: Moroya Sakamoto

use crate::aabb::Aabb;
use glam::Vec3;

/// Signed distance to a box centered at origin
///
/// # Arguments
/// * `point` - Point to evaluate
/// * `half_extents` - Half size along each axis
#[inline(always)]
pub fn sdf_box3d(point: Vec3, half_extents: Vec3) -> f32 {
    let q = point.abs() - half_extents;
    // Branchless combine of interior (negative) and exterior (positive) distance
    q.max(Vec3::ZERO).length() + q.x.max(q.y.max(q.z)).min(0.0)
}

/// Canonical bounds of the box brush
#[inline]
pub fn box3d_bounds(half_extents: Vec3) -> Aabb {
    Aabb::symmetric(half_extents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_faces() {
        let h = Vec3::new(1.0, 2.0, 3.0);
        assert!(sdf_box3d(Vec3::new(1.0, 0.0, 0.0), h).abs() < 0.0001);
        assert!(sdf_box3d(Vec3::new(0.0, 2.0, 0.0), h).abs() < 0.0001);
        assert!(sdf_box3d(Vec3::new(0.0, 0.0, 3.0), h).abs() < 0.0001);
    }

    #[test]
    fn test_box_interior() {
        // Nearest face is x at distance 1
        let d = sdf_box3d(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0));
        assert!((d + 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_box_corner_distance() {
        let d = sdf_box3d(Vec3::new(2.0, 2.0, 2.0), Vec3::ONE);
        assert!((d - 3.0f32.sqrt()).abs() < 0.0001);
    }
}
