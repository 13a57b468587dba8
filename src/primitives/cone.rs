//! Cone brush (z symmetry axis, apex up)
//!
//! Author: Moroya Sakamoto

use crate::aabb::Aabb;
use crate::primitives::coninder::sdf_coninder;
use glam::Vec3;

/// Signed distance to a capped cone centered at origin, apex at +z
///
/// Parameterized by the slope tangent rather than the base radius so the
/// bytecode carries the value evaluation actually needs.
///
/// # Arguments
/// * `tangent` - Base radius divided by height
/// * `height` - Full height, base at -height/2, apex at +height/2
#[inline(always)]
pub fn sdf_cone(point: Vec3, tangent: f32, height: f32) -> f32 {
    sdf_coninder(point, tangent * height, 0.0, height * 0.5)
}

/// Canonical bounds of the cone brush
#[inline]
pub fn cone_bounds(tangent: f32, height: f32) -> Aabb {
    let radius = tangent * height;
    Aabb::symmetric(Vec3::new(radius, radius, height * 0.5))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cone_apex_and_rim() {
        // tangent 0.5, height 2: base radius 1 at z=-1, apex at z=1
        assert!(sdf_cone(Vec3::new(0.0, 0.0, 1.0), 0.5, 2.0).abs() < 0.001);
        assert!(sdf_cone(Vec3::new(1.0, 0.0, -1.0), 0.5, 2.0).abs() < 0.001);
    }

    #[test]
    fn test_cone_axis_interior() {
        let d = sdf_cone(Vec3::new(0.0, 0.0, -0.5), 0.5, 2.0);
        assert!(d < 0.0);
    }

    #[test]
    fn test_cone_below_base() {
        let d = sdf_cone(Vec3::new(0.0, 0.0, -2.0), 0.5, 2.0);
        assert!((d - 1.0).abs() < 0.001);
    }
}
