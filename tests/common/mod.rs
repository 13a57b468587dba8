//! Common test helpers for sodapop integration tests
//!
//! Author: Moroya Sakamoto

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sodapop::prelude::*;

// ============================================================================
// Standard test shapes
// ============================================================================

/// Sphere of diameter 2 at the origin
pub fn test_sphere() -> SdfNode {
    SdfNode::sphere(2.0)
}

/// Two spheres of diameter 2, centers 4 apart on the x axis
pub fn two_lobes() -> SdfNode {
    let mut right = SdfNode::sphere(2.0);
    right.move_by(Vec3::new(4.0, 0.0, 0.0));
    SdfNode::sphere(2.0).union(right)
}

/// Multi-operation shape covering every node variant
pub fn test_complex_shape() -> SdfNode {
    let mut cut = SdfNode::box3d(0.5, 2.0, 0.5);
    cut.move_by(Vec3::new(0.5, 0.0, 0.0));
    let mut ring = SdfNode::torus(1.6, 0.4);
    ring.rotate_x(90.0);
    ring.move_by(Vec3::new(0.0, 1.0, 0.0));
    SdfNode::sphere(2.0)
        .diff(cut)
        .blend_union(0.1, ring)
        .flate(0.05)
}

/// The complex shape with two painted regions
pub fn painted_shape() -> (SdfNode, MaterialShared, MaterialShared) {
    let red = Material::solid_color(Vec3::X);
    let blue = Material::solid_color(Vec3::Z);
    let mut right = SdfNode::sphere(2.0).paint(blue.clone());
    right.move_by(Vec3::new(1.5, 0.0, 0.0));
    let shape = SdfNode::sphere(2.0).paint(red.clone()).union(right);
    (shape, red, blue)
}

// ============================================================================
// Standard test points
// ============================================================================

/// Seeded uniform points in [-extent, extent]^3
pub fn random_points(seed: u64, count: usize, extent: f32) -> Vec<Vec3> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            Vec3::new(
                rng.gen_range(-extent..extent),
                rng.gen_range(-extent..extent),
                rng.gen_range(-extent..extent),
            )
        })
        .collect()
}

/// Assert compiled evaluation matches tree evaluation at every point
pub fn assert_compiled_matches_tree(shape: &SdfNode, points: &[Vec3], tolerance: f32) {
    let compiled = SdfInterpreter::new(shape);
    for (i, &p) in points.iter().enumerate() {
        let tree = shape.eval(p);
        let byte = compiled.eval(p);
        assert!(
            (tree - byte).abs() < tolerance,
            "mismatch at point {}: tree={}, compiled={}, p={:?}",
            i,
            tree,
            byte,
            p
        );
    }
}

/// Spin until `ready` returns true or the deadline passes
pub fn wait_for(ready: impl Fn() -> bool, timeout: std::time::Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if ready() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    ready()
}
