//! Integration tests: octree construction and queries
//!
//! Author: Moroya Sakamoto

mod common;

use common::*;
use sodapop::prelude::*;

// ============================================================================
// Coverage
// ============================================================================

#[test]
fn exact_descend_is_sound_for_unions() {
    // Clipping a union may only drop geometry that is provably farther
    // than the cell's reach: the octree never reports a smaller distance
    // than the scene, and agrees exactly on and inside the surface.
    let scene = two_lobes();
    let tree = SdfOctree::create(&scene, 0.25, false, 3, 0.0).unwrap();
    for p in random_points(101, 500, 3.0) {
        if !tree.bounds.contains(p) {
            continue;
        }
        let truth = scene.eval(p);
        let through_tree = tree.eval(p, true);
        assert!(
            through_tree >= truth - 1e-5,
            "octree invented closer geometry at {p:?}: {through_tree} < {truth}"
        );
        if truth <= 0.0 {
            assert!(
                (through_tree - truth).abs() < 1e-5,
                "octree disagrees inside the surface at {p:?}"
            );
        }
    }
}

#[test]
fn leaf_evaluators_cover_their_cells() {
    let scene = two_lobes();
    let mut tree = SdfOctree::create(&scene, 0.5, false, 3, 0.0).unwrap();
    tree.populate_deferred();
    tree.link_leaves();
    tree.walk_leaves(&mut |leaf| {
        let evaluator = leaf.evaluator().expect("live leaves carry evaluators");
        let p = leaf.bounds.center();
        assert!((tree.eval(p, true) - evaluator.eval(p)).abs() < 1e-5);
    });
}

#[test]
fn approximate_descent_reports_empty_space_as_far() {
    let scene = two_lobes();
    let tree = SdfOctree::create(&scene, 0.25, false, 3, 0.0).unwrap();
    // Well outside both lobes but inside the bounding cube
    let gap = Vec3::new(2.0, 1.9, 1.9);
    let approx = tree.eval(gap, false);
    assert!(approx > 0.0, "empty space must never read as surface");
    // Exact descent always answers a real distance
    assert!(tree.eval(gap, true).is_finite());
}

// ============================================================================
// Coalescing
// ============================================================================

#[test]
fn uniform_brush_coalesces_to_root() {
    let tree = SdfOctree::create(&test_sphere(), 0.01, true, 16, 0.0).unwrap();
    assert!(tree.is_terminus());
    assert_eq!(tree.max_depth(), 1);
}

#[test]
fn coalescing_is_idempotent_across_target_sizes() {
    for target in [2.0, 0.5, 0.1] {
        let tree = SdfOctree::create(&test_sphere(), target, true, 16, 0.0).unwrap();
        assert!(tree.is_terminus(), "target {target} failed to collapse");
    }
}

// ============================================================================
// Construction failures
// ============================================================================

#[test]
fn unbounded_evaluator_is_rejected() {
    assert!(matches!(
        SdfOctree::create(&SdfNode::plane(1.0, 0.0, 0.0), 0.25, true, 8, 0.0),
        Err(OctreeError::Unbounded)
    ));
}

// ============================================================================
// Materials and gradients through the tree
// ============================================================================

#[test]
fn octree_material_lookup_matches_scene() {
    let (scene, red, blue) = painted_shape();
    let tree = SdfOctree::create(&scene, 0.25, false, 3, 0.0).unwrap();

    let near_left = tree.get_material(Vec3::new(-0.9, 0.0, 0.0)).unwrap();
    let near_right = tree.get_material(Vec3::new(2.4, 0.0, 0.0)).unwrap();
    assert!(same_material(&near_left, &red));
    assert!(same_material(&near_right, &blue));
}

#[test]
fn octree_gradient_matches_analytic_normal() {
    let tree = SdfOctree::create(&test_sphere(), 0.25, true, 8, 0.0).unwrap();
    for p in random_points(131, 100, 0.9) {
        if p.length() < 0.05 {
            continue;
        }
        let g = tree.gradient(p);
        assert!(
            (g - p.normalize()).length() < 1e-3,
            "gradient {g:?} off radial at {p:?}"
        );
    }
}

#[test]
fn interpreter_selection_agrees_with_descend() {
    let scene = test_complex_shape();
    let tree = SdfOctree::create(&scene, 0.25, false, 3, 0.0).unwrap();
    for p in random_points(151, 200, 2.0) {
        if let Some(compiled) = tree.select_interpreter(p) {
            assert!((compiled.eval(p) - tree.eval(p, true)).abs() < 1e-5);
        }
    }
}
