//! Integration tests: end-to-end meshing pipeline
//!
//! Author: Moroya Sakamoto

mod common;

use common::*;
use sodapop::prelude::*;
use std::sync::Arc;
use std::time::Duration;

const MESH_TIMEOUT: Duration = Duration::from_secs(60);

fn mesh_of(shape: SdfNode) -> Arc<Drawable> {
    let evaluator = Arc::new(shape);
    let drawable = Drawable::acquire(&evaluator, DEFAULT_DENSITY);
    assert!(
        wait_for(|| drawable.mesh_ready(), MESH_TIMEOUT),
        "meshing chain never completed"
    );
    drawable
}

// ============================================================================
// Basic extraction
// ============================================================================

#[test]
fn sphere_meshes_with_sane_buffers() {
    let drawable = mesh_of(test_sphere());
    let mesh = drawable.mesh();
    assert!(!mesh.positions.is_empty());
    assert_eq!(mesh.positions.len(), mesh.normals.len());
    assert_eq!(mesh.positions.len(), mesh.colors.len());
    assert_eq!(mesh.indices.len() % 3, 0);
    assert!(!mesh.indices.is_empty());

    // Every vertex sits on the sphere surface, every normal is unit radial
    for (p, n) in mesh.positions.iter().zip(mesh.normals.iter()) {
        assert!(
            (p.length() - 1.0).abs() < 0.1,
            "vertex {p:?} far from the surface"
        );
        assert!((n.length() - 1.0).abs() < 1e-3);
        assert!((*n - p.normalize()).length() < 0.1);
    }

    // Indices all address real vertices
    let max = mesh.positions.len() as u32;
    assert!(mesh.indices.iter().all(|&i| i < max));
}

#[test]
fn two_lobe_union_meshes_both_lobes() {
    let drawable = mesh_of(two_lobes());
    let mesh = drawable.mesh();
    let left = mesh.positions.iter().filter(|p| p.x < 2.0).count();
    let right = mesh.positions.iter().filter(|p| p.x > 2.0).count();
    assert!(left > 0 && right > 0, "one lobe went missing");
    // Disjoint lobes of equal size mesh symmetrically
    let ratio = left as f32 / right as f32;
    assert!((0.5..2.0).contains(&ratio), "lobe imbalance: {left} vs {right}");
}

#[test]
fn mesh_counts_are_deterministic() {
    let first = mesh_of(test_complex_shape());
    let second = mesh_of(test_complex_shape());
    // Distinct evaluator pointers, so these took separate trips through
    // the pipeline; the output must still agree exactly
    assert!(!Arc::ptr_eq(&first, &second));
    let a = first.mesh();
    let b = second.mesh();
    assert_eq!(a.positions.len(), b.positions.len());
    assert_eq!(a.indices.len(), b.indices.len());
}

// ============================================================================
// Materials
// ============================================================================

#[test]
fn painted_mesh_fills_material_slots() {
    let (shape, red, blue) = painted_shape();
    let drawable = mesh_of(shape);
    let slots = drawable.material_slots();
    assert_eq!(slots.len(), 2);
    assert!(same_material(&slots[0], &red));
    assert!(same_material(&slots[1], &blue));

    let slot_vertices = drawable.slot_vertices();
    assert_eq!(slot_vertices.len(), 2);
    assert!(!slot_vertices[0].is_empty());
    assert!(!slot_vertices[1].is_empty());

    // Every vertex landed in at most one slot
    let mesh = drawable.mesh();
    let assigned: usize = slot_vertices.iter().map(|s| s.len()).sum();
    assert!(assigned <= mesh.positions.len());
}

// ============================================================================
// Cache and lifetime behavior
// ============================================================================

#[test]
fn cache_reuses_mesh_work_per_evaluator_identity() {
    let evaluator = Arc::new(test_sphere());
    let first = Drawable::acquire(&evaluator, DEFAULT_DENSITY);
    assert!(wait_for(|| first.mesh_ready(), MESH_TIMEOUT));
    let count = first.mesh().positions.len();

    // Second acquire through the same pointer returns the same drawable,
    // mesh already attached
    let second = Drawable::acquire(&evaluator, DEFAULT_DENSITY);
    assert!(Arc::ptr_eq(&first, &second));
    assert!(second.mesh_ready());
    assert_eq!(second.mesh().positions.len(), count);
}

#[test]
fn degenerate_evaluator_never_becomes_ready() {
    let plane = Arc::new(SdfNode::plane(0.0, 1.0, 0.0));
    let drawable = Drawable::acquire(&plane, DEFAULT_DENSITY);
    assert!(!wait_for(|| drawable.mesh_ready(), Duration::from_millis(300)));
    assert!(drawable.mesh().positions.is_empty());
}

// ============================================================================
// Models over finished drawables
// ============================================================================

#[test]
fn model_shading_converges_on_a_painted_mesh() {
    let (shape, red, _) = painted_shape();
    let evaluator = Arc::new(shape);
    let model = SdfModel::create(&evaluator, Mat4::IDENTITY);
    assert!(
        wait_for(|| model.drawable().mesh_ready(), MESH_TIMEOUT),
        "mesh never became ready"
    );

    // Shading is incremental; wait until some left-lobe vertex carries
    // the red material's color
    let shaded = wait_for(
        || {
            let mesh = model.drawable().mesh();
            let colors = model.instance_colors();
            mesh.positions
                .iter()
                .zip(colors.iter())
                .any(|(p, c)| p.x < 0.0 && c.truncate() == red.guess_color())
        },
        MESH_TIMEOUT,
    );
    assert!(shaded, "shader task never painted the left lobe");

    let groups = model.coloring_groups();
    assert_eq!(groups.len(), 2);
    assert!(groups.iter().all(|g| g.vertex_count > 0));

    drop(model);
    sodapop::prelude::drain_outbox();
}

#[test]
fn live_model_registry_tracks_lifetimes() {
    let evaluator = Arc::new(SdfNode::cube(1.0));
    let model = SdfModel::create(&evaluator, Mat4::IDENTITY);
    let weak = Arc::downgrade(&model);
    assert!(get_live_models().iter().any(|m| Arc::ptr_eq(m, &model)));
    drop(model);
    // Other tests may hold their own live models; only ours must be gone
    assert!(!get_live_models()
        .iter()
        .any(|m| std::ptr::eq(Arc::as_ptr(m), weak.as_ptr())));
}
