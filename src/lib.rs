//! # Sodapop
//!
//! An interactive signed-distance-field modeling and meshing core.
//!
//! Scenes are CSG trees of distance-field brushes. A tree compiles into
//! a flat bytecode program for fast repeated evaluation, a spatial
//! octree clips the tree down per region, and a parallel pipeline
//! extracts a surface-nets mesh through the octree. Meshes attach to
//! shared Drawables; any number of placed models share one Drawable and
//! shade their vertices incrementally in the background.
//!
//! ## Example
//!
//! ```rust
//! use sodapop::prelude::*;
//!
//! // A sphere with a box carved out
//! let mut hole = SdfNode::cube(1.2);
//! hole.move_by(Vec3::new(0.0, 0.0, 0.6));
//! let shape = SdfNode::sphere(2.0).diff(hole);
//!
//! // Direct evaluation
//! let d = shape.eval(Vec3::ZERO);
//!
//! // Compiled evaluation agrees with the tree
//! let compiled = SdfInterpreter::new(&shape);
//! assert!((compiled.eval(Vec3::ZERO) - d).abs() < 1e-5);
//! ```
//!
//! ## Author
//!
//! Moroya Sakamoto

#![warn(missing_docs)]

pub mod aabb;
pub mod compiled;
pub mod material;
pub mod meshing;
pub mod model;
pub mod octree;
pub mod operations;
pub mod primitives;
pub mod scheduler;
pub mod tasks;
pub mod transform;
pub mod types;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude - commonly used types and functions
pub mod prelude {
    pub use crate::aabb::Aabb;
    pub use crate::compiled::{Opcode, ProgramBuffer, SdfInterpreter};
    pub use crate::material::{same_material, Material, MaterialShared};
    pub use crate::meshing::{populate, DEFAULT_DENSITY};
    pub use crate::model::{
        get_live_models, material_override, set_material_override, unload_all_models,
        ColoringGroup, Drawable, MaterialOverrideMode, MeshBuffers, SdfModel,
    };
    pub use crate::octree::{OctreeError, SdfOctree};
    pub use crate::operations::*;
    pub use crate::scheduler::{
        drain_outbox, enqueue_async, enqueue_continuous, enqueue_delete, rearm_continuous,
        thread_pool_size, ContinuousTask, TaskStatus,
    };
    pub use crate::tasks::{
        fan_out_indexed, fan_out_iter, fan_out_range, run_chain, ChainStage, StageOutcome,
    };
    pub use crate::transform::TransformMachine;
    pub use crate::types::{
        BrushNode, BrushShape, FlateNode, RayHit, SdfNode, SetFamily, SetNode, StencilNode,
    };
    pub use glam::{Mat4, Quat, Vec3, Vec4};
}

// Re-exports for convenience
pub use compiled::SdfInterpreter;
pub use octree::SdfOctree;
pub use types::SdfNode;

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_basic_workflow() {
        // A sphere with a smaller sphere carved out of its center
        let shape = SdfNode::sphere(2.0).diff(SdfNode::sphere(1.0));

        // The carved center is outside the shape
        assert!(shape.eval(Vec3::ZERO) > 0.0);

        // The outer surface is where the sphere put it
        assert!(shape.eval(Vec3::new(1.0, 0.0, 0.0)).abs() < 0.01);

        // Compiled evaluation agrees
        let compiled = SdfInterpreter::new(&shape);
        assert!((compiled.eval(Vec3::new(0.3, 0.1, 0.7)) - shape.eval(Vec3::new(0.3, 0.1, 0.7))).abs() < 1e-5);
    }

    #[test]
    fn test_octree_workflow() {
        let mut arm = SdfNode::cylinder(0.5, 3.0);
        arm.rotate_x(90.0);
        let shape = SdfNode::sphere(2.0).blend_union(0.2, arm);

        let tree = SdfOctree::create(&shape, 0.25, false, 3, 0.0).unwrap();
        let p = Vec3::new(0.9, 0.1, 0.0);
        assert!((tree.eval(p, true) - shape.eval(p)).abs() < 1e-5);
    }

    #[test]
    fn test_tree_serialization_round_trip() {
        let shape = SdfNode::sphere(2.0)
            .blend_union(0.25, SdfNode::torus(3.0, 0.5))
            .flate(0.1);
        let json = serde_json::to_string(&shape).unwrap();
        let restored: SdfNode = serde_json::from_str(&json).unwrap();
        for p in [Vec3::ZERO, Vec3::new(1.2, -0.4, 0.8)] {
            assert!((restored.eval(p) - shape.eval(p)).abs() < 1e-6);
        }
    }
}
