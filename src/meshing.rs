//! Sodapop meshing pipeline
//!
//! Turns a Drawable's evaluator into mesh buffers through a fixed chain
//! of parallel stages: finish the acceleration octree, build a
//! deduplicated point cache over its leaves, sample a clamped dense grid,
//! extract the surface with the surface-nets library, then bake normals
//! and materials per vertex. The chain owns all transient state; the
//! Drawable receives the finished buffers in one exclusive hand-off.
//!
//! Author: Moroya Sakamoto

use fast_surface_nets::ndshape::RuntimeShape;
use fast_surface_nets::{surface_nets, SurfaceNetsBuffer};
use glam::{UVec3, Vec3, Vec4};
use log::debug;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use crate::aabb::Aabb;
use crate::material::same_material;
use crate::model::{Drawable, MeshBuffers};
use crate::octree::SdfOctree;
use crate::tasks::{self, ChainStage, StageOutcome};

/// Grid cells per world unit when the caller has no preference
pub const DEFAULT_DENSITY: f32 = 20.0;

/// Sample values are clamped to this magnitude before extraction; the
/// surface-nets library is numerically sensitive to unbounded inputs
const SAMPLE_CLAMP: f32 = 100.0;

/// Point-cache bucket span, capping per-bucket lock contention
const BUCKET_SPAN: usize = 64;

/// Octree settings for meshing: fine cells, shallow synchronous build,
/// no coalescing so leaf evaluators stay minimal
const MESHING_TARGET_SIZE: f32 = 0.25;
const MESHING_MAX_DEPTH: u32 = 3;

/// Dense sample lattice over the evaluator bounds
///
/// The lattice is over-provisioned by two cells of padding on the low
/// side and one-plus-two on the high (the `+3` in the sample counts) so
/// the extracted surface never clips at the boundary. Flat indices use
/// x-fastest strides, matching the extraction library's layout.
#[derive(Debug, Clone, Copy)]
pub struct MeshingGrid {
    origin: Vec3,
    delta: Vec3,
    samples: UVec3,
}

impl MeshingGrid {
    fn for_bounds(bounds: Aabb, density: f32) -> MeshingGrid {
        let extent = bounds.extent();
        let base = (extent * density).ceil().max(Vec3::splat(8.0));
        let delta = extent / base;
        MeshingGrid {
            origin: bounds.min - delta * 2.0,
            delta,
            samples: base.as_uvec3() + UVec3::splat(3),
        }
    }

    fn total_samples(&self) -> usize {
        self.samples.x as usize * self.samples.y as usize * self.samples.z as usize
    }

    #[inline]
    fn unflatten(&self, flat: u32) -> UVec3 {
        let slice = self.samples.x * self.samples.y;
        let z = flat / slice;
        let rem = flat % slice;
        UVec3::new(rem % self.samples.x, rem / self.samples.x, z)
    }

    #[inline]
    fn world_position(&self, lattice: Vec3) -> Vec3 {
        self.origin + lattice * self.delta
    }

    /// Inclusive lattice index range covering `bounds`, padded one cell
    /// so corners shared with a neighboring leaf are cached by both
    fn corner_range(&self, bounds: &Aabb) -> (UVec3, UVec3) {
        let hi = self.samples - UVec3::ONE;
        let lo_cell = ((bounds.min - self.origin) / self.delta).floor() - Vec3::ONE;
        let hi_cell = ((bounds.max - self.origin) / self.delta).ceil() + Vec3::ONE;
        let lo = lo_cell.max(Vec3::ZERO).as_uvec3().min(hi);
        let hi = hi_cell.max(Vec3::ZERO).as_uvec3().min(hi);
        (lo, hi)
    }
}

/// Transient state owned by one in-flight pipeline
///
/// Freed when the terminal stage completes (or the chain is abandoned).
struct MeshingScratch {
    density: f32,
    octree: Option<Box<SdfOctree>>,
    grid: MeshingGrid,
    leaf_bounds: Vec<Aabb>,
    cache: Vec<Mutex<BTreeSet<u32>>>,
    buckets: Vec<Vec<u32>>,
    samples: Vec<f32>,
    extraction: SurfaceNetsBuffer,
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    colors: Vec<Vec4>,
    indices: Vec<u32>,
    slot_vertices: Vec<Mutex<Vec<u32>>>,
}

type Stage = Box<dyn ChainStage<MeshingScratch, Arc<Drawable>>>;

/// Kick off the meshing chain for `drawable`
///
/// Returns immediately; the chain runs on the pool and the drawable's
/// ready flag flips when (and only if) the terminal stage completes.
/// Degenerate or unbounded evaluators never start the chain, leaving the
/// drawable permanently not ready.
pub fn populate(drawable: &Arc<Drawable>, density: f32) {
    let octree = match SdfOctree::create(
        drawable.evaluator(),
        MESHING_TARGET_SIZE,
        false,
        MESHING_MAX_DEPTH,
        0.0,
    ) {
        Ok(octree) => octree,
        Err(err) => {
            debug!("meshing declined: {err}");
            return;
        }
    };

    let slots = drawable.material_slots().len();
    let scratch = MeshingScratch {
        density,
        grid: MeshingGrid::for_bounds(octree.bounds, density),
        octree: Some(octree),
        leaf_bounds: Vec::new(),
        cache: Vec::new(),
        buckets: Vec::new(),
        samples: Vec::new(),
        extraction: SurfaceNetsBuffer::default(),
        positions: Vec::new(),
        normals: Vec::new(),
        colors: Vec::new(),
        indices: Vec::new(),
        slot_vertices: (0..slots).map(|_| Mutex::new(Vec::new())).collect(),
    };

    let weak = Arc::downgrade(drawable);
    let stages: Vec<Stage> = vec![
        Box::new(PopulateOctree),
        Box::new(PopulatePointCache),
        Box::new(VertexLoop),
        Box::new(FaceLoop),
        Box::new(NormalLoop),
        Box::new(AverageNormals),
        Box::new(MaterialLoop),
    ];
    tasks::run_chain(scratch, move || weak.upgrade(), stages);
}

/// Stage 1: finish deferred octree cells in parallel, link the leaves,
/// and fix the sample grid over the tightened bounds
struct PopulateOctree;

impl ChainStage<MeshingScratch, Arc<Drawable>> for PopulateOctree {
    fn name(&self) -> &'static str {
        "populate octree"
    }

    fn setup(&self, scratch: &mut MeshingScratch, _drawable: &Arc<Drawable>) {
        if let Some(octree) = scratch.octree.as_deref_mut() {
            octree.populate_deferred();
            let leaves = octree.link_leaves();
            scratch.grid = MeshingGrid::for_bounds(octree.bounds, scratch.density);
            scratch.leaf_bounds = octree.collect_leaf_bounds();
            debug!(
                "meshing octree populated: {leaves} leaves, {} samples",
                scratch.grid.total_samples()
            );
        }
    }

    fn done(&self, scratch: &mut MeshingScratch, _drawable: &Arc<Drawable>) -> StageOutcome {
        if scratch.leaf_bounds.is_empty() {
            StageOutcome::Abort
        } else {
            StageOutcome::Continue
        }
    }
}

/// Stage 2: deduplicate voxel-corner evaluations across leaves through
/// sharded mutex buckets keyed by flat lattice index
struct PopulatePointCache;

impl ChainStage<MeshingScratch, Arc<Drawable>> for PopulatePointCache {
    fn name(&self) -> &'static str {
        "populate point cache"
    }

    fn setup(&self, scratch: &mut MeshingScratch, _drawable: &Arc<Drawable>) {
        let buckets = scratch.grid.total_samples().div_ceil(BUCKET_SPAN);
        scratch.cache = (0..buckets).map(|_| Mutex::new(BTreeSet::new())).collect();
    }

    fn run(&self, scratch: &MeshingScratch, _drawable: &Arc<Drawable>) {
        let grid = scratch.grid;
        tasks::fan_out_indexed(&scratch.leaf_bounds, |_, leaf| {
            let (lo, hi) = grid.corner_range(leaf);
            for z in lo.z..=hi.z {
                for y in lo.y..=hi.y {
                    let row = (z * grid.samples.y + y) * grid.samples.x;
                    for x in lo.x..=hi.x {
                        let flat = row + x;
                        let bucket = flat as usize / BUCKET_SPAN;
                        scratch.cache[bucket].lock().unwrap().insert(flat);
                    }
                }
            }
        });
    }

    fn done(&self, scratch: &mut MeshingScratch, _drawable: &Arc<Drawable>) -> StageOutcome {
        // Flatten the shard sets; empties stay as zero-length slots so
        // bucket index keeps matching sample-chunk index
        scratch.buckets = scratch
            .cache
            .drain(..)
            .map(|shard| shard.into_inner().unwrap().into_iter().collect())
            .collect();
        let live = scratch.buckets.iter().filter(|b| !b.is_empty()).count();
        debug!("point cache built: {live} live buckets");
        StageOutcome::Continue
    }
}

/// Stage 3: evaluate the clamped implicit function at every cached
/// corner; unevaluated space reads as far-away positive
struct VertexLoop;

impl ChainStage<MeshingScratch, Arc<Drawable>> for VertexLoop {
    fn name(&self) -> &'static str {
        "vertex loop"
    }

    fn setup(&self, scratch: &mut MeshingScratch, _drawable: &Arc<Drawable>) {
        let Some(octree) = scratch.octree.as_deref() else {
            return;
        };
        let grid = scratch.grid;
        scratch.samples = vec![SAMPLE_CLAMP; grid.total_samples()];
        // Buckets partition the flat index space into disjoint aligned
        // chunks, so each worker writes its own slice without locking
        scratch
            .samples
            .par_chunks_mut(BUCKET_SPAN)
            .zip(scratch.buckets.par_iter())
            .for_each(|(chunk, bucket)| {
                for &flat in bucket {
                    let lattice = grid.unflatten(flat).as_vec3();
                    let point = grid.world_position(lattice);
                    let dist = octree.eval(point, false);
                    chunk[flat as usize % BUCKET_SPAN] = dist.clamp(-SAMPLE_CLAMP, SAMPLE_CLAMP);
                }
            });
    }
}

/// Stage 4: run surface extraction over the sample grid and copy out
/// world-space vertex positions
struct FaceLoop;

impl ChainStage<MeshingScratch, Arc<Drawable>> for FaceLoop {
    fn name(&self) -> &'static str {
        "face loop"
    }

    fn setup(&self, scratch: &mut MeshingScratch, _drawable: &Arc<Drawable>) {
        let grid = scratch.grid;
        let shape = RuntimeShape::<u32, 3>::new(grid.samples.to_array());
        surface_nets(
            &scratch.samples,
            &shape,
            [0; 3],
            (grid.samples - UVec3::ONE).to_array(),
            &mut scratch.extraction,
        );
    }

    fn done(&self, scratch: &mut MeshingScratch, _drawable: &Arc<Drawable>) -> StageOutcome {
        let grid = scratch.grid;
        scratch.positions = scratch
            .extraction
            .positions
            .iter()
            .map(|p| grid.world_position(Vec3::from_array(*p)))
            .collect();
        debug!(
            "surface extracted: {} vertices, {} triangles",
            scratch.positions.len(),
            scratch.extraction.indices.len() / 3
        );
        StageOutcome::Continue
    }
}

/// Stage 5: publish the triangle list
struct NormalLoop;

impl ChainStage<MeshingScratch, Arc<Drawable>> for NormalLoop {
    fn name(&self) -> &'static str {
        "normal loop"
    }

    fn setup(&self, scratch: &mut MeshingScratch, _drawable: &Arc<Drawable>) {
        scratch.indices = scratch.extraction.indices.clone();
    }
}

/// Stage 6: analytic gradient normals, with the extraction library's
/// interpolated normal as the flat-region fallback
struct AverageNormals;

impl ChainStage<MeshingScratch, Arc<Drawable>> for AverageNormals {
    fn name(&self) -> &'static str {
        "average normals"
    }

    fn setup(&self, scratch: &mut MeshingScratch, _drawable: &Arc<Drawable>) {
        let Some(octree) = scratch.octree.as_deref() else {
            return;
        };
        let extracted = &scratch.extraction.normals;
        scratch.normals = scratch
            .positions
            .par_iter()
            .enumerate()
            .map(|(vertex, &position)| {
                let gradient = octree.gradient(position);
                if gradient != Vec3::ZERO {
                    gradient
                } else {
                    Vec3::from_array(extracted[vertex]).normalize_or_zero()
                }
            })
            .collect();
    }
}

/// Stage 7: per-vertex governing material, slot assignment, and baked
/// chthonic colors; hands the finished buffers to the drawable
struct MaterialLoop;

impl ChainStage<MeshingScratch, Arc<Drawable>> for MaterialLoop {
    fn name(&self) -> &'static str {
        "material loop"
    }

    fn setup(&self, scratch: &mut MeshingScratch, drawable: &Arc<Drawable>) {
        let Some(octree) = scratch.octree.as_deref() else {
            return;
        };
        let slots = drawable.material_slots();
        let slot_vertices = &scratch.slot_vertices;
        let normals = &scratch.normals;
        scratch.colors = scratch
            .positions
            .par_iter()
            .enumerate()
            .map(|(vertex, &position)| {
                let normal = normals[vertex];
                match octree.get_material(position) {
                    Some(material) => {
                        if let Some(slot) =
                            slots.iter().position(|known| same_material(known, &material))
                        {
                            slot_vertices[slot].lock().unwrap().push(vertex as u32);
                        }
                        material.eval_chthonic(position, normal, normal)
                    }
                    None => Vec4::ONE,
                }
            })
            .collect();
    }

    fn done(&self, scratch: &mut MeshingScratch, drawable: &Arc<Drawable>) -> StageOutcome {
        let buffers = MeshBuffers {
            positions: std::mem::take(&mut scratch.positions),
            normals: std::mem::take(&mut scratch.normals),
            colors: std::mem::take(&mut scratch.colors),
            indices: std::mem::take(&mut scratch.indices),
        };
        let slot_vertices = scratch
            .slot_vertices
            .drain(..)
            .map(|slot| slot.into_inner().unwrap())
            .collect();
        let octree = scratch.octree.take();
        drawable.install_mesh(buffers, slot_vertices, octree);
        debug!("mesh installed for drawable");
        // Scratch drops with the chain; nothing left to free by hand
        StageOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_dimensions() {
        let bounds = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let grid = MeshingGrid::for_bounds(bounds, DEFAULT_DENSITY);
        // 2 units * 20 cells/unit = 40 base samples, +3 padding
        assert_eq!(grid.samples, UVec3::splat(43));
        // Origin backs off two cells from the bounds
        let delta = 2.0 / 40.0;
        assert!((grid.origin - (bounds.min - Vec3::splat(delta * 2.0)))
            .length()
            .abs()
            < 1e-6);
    }

    #[test]
    fn test_grid_enforces_minimum_resolution() {
        let bounds = Aabb::new(Vec3::ZERO, Vec3::splat(0.1));
        let grid = MeshingGrid::for_bounds(bounds, DEFAULT_DENSITY);
        assert_eq!(grid.samples, UVec3::splat(11));
    }

    #[test]
    fn test_flat_index_round_trip() {
        let bounds = Aabb::new(Vec3::ZERO, Vec3::new(1.0, 2.0, 0.5));
        let grid = MeshingGrid::for_bounds(bounds, DEFAULT_DENSITY);
        let lattice = UVec3::new(3, 7, 2);
        let flat = (lattice.z * grid.samples.y + lattice.y) * grid.samples.x + lattice.x;
        assert_eq!(grid.unflatten(flat), lattice);
    }

    #[test]
    fn test_corner_range_clamps_to_lattice() {
        let bounds = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let grid = MeshingGrid::for_bounds(bounds, DEFAULT_DENSITY);
        let (lo, hi) = grid.corner_range(&Aabb::new(Vec3::splat(-50.0), Vec3::splat(50.0)));
        assert_eq!(lo, UVec3::ZERO);
        assert_eq!(hi, grid.samples - UVec3::ONE);
    }
}
