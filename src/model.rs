//! Drawable and model bookkeeping
//!
//! A Drawable is the meshed form of one evaluator, shared through a
//! process-wide weak cache so identical trees never mesh twice. A model
//! is one placed instance of a Drawable with its own transform,
//! visibility, and incrementally-shaded instance colors.
//!
//! Author: Moroya Sakamoto

use glam::{Mat4, Vec3, Vec4};
use log::debug;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::material::{Material, MaterialShared};
use crate::meshing;
use crate::octree::SdfOctree;
use crate::scheduler::{self, ContinuousTask, TaskStatus};
use crate::types::SdfNode;

/// Finished mesh output
#[derive(Debug, Default, Clone)]
pub struct MeshBuffers {
    /// World-space vertex positions
    pub positions: Vec<Vec3>,
    /// Per-vertex unit normals
    pub normals: Vec<Vec3>,
    /// Baked per-vertex colors
    pub colors: Vec<Vec4>,
    /// Triangle list
    pub indices: Vec<u32>,
}

/// Meshed form of one evaluator, shared between models
pub struct Drawable {
    evaluator: Arc<SdfNode>,
    material_slots: Vec<MaterialShared>,
    buffers: Mutex<MeshBuffers>,
    slot_vertices: Mutex<Vec<Vec<u32>>>,
    octree: Mutex<Option<Box<SdfOctree>>>,
    mesh_ready: AtomicBool,
}

lazy_static::lazy_static! {
    /// Process-wide drawable cache: evaluator address to weak drawable
    static ref DRAWABLE_CACHE: Mutex<Vec<(usize, Weak<Drawable>)>> = Mutex::new(Vec::new());

    /// Every model still alive, for frame-loop iteration
    static ref LIVE_MODELS: Mutex<Vec<Weak<SdfModel>>> = Mutex::new(Vec::new());
}

impl Drawable {
    /// Fetch or build the drawable for `evaluator`
    ///
    /// A cache hit shares the existing drawable and its in-flight or
    /// finished mesh; a miss deep-copies the evaluator (folding pending
    /// transforms so the copy is immutable under background meshing) and
    /// kicks off the meshing chain.
    pub fn acquire(evaluator: &Arc<SdfNode>, density: f32) -> Arc<Drawable> {
        let key = Arc::as_ptr(evaluator) as usize;
        let mut cache = DRAWABLE_CACHE.lock().unwrap();
        for (cached_key, weak) in cache.iter() {
            if *cached_key == key {
                if let Some(drawable) = weak.upgrade() {
                    debug!("drawable cache hit");
                    return drawable;
                }
            }
        }

        let frozen = Arc::new(evaluator.deep_copy());
        let mut slots: Vec<MaterialShared> = Vec::new();
        frozen.walk_materials(&mut |material| {
            if !slots.iter().any(|known| Arc::ptr_eq(known, material)) {
                slots.push(material.clone());
            }
        });

        let drawable = Arc::new(Drawable {
            evaluator: frozen,
            material_slots: slots,
            buffers: Mutex::new(MeshBuffers::default()),
            slot_vertices: Mutex::new(Vec::new()),
            octree: Mutex::new(None),
            mesh_ready: AtomicBool::new(false),
        });
        cache.push((key, Arc::downgrade(&drawable)));
        drop(cache);

        meshing::populate(&drawable, density);
        drawable
    }

    /// Frozen evaluator this drawable meshes
    pub fn evaluator(&self) -> &Arc<SdfNode> {
        &self.evaluator
    }

    /// Stable material slot table, first-seen insertion order
    pub fn material_slots(&self) -> &[MaterialShared] {
        &self.material_slots
    }

    /// True once the meshing chain's terminal stage has completed
    pub fn mesh_ready(&self) -> bool {
        self.mesh_ready.load(Ordering::Acquire)
    }

    /// Locked view of the mesh output
    pub fn mesh(&self) -> MutexGuard<'_, MeshBuffers> {
        self.buffers.lock().unwrap()
    }

    /// Vertex list per material slot, parallel to `material_slots`
    pub fn slot_vertices(&self) -> MutexGuard<'_, Vec<Vec<u32>>> {
        self.slot_vertices.lock().unwrap()
    }

    /// Meshing octree, retained for later spatial queries
    pub fn with_octree<R>(&self, f: impl FnOnce(Option<&SdfOctree>) -> R) -> R {
        let guard = self.octree.lock().unwrap();
        f(guard.as_deref())
    }

    /// Terminal hand-off from the meshing chain
    pub fn install_mesh(
        &self,
        buffers: MeshBuffers,
        slot_vertices: Vec<Vec<u32>>,
        octree: Option<Box<SdfOctree>>,
    ) {
        *self.buffers.lock().unwrap() = buffers;
        *self.slot_vertices.lock().unwrap() = slot_vertices;
        *self.octree.lock().unwrap() = octree;
        self.mesh_ready.store(true, Ordering::Release);
        // Shader tasks parked on a not-ready mesh have work now
        scheduler::rearm_continuous();
    }
}

impl Drop for Drawable {
    fn drop(&mut self) {
        // One stale cache entry is pruned per deletion event, bounding
        // cleanup cost instead of sweeping the whole list
        scheduler::enqueue_delete(|| {
            let mut cache = DRAWABLE_CACHE.lock().unwrap();
            if let Some(stale) = cache.iter().position(|(_, weak)| weak.strong_count() == 0) {
                cache.swap_remove(stale);
            }
        });
    }
}

/// Whole-scene shading override
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MaterialOverrideMode {
    /// Shade with each vertex's own material
    Off = 0,
    /// Shade every vertex with the debug-normals material
    Normals = 1,
    /// Shade every vertex with its material's flat swatch color
    Invariant = 2,
}

static OVERRIDE_MODE: AtomicU8 = AtomicU8::new(MaterialOverrideMode::Off as u8);

/// Set the global shading override
pub fn set_material_override(mode: MaterialOverrideMode) {
    OVERRIDE_MODE.store(mode as u8, Ordering::Relaxed);
    // Converged shader tasks must re-shade under the new mode
    scheduler::rearm_continuous();
}

/// Current global shading override
pub fn material_override() -> MaterialOverrideMode {
    match OVERRIDE_MODE.load(Ordering::Relaxed) {
        1 => MaterialOverrideMode::Normals,
        2 => MaterialOverrideMode::Invariant,
        _ => MaterialOverrideMode::Off,
    }
}

/// Vertices shaded per `ShaderTask` invocation
const SHADER_BATCH: usize = 64;

/// One placed instance of a Drawable
pub struct SdfModel {
    drawable: Arc<Drawable>,
    transform: Mutex<Mat4>,
    visible: AtomicBool,
    listens_to_mouse: AtomicBool,
    instance_colors: Mutex<Vec<Vec4>>,
    drawing: AtomicBool,
}

impl SdfModel {
    /// Place a new instance of `evaluator` in the scene
    ///
    /// The drawable is shared through the cache; one recurring shading
    /// task per material slot starts immediately and waits for the mesh.
    pub fn create(evaluator: &Arc<SdfNode>, transform: Mat4) -> Arc<SdfModel> {
        let drawable = Drawable::acquire(evaluator, meshing::DEFAULT_DENSITY);
        let model = Arc::new(SdfModel {
            drawable,
            transform: Mutex::new(transform),
            visible: AtomicBool::new(true),
            listens_to_mouse: AtomicBool::new(false),
            instance_colors: Mutex::new(Vec::new()),
            drawing: AtomicBool::new(false),
        });
        LIVE_MODELS.lock().unwrap().push(Arc::downgrade(&model));

        for slot in 0..model.drawable.material_slots().len() {
            scheduler::enqueue_continuous(ShaderTask {
                model: Arc::downgrade(&model),
                slot,
                cursor: 0,
            });
        }
        model
    }

    /// Shared mesh this instance draws
    pub fn drawable(&self) -> &Arc<Drawable> {
        &self.drawable
    }

    /// World transform
    pub fn transform(&self) -> Mat4 {
        *self.transform.lock().unwrap()
    }

    /// Move the instance
    pub fn set_transform(&self, transform: Mat4) {
        *self.transform.lock().unwrap() = transform;
    }

    /// Instance visibility
    pub fn visible(&self) -> bool {
        self.visible.load(Ordering::Relaxed)
    }

    /// Show or hide the instance
    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::Relaxed);
    }

    /// Whether picking queries should consider this instance
    pub fn listens_to_mouse(&self) -> bool {
        self.listens_to_mouse.load(Ordering::Relaxed)
    }

    /// Opt the instance in or out of picking queries
    pub fn set_listens_to_mouse(&self, listens: bool) {
        self.listens_to_mouse.store(listens, Ordering::Relaxed);
    }

    /// Per-instance shaded colors, parallel to the drawable's positions
    pub fn instance_colors(&self) -> MutexGuard<'_, Vec<Vec4>> {
        self.instance_colors.lock().unwrap()
    }

    /// Mark a draw in flight; shading tasks yield until cleared
    pub fn begin_draw(&self) {
        self.drawing.store(true, Ordering::Release);
    }

    /// Clear the in-flight draw flag and wake tasks that yielded to it
    pub fn end_draw(&self) {
        self.drawing.store(false, Ordering::Release);
        scheduler::rearm_continuous();
    }

    /// Shading groups: one per material slot with any vertices assigned
    pub fn coloring_groups(&self) -> Vec<ColoringGroup> {
        self.drawable
            .slot_vertices()
            .iter()
            .enumerate()
            .filter(|(_, vertices)| !vertices.is_empty())
            .map(|(slot, vertices)| ColoringGroup {
                material_slot: slot,
                vertex_count: vertices.len(),
            })
            .collect()
    }
}

/// One material slot's share of an instance's vertices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColoringGroup {
    /// Index into the drawable's material slot table
    pub material_slot: usize,
    /// Vertices assigned to the slot
    pub vertex_count: usize,
}

/// Every model still alive
pub fn get_live_models() -> Vec<Arc<SdfModel>> {
    let mut registry = LIVE_MODELS.lock().unwrap();
    registry.retain(|weak| weak.strong_count() > 0);
    registry.iter().filter_map(|weak| weak.upgrade()).collect()
}

/// Drop the registry's references to every model
pub fn unload_all_models() {
    LIVE_MODELS.lock().unwrap().clear();
    // Parked tasks whose models have been dropped run once more and remove
    // themselves
    scheduler::rearm_continuous();
}

/// Recurring incremental shading over one material slot's vertices
///
/// Shades a bounded batch per invocation so large meshes spread their
/// shading across many scheduler turns, and yields immediately while a
/// draw is in flight.
struct ShaderTask {
    model: Weak<SdfModel>,
    slot: usize,
    cursor: usize,
}

impl ShaderTask {
    fn shade(&self, material: &MaterialShared, position: Vec3, normal: Vec3) -> Vec4 {
        match material_override() {
            MaterialOverrideMode::Off => material.eval_chthonic(position, normal, normal),
            MaterialOverrideMode::Normals => {
                Material::debug_normals().eval_chthonic(position, normal, normal)
            }
            MaterialOverrideMode::Invariant => material.guess_color().extend(1.0),
        }
    }
}

impl ContinuousTask for ShaderTask {
    fn run(&mut self) -> TaskStatus {
        let model = match self.model.upgrade() {
            Some(model) => model,
            None => return TaskStatus::Remove,
        };
        if model.drawing.load(Ordering::Acquire) {
            return TaskStatus::Skipped;
        }
        if !model.drawable.mesh_ready() {
            return TaskStatus::Skipped;
        }

        let material = &model.drawable.material_slots()[self.slot];
        let slot_vertices = model.drawable.slot_vertices();
        let vertices = &slot_vertices[self.slot];
        if vertices.is_empty() {
            return TaskStatus::Remove;
        }

        let mesh = model.drawable.mesh();
        let mut colors = model.instance_colors.lock().unwrap();
        if colors.len() != mesh.positions.len() {
            colors.resize(mesh.positions.len(), Vec4::ONE);
        }

        let mut repainted = false;
        let batch = SHADER_BATCH.min(vertices.len());
        for _ in 0..batch {
            let vertex = vertices[self.cursor % vertices.len()] as usize;
            self.cursor = (self.cursor + 1) % vertices.len();
            let shaded = self.shade(material, mesh.positions[vertex], mesh.normals[vertex]);
            if colors[vertex] != shaded {
                colors[vertex] = shaded;
                repainted = true;
            }
        }

        if repainted {
            TaskStatus::Repainted
        } else {
            TaskStatus::Converged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Material;

    #[test]
    fn test_drawable_cache_reuses_by_identity() {
        let evaluator = Arc::new(SdfNode::sphere(1.0));
        let first = Drawable::acquire(&evaluator, meshing::DEFAULT_DENSITY);
        let second = Drawable::acquire(&evaluator, meshing::DEFAULT_DENSITY);
        assert!(Arc::ptr_eq(&first, &second));

        // A structurally identical tree behind a different pointer is a
        // different cache entry
        let other = Arc::new(SdfNode::sphere(1.0));
        let third = Drawable::acquire(&other, meshing::DEFAULT_DENSITY);
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_material_slot_table_is_insertion_ordered() {
        let red = Material::solid_color(Vec3::X);
        let blue = Material::solid_color(Vec3::Z);
        let mut right = SdfNode::sphere(1.0).paint(blue.clone());
        right.move_by(Vec3::new(2.0, 0.0, 0.0));
        let tree = Arc::new(SdfNode::sphere(1.0).paint(red.clone()).union(right));

        let drawable = Drawable::acquire(&tree, meshing::DEFAULT_DENSITY);
        let slots = drawable.material_slots();
        assert_eq!(slots.len(), 2);
        assert!(Arc::ptr_eq(&slots[0], &red));
        assert!(Arc::ptr_eq(&slots[1], &blue));
    }

    #[test]
    fn test_degenerate_drawable_never_ready() {
        let plane = Arc::new(SdfNode::plane(0.0, 0.0, 1.0));
        let drawable = Drawable::acquire(&plane, meshing::DEFAULT_DENSITY);
        std::thread::sleep(std::time::Duration::from_millis(200));
        assert!(!drawable.mesh_ready());
        assert!(drawable.mesh().positions.is_empty());
    }

    #[test]
    fn test_override_mode_round_trip() {
        set_material_override(MaterialOverrideMode::Normals);
        assert_eq!(material_override(), MaterialOverrideMode::Normals);
        set_material_override(MaterialOverrideMode::Off);
        assert_eq!(material_override(), MaterialOverrideMode::Off);
    }
}
