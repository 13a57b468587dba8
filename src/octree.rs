//! Spatial acceleration octree
//!
//! Recursive 8-way partition over a node tree's bounding cube. Every cell
//! clips the parent evaluator down to its own bounding sphere, so queries
//! inside a leaf run against a much smaller tree (and a matching compiled
//! interpreter) than the scene root. Cells past the depth cap defer their
//! subdivision; the meshing pipeline finishes them in parallel later.
//!
//! Author: Moroya Sakamoto

use glam::Vec3;
use log::{debug, trace};
use rayon::prelude::*;
use std::sync::Arc;
use thiserror::Error;

use crate::aabb::Aabb;
use crate::compiled::SdfInterpreter;
use crate::material::MaterialShared;
use crate::types::SdfNode;

/// Why an octree could not be constructed
#[derive(Debug, Error)]
pub enum OctreeError {
    /// The evaluator has no finite extent on any axis (e.g. a bare half space)
    #[error("evaluator is unbounded on every axis")]
    Unbounded,
    /// The evaluator's bounds are empty or zero volume
    #[error("evaluator bounds are degenerate")]
    Degenerate,
    /// Nothing of the evaluator survives clipping against its own bounds
    #[error("evaluator contributes nothing within its bounds")]
    Empty,
}

/// One cell of the acceleration structure
///
/// Cells move through exactly three states: unpopulated (freshly deferred,
/// `incomplete` set), populated interior (live children), and populated
/// terminus. Coalescing only ever turns an interior back into a terminus;
/// nothing re-enters the unpopulated state.
pub struct SdfOctree {
    /// Cell bounds, tightened to the union of live children after population
    pub bounds: Aabb,
    pivot: Vec3,
    target_size: f32,
    coalesce: bool,
    depth: u32,
    terminus: bool,
    incomplete: bool,
    leaf_ordinal: usize,
    evaluator: Option<Arc<SdfNode>>,
    interpreter: Option<Arc<SdfInterpreter>>,
    children: [Option<Box<SdfOctree>>; 8],
}

impl SdfOctree {
    /// Build an octree over `evaluator`
    ///
    /// The root cell is the evaluator's bounding cube expanded by `margin`.
    /// Subdivision stops at cells no larger than `target_size`; cells that
    /// would subdivide past `max_depth` are deferred instead (unless
    /// `coalesce` is set, in which case depth is uncapped and uniform
    /// regions collapse back together). Deferred cells are finished later
    /// by [`SdfOctree::populate_deferred`].
    pub fn create(
        evaluator: &SdfNode,
        target_size: f32,
        coalesce: bool,
        max_depth: u32,
        margin: f32,
    ) -> Result<Box<SdfOctree>, OctreeError> {
        if !evaluator.has_finite_bounds() {
            return Err(OctreeError::Unbounded);
        }
        let bounds = evaluator.bounds();
        if bounds.degenerate() || bounds.volume() == 0.0 {
            return Err(OctreeError::Degenerate);
        }

        let cell = bounds.bounding_cube().expand(margin);
        let mut root = SdfOctree::populate_cell(
            evaluator,
            cell,
            target_size,
            coalesce,
            1,
            max_depth,
        );
        match root.take() {
            Some(root) => {
                debug!(
                    "octree over {:?} ready, target size {}",
                    root.bounds, target_size
                );
                Ok(root)
            }
            None => Err(OctreeError::Empty),
        }
    }

    /// Clip, classify, and recurse; `None` when the cell is dead space
    fn populate_cell(
        parent_evaluator: &SdfNode,
        cell: Aabb,
        target_size: f32,
        coalesce: bool,
        depth: u32,
        max_depth: u32,
    ) -> Option<Box<SdfOctree>> {
        let pivot = cell.center();
        let radius = (cell.max - cell.min).length() * 0.5;
        let evaluator = parent_evaluator.clip(pivot, radius)?;

        // Coalescing short-circuit: a cell whose clipped evaluator is
        // already tiny runs faster whole than subdivided
        let tiny = coalesce && evaluator.leaf_count() <= depth.max(3) as usize;

        let mut node = Box::new(SdfOctree {
            bounds: cell,
            pivot,
            target_size,
            coalesce,
            depth,
            terminus: tiny || cell.extent().max_element() <= target_size,
            incomplete: false,
            leaf_ordinal: usize::MAX,
            evaluator: None,
            interpreter: Some(Arc::new(SdfInterpreter::new(&evaluator))),
            children: Default::default(),
        });
        node.evaluator = Some(Arc::new(evaluator));

        if !node.terminus {
            if depth >= max_depth && !coalesce {
                // Defer; populate_deferred picks this cell up later
                node.incomplete = true;
                trace!("octree cell at {:?} deferred at depth {depth}", pivot);
            } else {
                node.subdivide(max_depth);
            }
        }
        Some(node)
    }

    /// Populate all eight octants, then tighten and maybe coalesce
    fn subdivide(&mut self, max_depth: u32) {
        let evaluator = match &self.evaluator {
            Some(evaluator) => evaluator.clone(),
            None => return,
        };
        let min = self.bounds.min;
        let half = self.bounds.extent() * 0.5;
        for octant in 0..8usize {
            let corner = min
                + Vec3::new(
                    if octant & 1 != 0 { half.x } else { 0.0 },
                    if octant & 2 != 0 { half.y } else { 0.0 },
                    if octant & 4 != 0 { half.z } else { 0.0 },
                );
            let cell = Aabb::new(corner, corner + half);
            self.children[octant] = SdfOctree::populate_cell(
                &evaluator,
                cell,
                self.target_size,
                self.coalesce,
                self.depth + 1,
                max_depth,
            );
        }
        self.settle();
    }

    /// Post-child bookkeeping: dead-leaf collapse, bounds tightening,
    /// and coalescing of locally-uniform regions
    fn settle(&mut self) {
        let live = self.children.iter().flatten().count();
        if live == 0 {
            // All octants clipped away; the blend padding in the parent's
            // clip radius was the only thing keeping this cell alive
            self.terminus = true;
            self.evaluator = None;
            self.interpreter = None;
            return;
        }

        let mut tight = Aabb::empty();
        for child in self.children.iter().flatten() {
            tight = tight.union(&child.bounds);
        }
        self.bounds = tight;

        if self.coalesce && self.should_coalesce(live) {
            trace!("coalescing octree cell at {:?}", self.pivot);
            self.children = Default::default();
            self.terminus = true;
        }
    }

    fn should_coalesce(&self, live: usize) -> bool {
        if live != 8 {
            return false;
        }
        let mut octants = self.children.iter().flatten();
        let first = match octants.next() {
            Some(first) => first,
            None => return false,
        };
        if !first.terminus {
            return false;
        }
        let reference = match &first.evaluator {
            Some(evaluator) => evaluator,
            None => return false,
        };
        octants.all(|child| {
            child.terminus
                && child
                    .evaluator
                    .as_deref()
                    .is_some_and(|evaluator| evaluator == reference.as_ref())
        })
    }

    /// Finish every deferred cell, fanning the work across the pool
    ///
    /// Deferred cells are disjoint subtrees, so each can subdivide with an
    /// exclusive borrow while the rest of the tree stays untouched.
    pub fn populate_deferred(&mut self) {
        let mut deferred: Vec<&mut SdfOctree> = Vec::new();
        self.collect_deferred(&mut deferred);
        if deferred.is_empty() {
            return;
        }
        debug!("populating {} deferred octree cells", deferred.len());
        deferred.into_par_iter().for_each(|cell| {
            cell.incomplete = false;
            cell.subdivide(u32::MAX);
        });
    }

    fn collect_deferred<'a>(&'a mut self, out: &mut Vec<&'a mut SdfOctree>) {
        if self.incomplete {
            out.push(self);
            return;
        }
        for child in self.children.iter_mut().flatten() {
            child.collect_deferred(out);
        }
    }

    /// True once no cell in the subtree is still deferred
    pub fn fully_populated(&self) -> bool {
        !self.incomplete
            && self
                .children
                .iter()
                .flatten()
                .all(|child| child.fully_populated())
    }

    /// Cell governing `point`
    ///
    /// Approximate descent treats empty branches as a miss; exact descent
    /// falls back to the nearest ancestor that still holds an evaluator,
    /// which is what ray marching needs for correctness.
    pub fn descend(&self, point: Vec3, exact: bool) -> Option<&SdfOctree> {
        if self.terminus || self.incomplete {
            return self.evaluator.is_some().then_some(self);
        }
        let octant = (usize::from(point.x >= self.pivot.x))
            | (usize::from(point.y >= self.pivot.y) << 1)
            | (usize::from(point.z >= self.pivot.z) << 2);
        let below = match &self.children[octant] {
            Some(child) => child.descend(point, exact),
            None => None,
        };
        match below {
            Some(cell) => Some(cell),
            None if exact => self.evaluator.is_some().then_some(self),
            None => None,
        }
    }

    /// Distance at `point` through the cell's compiled program
    ///
    /// Repeated queries run the flat bytecode, not the node tree; the tree
    /// evaluator is kept for gradient and material lookups. Approximate
    /// misses answer positive infinity: unevaluated empty space is far
    /// away, never on the surface.
    pub fn eval(&self, point: Vec3, exact: bool) -> f32 {
        match self.descend(point, exact) {
            Some(cell) => match &cell.interpreter {
                Some(interpreter) => interpreter.eval(point),
                None => f32::INFINITY,
            },
            None => f32::INFINITY,
        }
    }

    /// Surface normal estimate at `point`
    pub fn gradient(&self, point: Vec3) -> Vec3 {
        match self.descend(point, true) {
            Some(cell) => match &cell.evaluator {
                Some(evaluator) => evaluator.gradient(point),
                None => Vec3::ZERO,
            },
            None => Vec3::ZERO,
        }
    }

    /// Material governing the surface nearest `point`
    pub fn get_material(&self, point: Vec3) -> Option<MaterialShared> {
        let cell = self.descend(point, true)?;
        cell.evaluator.as_ref()?.get_material(point)
    }

    /// Compiled interpreter for the cell governing `point`
    pub fn select_interpreter(&self, point: Vec3) -> Option<Arc<SdfInterpreter>> {
        let cell = self.descend(point, true)?;
        cell.interpreter.clone()
    }

    /// Assign ordinals to every live leaf; returns the leaf count
    ///
    /// Ordinals are dense and stable for the life of the tree, so parallel
    /// consumers can claim leaves through a shared atomic cursor.
    pub fn link_leaves(&mut self) -> usize {
        let mut next = 0usize;
        self.link_leaves_from(&mut next);
        next
    }

    fn link_leaves_from(&mut self, next: &mut usize) {
        if self.terminus {
            if self.evaluator.is_some() {
                self.leaf_ordinal = *next;
                *next += 1;
            }
            return;
        }
        for child in self.children.iter_mut().flatten() {
            child.link_leaves_from(next);
        }
    }

    /// Visit every live leaf in ordinal order
    pub fn walk_leaves(&self, visit: &mut dyn FnMut(&SdfOctree)) {
        if self.terminus {
            if self.evaluator.is_some() {
                visit(self);
            }
            return;
        }
        for child in self.children.iter().flatten() {
            child.walk_leaves(visit);
        }
    }

    /// Bounds of every live leaf, in ordinal order
    pub fn collect_leaf_bounds(&self) -> Vec<Aabb> {
        let mut out = Vec::new();
        self.walk_leaves(&mut |leaf| out.push(leaf.bounds));
        out
    }

    /// True for a cell with no children
    pub fn is_terminus(&self) -> bool {
        self.terminus
    }

    /// Ordinal assigned by `link_leaves`
    pub fn leaf_ordinal(&self) -> usize {
        self.leaf_ordinal
    }

    /// Clipped evaluator for this cell, if any geometry survives here
    pub fn evaluator(&self) -> Option<&Arc<SdfNode>> {
        self.evaluator.as_ref()
    }

    /// Greatest cell depth in the subtree (root is 1)
    pub fn max_depth(&self) -> u32 {
        self.children
            .iter()
            .flatten()
            .map(|child| child.max_depth())
            .max()
            .unwrap_or(self.depth)
    }
}
