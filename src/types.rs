//! The CSG node tree
//!
//! Defines the SdfNode tree structure and the full evaluation contract:
//! distance, gradient, conservative clipping, bounds, bytecode emission,
//! material queries, and lazy transform application. Trees are built by
//! the factory functions at the bottom of this file, shared by `Arc`, and
//! mutated copy-on-write so a frozen subtree is safe to hand to a
//! background meshing pipeline.
//!
//! Author: Moroya Sakamoto

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::aabb::Aabb;
use crate::compiled::{Opcode, ProgramBuffer};
use crate::material::MaterialShared;
use crate::operations::{
    sdf_diff, sdf_inter, sdf_union, smooth_diff, smooth_inter, smooth_union,
};
use crate::primitives;
use crate::transform::TransformMachine;

/// Finite-difference step for gradients
const GRADIENT_EPSILON: f32 = 1e-4;

/// Result of a sphere-trace query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// True when the march converged onto the surface
    pub hit: bool,
    /// Distance traveled along the ray; infinite on a miss
    pub travel: f32,
    /// Final sample position
    pub position: Vec3,
}

/// CSG set-operator family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetFamily {
    /// min(lhs, rhs)
    Union,
    /// max(lhs, rhs)
    Inter,
    /// max(lhs, -rhs)
    Diff,
}

/// Leaf shape with its literal parameters, canonical space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BrushShape {
    /// Ball of `radius`
    Sphere { radius: f32 },
    /// Axis-aligned ellipsoid
    Ellipsoid { radii: Vec3 },
    /// Axis-aligned box
    Box { half_extents: Vec3 },
    /// Ring around z
    Torus { major_radius: f32, minor_radius: f32 },
    /// Capped cylinder along z
    Cylinder { radius: f32, half_height: f32 },
    /// Capped cone along z, apex up
    Cone { tangent: f32, height: f32 },
    /// Capped cone with two cap radii
    Coninder { radius_low: f32, radius_high: f32, half_height: f32 },
    /// Half space below the unit `normal`
    Plane { normal: Vec3 },
}

impl BrushShape {
    /// Distance in canonical space
    #[inline]
    pub fn eval(&self, point: Vec3) -> f32 {
        match *self {
            BrushShape::Sphere { radius } => primitives::sdf_sphere(point, radius),
            BrushShape::Ellipsoid { radii } => primitives::sdf_ellipsoid(point, radii),
            BrushShape::Box { half_extents } => primitives::sdf_box3d(point, half_extents),
            BrushShape::Torus { major_radius, minor_radius } => {
                primitives::sdf_torus(point, major_radius, minor_radius)
            }
            BrushShape::Cylinder { radius, half_height } => {
                primitives::sdf_cylinder(point, radius, half_height)
            }
            BrushShape::Cone { tangent, height } => primitives::sdf_cone(point, tangent, height),
            BrushShape::Coninder { radius_low, radius_high, half_height } => {
                primitives::sdf_coninder(point, radius_low, radius_high, half_height)
            }
            BrushShape::Plane { normal } => primitives::sdf_plane(point, normal),
        }
    }

    /// Canonical bounds, symmetric about the origin
    pub fn bounds(&self) -> Aabb {
        match *self {
            BrushShape::Sphere { radius } => primitives::sphere_bounds(radius),
            BrushShape::Ellipsoid { radii } => primitives::ellipsoid_bounds(radii),
            BrushShape::Box { half_extents } => primitives::box3d_bounds(half_extents),
            BrushShape::Torus { major_radius, minor_radius } => {
                primitives::torus_bounds(major_radius, minor_radius)
            }
            BrushShape::Cylinder { radius, half_height } => {
                primitives::cylinder_bounds(radius, half_height)
            }
            BrushShape::Cone { tangent, height } => primitives::cone_bounds(tangent, height),
            BrushShape::Coninder { radius_low, radius_high, half_height } => {
                primitives::coninder_bounds(radius_low, radius_high, half_height)
            }
            BrushShape::Plane { normal } => primitives::plane_bounds(normal),
        }
    }

    /// Matching bytecode tag
    pub fn opcode(&self) -> Opcode {
        match self {
            BrushShape::Sphere { .. } => Opcode::Sphere,
            BrushShape::Ellipsoid { .. } => Opcode::Ellipsoid,
            BrushShape::Box { .. } => Opcode::Box,
            BrushShape::Torus { .. } => Opcode::Torus,
            BrushShape::Cylinder { .. } => Opcode::Cylinder,
            BrushShape::Cone { .. } => Opcode::Cone,
            BrushShape::Coninder { .. } => Opcode::Coninder,
            BrushShape::Plane { .. } => Opcode::Plane,
        }
    }

    /// Emit the literal parameter words
    pub fn compile_params(&self, program: &mut ProgramBuffer) {
        match *self {
            BrushShape::Sphere { radius } => program.push_scalar(radius),
            BrushShape::Ellipsoid { radii } => program.push_vec3(radii),
            BrushShape::Box { half_extents } => program.push_vec3(half_extents),
            BrushShape::Torus { major_radius, minor_radius } => {
                program.push_scalar(major_radius);
                program.push_scalar(minor_radius);
            }
            BrushShape::Cylinder { radius, half_height } => {
                program.push_scalar(radius);
                program.push_scalar(half_height);
            }
            BrushShape::Cone { tangent, height } => {
                program.push_scalar(tangent);
                program.push_scalar(height);
            }
            BrushShape::Coninder { radius_low, radius_high, half_height } => {
                program.push_scalar(radius_low);
                program.push_scalar(radius_high);
                program.push_scalar(half_height);
            }
            BrushShape::Plane { normal } => program.push_vec3(normal),
        }
    }
}

/// Leaf node: a brush with a placement and optional paint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrushNode {
    /// Shape and literal parameters
    pub shape: BrushShape,
    /// Accumulated placement
    pub transform: TransformMachine,
    /// Paint applied to this brush, if any
    pub material: Option<MaterialShared>,
}

/// Interior node: a set operator over two children
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetNode {
    /// Operator family
    pub family: SetFamily,
    /// Blend threshold; `None` for the hard-edged operator
    pub blend: Option<f32>,
    /// Left operand
    pub lhs: Arc<SdfNode>,
    /// Right operand
    pub rhs: Arc<SdfNode>,
}

/// Modifier node: sphere-sweep inflate (or deflate for negative radius)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlateNode {
    /// Shape being inflated
    pub child: Arc<SdfNode>,
    /// Shell radius
    pub radius: f32,
}

/// Modifier node: material override masked by another shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StencilNode {
    /// Shape being painted
    pub child: Arc<SdfNode>,
    /// Mask geometry; only its sign at the query point matters
    pub stencil: Arc<SdfNode>,
    /// Override material
    pub material: MaterialShared,
    /// Paint the inside of the mask when true, the outside when false
    pub apply_to_negative: bool,
}

/// One node of a CSG tree
///
/// A closed set of variants; every operation below dispatches with a
/// match rather than through trait objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SdfNode {
    /// Leaf shape
    Brush(BrushNode),
    /// Set operator
    Set(SetNode),
    /// Inflate modifier
    Flate(FlateNode),
    /// Material stencil modifier
    Stencil(StencilNode),
}

impl SdfNode {
    /// Signed distance at `point`
    pub fn eval(&self, point: Vec3) -> f32 {
        match self {
            SdfNode::Brush(brush) => {
                brush.shape.eval(brush.transform.apply_inverse(point))
                    * brush.transform.accumulated_scale()
            }
            SdfNode::Set(set) => {
                let lhs = set.lhs.eval(point);
                let rhs = set.rhs.eval(point);
                set.combine(lhs, rhs)
            }
            SdfNode::Flate(flate) => flate.child.eval(point) - flate.radius,
            SdfNode::Stencil(stencil) => stencil.child.eval(point),
        }
    }

    /// Surface normal estimate by tetrahedral finite differences
    ///
    /// Falls back to forward differences when the four taps cancel
    /// exactly (flat regions); the zero vector is returned only when the
    /// field is flat in every probed direction.
    pub fn gradient(&self, point: Vec3) -> Vec3 {
        let e = GRADIENT_EPSILON;
        let xyy = Vec3::new(e, -e, -e);
        let yyx = Vec3::new(-e, -e, e);
        let yxy = Vec3::new(-e, e, -e);
        let xxx = Vec3::new(e, e, e);

        let gradient = xyy * self.eval(point + xyy)
            + yyx * self.eval(point + yyx)
            + yxy * self.eval(point + yxy)
            + xxx * self.eval(point + xxx);

        let length_squared = gradient.length_squared();
        if length_squared == 0.0 {
            let dist = self.eval(point);
            Vec3::new(
                self.eval(point + Vec3::new(e, 0.0, 0.0)) - dist,
                self.eval(point + Vec3::new(0.0, e, 0.0)) - dist,
                self.eval(point + Vec3::new(0.0, 0.0, e)) - dist,
            )
            .normalize_or_zero()
        } else {
            gradient / length_squared.sqrt()
        }
    }

    /// Conservative spatial pruning
    ///
    /// Returns the subtree still relevant within `radius` of `point`, or
    /// `None` when this subtree cannot influence that ball. The returned
    /// node evaluates identically to `self` inside the ball.
    pub fn clip(&self, point: Vec3, radius: f32) -> Option<SdfNode> {
        match self {
            SdfNode::Brush(_) => {
                // Brushes clip whole: either the entire shape stays or none of it
                if self.eval(point) <= radius {
                    Some(self.clone())
                } else {
                    None
                }
            }
            SdfNode::Set(set) => {
                if self.eval(point) > radius {
                    return None;
                }
                if let Some(threshold) = set.blend {
                    // Inside the blending region both sides must survive with
                    // the expanded radius; if one vanishes the operator
                    // degenerates to its hard-edged form below.
                    let new_lhs = set.lhs.clip(point, radius + threshold);
                    let new_rhs = set.rhs.clip(point, radius + threshold);
                    if let (Some(lhs), Some(rhs)) = (new_lhs, new_rhs) {
                        return Some(SdfNode::Set(SetNode {
                            family: set.family,
                            blend: set.blend,
                            lhs: Arc::new(lhs),
                            rhs: Arc::new(rhs),
                        }));
                    }
                    if set.family == SetFamily::Inter {
                        return None;
                    }
                }

                let new_lhs = set.lhs.clip(point, radius);
                let new_rhs = set.rhs.clip(point, radius);
                match (new_lhs, new_rhs, set.family) {
                    (Some(lhs), Some(rhs), _) => Some(SdfNode::Set(SetNode {
                        family: set.family,
                        blend: set.blend,
                        lhs: Arc::new(lhs),
                        rhs: Arc::new(rhs),
                    })),
                    // Either surviving operand stands alone
                    (Some(lhs), None, SetFamily::Union) => Some(lhs),
                    (None, Some(rhs), SetFamily::Union) => Some(rhs),
                    // The subtrahend can never be the whole result
                    (lhs, _, SetFamily::Diff) => lhs,
                    (_, _, SetFamily::Inter) => None,
                    (None, None, _) => None,
                }
            }
            SdfNode::Flate(flate) => {
                if self.eval(point) <= radius {
                    let child = flate.child.clip(point, radius + flate.radius)?;
                    Some(SdfNode::Flate(FlateNode {
                        child: Arc::new(child),
                        radius: flate.radius,
                    }))
                } else {
                    None
                }
            }
            SdfNode::Stencil(stencil) => {
                let child = stencil.child.clip(point, radius)?;
                // The mask only drives material lookups, so keep it whole
                // when it clips away rather than losing the paint boundary.
                let mask = stencil
                    .stencil
                    .clip(point, radius)
                    .unwrap_or_else(|| (*stencil.stencil).clone());
                Some(SdfNode::Stencil(StencilNode {
                    child: Arc::new(child),
                    stencil: Arc::new(mask),
                    material: stencil.material.clone(),
                    apply_to_negative: stencil.apply_to_negative,
                }))
            }
        }
    }

    /// Conservative world-space bounds
    pub fn bounds(&self) -> Aabb {
        match self {
            SdfNode::Brush(brush) => brush.transform.apply_aabb(brush.shape.bounds()),
            SdfNode::Set(set) => {
                let lhs = set.lhs.bounds();
                let rhs = set.rhs.bounds();
                set.combine_bounds(lhs, rhs, true)
            }
            // Intentionally over-padded; the exact tight pad is one radius
            SdfNode::Flate(flate) => flate.child.bounds().expand(flate.radius * 2.0),
            SdfNode::Stencil(stencil) => stencil.child.bounds(),
        }
    }

    /// Bounds without blend-region padding, used for alignment anchors
    pub fn inner_bounds(&self) -> Aabb {
        match self {
            SdfNode::Brush(brush) => brush.transform.apply_aabb(brush.shape.bounds()),
            SdfNode::Set(set) => {
                let lhs = set.lhs.inner_bounds();
                let rhs = set.rhs.inner_bounds();
                set.combine_bounds(lhs, rhs, false)
            }
            SdfNode::Flate(flate) => flate.child.inner_bounds().expand(flate.radius * 2.0),
            SdfNode::Stencil(stencil) => stencil.child.inner_bounds(),
        }
    }

    /// Deep clone, folding pending transforms so the copy is immutable
    /// and safe to hand to a background thread
    pub fn deep_copy(&self) -> SdfNode {
        match self {
            SdfNode::Brush(brush) => {
                let mut transform = brush.transform;
                transform.fold();
                SdfNode::Brush(BrushNode {
                    shape: brush.shape,
                    transform,
                    material: brush.material.clone(),
                })
            }
            SdfNode::Set(set) => SdfNode::Set(SetNode {
                family: set.family,
                blend: set.blend,
                lhs: Arc::new(set.lhs.deep_copy()),
                rhs: Arc::new(set.rhs.deep_copy()),
            }),
            SdfNode::Flate(flate) => SdfNode::Flate(FlateNode {
                child: Arc::new(flate.child.deep_copy()),
                radius: flate.radius,
            }),
            SdfNode::Stencil(stencil) => SdfNode::Stencil(StencilNode {
                child: Arc::new(stencil.child.deep_copy()),
                stencil: Arc::new(stencil.stencil.deep_copy()),
                material: stencil.material.clone(),
                apply_to_negative: stencil.apply_to_negative,
            }),
        }
    }

    /// Translate the whole subtree
    pub fn move_by(&mut self, offset: Vec3) {
        match self {
            SdfNode::Brush(brush) => brush.transform.move_by(offset),
            SdfNode::Set(set) => {
                Arc::make_mut(&mut set.lhs).move_by(offset);
                Arc::make_mut(&mut set.rhs).move_by(offset);
            }
            SdfNode::Flate(flate) => Arc::make_mut(&mut flate.child).move_by(offset),
            SdfNode::Stencil(stencil) => {
                Arc::make_mut(&mut stencil.child).move_by(offset);
                Arc::make_mut(&mut stencil.stencil).move_by(offset);
            }
        }
    }

    /// Rotate the whole subtree about the origin
    pub fn rotate(&mut self, rotation: Quat) {
        match self {
            SdfNode::Brush(brush) => brush.transform.rotate(rotation),
            SdfNode::Set(set) => {
                Arc::make_mut(&mut set.lhs).rotate(rotation);
                Arc::make_mut(&mut set.rhs).rotate(rotation);
            }
            SdfNode::Flate(flate) => Arc::make_mut(&mut flate.child).rotate(rotation),
            SdfNode::Stencil(stencil) => {
                Arc::make_mut(&mut stencil.child).rotate(rotation);
                Arc::make_mut(&mut stencil.stencil).rotate(rotation);
            }
        }
    }

    /// Uniformly scale the whole subtree about the origin
    pub fn scale(&mut self, scale_by: f32) {
        match self {
            SdfNode::Brush(brush) => brush.transform.scale(scale_by),
            SdfNode::Set(set) => {
                // Blend regions scale with the geometry
                if let Some(threshold) = &mut set.blend {
                    *threshold *= scale_by;
                }
                Arc::make_mut(&mut set.lhs).scale(scale_by);
                Arc::make_mut(&mut set.rhs).scale(scale_by);
            }
            SdfNode::Flate(flate) => {
                flate.radius *= scale_by;
                Arc::make_mut(&mut flate.child).scale(scale_by);
            }
            SdfNode::Stencil(stencil) => {
                Arc::make_mut(&mut stencil.child).scale(scale_by);
                Arc::make_mut(&mut stencil.stencil).scale(scale_by);
            }
        }
    }

    /// Rotate about +x by degrees
    pub fn rotate_x(&mut self, degrees: f32) {
        self.rotate(Quat::from_rotation_x(degrees.to_radians()));
    }

    /// Rotate about +y by degrees
    pub fn rotate_y(&mut self, degrees: f32) {
        self.rotate(Quat::from_rotation_y(degrees.to_radians()));
    }

    /// Rotate about +z by degrees
    pub fn rotate_z(&mut self, degrees: f32) {
        self.rotate(Quat::from_rotation_z(degrees.to_radians()));
    }

    /// Move the tree so the anchored point of its inner bounds sits at
    /// the origin; anchor components are -1 (min), 0 (center), +1 (max)
    pub fn align(&mut self, anchors: Vec3) {
        let alignment = anchors * 0.5 + Vec3::splat(0.5);
        let bounds = self.inner_bounds();
        let offset = -(bounds.min + (bounds.max - bounds.min) * alignment);
        self.move_by(offset);
    }

    /// Paint brushes in the subtree
    ///
    /// Unpainted brushes always take the material; painted brushes only
    /// when `force` is set. `force` also replaces stencil overrides.
    pub fn apply_material(&mut self, material: &MaterialShared, force: bool) {
        match self {
            SdfNode::Brush(brush) => {
                if force || brush.material.is_none() {
                    brush.material = Some(material.clone());
                }
            }
            SdfNode::Set(set) => {
                Arc::make_mut(&mut set.lhs).apply_material(material, force);
                Arc::make_mut(&mut set.rhs).apply_material(material, force);
            }
            SdfNode::Flate(flate) => Arc::make_mut(&mut flate.child).apply_material(material, force),
            SdfNode::Stencil(stencil) => {
                if force {
                    stencil.material = material.clone();
                }
                Arc::make_mut(&mut stencil.child).apply_material(material, force);
            }
        }
    }

    /// Visit every material in the subtree, depth first, left to right
    pub fn walk_materials(&self, visit: &mut dyn FnMut(&MaterialShared)) {
        match self {
            SdfNode::Brush(brush) => {
                if let Some(material) = &brush.material {
                    visit(material);
                }
            }
            SdfNode::Set(set) => {
                set.lhs.walk_materials(visit);
                set.rhs.walk_materials(visit);
            }
            SdfNode::Flate(flate) => flate.child.walk_materials(visit),
            SdfNode::Stencil(stencil) => {
                visit(&stencil.material);
                stencil.child.walk_materials(visit);
            }
        }
    }

    /// Material governing the surface nearest `point`
    ///
    /// Set operators pick the side whose distance produced the combined
    /// result (nearest-surface heuristic, ties to the left); difference
    /// always answers from the left side because right-side material is
    /// subtracted away with its geometry.
    pub fn get_material(&self, point: Vec3) -> Option<MaterialShared> {
        match self {
            SdfNode::Brush(brush) => brush.material.clone(),
            SdfNode::Set(set) => {
                if set.family == SetFamily::Diff {
                    return set.lhs.get_material(point);
                }
                let eval_lhs = set.lhs.eval(point);
                let eval_rhs = set.rhs.eval(point);
                let dist = set.combine(eval_lhs, eval_rhs);
                let take_left = if set.blend.is_some() {
                    (eval_lhs - dist).abs() <= (eval_rhs - dist).abs()
                } else {
                    dist == eval_lhs
                };
                if take_left {
                    set.lhs.get_material(point)
                } else {
                    set.rhs.get_material(point)
                }
            }
            SdfNode::Flate(flate) => flate.child.get_material(point),
            SdfNode::Stencil(stencil) => {
                let inside = stencil.stencil.eval(point) < 0.0;
                if inside == stencil.apply_to_negative {
                    Some(stencil.material.clone())
                } else {
                    stencil.child.get_material(point)
                }
            }
        }
    }

    /// True when any brush in the subtree carries a material
    pub fn has_paint(&self) -> bool {
        match self {
            SdfNode::Brush(brush) => brush.material.is_some(),
            SdfNode::Set(set) => set.lhs.has_paint() || set.rhs.has_paint(),
            SdfNode::Flate(flate) => flate.child.has_paint(),
            SdfNode::Stencil(_) => true,
        }
    }

    /// True when some part of the subtree has finite bounds
    pub fn has_finite_bounds(&self) -> bool {
        match self {
            SdfNode::Brush(_) => {
                let bounds = self.bounds();
                bounds.min.is_finite() && bounds.max.is_finite()
            }
            SdfNode::Set(set) => set.lhs.has_finite_bounds() || set.rhs.has_finite_bounds(),
            SdfNode::Flate(flate) => flate.child.has_finite_bounds(),
            SdfNode::Stencil(stencil) => stencil.child.has_finite_bounds(),
        }
    }

    /// Number of brush leaves
    pub fn leaf_count(&self) -> usize {
        match self {
            SdfNode::Brush(_) => 1,
            SdfNode::Set(set) => set.lhs.leaf_count() + set.rhs.leaf_count(),
            SdfNode::Flate(flate) => flate.child.leaf_count(),
            SdfNode::Stencil(stencil) => stencil.child.leaf_count(),
        }
    }

    /// Emit bytecode for this subtree (children before operators,
    /// transforms before brushes); no terminator is appended
    pub fn compile(&self, program: &mut ProgramBuffer) {
        match self {
            SdfNode::Brush(brush) => {
                brush.transform.compile(program);
                program.push_opcode(brush.shape.opcode());
                brush.shape.compile_params(program);
                let scale = brush.transform.accumulated_scale();
                if scale != 1.0 {
                    program.push_opcode(Opcode::ScaleField);
                    program.push_scalar(scale);
                }
            }
            SdfNode::Set(set) => {
                set.lhs.compile(program);
                set.rhs.compile(program);
                match (set.family, set.blend) {
                    (SetFamily::Union, None) => program.push_opcode(Opcode::Union),
                    (SetFamily::Inter, None) => program.push_opcode(Opcode::Inter),
                    (SetFamily::Diff, None) => program.push_opcode(Opcode::Diff),
                    (SetFamily::Union, Some(threshold)) => {
                        program.push_opcode(Opcode::BlendUnion);
                        program.push_scalar(threshold);
                    }
                    (SetFamily::Inter, Some(threshold)) => {
                        program.push_opcode(Opcode::BlendInter);
                        program.push_scalar(threshold);
                    }
                    (SetFamily::Diff, Some(threshold)) => {
                        program.push_opcode(Opcode::BlendDiff);
                        program.push_scalar(threshold);
                    }
                }
            }
            SdfNode::Flate(flate) => {
                flate.child.compile(program);
                program.push_opcode(Opcode::Flate);
                program.push_scalar(flate.radius);
            }
            // The mask never affects distance, so it never compiles
            SdfNode::Stencil(stencil) => stencil.child.compile(program),
        }
    }

    /// Value-stack slots an interpreter needs for this subtree
    pub fn stack_size(&self) -> usize {
        self.stack_size_at(1)
    }

    fn stack_size_at(&self, depth: usize) -> usize {
        match self {
            SdfNode::Brush(_) => depth,
            SdfNode::Set(set) => (depth + 1)
                .max(set.lhs.stack_size_at(depth))
                .max(set.rhs.stack_size_at(depth + 1)),
            SdfNode::Flate(flate) => flate.child.stack_size_at(depth),
            SdfNode::Stencil(stencil) => stencil.child.stack_size_at(depth),
        }
    }

    /// Sphere trace from `origin` along `direction`
    pub fn ray_march(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_iterations: u32,
        epsilon: f32,
    ) -> RayHit {
        let direction = direction.normalize();
        let mut position = origin;
        let mut travel = 0.0f32;
        for _ in 0..max_iterations {
            let dist = self.eval(position);
            if dist <= epsilon {
                return RayHit { hit: true, travel, position };
            }
            travel += dist;
            position = direction * travel + origin;
        }
        RayHit {
            hit: false,
            travel: f32::INFINITY,
            position,
        }
    }
}

impl SetNode {
    /// Apply the operator to two child distances
    #[inline]
    pub fn combine(&self, lhs: f32, rhs: f32) -> f32 {
        match (self.family, self.blend) {
            (SetFamily::Union, None) => sdf_union(lhs, rhs),
            (SetFamily::Inter, None) => sdf_inter(lhs, rhs),
            (SetFamily::Diff, None) => sdf_diff(lhs, rhs),
            (SetFamily::Union, Some(k)) => smooth_union(lhs, rhs, k),
            (SetFamily::Inter, Some(k)) => smooth_inter(lhs, rhs, k),
            (SetFamily::Diff, Some(k)) => smooth_diff(lhs, rhs, k),
        }
    }

    fn combine_bounds(&self, lhs: Aabb, rhs: Aabb, with_liminal: bool) -> Aabb {
        let mut combined = match self.family {
            SetFamily::Union => lhs.union(&rhs),
            SetFamily::Inter => lhs.intersection(&rhs),
            SetFamily::Diff => lhs,
        };
        if with_liminal {
            if let Some(threshold) = self.blend {
                // The blend can pull the surface into the seam region
                // between the operands, up to one threshold outward
                let liminal = lhs.intersection(&rhs).expand(threshold);
                combined = combined.union(&liminal);
            }
        }
        combined
    }
}

/// Structural equality: same shape, same placement, same paint handles.
/// Used by the octree to detect locally-uniform regions.
impl PartialEq for SdfNode {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SdfNode::Brush(a), SdfNode::Brush(b)) => {
                a.shape == b.shape
                    && a.transform == b.transform
                    && match (&a.material, &b.material) {
                        (None, None) => true,
                        (Some(x), Some(y)) => Arc::ptr_eq(x, y),
                        _ => false,
                    }
            }
            (SdfNode::Set(a), SdfNode::Set(b)) => {
                a.family == b.family
                    && a.blend == b.blend
                    && *a.lhs == *b.lhs
                    && *a.rhs == *b.rhs
            }
            (SdfNode::Flate(a), SdfNode::Flate(b)) => {
                a.radius == b.radius && *a.child == *b.child
            }
            (SdfNode::Stencil(a), SdfNode::Stencil(b)) => {
                a.apply_to_negative == b.apply_to_negative
                    && Arc::ptr_eq(&a.material, &b.material)
                    && *a.child == *b.child
                    && *a.stencil == *b.stencil
            }
            _ => false,
        }
    }
}

fn set_node(family: SetFamily, blend: Option<f32>, lhs: SdfNode, rhs: SdfNode) -> SdfNode {
    // Left-lean the tree where the operands commute; a shallower right
    // spine means a smaller interpreter stack and fewer distinct forms
    // for structurally equivalent trees.
    let swap = family != SetFamily::Diff && rhs.stack_size() > lhs.stack_size();
    let (lhs, rhs) = if swap { (rhs, lhs) } else { (lhs, rhs) };
    SdfNode::Set(SetNode {
        family,
        blend,
        lhs: Arc::new(lhs),
        rhs: Arc::new(rhs),
    })
}

/// Factory functions. Dimensions are full extents; the factories halve
/// them into the radii and half extents the distance functions take.
impl SdfNode {
    /// Sphere of the given diameter
    pub fn sphere(diameter: f32) -> SdfNode {
        SdfNode::Brush(BrushNode {
            shape: BrushShape::Sphere { radius: diameter * 0.5 },
            transform: TransformMachine::new(),
            material: None,
        })
    }

    /// Ellipsoid of the given diameters
    pub fn ellipsoid(diameter_x: f32, diameter_y: f32, diameter_z: f32) -> SdfNode {
        SdfNode::Brush(BrushNode {
            shape: BrushShape::Ellipsoid {
                radii: Vec3::new(diameter_x, diameter_y, diameter_z) * 0.5,
            },
            transform: TransformMachine::new(),
            material: None,
        })
    }

    /// Box of the given edge lengths
    pub fn box3d(width: f32, depth: f32, height: f32) -> SdfNode {
        SdfNode::Brush(BrushNode {
            shape: BrushShape::Box {
                half_extents: Vec3::new(width, depth, height) * 0.5,
            },
            transform: TransformMachine::new(),
            material: None,
        })
    }

    /// Cube of the given edge length
    pub fn cube(extent: f32) -> SdfNode {
        SdfNode::box3d(extent, extent, extent)
    }

    /// Torus with the given overall and tube diameters
    pub fn torus(major_diameter: f32, minor_diameter: f32) -> SdfNode {
        let minor_radius = minor_diameter * 0.5;
        let major_radius = (major_diameter - minor_diameter) * 0.5;
        SdfNode::Brush(BrushNode {
            shape: BrushShape::Torus { major_radius, minor_radius },
            transform: TransformMachine::new(),
            material: None,
        })
    }

    /// Cylinder of the given diameter and height, along z
    pub fn cylinder(diameter: f32, height: f32) -> SdfNode {
        SdfNode::Brush(BrushNode {
            shape: BrushShape::Cylinder {
                radius: diameter * 0.5,
                half_height: height * 0.5,
            },
            transform: TransformMachine::new(),
            material: None,
        })
    }

    /// Cone of the given base diameter and height, apex up
    pub fn cone(diameter: f32, height: f32) -> SdfNode {
        SdfNode::Brush(BrushNode {
            shape: BrushShape::Cone {
                tangent: diameter * 0.5 / height,
                height,
            },
            transform: TransformMachine::new(),
            material: None,
        })
    }

    /// Capped cone with separate low and high cap diameters
    pub fn coninder(diameter_low: f32, diameter_high: f32, height: f32) -> SdfNode {
        SdfNode::Brush(BrushNode {
            shape: BrushShape::Coninder {
                radius_low: diameter_low * 0.5,
                radius_high: diameter_high * 0.5,
                half_height: height * 0.5,
            },
            transform: TransformMachine::new(),
            material: None,
        })
    }

    /// Half space below the plane through the origin with this normal
    pub fn plane(normal_x: f32, normal_y: f32, normal_z: f32) -> SdfNode {
        SdfNode::Brush(BrushNode {
            shape: BrushShape::Plane {
                normal: Vec3::new(normal_x, normal_y, normal_z).normalize(),
            },
            transform: TransformMachine::new(),
            material: None,
        })
    }

    /// Hard union
    pub fn union(self, other: SdfNode) -> SdfNode {
        set_node(SetFamily::Union, None, self, other)
    }

    /// Hard intersection
    pub fn inter(self, other: SdfNode) -> SdfNode {
        set_node(SetFamily::Inter, None, self, other)
    }

    /// Hard difference
    pub fn diff(self, other: SdfNode) -> SdfNode {
        set_node(SetFamily::Diff, None, self, other)
    }

    /// Blended union with the given threshold
    pub fn blend_union(self, threshold: f32, other: SdfNode) -> SdfNode {
        set_node(SetFamily::Union, Some(threshold), self, other)
    }

    /// Blended intersection with the given threshold
    pub fn blend_inter(self, threshold: f32, other: SdfNode) -> SdfNode {
        set_node(SetFamily::Inter, Some(threshold), self, other)
    }

    /// Blended difference with the given threshold
    pub fn blend_diff(self, threshold: f32, other: SdfNode) -> SdfNode {
        set_node(SetFamily::Diff, Some(threshold), self, other)
    }

    /// Inflate by `radius` (deflate when negative)
    pub fn flate(self, radius: f32) -> SdfNode {
        SdfNode::Flate(FlateNode {
            child: Arc::new(self),
            radius,
        })
    }

    /// Override material where `mask` applies
    pub fn stencil(self, mask: SdfNode, material: MaterialShared, apply_to_negative: bool) -> SdfNode {
        SdfNode::Stencil(StencilNode {
            child: Arc::new(self),
            stencil: Arc::new(mask),
            material,
            apply_to_negative,
        })
    }

    /// Paint unpainted brushes in the subtree, builder style
    pub fn paint(mut self, material: MaterialShared) -> SdfNode {
        self.apply_material(&material, false);
        self
    }

    /// Paint every brush in the subtree, builder style
    pub fn paint_over(mut self, material: MaterialShared) -> SdfNode {
        self.apply_material(&material, true);
        self
    }
}
