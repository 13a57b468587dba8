//! Bytecode interpreter for compiled distance fields
//!
//! Evaluates the flat word stream emitted by `SdfNode::compile` with a
//! small value stack sized exactly for the tree that produced it. The
//! interpreter holds no references back into the tree, so a compiled
//! program can outlive its source and travel to worker threads freely.
//!
//! Author: Moroya Sakamoto

use glam::Vec3;

use crate::compiled::{Opcode, ProgramBuffer};
use crate::operations::{
    sdf_diff, sdf_inter, sdf_union, smooth_diff, smooth_inter, smooth_union,
};
use crate::primitives;
use crate::types::SdfNode;

/// A compiled distance field
///
/// Construction is the only coupling to the tree; evaluation touches
/// nothing but the word stream.
#[derive(Debug, Clone)]
pub struct SdfInterpreter {
    program: ProgramBuffer,
    stack_size: usize,
}

impl SdfInterpreter {
    /// Compile a tree into an executable program
    pub fn new(root: &SdfNode) -> Self {
        let mut program = ProgramBuffer::new();
        root.compile(&mut program);
        program.push_opcode(Opcode::Stop);
        SdfInterpreter {
            program,
            stack_size: root.stack_size(),
        }
    }

    /// Words in the program, terminator included
    pub fn program_len(&self) -> usize {
        self.program.len()
    }

    /// Value-stack slots evaluation will use
    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    /// Signed distance at `point`
    ///
    /// Panics on a corrupt program (bad tag, missing operand, stack
    /// mismatch); programs built by `new` never trip these.
    pub fn eval(&self, point: Vec3) -> f32 {
        let mut stack: Vec<f32> = Vec::with_capacity(self.stack_size);
        // Current-point register: transform opcodes bend it, each brush
        // consumes it and resets it to the query point.
        let mut local = point;
        let mut cursor = 0usize;

        loop {
            let opcode = self.program.opcode_at(cursor);
            cursor += 1;
            match opcode {
                Opcode::Stop => break,

                Opcode::Sphere => {
                    let radius = self.program.scalar_at(cursor);
                    cursor += 1;
                    stack.push(primitives::sdf_sphere(local, radius));
                    local = point;
                }
                Opcode::Ellipsoid => {
                    let radii = self.program.vec3_at(cursor);
                    cursor += 3;
                    stack.push(primitives::sdf_ellipsoid(local, radii));
                    local = point;
                }
                Opcode::Box => {
                    let half_extents = self.program.vec3_at(cursor);
                    cursor += 3;
                    stack.push(primitives::sdf_box3d(local, half_extents));
                    local = point;
                }
                Opcode::Torus => {
                    let major = self.program.scalar_at(cursor);
                    let minor = self.program.scalar_at(cursor + 1);
                    cursor += 2;
                    stack.push(primitives::sdf_torus(local, major, minor));
                    local = point;
                }
                Opcode::Cylinder => {
                    let radius = self.program.scalar_at(cursor);
                    let half_height = self.program.scalar_at(cursor + 1);
                    cursor += 2;
                    stack.push(primitives::sdf_cylinder(local, radius, half_height));
                    local = point;
                }
                Opcode::Cone => {
                    let tangent = self.program.scalar_at(cursor);
                    let height = self.program.scalar_at(cursor + 1);
                    cursor += 2;
                    stack.push(primitives::sdf_cone(local, tangent, height));
                    local = point;
                }
                Opcode::Coninder => {
                    let radius_low = self.program.scalar_at(cursor);
                    let radius_high = self.program.scalar_at(cursor + 1);
                    let half_height = self.program.scalar_at(cursor + 2);
                    cursor += 3;
                    stack.push(primitives::sdf_coninder(
                        local,
                        radius_low,
                        radius_high,
                        half_height,
                    ));
                    local = point;
                }
                Opcode::Plane => {
                    let normal = self.program.vec3_at(cursor);
                    cursor += 3;
                    stack.push(primitives::sdf_plane(local, normal));
                    local = point;
                }

                Opcode::Union => {
                    let (lhs, rhs) = pop_pair(&mut stack);
                    stack.push(sdf_union(lhs, rhs));
                }
                Opcode::Inter => {
                    let (lhs, rhs) = pop_pair(&mut stack);
                    stack.push(sdf_inter(lhs, rhs));
                }
                Opcode::Diff => {
                    let (lhs, rhs) = pop_pair(&mut stack);
                    stack.push(sdf_diff(lhs, rhs));
                }
                Opcode::BlendUnion => {
                    let threshold = self.program.scalar_at(cursor);
                    cursor += 1;
                    let (lhs, rhs) = pop_pair(&mut stack);
                    stack.push(smooth_union(lhs, rhs, threshold));
                }
                Opcode::BlendInter => {
                    let threshold = self.program.scalar_at(cursor);
                    cursor += 1;
                    let (lhs, rhs) = pop_pair(&mut stack);
                    stack.push(smooth_inter(lhs, rhs, threshold));
                }
                Opcode::BlendDiff => {
                    let threshold = self.program.scalar_at(cursor);
                    cursor += 1;
                    let (lhs, rhs) = pop_pair(&mut stack);
                    stack.push(smooth_diff(lhs, rhs, threshold));
                }

                Opcode::Flate => {
                    let radius = self.program.scalar_at(cursor);
                    cursor += 1;
                    let top = pop_one(&mut stack);
                    stack.push(top - radius);
                }
                Opcode::Offset => {
                    let offset = self.program.vec3_at(cursor);
                    cursor += 3;
                    local -= offset;
                }
                Opcode::Matrix => {
                    let inverse = self.program.mat4_at(cursor);
                    cursor += 16;
                    local = inverse.transform_point3(local);
                }
                Opcode::ScaleField => {
                    let scale = self.program.scalar_at(cursor);
                    cursor += 1;
                    let top = pop_one(&mut stack);
                    stack.push(top * scale);
                }
            }
        }

        assert_eq!(stack.len(), 1, "corrupt program: stack depth {}", stack.len());
        stack[0]
    }
}

#[inline(always)]
fn pop_one(stack: &mut Vec<f32>) -> f32 {
    match stack.pop() {
        Some(value) => value,
        None => panic!("corrupt program: stack underflow"),
    }
}

#[inline(always)]
fn pop_pair(stack: &mut Vec<f32>) -> (f32, f32) {
    let rhs = pop_one(stack);
    let lhs = pop_one(stack);
    (lhs, rhs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn assert_matches_tree(node: &SdfNode, points: &[Vec3]) {
        let interp = SdfInterpreter::new(node);
        for &p in points {
            let tree = node.eval(p);
            let byte = interp.eval(p);
            assert!(
                (tree - byte).abs() < 1e-5,
                "tree {tree} vs bytecode {byte} at {p:?}"
            );
        }
    }

    const PROBES: [Vec3; 5] = [
        Vec3::ZERO,
        Vec3::new(1.0, 0.5, -0.25),
        Vec3::new(-3.0, 2.0, 1.0),
        Vec3::new(0.1, 0.1, 0.1),
        Vec3::new(5.0, -5.0, 5.0),
    ];

    #[test]
    fn test_single_brush() {
        assert_matches_tree(&SdfNode::sphere(2.0), &PROBES);
        assert_matches_tree(&SdfNode::torus(3.0, 0.5), &PROBES);
        assert_matches_tree(&SdfNode::coninder(2.0, 1.0, 1.5), &PROBES);
    }

    #[test]
    fn test_offset_brush() {
        let mut node = SdfNode::cube(1.5);
        node.move_by(Vec3::new(1.0, -2.0, 0.5));
        assert_matches_tree(&node, &PROBES);
    }

    #[test]
    fn test_rotated_scaled_brush() {
        let mut node = SdfNode::box3d(2.0, 1.0, 0.5);
        node.rotate(Quat::from_rotation_y(0.7));
        node.scale(1.75);
        node.move_by(Vec3::new(0.25, 0.0, -1.0));
        assert_matches_tree(&node, &PROBES);
    }

    #[test]
    fn test_set_operators() {
        let mut rhs = SdfNode::cylinder(1.0, 3.0);
        rhs.move_by(Vec3::new(0.5, 0.0, 0.0));
        let union = SdfNode::sphere(2.0).union(rhs.clone());
        let inter = SdfNode::sphere(2.0).inter(rhs.clone());
        let diff = SdfNode::sphere(2.0).diff(rhs.clone());
        assert_matches_tree(&union, &PROBES);
        assert_matches_tree(&inter, &PROBES);
        assert_matches_tree(&diff, &PROBES);
    }

    #[test]
    fn test_blend_operators() {
        let mut rhs = SdfNode::sphere(2.0);
        rhs.move_by(Vec3::new(1.2, 0.0, 0.0));
        let blended = SdfNode::sphere(2.0)
            .blend_union(0.3, rhs)
            .blend_diff(0.1, SdfNode::cube(0.5));
        assert_matches_tree(&blended, &PROBES);
    }

    #[test]
    fn test_flate_modifier() {
        let node = SdfNode::sphere(2.0).flate(0.3);
        assert_matches_tree(&node, &PROBES);
    }

    #[test]
    fn test_stack_size_matches_tree() {
        let chain = SdfNode::sphere(1.0)
            .union(SdfNode::sphere(1.0))
            .union(SdfNode::sphere(1.0));
        let interp = SdfInterpreter::new(&chain);
        assert_eq!(interp.stack_size(), chain.stack_size());
        assert_eq!(interp.stack_size(), 2);
    }

    #[test]
    #[should_panic(expected = "corrupt program")]
    fn test_corrupt_program_panics() {
        let mut program = ProgramBuffer::new();
        program.push_opcode(Opcode::Union);
        program.push_opcode(Opcode::Stop);
        let interp = SdfInterpreter {
            program,
            stack_size: 2,
        };
        interp.eval(Vec3::ZERO);
    }
}
