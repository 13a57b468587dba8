//! Lazy rigid-transform accumulation for brush nodes
//!
//! Scripting layers tend to issue long runs of move/rotate calls while
//! positioning a brush. The machine batches those runs and folds them into
//! a single matrix pair only when a fold boundary is hit (a different kind
//! of mutation, or a consumer that needs the matrices), so N moves cost one
//! matrix inversion instead of N.
//!
//! Author: Moroya Sakamoto

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::aabb::Aabb;
use crate::compiled::{Opcode, ProgramBuffer};

/// How much of the accumulated transform the folded matrices encode
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FoldState {
    /// No transform at all
    Identity,
    /// Pure translation
    Offset,
    /// Rotation and/or scale present
    Matrix,
}

/// Accumulated offset + rotation + uniform scale with lazy folding
///
/// `offset_run`/`rotate_run` hold the pending run; at most one kind is
/// pending at a time (starting the other kind folds the current run).
/// `last_fold`/`last_fold_inverse` are the committed matrices.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TransformMachine {
    fold_state: FoldState,
    last_fold: Mat4,
    last_fold_inverse: Mat4,
    offset_pending: bool,
    offset_run: Vec3,
    rotate_pending: bool,
    rotate_run: Quat,
    accumulated_scale: f32,
}

impl Default for TransformMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformMachine {
    /// Identity transform
    pub fn new() -> Self {
        Self {
            fold_state: FoldState::Identity,
            last_fold: Mat4::IDENTITY,
            last_fold_inverse: Mat4::IDENTITY,
            offset_pending: false,
            offset_run: Vec3::ZERO,
            rotate_pending: false,
            rotate_run: Quat::IDENTITY,
            accumulated_scale: 1.0,
        }
    }

    /// Back to identity
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Product of every uniform scale applied so far
    #[inline]
    pub fn accumulated_scale(&self) -> f32 {
        self.accumulated_scale
    }

    /// True when nothing has been applied
    pub fn is_identity(&self) -> bool {
        self.fold_state == FoldState::Identity && !self.offset_pending && !self.rotate_pending
    }

    fn fold_offset(&mut self) {
        self.last_fold_inverse *= Mat4::from_translation(self.offset_run);
        self.last_fold = self.last_fold_inverse.inverse();
        self.offset_run = Vec3::ZERO;
        self.offset_pending = false;
        self.fold_state = self.fold_state.max(FoldState::Offset);
    }

    fn fold_rotation(&mut self) {
        self.last_fold_inverse *= Mat4::from_quat(self.rotate_run).transpose();
        self.last_fold = self.last_fold_inverse.inverse();
        self.rotate_run = Quat::IDENTITY;
        self.rotate_pending = false;
        self.fold_state = FoldState::Matrix;
    }

    /// Commit any pending run into the folded matrices
    pub fn fold(&mut self) {
        if self.rotate_pending {
            self.fold_rotation();
        } else if self.offset_pending {
            self.fold_offset();
        }
    }

    fn folded(&self) -> Self {
        let mut machine = *self;
        machine.fold();
        machine
    }

    /// Translate by `offset` (world space)
    pub fn move_by(&mut self, offset: Vec3) {
        if self.rotate_pending {
            self.fold_rotation();
        }
        // The run accumulates the inverse offset
        self.offset_run -= offset;
        self.offset_pending = true;
    }

    /// Rotate by `rotation` (world space)
    pub fn rotate(&mut self, rotation: Quat) {
        if self.offset_pending {
            self.fold_offset();
        }
        self.rotate_run = rotation * self.rotate_run;
        self.rotate_pending = true;
    }

    /// Uniform scale by `scale_by`
    pub fn scale(&mut self, scale_by: f32) {
        self.fold();
        self.last_fold_inverse *= Mat4::from_scale(Vec3::splat(1.0 / scale_by));
        self.last_fold = self.last_fold_inverse.inverse();
        self.accumulated_scale *= scale_by;
        self.fold_state = FoldState::Matrix;
    }

    /// World point into the brush's canonical space
    #[inline]
    pub fn apply_inverse(&self, point: Vec3) -> Vec3 {
        // Pending runs are applied without committing the fold so that
        // evaluation never needs &mut access.
        let point = if self.rotate_pending {
            self.rotate_run.inverse() * point
        } else if self.offset_pending {
            point + self.offset_run
        } else {
            point
        };
        match self.fold_state {
            FoldState::Identity => point,
            _ => self.last_fold_inverse.transform_point3(point),
        }
    }

    /// Canonical-space point into world space
    #[inline]
    pub fn apply(&self, point: Vec3) -> Vec3 {
        let point = match self.fold_state {
            FoldState::Identity => point,
            _ => self.last_fold.transform_point3(point),
        };
        if self.rotate_pending {
            self.rotate_run * point
        } else if self.offset_pending {
            point - self.offset_run
        } else {
            point
        }
    }

    /// Transform a canonical-space box into world space
    pub fn apply_aabb(&self, bounds: Aabb) -> Aabb {
        let machine = self.folded();
        match machine.fold_state {
            FoldState::Identity => bounds,
            FoldState::Offset => {
                let offset = machine.last_fold.w_axis.truncate();
                Aabb::new(bounds.min + offset, bounds.max + offset)
            }
            FoldState::Matrix => {
                let a = bounds.min;
                let b = bounds.max;
                let corners = [
                    a,
                    b,
                    Vec3::new(b.x, a.y, a.z),
                    Vec3::new(a.x, b.y, a.z),
                    Vec3::new(a.x, a.y, b.z),
                    Vec3::new(a.x, b.y, b.z),
                    Vec3::new(b.x, a.y, b.z),
                    Vec3::new(b.x, b.y, a.z),
                ];
                let mut out = Aabb::empty();
                for corner in corners {
                    let world = machine.last_fold.transform_point3(corner);
                    out.min = out.min.min(world);
                    out.max = out.max.max(world);
                }
                out
            }
        }
    }

    /// Emit the transform prologue for a brush evaluation
    ///
    /// Identity emits nothing; pure translations emit `Offset` plus the
    /// forward offset; anything else emits `Matrix` plus the inverse matrix.
    pub fn compile(&self, program: &mut ProgramBuffer) {
        let machine = self.folded();
        match machine.fold_state {
            FoldState::Identity => {}
            FoldState::Offset => {
                program.push_opcode(Opcode::Offset);
                program.push_vec3(machine.last_fold.w_axis.truncate());
            }
            FoldState::Matrix => {
                program.push_opcode(Opcode::Matrix);
                program.push_mat4(&machine.last_fold_inverse);
            }
        }
    }
}

impl PartialEq for TransformMachine {
    fn eq(&self, other: &Self) -> bool {
        let a = self.folded();
        let b = other.folded();
        a.fold_state == b.fold_state
            && (a.fold_state == FoldState::Identity || a.last_fold == b.last_fold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn test_identity() {
        let machine = TransformMachine::new();
        assert!(machine.is_identity());
        assert!(close(machine.apply_inverse(Vec3::ONE), Vec3::ONE));
        assert!(close(machine.apply(Vec3::ONE), Vec3::ONE));
    }

    #[test]
    fn test_move_run_amortizes() {
        let mut machine = TransformMachine::new();
        machine.move_by(Vec3::X);
        machine.move_by(Vec3::X);
        machine.move_by(Vec3::Y);
        // Pending run, not yet folded
        assert!(close(machine.apply_inverse(Vec3::ZERO), Vec3::new(-2.0, -1.0, 0.0)));
        assert!(close(machine.apply(Vec3::ZERO), Vec3::new(2.0, 1.0, 0.0)));
        machine.fold();
        assert!(close(machine.apply_inverse(Vec3::ZERO), Vec3::new(-2.0, -1.0, 0.0)));
    }

    #[test]
    fn test_rotate_then_move() {
        let mut machine = TransformMachine::new();
        machine.rotate(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2));
        machine.move_by(Vec3::X);
        // +X in canonical space rotates to +Y, then the move lands it at (1,1,0)
        assert!(close(machine.apply(Vec3::X), Vec3::new(1.0, 1.0, 0.0)));
        // Round trip
        let p = Vec3::new(0.3, -0.7, 0.2);
        assert!(close(machine.apply_inverse(machine.apply(p)), p));
    }

    #[test]
    fn test_scale_accumulates() {
        let mut machine = TransformMachine::new();
        machine.scale(2.0);
        machine.scale(0.5);
        assert!((machine.accumulated_scale() - 1.0).abs() < 1e-6);
        machine.scale(3.0);
        assert!((machine.accumulated_scale() - 3.0).abs() < 1e-6);
        assert!(close(machine.apply(Vec3::X), Vec3::new(3.0, 0.0, 0.0)));
        assert!(close(machine.apply_inverse(Vec3::new(3.0, 0.0, 0.0)), Vec3::X));
    }

    #[test]
    fn test_aabb_offset_and_matrix() {
        let unit = Aabb::symmetric(Vec3::ONE);

        let mut moved = TransformMachine::new();
        moved.move_by(Vec3::new(3.0, 0.0, 0.0));
        let bounds = moved.apply_aabb(unit);
        assert!(close(bounds.min, Vec3::new(2.0, -1.0, -1.0)));
        assert!(close(bounds.max, Vec3::new(4.0, 1.0, 1.0)));

        let mut spun = TransformMachine::new();
        spun.rotate(Quat::from_rotation_z(std::f32::consts::FRAC_PI_4));
        let bounds = spun.apply_aabb(unit);
        let expected = 2.0f32.sqrt();
        assert!((bounds.max.x - expected).abs() < 1e-4);
        assert!((bounds.max.y - expected).abs() < 1e-4);
        assert!((bounds.max.z - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_structural_equality() {
        let mut a = TransformMachine::new();
        let mut b = TransformMachine::new();
        assert_eq!(a, b);
        a.move_by(Vec3::X);
        assert_ne!(a, b);
        b.move_by(Vec3::X * 0.5);
        b.move_by(Vec3::X * 0.5);
        // Same committed transform via different runs
        assert_eq!(a, b);
    }
}
