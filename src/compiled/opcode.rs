//! Bytecode opcodes
//!
//! Word tags for the flat program stream. Numeric ranges group the
//! categories so the interpreter's dispatch and the debug validation can
//! classify an opcode with a compare instead of a table.
//!
//! Author: Moroya Sakamoto

/// Instruction tags for the word stream
///
/// Encoding ranges:
/// - 0: stream terminator
/// - 1..=8: brush opcodes (push one distance)
/// - 9..=14: set opcodes (pop two, push one)
/// - 15, 18: top-of-stack modifiers
/// - 16..=17: current-point transforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    /// End of program
    Stop = 0,

    /// Sphere brush: radius
    Sphere = 1,
    /// Ellipsoid brush: 3 radii
    Ellipsoid = 2,
    /// Box brush: 3 half extents
    Box = 3,
    /// Torus brush: major radius, minor radius
    Torus = 4,
    /// Cylinder brush: radius, half height
    Cylinder = 5,
    /// Cone brush: slope tangent, height
    Cone = 6,
    /// Coninder brush: low radius, high radius, half height
    Coninder = 7,
    /// Half-space brush: unit normal
    Plane = 8,

    /// Hard union
    Union = 9,
    /// Hard intersection
    Inter = 10,
    /// Hard difference
    Diff = 11,
    /// Blended union: threshold
    BlendUnion = 12,
    /// Blended intersection: threshold
    BlendInter = 13,
    /// Blended difference: threshold
    BlendDiff = 14,

    /// Add/remove a shell: radius biases top of stack
    Flate = 15,

    /// Translate the current point: 3 floats (forward offset)
    Offset = 16,
    /// Transform the current point: 16 floats (inverse matrix, column major)
    Matrix = 17,

    /// Scale the top of stack (world-space distance correction)
    ScaleField = 18,
}

impl Opcode {
    /// Decode a word tag; `None` for any unknown value
    pub fn from_word(word: u32) -> Option<Self> {
        match word {
            0 => Some(Opcode::Stop),
            1 => Some(Opcode::Sphere),
            2 => Some(Opcode::Ellipsoid),
            3 => Some(Opcode::Box),
            4 => Some(Opcode::Torus),
            5 => Some(Opcode::Cylinder),
            6 => Some(Opcode::Cone),
            7 => Some(Opcode::Coninder),
            8 => Some(Opcode::Plane),
            9 => Some(Opcode::Union),
            10 => Some(Opcode::Inter),
            11 => Some(Opcode::Diff),
            12 => Some(Opcode::BlendUnion),
            13 => Some(Opcode::BlendInter),
            14 => Some(Opcode::BlendDiff),
            15 => Some(Opcode::Flate),
            16 => Some(Opcode::Offset),
            17 => Some(Opcode::Matrix),
            18 => Some(Opcode::ScaleField),
            _ => None,
        }
    }

    /// Pushes exactly one distance value
    #[inline]
    pub fn is_brush(self) -> bool {
        (self as u32) >= 1 && (self as u32) <= 8
    }

    /// Pops two values, pushes one
    #[inline]
    pub fn is_set_op(self) -> bool {
        (self as u32) >= 9 && (self as u32) <= 14
    }

    /// Carries a blend threshold operand
    #[inline]
    pub fn is_blend(self) -> bool {
        matches!(self, Opcode::BlendUnion | Opcode::BlendInter | Opcode::BlendDiff)
    }

    /// Mutates the current-point register
    #[inline]
    pub fn is_transform(self) -> bool {
        matches!(self, Opcode::Offset | Opcode::Matrix)
    }
}
