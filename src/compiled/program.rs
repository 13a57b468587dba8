//! Flat word-stream program buffer
//!
//! A program is a dense sequence of 32-bit words: opcode tags interleaved
//! with raw float operands (vectors and matrices stored as consecutive
//! floats). Which interpretation applies at an offset is fixed by the
//! grammar the compiler emits; reading the wrong kind is a compiler bug,
//! not a runtime condition, so the accessors panic on mismatch.
//!
//! Author: Moroya Sakamoto

use glam::{Mat4, Vec3};

use super::opcode::Opcode;

/// One program word: an opcode tag or raw float bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Word(u32);

impl Word {
    /// Tag word
    #[inline]
    pub fn from_opcode(opcode: Opcode) -> Self {
        Word(opcode as u32)
    }

    /// Operand word
    #[inline]
    pub fn from_scalar(value: f32) -> Self {
        Word(value.to_bits())
    }

    /// Raw bit pattern
    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }
}

/// Append-only bytecode stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramBuffer {
    words: Vec<Word>,
}

impl ProgramBuffer {
    /// Empty program
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Number of words emitted so far
    #[inline]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// True when nothing has been emitted
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Emit an opcode tag
    #[inline]
    pub fn push_opcode(&mut self, opcode: Opcode) {
        self.words.push(Word::from_opcode(opcode));
    }

    /// Emit a float operand
    #[inline]
    pub fn push_scalar(&mut self, value: f32) {
        self.words.push(Word::from_scalar(value));
    }

    /// Emit three float operands
    pub fn push_vec3(&mut self, value: Vec3) {
        self.push_scalar(value.x);
        self.push_scalar(value.y);
        self.push_scalar(value.z);
    }

    /// Emit sixteen float operands, column major
    pub fn push_mat4(&mut self, value: &Mat4) {
        for cell in value.to_cols_array() {
            self.push_scalar(cell);
        }
    }

    /// Decode the opcode at `at`
    ///
    /// # Panics
    /// On overrun or an operand word where a tag is expected — both are
    /// interpreter-corruption defects.
    #[inline]
    pub fn opcode_at(&self, at: usize) -> Opcode {
        let word = self.words[at];
        match Opcode::from_word(word.bits()) {
            Some(opcode) => opcode,
            None => panic!("corrupt program: word {} at {} is not an opcode", word.bits(), at),
        }
    }

    /// Read the float operand at `at`
    #[inline]
    pub fn scalar_at(&self, at: usize) -> f32 {
        f32::from_bits(self.words[at].bits())
    }

    /// Read three float operands starting at `at`
    #[inline]
    pub fn vec3_at(&self, at: usize) -> Vec3 {
        Vec3::new(
            self.scalar_at(at),
            self.scalar_at(at + 1),
            self.scalar_at(at + 2),
        )
    }

    /// Read sixteen float operands starting at `at`, column major
    pub fn mat4_at(&self, at: usize) -> Mat4 {
        let mut cells = [0.0f32; 16];
        for (i, cell) in cells.iter_mut().enumerate() {
            *cell = self.scalar_at(at + i);
        }
        Mat4::from_cols_array(&cells)
    }
}
