//! Compiled SDF: flat bytecode evaluation
//!
//! Recursive tree evaluation pays a dispatch and pointer-chase cost per
//! node per query. The octree instead compiles each clipped subtree once
//! into a flat word stream and evaluates that with a small stack machine:
//!
//! - No per-query heap traffic (the value stack is preallocated to the
//!   analytically computed maximum depth)
//! - No branch-heavy recursion (a single linear scan with a jump table)
//! - Transform prologues are folded to at most one matrix per brush
//!
//! Author: Moroya Sakamoto

pub mod interp;
pub mod opcode;
pub mod program;

pub use interp::SdfInterpreter;
pub use opcode::Opcode;
pub use program::{ProgramBuffer, Word};
