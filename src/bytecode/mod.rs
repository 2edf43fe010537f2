//! Bytecode representation and emission.
//!
//! - `op` — the fixed opcode enum, bit-exact wire values.
//! - `code` — `Code`, the compiled-function container.
//! - `builder` — `CodeBuilder`, used by the compiler to emit instructions.

pub mod builder;
pub mod code;
pub mod op;

pub use builder::{CodeBuilder, JumpLabel};
pub use code::{Code, LineEntry};
pub use op::Opcode;
