//! Scanner, compiler, and stack VM for the ember bytecode language.
//!
//! `ember-core` owns the data model; this crate turns source text into a
//! `Chunk` and then executes it.

pub mod compiler;
pub mod scanner;
pub mod vm;

pub use compiler::{compile, disassemble_chunk, disassemble_instruction};
pub use scanner::{Scanner, Token, TokenKind};
pub use vm::{InterpretResult, Vm};
