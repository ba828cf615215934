//! Data model for the ember bytecode VM.
//!
//! This crate owns everything that does not need a scanner or a parser:
//! the tagged runtime `Value`, the heap string type, the interning table,
//! the bytecode `Chunk`, and the growable-array allocation policy they all
//! share.

pub mod chunk;
pub mod heap;
pub mod memory;
pub mod object;
pub mod table;
pub mod value;

pub use chunk::{Chunk, OpCode, MAX_CONSTANTS};
pub use heap::Heap;
pub use object::{Obj, ObjString};
pub use table::Table;
pub use value::{values_equal, Value};
