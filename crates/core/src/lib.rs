//! Opal Core: shared primitives for the Opal toolchain
//!
//! This crate holds the types the compiler and the VM agree on:
//!
//! - `value`: the 8-byte NaN-boxed [`Value`]
//! - `object`: garbage-collected heap cells ([`Obj`])
//! - `bytecode`: the instruction set ([`Opcode`], [`Instruction`])
//!
//! No I/O happens here; the compiler emits instruction buffers and the VM
//! consumes them, both through these definitions.

pub mod bytecode;
pub mod object;
pub mod value;

pub use bytecode::{Instruction, Opcode, Operand};
pub use object::{Obj, ObjKind};
pub use value::Value;
