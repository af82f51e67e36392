//! Opal Compiler Library
//!
//! The compilation pipeline for the Opal language: lexer → Pratt parser →
//! typed AST → single-pass lowering to stack bytecode. The produced
//! instruction buffers run on `opal-runtime` or serialize to `.gvm`
//! images.
//!
//! ```rust
//! let buffer = opalc::compile_source("demo", "using core\nprintln(1 + 2)").unwrap();
//! assert!(!buffer.is_empty());
//! ```

pub mod ast;
pub mod builtins;
pub mod codegen;
pub mod doc;
pub mod error;
pub mod graphviz;
pub mod lexer;
pub mod parser;
pub mod scope;
pub mod serializer;
pub mod types;

pub use codegen::{Compiler, compile_file, compile_source};
pub use error::CompileError;
pub use parser::Parser;
pub use types::{DataType, TypeContext};
