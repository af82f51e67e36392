//! Compiler error types.
//!
//! Diagnostics are printed as single lines to stdout at the point of
//! detection (`<source>:<line>:<col> (<phase>): <message>`); these types
//! carry the failure out of the pipeline so `?` works at the API surface.

/// Error type for the compilation pipeline.
#[derive(Debug)]
pub enum CompileError {
    /// Lexical analysis failed; diagnostics were already printed.
    Lex,
    /// Parsing failed; diagnostics were already printed.
    Syntax,
    /// Semantic analysis or lowering failed; diagnostics were already printed.
    Semantic,
    /// A file could not be read or written, or a bytecode image is invalid.
    File(String),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Lex => write!(f, "lexical analysis failed"),
            CompileError::Syntax => write!(f, "parsing failed"),
            CompileError::Semantic => write!(f, "compilation failed"),
            CompileError::File(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<std::io::Error> for CompileError {
    fn from(e: std::io::Error) -> Self {
        CompileError::File(e.to_string())
    }
}
