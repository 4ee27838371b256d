//! Shared types for the Sponge script engine.
//!
//! This crate defines the AST that the parser produces and the engine
//! instruments, source spans, syntax errors, and the drawing command model
//! shared by the evaluator and the graphics surface.

mod error;
mod span;
pub mod ast;
pub mod draw;

pub use error::{CompileErrors, ErrorCode, SpongeError, MAX_ERRORS};
pub use span::{SourceFile, Span};

/// Result type used by the front end (lexer and parser).
pub type Result<T> = std::result::Result<T, SpongeError>;
