//! Sponge tree-walking evaluator.
//!
//! Executes a parsed [`Program`](sponge_types::ast::Program) directly. Every
//! externally visible effect (console output, input, sleeping, shell calls,
//! drawing) and every instrumentation callback goes through the [`Host`]
//! trait, so the engine decides per run where those effects land.

mod args;
mod builtins;
mod env;
mod error;
mod evaluator;
mod host;
mod methods;
mod modules;
mod ops;
mod stack;
mod value;

pub use env::Environment;
pub use error::{EvalError, EvalResult};
pub use evaluator::{Evaluator, MAX_CALL_DEPTH};
pub use host::Host;
pub use stack::{on_script_stack, SCRIPT_STACK_SIZE};
pub use value::{ExceptionValue, FileHandle, Function, ModuleKind, Value};
