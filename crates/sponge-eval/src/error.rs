//! Runtime error types for the sponge evaluator.

use crate::value::{ExceptionValue, Value};
use std::rc::Rc;

/// Evaluation error: script exceptions, engine signals, and internal
/// control flow.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EvalError {
    /// A Python-style exception raised by script code or a builtin.
    /// The only variant `try`/`except` can catch.
    #[error("{}", describe(.kind, .message))]
    Script {
        kind: String,
        message: String,
        /// Line of the innermost statement that was executing.
        line: Option<u32>,
    },
    /// `input()` was called with nothing left to read.
    #[error("insufficient input")]
    InsufficientInput,
    /// The host asked the run to stop.
    #[error("interrupted")]
    Interrupted,
    /// The host failed to carry out an effect.
    #[error("host failure: {0}")]
    Host(String),

    // ── Control flow (never escapes a well-formed program) ──
    #[error("'break' outside loop")]
    Break,
    #[error("'continue' outside loop")]
    Continue,
    #[error("'return' outside function")]
    Return(Value),
}

/// Result alias for evaluator operations.
pub type EvalResult<T> = Result<T, EvalError>;

fn describe(kind: &str, message: &str) -> String {
    if message.is_empty() {
        kind.to_string()
    } else {
        format!("{kind}: {message}")
    }
}

impl EvalError {
    pub fn script(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Script {
            kind: kind.into(),
            message: message.into(),
            line: None,
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::script("TypeError", message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::script("ValueError", message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::script("IndexError", message)
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::script("ZeroDivisionError", message)
    }

    pub fn overflow() -> Self {
        Self::script("OverflowError", "integer result too large")
    }

    pub fn attribute_error(type_name: &str, attr: &str) -> Self {
        Self::script(
            "AttributeError",
            format!("'{type_name}' object has no attribute '{attr}'"),
        )
    }

    /// Only script exceptions reach `except` clauses.
    pub fn is_catchable(&self) -> bool {
        matches!(self, Self::Script { .. })
    }

    /// Engine signals end the run without running any more script code,
    /// `finally` blocks included.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::InsufficientInput | Self::Interrupted | Self::Host(_)
        )
    }

    /// The exception kind, for script errors.
    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::Script { kind, .. } => Some(kind.as_str()),
            _ => None,
        }
    }

    pub fn line(&self) -> Option<u32> {
        match self {
            Self::Script { line, .. } => *line,
            _ => None,
        }
    }

    /// Record `line` unless an inner statement already did.
    pub fn at_line(mut self, at: u32) -> Self {
        if let Self::Script { line, .. } = &mut self {
            if line.is_none() {
                *line = Some(at);
            }
        }
        self
    }

    /// The value bound by `except Kind as name`.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Script { kind, message, .. } => Value::Exception(Rc::new(ExceptionValue {
                kind: kind.clone(),
                message: message.clone(),
            })),
            _ => Value::None,
        }
    }

    /// Render a script error the way the learner-facing console shows it.
    pub fn to_traceback(&self, file: &str) -> String {
        let mut text = String::from("Traceback (most recent call last):\n");
        if let Some(line) = self.line() {
            text.push_str(&format!("  File \"{file}\", line {line}, in <module>\n"));
        }
        text.push_str(&self.to_string());
        text.push('\n');
        text
    }
}

/// Whether an `except <handler>` clause catches an exception of kind `raised`.
pub(crate) fn exception_matches(handler: &str, raised: &str) -> bool {
    if handler == raised || handler == "Exception" || handler == "BaseException" {
        return true;
    }
    match handler {
        "ArithmeticError" => matches!(raised, "ZeroDivisionError" | "OverflowError"),
        "LookupError" => matches!(raised, "IndexError" | "KeyError"),
        "OSError" | "IOError" => raised == "FileNotFoundError",
        "RuntimeError" => raised == "RecursionError",
        _ => false,
    }
}
