//! Engine error types.

use sponge_types::CompileErrors;

/// Failure of a blocking round trip with the controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The controller interrupted the run while a request was pending.
    #[error("interrupted by controller")]
    Interrupted,
    /// The controller endpoint went away.
    #[error("controller disconnected")]
    Disconnected,
    /// The controller answered with something the engine cannot use.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to compile: {}", .0.errors.first().map(|e| e.message.as_str()).unwrap_or("syntax error"))]
    Syntax(CompileErrors),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Why a grading criterion could not be evaluated. Reported as a
/// malformed test case, never as incorrect output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CriterionError {
    #[error("file criterion has no filename")]
    MissingFilename,
    #[error("statement criterion has no statement")]
    MissingStatement,
    #[error("file '{0}' does not exist")]
    UnreadableFile(String),
    #[error("statement '{statement}' failed: {message}")]
    Statement { statement: String, message: String },
    #[error("turtle criterion needs a reference solution")]
    MissingReference,
    #[error("reference solution failed: {0}")]
    Reference(String),
    #[error("invalid pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },
    #[error("unknown criterion type '{0}'")]
    UnknownType(String),
    #[error("unknown normalization flag '{0}'")]
    UnknownFlag(char),
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
