//! Error types for the task-routing core.
//!
//! The dispatch path distinguishes caller-usage errors (surfaced as `Err`)
//! from recoverable routing failures (absorbed into the fallback ladder and
//! recorded in the outcome log). Executor failures carry enough detail to
//! tell transport problems from remote-side execution problems in logs, even
//! though the dispatcher treats both as fallback triggers.

use thiserror::Error;

/// Errors surfaced to callers of the dispatch engine and config setters.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// `force_local` and `force_remote` were both set. Rejected before any
    /// side effect.
    #[error("cannot force both local and remote execution")]
    ConflictingForce,

    /// A threshold outside the closed interval [0.0, 1.0].
    #[error("delegation threshold must be between 0.0 and 1.0, got {0}")]
    InvalidThreshold(f64),

    /// Persisted configuration could not be loaded or validated.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by the injected executor collaborators.
#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    /// The peer could not be reached at all (refused, DNS, channel setup).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The execution did not complete within the configured timeout.
    #[error("execution timed out after {0}s")]
    Timeout(u64),

    /// The peer was reached but the task itself failed (non-zero exit,
    /// application error).
    #[error("execution failed: {0}")]
    Execution(String),
}

/// Failure of the optional semantic-similarity backend.
///
/// Never propagated out of the scorer; logged and degraded to the
/// keyword-only score.
#[derive(Debug, Error)]
pub enum SemanticError {
    #[error("embedding backend unavailable: {0}")]
    Unavailable(String),
}
