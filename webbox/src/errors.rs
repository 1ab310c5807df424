//! Error types for the webbox crate.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type WebboxResult<T> = Result<T, WebboxError>;

/// Errors surfaced by the session manager and the engine seam.
///
/// **Clone**: every variant carries an owned message so the enum is `Clone`.
/// This is required by the single-flight guard, where one failed operation
/// must be observable by every caller that awaited it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WebboxError {
    /// Sandbox boot was rejected, or an instance already exists globally.
    #[error("boot failed: {0}")]
    Boot(String),

    /// The underlying mount operation was rejected.
    #[error("mount failed: {0}")]
    Mount(String),

    /// Command execution could not be started.
    #[error("spawn failed: {0}")]
    Spawn(String),

    /// An operation was issued against a session in the wrong state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Unexpected internal failure (lock poisoning, channel breakage).
    #[error("internal error: {0}")]
    Internal(String),
}
