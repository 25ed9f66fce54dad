//! Crate error types.

use thiserror::Error;

/// Errors surfaced by the hook system.
///
/// Process-level failures (timeout, non-zero exit, oversized output) are
/// deliberately *not* represented here — the runner normalizes those into a
/// `HookOutput` carrying an `error` string so a single misbehaving hook can
/// never abort a batch by accident. This enum covers registration-time
/// validation, protocol parsing, and the trust ledger.
#[derive(Debug, Error)]
pub enum HookError {
    /// Hook id is empty or contains characters outside `[A-Za-z0-9_-]`.
    #[error("invalid hook id '{0}': must be non-empty alphanumeric/dash/underscore")]
    InvalidHookId(String),

    /// Hook command failed the safety rules (shell metacharacters, or a
    /// relative path outside the interpreter whitelist).
    #[error("invalid hook command '{command}': {reason}")]
    InvalidCommand { command: String, reason: String },

    /// A hook with this id is already registered.
    #[error("duplicate hook id '{0}'")]
    DuplicateHookId(String),

    /// Event name does not match any lifecycle event.
    #[error("unknown hook event '{0}'")]
    UnknownEvent(String),

    /// Hook stdout was not valid JSON at all.
    #[error("malformed JSON in hook output: {0}")]
    MalformedOutput(#[source] serde_json::Error),

    /// Hook stdout parsed as JSON but violated the output schema.
    #[error("invalid hook output structure: {0}")]
    InvalidOutputStructure(String),

    /// Trust ledger could not be read, parsed, or written.
    #[error("trust ledger error: {0}")]
    Ledger(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HookError>;
