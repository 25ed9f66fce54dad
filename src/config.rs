//! Hook system configuration and registration-time safety rules.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HookError, Result};

/// Interpreters a hook command may name without an absolute path.
///
/// Everything else must be an absolute path so that a registered hook cannot
/// be hijacked by PATH manipulation at execution time.
pub const INTERPRETER_WHITELIST: &[&str] = &[
    "node", "python", "python3", "bash", "sh", "npx", "deno", "bun",
];

/// Characters rejected in hook commands. Hooks are spawned without a shell,
/// so none of these have a legitimate use in the command itself.
const SHELL_METACHARACTERS: &[char] = &[
    ';', '&', '|', '`', '$', '(', ')', '{', '}', '[', ']', '<', '>', '"', '\'', '\n', '\r',
];

/// Configuration for the hook engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HooksConfig {
    /// Master switch. When false every hook call short-circuits to
    /// `{continue: true, error: "hooks disabled"}` without spawning anything.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Per-hook timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Automatically trust workspace-sourced hooks without individual approval.
    #[serde(default)]
    pub trust_workspace: bool,

    /// Combined stdout+stderr cap in bytes. Exceeding it terminates the hook.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Dispatch a batch in parallel instead of sequentially. Parallel batches
    /// see only the original input (no data chaining between hooks).
    #[serde(default)]
    pub parallel: bool,

    /// In parallel mode, treat any hook error as a reason to stop
    /// (`should_continue: false`). Sequential mode ignores this: only an
    /// explicit `continue: false` aborts a sequential batch.
    #[serde(default)]
    pub stop_on_error: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_output_bytes() -> usize {
    1024 * 1024
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            timeout_ms: default_timeout_ms(),
            trust_workspace: false,
            max_output_bytes: default_max_output_bytes(),
            parallel: false,
            stop_on_error: false,
        }
    }
}

/// Validate a hook id: non-empty, alphanumeric plus dash and underscore.
pub fn validate_hook_id(id: &str) -> Result<()> {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(HookError::InvalidHookId(id.to_string()));
    }
    Ok(())
}

/// Validate a hook command against the safety rules.
///
/// The command must be free of shell metacharacters and be either an absolute
/// path or one of the whitelisted interpreter names. Arguments are passed to
/// the process verbatim with no shell expansion, so they need no filtering.
pub fn validate_command(command: &str) -> Result<()> {
    let invalid = |reason: &str| HookError::InvalidCommand {
        command: command.to_string(),
        reason: reason.to_string(),
    };

    if command.trim().is_empty() {
        return Err(invalid("command is empty"));
    }

    if let Some(c) = command.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
        return Err(invalid(&format!("contains shell metacharacter '{}'", c.escape_default())));
    }

    if !Path::new(command).is_absolute() && !INTERPRETER_WHITELIST.contains(&command) {
        return Err(invalid("must be an absolute path or a whitelisted interpreter"));
    }

    Ok(())
}
