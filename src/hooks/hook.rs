//! Hook definitions: the hook record, its source/trust tier, and the fixed
//! set of lifecycle events.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{validate_command, validate_hook_id};
use crate::error::{HookError, Result};

/// Where a hook came from. Fixes both its execution priority within a batch
/// and whether it needs explicit user approval before running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookSource {
    /// Shipped with the host binary.
    Builtin,
    /// Created by the user through the host UI. The only editable tier.
    User,
    /// Found in the current workspace.
    Workspace,
    /// Fetched from a remote registry.
    Downloaded,
    /// Registered by an installed extension.
    Extension,
}

impl HookSource {
    /// Execution priority within one event firing. Lower runs first;
    /// hooks in the same tier keep their registration order.
    pub fn priority(&self) -> u8 {
        match self {
            HookSource::Builtin => 0,
            HookSource::User => 1,
            HookSource::Workspace => 2,
            HookSource::Downloaded | HookSource::Extension => 3,
        }
    }

    /// Whether this tier requires an individual, hash-verified approval.
    ///
    /// `builtin` and `user` hooks are always trusted. `workspace` hooks are
    /// auto-trusted only behind the global `trust_workspace` switch.
    /// `downloaded` and `extension` hooks always need approval.
    pub fn requires_approval(&self, trust_workspace: bool) -> bool {
        match self {
            HookSource::Builtin | HookSource::User => false,
            HookSource::Workspace => !trust_workspace,
            HookSource::Downloaded | HookSource::Extension => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HookSource::Builtin => "builtin",
            HookSource::User => "user",
            HookSource::Workspace => "workspace",
            HookSource::Downloaded => "downloaded",
            HookSource::Extension => "extension",
        }
    }
}

impl fmt::Display for HookSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle points a hook can attach to. Closed enumeration: the host never
/// emits anything outside this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    SessionStart,
    SessionEnd,
    BeforeAgent,
    AfterAgent,
    BeforeModel,
    AfterModel,
    BeforeToolSelection,
    BeforeTool,
    AfterTool,
    PreCompress,
    PostCompress,
    Notification,
}

impl HookEvent {
    /// Every lifecycle event, in emission order. The event handler subscribes
    /// to all of these on `start()`.
    pub const ALL: [HookEvent; 12] = [
        HookEvent::SessionStart,
        HookEvent::SessionEnd,
        HookEvent::BeforeAgent,
        HookEvent::AfterAgent,
        HookEvent::BeforeModel,
        HookEvent::AfterModel,
        HookEvent::BeforeToolSelection,
        HookEvent::BeforeTool,
        HookEvent::AfterTool,
        HookEvent::PreCompress,
        HookEvent::PostCompress,
        HookEvent::Notification,
    ];

    /// Wire name (snake_case), as written into the child's stdin payload.
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::SessionStart => "session_start",
            HookEvent::SessionEnd => "session_end",
            HookEvent::BeforeAgent => "before_agent",
            HookEvent::AfterAgent => "after_agent",
            HookEvent::BeforeModel => "before_model",
            HookEvent::AfterModel => "after_model",
            HookEvent::BeforeToolSelection => "before_tool_selection",
            HookEvent::BeforeTool => "before_tool",
            HookEvent::AfterTool => "after_tool",
            HookEvent::PreCompress => "pre_compress",
            HookEvent::PostCompress => "post_compress",
            HookEvent::Notification => "notification",
        }
    }

    /// Required data fields for this event on the wire (snake_case).
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            HookEvent::SessionStart => &["session_id"],
            HookEvent::SessionEnd => &["session_id", "messages"],
            HookEvent::BeforeAgent => &["prompt", "context"],
            HookEvent::AfterAgent => &["response", "tool_calls"],
            HookEvent::BeforeModel => &["messages", "model"],
            HookEvent::AfterModel => &["response", "tokens"],
            HookEvent::BeforeToolSelection => &["available_tools"],
            HookEvent::BeforeTool => &["tool_name", "args"],
            HookEvent::AfterTool => &["tool_name", "result"],
            HookEvent::PreCompress | HookEvent::PostCompress | HookEvent::Notification => &[],
        }
    }
}

impl FromStr for HookEvent {
    type Err = HookError;

    fn from_str(s: &str) -> Result<Self> {
        HookEvent::ALL
            .iter()
            .find(|e| e.as_str() == s)
            .copied()
            .ok_or_else(|| HookError::UnknownEvent(s.to_string()))
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered, executable hook. Immutable value record: edits replace the
/// whole hook, and only `user`-sourced hooks may be edited or removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hook {
    /// Unique id, alphanumeric/dash/underscore.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Absolute path or whitelisted interpreter. Never passed to a shell.
    pub command: String,

    /// Ordered arguments, passed verbatim with no shell expansion.
    #[serde(default)]
    pub args: Vec<String>,

    /// Origin of the hook; fixes trust tier and priority.
    pub source: HookSource,

    /// Name of the extension that registered this hook, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_name: Option<String>,

    /// On-disk script backing this hook. When present, approval hashes cover
    /// the file content instead of command+args.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
}

impl Hook {
    /// Check id and command against the registration-time safety rules.
    pub fn validate(&self) -> Result<()> {
        validate_hook_id(&self.id)?;
        validate_command(&self.command)?;
        Ok(())
    }

    /// Only user-created hooks may be edited after registration.
    pub fn is_editable(&self) -> bool {
        self.source == HookSource::User
    }

    /// Only user-created hooks may be removed after registration.
    pub fn is_deletable(&self) -> bool {
        self.source == HookSource::User
    }
}
