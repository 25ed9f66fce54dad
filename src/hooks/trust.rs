//! Hash-based trust and approval ledger for hooks.
//!
//! Trust is decided per invocation from the hook's source tier: `builtin` and
//! `user` are always trusted, `workspace` only behind the global
//! `trust_workspace` switch, and `downloaded`/`extension` always need an
//! individual approval. An approval is valid only while the hook's live hash
//! matches the hash recorded at approval time; any drift forces re-approval.
//!
//! The ledger persists as a single versioned JSON document:
//! ```json
//! { "version": 1, "approvals": [ { "source": "...", "hash": "sha256:...",
//!   "approvedAt": "ISO-8601", "approvedBy": "user" } ] }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::hook::Hook;
use crate::error::{HookError, Result};

const LEDGER_VERSION: u32 = 1;

/// One approval record in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookApproval {
    /// Path/command identity of the approved hook.
    pub source: String,

    /// `sha256:<hex>` over the script file content when available, otherwise
    /// over command+args.
    pub hash: String,

    #[serde(rename = "approvedAt")]
    pub approved_at: DateTime<Utc>,

    #[serde(rename = "approvedBy")]
    pub approved_by: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    version: u32,
    approvals: Vec<HookApproval>,
}

/// Identity key an approval is stored under: the backing script path when the
/// hook has one, otherwise the command plus its arguments.
pub fn approval_source(hook: &Hook) -> String {
    match &hook.source_path {
        Some(path) => path.display().to_string(),
        None if hook.args.is_empty() => hook.command.clone(),
        None => format!("{} {}", hook.command, hook.args.join(" ")),
    }
}

/// Current hash of a hook: file content when `source_path` is set (so edits
/// to the script invalidate the approval), else command+args.
pub fn hook_hash(hook: &Hook) -> Result<String> {
    let mut hasher = Sha256::new();
    match &hook.source_path {
        Some(path) => {
            let content = fs::read(path)?;
            hasher.update(&content);
        }
        None => {
            hasher.update(hook.command.as_bytes());
            for arg in &hook.args {
                hasher.update([0u8]);
                hasher.update(arg.as_bytes());
            }
        }
    }
    Ok(format!("sha256:{:x}", hasher.finalize()))
}

/// Host-side extension point for interactive approval.
///
/// The runner asks the prompt when an unapproved hook is about to run. The
/// default wiring denies everything: a hook that cannot be approved is
/// skipped, never executed.
#[async_trait]
pub trait ApprovalPrompt: Send + Sync {
    async fn request_approval(&self, hook: &Hook, hash: &str) -> bool;
}

/// Default prompt when no UI is wired up. Always denies.
pub struct DenyAll;

#[async_trait]
impl ApprovalPrompt for DenyAll {
    async fn request_approval(&self, _hook: &Hook, _hash: &str) -> bool {
        false
    }
}

/// In-memory approval map backed by the on-disk ledger.
///
/// The map loads lazily on the first trust check; every mutation writes the
/// full ledger back. Single-process use is assumed — there is no file
/// locking between concurrent writers.
pub struct TrustStore {
    ledger_path: Option<PathBuf>,
    approvals: RwLock<Option<HashMap<String, HookApproval>>>,
    prompt: Box<dyn ApprovalPrompt>,
}

impl TrustStore {
    /// A store persisting to `ledger_path`, with the default deny-all prompt.
    pub fn new(ledger_path: PathBuf) -> Self {
        Self {
            ledger_path: Some(ledger_path),
            approvals: RwLock::new(None),
            prompt: Box::new(DenyAll),
        }
    }

    /// A purely in-memory store (tests, ephemeral sessions).
    pub fn in_memory() -> Self {
        Self {
            ledger_path: None,
            approvals: RwLock::new(Some(HashMap::new())),
            prompt: Box::new(DenyAll),
        }
    }

    /// Replace the interactive approval prompt (host UI integration).
    pub fn with_prompt(mut self, prompt: Box<dyn ApprovalPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Whether the hook may run right now, per its source tier and the
    /// approval ledger. Never prompts.
    pub async fn is_trusted(&self, hook: &Hook, trust_workspace: bool) -> Result<bool> {
        if !hook.source.requires_approval(trust_workspace) {
            return Ok(true);
        }

        let key = approval_source(hook);
        self.ensure_loaded().await?;

        let guard = self.approvals.read().await;
        let Some(approval) = guard.as_ref().and_then(|m| m.get(&key)) else {
            return Ok(false);
        };

        // Any hash drift since approval time invalidates the approval.
        let current = match hook_hash(hook) {
            Ok(h) => h,
            Err(e) => {
                warn!(name: "Trust", "cannot hash hook '{}': {}", hook.id, e);
                return Ok(false);
            }
        };
        Ok(approval.hash == current)
    }

    /// Trust gate used by the runner: checks the ledger, then falls back to
    /// the interactive prompt. A granted prompt is recorded as an approval.
    pub async fn ensure_trusted(&self, hook: &Hook, trust_workspace: bool) -> Result<bool> {
        if self.is_trusted(hook, trust_workspace).await? {
            return Ok(true);
        }

        let hash = match hook_hash(hook) {
            Ok(h) => h,
            Err(_) => return Ok(false),
        };
        if self.prompt.request_approval(hook, &hash).await {
            self.approve(hook, "user").await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Record an approval for the hook at its current hash and persist.
    pub async fn approve(&self, hook: &Hook, approved_by: &str) -> Result<()> {
        let hash = hook_hash(hook)?;
        let key = approval_source(hook);
        self.ensure_loaded().await?;

        let mut guard = self.approvals.write().await;
        let map = guard.get_or_insert_with(HashMap::new);
        map.insert(
            key.clone(),
            HookApproval {
                source: key.clone(),
                hash,
                approved_at: Utc::now(),
                approved_by: approved_by.to_string(),
            },
        );
        debug!(name: "Trust", "approved hook '{}' ({})", hook.id, key);
        self.save(map)
    }

    /// Remove an approval by its source identity. Returns true if it existed.
    pub async fn revoke(&self, source: &str) -> Result<bool> {
        self.ensure_loaded().await?;
        let mut guard = self.approvals.write().await;
        let map = guard.get_or_insert_with(HashMap::new);
        let removed = map.remove(source).is_some();
        if removed {
            self.save(map)?;
        }
        Ok(removed)
    }

    /// All current approvals (host UI listing).
    pub async fn approvals(&self) -> Result<Vec<HookApproval>> {
        self.ensure_loaded().await?;
        let guard = self.approvals.read().await;
        Ok(guard.as_ref().map(|m| m.values().cloned().collect()).unwrap_or_default())
    }

    async fn ensure_loaded(&self) -> Result<()> {
        {
            let guard = self.approvals.read().await;
            if guard.is_some() {
                return Ok(());
            }
        }

        let mut map = HashMap::new();
        if let Some(path) = &self.ledger_path
            && path.exists()
        {
            let content = fs::read_to_string(path)
                .map_err(|e| HookError::Ledger(format!("read {}: {}", path.display(), e)))?;
            let ledger: LedgerFile = serde_json::from_str(&content)
                .map_err(|e| HookError::Ledger(format!("parse {}: {}", path.display(), e)))?;
            for approval in ledger.approvals {
                map.insert(approval.source.clone(), approval);
            }
            debug!(name: "Trust", "loaded {} approval(s) from {}", map.len(), path.display());
        }

        let mut guard = self.approvals.write().await;
        guard.get_or_insert(map);
        Ok(())
    }

    fn save(&self, map: &HashMap<String, HookApproval>) -> Result<()> {
        let Some(path) = &self.ledger_path else {
            return Ok(());
        };
        let mut approvals: Vec<_> = map.values().cloned().collect();
        approvals.sort_by(|a, b| a.source.cmp(&b.source));
        let ledger = LedgerFile {
            version: LEDGER_VERSION,
            approvals,
        };
        let json = serde_json::to_string_pretty(&ledger)
            .map_err(|e| HookError::Ledger(format!("serialize ledger: {}", e)))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)
            .map_err(|e| HookError::Ledger(format!("write {}: {}", path.display(), e)))?;
        Ok(())
    }
}
