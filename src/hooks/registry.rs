//! Hook registry and execution planner.

use std::collections::HashMap;

use tracing::debug;

use super::hook::{Hook, HookEvent};
use crate::error::{HookError, Result};

/// Canonical store of registered hooks, keyed by lifecycle event.
///
/// Hooks keep their registration order within an event. Ids are unique across
/// the whole registry: registering a second hook with an existing id is
/// rejected rather than shadowing the first.
#[derive(Debug, Default)]
pub struct HookRegistry {
    by_event: HashMap<HookEvent, Vec<Hook>>,
    by_id: HashMap<String, HookEvent>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook for an event. Validates the hook's id and command and
    /// rejects duplicate ids.
    pub fn register(&mut self, event: HookEvent, hook: Hook) -> Result<()> {
        hook.validate()?;
        if self.by_id.contains_key(&hook.id) {
            return Err(HookError::DuplicateHookId(hook.id));
        }
        debug!(name: "Hooks", "registered hook '{}' ({}) for {}", hook.id, hook.source, event);
        self.by_id.insert(hook.id.clone(), event);
        self.by_event.entry(event).or_default().push(hook);
        Ok(())
    }

    /// Remove a hook by id from every event list. Returns true if it existed.
    pub fn unregister(&mut self, id: &str) -> bool {
        if self.by_id.remove(id).is_none() {
            return false;
        }
        for hooks in self.by_event.values_mut() {
            hooks.retain(|h| h.id != id);
        }
        debug!(name: "Hooks", "unregistered hook '{}'", id);
        true
    }

    /// Hooks registered against an event, in registration order.
    pub fn hooks_for_event(&self, event: HookEvent) -> &[Hook] {
        self.by_event.get(&event).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, id: &str) -> Option<&Hook> {
        let event = self.by_id.get(id)?;
        self.by_event.get(event)?.iter().find(|h| h.id == id)
    }

    /// Only user-created hooks may be edited.
    pub fn is_editable(&self, id: &str) -> bool {
        self.get(id).is_some_and(Hook::is_editable)
    }

    /// Only user-created hooks may be deleted.
    pub fn is_deletable(&self, id: &str) -> bool {
        self.get(id).is_some_and(Hook::is_deletable)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Ordered hook list for one event firing. Derived fresh per firing, never
/// persisted.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub event: HookEvent,
    pub hooks: Vec<Hook>,
    /// Dispatch mode for this firing. The event handler consults this flag:
    /// sequential runs hooks one at a time with data chaining and
    /// abort-on-veto, parallel fans out with error isolation.
    pub parallel: bool,
}

impl ExecutionPlan {
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

/// Order the registry's hooks for one event firing.
///
/// Stable sort by source priority (`builtin < user < workspace <
/// downloaded/extension`), preserving registration order within a tier.
pub fn plan_execution(registry: &HookRegistry, event: HookEvent, parallel: bool) -> ExecutionPlan {
    let mut hooks = registry.hooks_for_event(event).to_vec();
    hooks.sort_by_key(|h| h.source.priority());
    ExecutionPlan {
        event,
        hooks,
        parallel,
    }
}
