//! Event handler: subscribes the message bus to the fixed lifecycle events
//! and drives the runner per event.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::hook::HookEvent;
use super::protocol::create_event_input;
use super::registry::{HookRegistry, plan_execution};
use super::runner::HookRunner;
use crate::bus::MessageBus;
use crate::config::HooksConfig;

/// Uniform result of handling one lifecycle event.
#[derive(Debug, Clone)]
pub struct EventHandlingResult {
    pub event: String,
    pub hooks_executed: usize,
    /// True when no hook produced an error.
    pub success: bool,
    pub system_messages: Vec<String>,
    /// False when a hook vetoed the operation (or, in parallel mode with
    /// `stop_on_error`, when any hook failed).
    pub should_continue: bool,
    pub aggregated_data: Map<String, Value>,
    pub errors: Vec<String>,
}

impl EventHandlingResult {
    fn empty(event: HookEvent) -> Self {
        Self {
            event: event.as_str().to_string(),
            hooks_executed: 0,
            success: true,
            system_messages: Vec::new(),
            should_continue: true,
            aggregated_data: Map::new(),
            errors: Vec::new(),
        }
    }
}

/// Bridges the bus and the runner: one listener per lifecycle event, each
/// fetching that event's hooks from the registry and executing them per the
/// planned mode.
pub struct HookEventHandler {
    bus: Arc<MessageBus>,
    registry: Arc<RwLock<HookRegistry>>,
    runner: Arc<HookRunner>,
    config: HooksConfig,
    enabled: Arc<AtomicBool>,
    subscriptions: Mutex<Vec<u64>>,
}

impl HookEventHandler {
    pub fn new(
        bus: Arc<MessageBus>,
        registry: Arc<RwLock<HookRegistry>>,
        runner: Arc<HookRunner>,
        config: HooksConfig,
    ) -> Self {
        Self {
            bus,
            registry,
            runner,
            config,
            enabled: Arc::new(AtomicBool::new(true)),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to the full fixed set of lifecycle events.
    pub async fn start(self: &Arc<Self>) {
        let mut subscriptions = self.subscriptions.lock().await;
        if !subscriptions.is_empty() {
            return;
        }
        for event in HookEvent::ALL {
            let handler = Arc::clone(self);
            let id = self
                .bus
                .subscribe(event.as_str(), 0, move |msg| {
                    let handler = Arc::clone(&handler);
                    async move {
                        let result = handler.handle_event(event, msg.data).await;
                        if !result.errors.is_empty() {
                            debug!(name: "Hooks", "event {} finished with {} error(s)", event, result.errors.len());
                        }
                        Ok(())
                    }
                })
                .await;
            subscriptions.push(id);
        }
        debug!(name: "Hooks", "subscribed to {} lifecycle events", subscriptions.len());
    }

    /// Unsubscribe everything.
    pub async fn stop(&self) {
        let mut subscriptions = self.subscriptions.lock().await;
        for id in subscriptions.drain(..) {
            self.bus.unsubscribe(id).await;
        }
    }

    /// Toggle execution without unsubscribing.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Run every hook registered for `event` against `data` and aggregate
    /// the results. Callers that need the result (vetoes, injected messages)
    /// invoke this directly; bus emissions go through the same path.
    pub async fn handle_event(&self, event: HookEvent, data: Value) -> EventHandlingResult {
        if !self.is_enabled() {
            return EventHandlingResult::empty(event);
        }

        let plan = {
            let registry = self.registry.read().await;
            plan_execution(&registry, event, self.config.parallel)
        };
        if plan.is_empty() {
            return EventHandlingResult::empty(event);
        }

        let input = create_event_input(event, data);
        debug!(name: "Hooks", "handling {} with {} hook(s), parallel={}", event, plan.hooks.len(), plan.parallel);

        if plan.parallel {
            // Fan out per-hook futures directly; every hook sees the original
            // input and failures stay isolated.
            let outputs = futures::future::join_all(
                plan.hooks.iter().map(|h| self.runner.execute_hook(h, &input)),
            )
            .await;

            let mut result = EventHandlingResult::empty(event);
            result.hooks_executed = outputs.len();
            for output in outputs {
                if let Some(msg) = output.system_message {
                    result.system_messages.push(msg);
                }
                if let Some(data) = output.data {
                    for (k, v) in data {
                        result.aggregated_data.insert(k, v);
                    }
                }
                if let Some(err) = output.error {
                    result.errors.push(err);
                }
                if !output.continue_ {
                    result.should_continue = false;
                }
            }
            if self.config.stop_on_error && !result.errors.is_empty() {
                result.should_continue = false;
            }
            result.success = result.errors.is_empty();
            result
        } else {
            let outcome = self.runner.execute_sequential(&plan, &input).await;
            let errors: Vec<String> = outcome
                .outputs
                .iter()
                .filter_map(|o| o.error.clone())
                .collect();
            EventHandlingResult {
                event: event.as_str().to_string(),
                hooks_executed: outcome.outputs.len(),
                success: errors.is_empty(),
                system_messages: outcome.system_messages,
                should_continue: !outcome.aborted,
                aggregated_data: outcome.aggregated_data,
                errors,
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::hooks::hook::{Hook, HookSource};
    use crate::hooks::tracer::ExecutionTracer;
    use crate::hooks::trust::TrustStore;
    use serde_json::json;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_script(dir: &TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    fn hook_for(command: &str, id: &str) -> Hook {
        Hook {
            id: id.to_string(),
            name: id.to_string(),
            command: command.to_string(),
            args: Vec::new(),
            source: HookSource::User,
            extension_name: None,
            source_path: None,
        }
    }

    async fn handler_with(
        config: HooksConfig,
        hooks: Vec<(HookEvent, Hook)>,
    ) -> Arc<HookEventHandler> {
        let mut registry = HookRegistry::new();
        for (event, hook) in hooks {
            registry.register(event, hook).unwrap();
        }
        let runner = Arc::new(HookRunner::new(
            config.clone(),
            Arc::new(TrustStore::in_memory()),
            Arc::new(ExecutionTracer::new()),
        ));
        Arc::new(HookEventHandler::new(
            Arc::new(MessageBus::default()),
            Arc::new(RwLock::new(registry)),
            runner,
            config,
        ))
    }

    #[tokio::test]
    async fn test_handle_event_sequential() {
        let dir = TempDir::new().unwrap();
        let cmd = write_script(
            &dir,
            "ok.sh",
            r#"echo '{"continue": true, "systemMessage": "seen", "data": {"k": "v"}}'"#,
        );
        let handler = handler_with(
            HooksConfig::default(),
            vec![(HookEvent::BeforeTool, hook_for(&cmd, "ok"))],
        )
        .await;

        let result = handler
            .handle_event(HookEvent::BeforeTool, json!({"tool_name": "bash", "args": {}}))
            .await;
        assert_eq!(result.hooks_executed, 1);
        assert!(result.success);
        assert!(result.should_continue);
        assert_eq!(result.system_messages, vec!["seen"]);
        assert_eq!(result.aggregated_data.get("k"), Some(&json!("v")));
    }

    #[tokio::test]
    async fn test_handle_event_veto() {
        let dir = TempDir::new().unwrap();
        let cmd = write_script(&dir, "veto.sh", r#"echo '{"continue": false}'"#);
        let handler = handler_with(
            HooksConfig::default(),
            vec![(HookEvent::BeforeTool, hook_for(&cmd, "veto"))],
        )
        .await;

        let result = handler.handle_event(HookEvent::BeforeTool, json!({})).await;
        assert!(!result.should_continue);
        assert!(result.success, "a veto is a control signal, not an error");
    }

    #[tokio::test]
    async fn test_handle_event_parallel_mode() {
        let dir = TempDir::new().unwrap();
        let a = write_script(&dir, "a.sh", r#"echo '{"continue": true, "data": {"a": 1}}'"#);
        let b = write_script(&dir, "b.sh", "exit 1");
        let config = HooksConfig {
            parallel: true,
            ..Default::default()
        };
        let handler = handler_with(
            config,
            vec![
                (HookEvent::AfterTool, hook_for(&a, "a")),
                (HookEvent::AfterTool, hook_for(&b, "b")),
            ],
        )
        .await;

        let result = handler
            .handle_event(HookEvent::AfterTool, json!({"tool_name": "bash", "result": "ok"}))
            .await;
        assert_eq!(result.hooks_executed, 2);
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        // one failed hook does not stop a parallel batch by itself
        assert!(result.should_continue);
        assert_eq!(result.aggregated_data.get("a"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_disabled_handler_is_noop() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let cmd = write_script(
            &dir,
            "mark.sh",
            &format!("touch {}\necho '{{\"continue\": true}}'", marker.display()),
        );
        let handler = handler_with(
            HooksConfig::default(),
            vec![(HookEvent::SessionStart, hook_for(&cmd, "mark"))],
        )
        .await;

        handler.disable();
        let result = handler
            .handle_event(HookEvent::SessionStart, json!({"session_id": "s"}))
            .await;
        assert_eq!(result.hooks_executed, 0);
        assert!(!marker.exists());

        handler.enable();
        handler
            .handle_event(HookEvent::SessionStart, json!({"session_id": "s"}))
            .await;
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_no_hooks_registered_is_empty_result() {
        let handler = handler_with(HooksConfig::default(), Vec::new()).await;
        let result = handler.handle_event(HookEvent::Notification, json!({})).await;
        assert_eq!(result.hooks_executed, 0);
        assert!(result.success);
        assert!(result.should_continue);
    }

    #[tokio::test]
    async fn test_start_subscribes_and_stop_unsubscribes() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("fired");
        let cmd = write_script(
            &dir,
            "mark.sh",
            &format!("touch {}\necho '{{\"continue\": true}}'", marker.display()),
        );
        let handler = handler_with(
            HooksConfig::default(),
            vec![(HookEvent::BeforeTool, hook_for(&cmd, "mark"))],
        )
        .await;

        handler.start().await;
        assert_eq!(handler.bus.listener_count().await, HookEvent::ALL.len());
        // idempotent
        handler.start().await;
        assert_eq!(handler.bus.listener_count().await, HookEvent::ALL.len());

        handler
            .bus
            .emit("before_tool", json!({"tool_name": "bash", "args": {}}))
            .await;
        assert!(marker.exists());

        handler.stop().await;
        assert_eq!(handler.bus.listener_count().await, 0);
    }

    #[tokio::test]
    async fn test_bus_driven_emission_runs_hooks() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("session-start");
        let cmd = write_script(
            &dir,
            "mark.sh",
            &format!("touch {}\necho '{{\"continue\": true}}'", marker.display()),
        );
        let handler = handler_with(
            HooksConfig::default(),
            vec![(HookEvent::SessionStart, hook_for(&cmd, "mark"))],
        )
        .await;
        handler.start().await;

        handler.bus.emit("session_start", json!({"sessionId": "s-1"})).await;
        assert!(marker.exists());

        // unrelated events do not fire the hook
        fs::remove_file(&marker).unwrap();
        handler.bus.emit("session_end", json!({"session_id": "s-1"})).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!marker.exists());
    }
}
