//! Execution tracer: a toggleable side-channel recorder of hook invocations.
//!
//! The tracer is purely observational — it never alters runner behavior or
//! timing. Off by default; when enabled, every runner invocation produces one
//! [`TraceEntry`] with timing, size-capped input/output previews, and the
//! derived success flag. History lives in memory until cleared or exported.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::hook::{Hook, HookEvent};

/// Input/output previews are capped so a chatty hook cannot bloat the trace
/// history; this is independent of the runner's own output cap.
const PREVIEW_CAP_BYTES: usize = 4096;

/// Diagnostic record of one hook invocation.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    pub id: String,
    pub hook_id: String,
    pub hook_name: String,
    pub source: String,
    pub event: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    /// Size-capped JSON preview of the input payload.
    pub input: String,
    /// Size-capped JSON preview of the output, once the invocation ends.
    pub output: Option<String>,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    pub success: Option<bool>,
}

/// Aggregate view over the trace history.
#[derive(Debug, Clone, Serialize)]
pub struct TraceSummary {
    pub total: usize,
    pub failures: usize,
    pub avg_duration_ms: f64,
    pub by_hook: HashMap<String, usize>,
    pub by_event: HashMap<String, usize>,
}

/// Recorder of hook invocations. Cheap to share behind an `Arc`; all methods
/// take `&self`.
#[derive(Debug, Default)]
pub struct ExecutionTracer {
    enabled: AtomicBool,
    traces: Mutex<Vec<TraceEntry>>,
}

impl ExecutionTracer {
    /// A tracer in its default (disabled) state.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Open a trace for a starting invocation. Returns `None` when disabled;
    /// the caller passes the id back to [`end_trace`](Self::end_trace).
    pub fn start_trace(&self, hook: &Hook, event: &str, input: &Value) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        let id = Uuid::new_v4().to_string();
        let entry = TraceEntry {
            id: id.clone(),
            hook_id: hook.id.clone(),
            hook_name: hook.name.clone(),
            source: hook.source.to_string(),
            event: event.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            input: preview(input),
            output: None,
            error: None,
            exit_code: None,
            success: None,
        };
        self.traces.lock().expect("tracer lock poisoned").push(entry);
        Some(id)
    }

    /// Close a trace. Success is derived: no error AND exit code absent or 0.
    pub fn end_trace(
        &self,
        trace_id: &str,
        output: Option<&Value>,
        error: Option<&str>,
        exit_code: Option<i32>,
    ) {
        let mut traces = self.traces.lock().expect("tracer lock poisoned");
        let Some(entry) = traces.iter_mut().find(|t| t.id == trace_id) else {
            return;
        };
        let ended = Utc::now();
        entry.duration_ms = Some(
            (ended - entry.started_at).num_milliseconds().max(0) as u64,
        );
        entry.ended_at = Some(ended);
        entry.output = output.map(preview);
        entry.error = error.map(str::to_string);
        entry.exit_code = exit_code;
        entry.success = Some(error.is_none() && exit_code.is_none_or(|c| c == 0));
    }

    pub fn all(&self) -> Vec<TraceEntry> {
        self.traces.lock().expect("tracer lock poisoned").clone()
    }

    pub fn for_hook(&self, hook_name: &str) -> Vec<TraceEntry> {
        self.all().into_iter().filter(|t| t.hook_name == hook_name).collect()
    }

    pub fn for_event(&self, event: HookEvent) -> Vec<TraceEntry> {
        self.all().into_iter().filter(|t| t.event == event.as_str()).collect()
    }

    pub fn failures(&self) -> Vec<TraceEntry> {
        self.all().into_iter().filter(|t| t.success == Some(false)).collect()
    }

    pub fn summary(&self) -> TraceSummary {
        let traces = self.all();
        let mut by_hook: HashMap<String, usize> = HashMap::new();
        let mut by_event: HashMap<String, usize> = HashMap::new();
        let mut failures = 0;
        let mut duration_total = 0u64;
        let mut duration_count = 0u64;

        for t in &traces {
            *by_hook.entry(t.hook_name.clone()).or_default() += 1;
            *by_event.entry(t.event.clone()).or_default() += 1;
            if t.success == Some(false) {
                failures += 1;
            }
            if let Some(d) = t.duration_ms {
                duration_total += d;
                duration_count += 1;
            }
        }

        TraceSummary {
            total: traces.len(),
            failures,
            avg_duration_ms: if duration_count == 0 {
                0.0
            } else {
                duration_total as f64 / duration_count as f64
            },
            by_hook,
            by_event,
        }
    }

    /// Export the full history as pretty-printed JSON.
    pub fn export_json(&self) -> String {
        serde_json::to_string_pretty(&self.all()).unwrap_or_else(|_| "[]".to_string())
    }

    /// Export the full history as human-readable multi-line blocks.
    pub fn export_text(&self) -> String {
        let mut out = String::new();
        for t in self.all() {
            out.push_str(&format!("=== {} ({}) ===\n", t.hook_name, t.id));
            out.push_str(&format!("event:    {}\n", t.event));
            out.push_str(&format!("source:   {}\n", t.source));
            out.push_str(&format!("started:  {}\n", t.started_at.to_rfc3339()));
            if let Some(d) = t.duration_ms {
                out.push_str(&format!("duration: {}ms\n", d));
            }
            if let Some(code) = t.exit_code {
                out.push_str(&format!("exit:     {}\n", code));
            }
            if let Some(success) = t.success {
                out.push_str(&format!("success:  {}\n", success));
            }
            if let Some(err) = &t.error {
                out.push_str(&format!("error:    {}\n", err));
            }
            out.push_str(&format!("input:    {}\n", t.input));
            if let Some(output) = &t.output {
                out.push_str(&format!("output:   {}\n", output));
            }
            out.push('\n');
        }
        out
    }

    pub fn clear(&self) {
        self.traces.lock().expect("tracer lock poisoned").clear();
    }
}

fn preview(value: &Value) -> String {
    let mut text = value.to_string();
    if text.len() > PREVIEW_CAP_BYTES {
        let mut cut = PREVIEW_CAP_BYTES;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...[truncated]");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::hook::HookSource;
    use serde_json::json;

    fn hook(id: &str) -> Hook {
        Hook {
            id: id.to_string(),
            name: id.to_string(),
            command: "/bin/true".to_string(),
            args: Vec::new(),
            source: HookSource::User,
            extension_name: None,
            source_path: None,
        }
    }

    #[test]
    fn test_disabled_by_default() {
        let tracer = ExecutionTracer::new();
        assert!(!tracer.is_enabled());
        assert!(tracer.start_trace(&hook("a"), HookEvent::BeforeTool.as_str(), &json!({})).is_none());
        assert!(tracer.all().is_empty());
    }

    #[test]
    fn test_start_end_success() {
        let tracer = ExecutionTracer::new();
        tracer.enable();
        let id = tracer
            .start_trace(&hook("a"), HookEvent::BeforeTool.as_str(), &json!({"k": "v"}))
            .unwrap();
        tracer.end_trace(&id, Some(&json!({"continue": true})), None, Some(0));

        let traces = tracer.all();
        assert_eq!(traces.len(), 1);
        let t = &traces[0];
        assert_eq!(t.success, Some(true));
        assert!(t.duration_ms.is_some());
        assert!(t.input.contains("\"k\""));
        assert!(t.output.as_ref().unwrap().contains("continue"));
    }

    #[test]
    fn test_success_derivation() {
        let tracer = ExecutionTracer::new();
        tracer.enable();
        let h = hook("a");

        // error wins even with exit 0
        let id = tracer.start_trace(&h, HookEvent::BeforeTool.as_str(), &json!({})).unwrap();
        tracer.end_trace(&id, None, Some("boom"), Some(0));
        // non-zero exit fails
        let id = tracer.start_trace(&h, HookEvent::BeforeTool.as_str(), &json!({})).unwrap();
        tracer.end_trace(&id, None, None, Some(2));
        // no exit code at all is still a success when there is no error
        let id = tracer.start_trace(&h, HookEvent::BeforeTool.as_str(), &json!({})).unwrap();
        tracer.end_trace(&id, None, None, None);

        let traces = tracer.all();
        assert_eq!(traces[0].success, Some(false));
        assert_eq!(traces[1].success, Some(false));
        assert_eq!(traces[2].success, Some(true));
        assert_eq!(tracer.failures().len(), 2);
    }

    #[test]
    fn test_queries_and_summary() {
        let tracer = ExecutionTracer::new();
        tracer.enable();
        let id = tracer.start_trace(&hook("a"), HookEvent::BeforeTool.as_str(), &json!({})).unwrap();
        tracer.end_trace(&id, None, None, Some(0));
        let id = tracer.start_trace(&hook("b"), HookEvent::AfterTool.as_str(), &json!({})).unwrap();
        tracer.end_trace(&id, None, Some("bad"), None);

        assert_eq!(tracer.for_hook("a").len(), 1);
        assert_eq!(tracer.for_event(HookEvent::AfterTool).len(), 1);

        let summary = tracer.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.by_hook.get("a"), Some(&1));
        assert_eq!(summary.by_event.get("before_tool"), Some(&1));
    }

    #[test]
    fn test_preview_cap() {
        let big = json!({"blob": "x".repeat(PREVIEW_CAP_BYTES * 2)});
        let text = preview(&big);
        assert!(text.len() < PREVIEW_CAP_BYTES + 32);
        assert!(text.ends_with("...[truncated]"));
    }

    #[test]
    fn test_export_text_and_clear() {
        let tracer = ExecutionTracer::new();
        tracer.enable();
        let id = tracer.start_trace(&hook("audit"), HookEvent::SessionStart.as_str(), &json!({})).unwrap();
        tracer.end_trace(&id, None, None, Some(0));

        let text = tracer.export_text();
        assert!(text.contains("=== audit"));
        assert!(text.contains("event:    session_start"));

        let json_export = tracer.export_json();
        assert!(json_export.contains("\"audit\""));

        tracer.clear();
        assert!(tracer.all().is_empty());
    }

    #[test]
    fn test_end_trace_unknown_id_is_noop() {
        let tracer = ExecutionTracer::new();
        tracer.enable();
        tracer.end_trace("no-such-id", None, None, None);
        assert!(tracer.all().is_empty());
    }
}
