//! Hook execution engine: spawns one child process per hook invocation,
//! exchanges the stdio JSON protocol, and enforces timeout, output-size, and
//! trust limits.
//!
//! Every failure branch (spawn error, timeout, oversized output, non-zero
//! exit, empty or malformed output, trust denial) is normalized into a
//! `HookOutput { continue: true, error: "..." }` — a misbehaving hook never
//! aborts the surrounding batch by itself. Only an explicit
//! `continue: false` from a hook halts sequential batch progression.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::hook::Hook;
use super::protocol::{HookInput, HookOutput, parse_hook_output};
use super::registry::ExecutionPlan;
use super::tracer::ExecutionTracer;
use super::trust::TrustStore;
use crate::config::{HooksConfig, validate_command};

/// After a graceful termination signal, how long the process gets before the
/// forceful kill.
const KILL_GRACE: Duration = Duration::from_millis(1000);

/// Result of a sequential batch: hooks ran one at a time in plan order, each
/// seeing the data merged from its predecessors.
#[derive(Debug, Default)]
pub struct SequentialOutcome {
    /// One output per hook that actually ran. Shorter than the plan when a
    /// hook vetoed.
    pub outputs: Vec<HookOutput>,
    /// `systemMessage` values in execution order.
    pub system_messages: Vec<String>,
    /// Union of all `data` fields, later hooks overwriting earlier keys.
    pub aggregated_data: Map<String, Value>,
    /// True when a hook returned `continue: false`; hooks after it never ran.
    pub aborted: bool,
}

/// Result of a parallel batch: every hook saw the original input, failures
/// are isolated per hook.
#[derive(Debug, Default)]
pub struct ParallelOutcome {
    pub outputs: Vec<HookOutput>,
    pub system_messages: Vec<String>,
    pub aggregated_data: Map<String, Value>,
    /// Error strings from failed hooks, in plan order.
    pub errors: Vec<String>,
    /// False only on an explicit veto, or on any error when `stop_on_error`
    /// is configured.
    pub should_continue: bool,
}

enum ProcessOutcome {
    Completed {
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },
    SpawnFailed(String),
    TimedOut,
    OutputExceeded,
}

/// Executes hooks as isolated child processes.
pub struct HookRunner {
    config: HooksConfig,
    trust: Arc<TrustStore>,
    tracer: Arc<ExecutionTracer>,
}

impl HookRunner {
    pub fn new(config: HooksConfig, trust: Arc<TrustStore>, tracer: Arc<ExecutionTracer>) -> Self {
        Self {
            config,
            trust,
            tracer,
        }
    }

    pub fn config(&self) -> &HooksConfig {
        &self.config
    }

    pub fn tracer(&self) -> &Arc<ExecutionTracer> {
        &self.tracer
    }

    /// Run one hook to completion. Infallible by design: every failure is
    /// folded into the returned output's `error` field.
    pub async fn execute_hook(&self, hook: &Hook, input: &HookInput) -> HookOutput {
        if !self.config.enabled {
            return HookOutput::failure("hooks disabled");
        }

        if let Err(e) = validate_command(&hook.command) {
            return HookOutput::failure(e.to_string());
        }

        match self.trust.ensure_trusted(hook, self.config.trust_workspace).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(name: "Hooks", "skipping hook '{}': not approved", hook.id);
                return HookOutput::failure(format!("hook '{}' is not approved", hook.id));
            }
            Err(e) => return HookOutput::failure(format!("trust check failed: {}", e)),
        }

        let payload = match serde_json::to_string(input) {
            Ok(p) => p,
            Err(e) => return HookOutput::failure(format!("failed to serialize hook input: {}", e)),
        };

        let trace_id = self.tracer.start_trace(
            hook,
            &input.event,
            &serde_json::to_value(input).unwrap_or(Value::Null),
        );

        let outcome = self.run_process(hook, &payload).await;
        let (output, exit_code) = self.translate_outcome(hook, outcome);

        if let Some(id) = trace_id {
            self.tracer.end_trace(
                &id,
                serde_json::to_value(&output).ok().as_ref(),
                output.error.as_deref(),
                exit_code,
            );
        }

        output
    }

    /// Sequential batch with data chaining: each hook's `data` is merged into
    /// the next hook's input, and an explicit `continue: false` stops the
    /// batch. Trust is re-checked per hook inside [`execute_hook`](Self::execute_hook).
    pub async fn execute_sequential(
        &self,
        plan: &ExecutionPlan,
        input: &HookInput,
    ) -> SequentialOutcome {
        let mut outcome = SequentialOutcome::default();
        let mut chained = input.data.clone();

        for hook in &plan.hooks {
            let hook_input = HookInput {
                event: input.event.clone(),
                data: chained.clone(),
            };
            let output = self.execute_hook(hook, &hook_input).await;

            if let Some(msg) = &output.system_message {
                outcome.system_messages.push(msg.clone());
            }
            if let Some(data) = &output.data {
                for (k, v) in data {
                    outcome.aggregated_data.insert(k.clone(), v.clone());
                    chained.insert(k.clone(), v.clone());
                }
            }

            let vetoed = !output.continue_;
            outcome.outputs.push(output);
            if vetoed {
                debug!(name: "Hooks", "hook '{}' vetoed {}, aborting batch", hook.id, input.event);
                outcome.aborted = true;
                break;
            }
        }

        outcome
    }

    /// Parallel batch: all hooks start concurrently, each sees only the
    /// original input, and failures are collected instead of propagated.
    pub async fn execute_parallel(
        &self,
        plan: &ExecutionPlan,
        input: &HookInput,
    ) -> ParallelOutcome {
        let outputs = join_all(plan.hooks.iter().map(|h| self.execute_hook(h, input))).await;

        let mut outcome = ParallelOutcome {
            should_continue: true,
            ..Default::default()
        };
        for output in outputs {
            if let Some(msg) = &output.system_message {
                outcome.system_messages.push(msg.clone());
            }
            if let Some(data) = &output.data {
                for (k, v) in data {
                    outcome.aggregated_data.insert(k.clone(), v.clone());
                }
            }
            if let Some(err) = &output.error {
                outcome.errors.push(err.clone());
            }
            if !output.continue_ {
                outcome.should_continue = false;
            }
            outcome.outputs.push(output);
        }

        if self.config.stop_on_error && !outcome.errors.is_empty() {
            outcome.should_continue = false;
        }

        outcome
    }

    async fn run_process(&self, hook: &Hook, payload: &str) -> ProcessOutcome {
        let mut child = match Command::new(&hook.command)
            .args(&hook.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return ProcessOutcome::SpawnFailed(e.to_string()),
        };

        // Write the input once, then close stdin so the hook sees EOF. The
        // write runs detached so a hook that floods its output before reading
        // stdin cannot deadlock against the full pipe.
        let stdin = child.stdin.take();
        let payload = payload.to_string();
        let hook_id = hook.id.clone();
        tokio::spawn(async move {
            if let Some(mut stdin) = stdin
                && let Err(e) = stdin.write_all(payload.as_bytes()).await
            {
                warn!(name: "Hooks", "failed to write stdin of hook '{}': {}", hook_id, e);
            }
        });

        // Drain both output streams concurrently; the shared counter enforces
        // the combined cap and wakes the select below on overflow.
        let cap = self.config.max_output_bytes;
        let used = Arc::new(AtomicUsize::new(0));
        let overflow = Arc::new(Notify::new());
        let stdout_task = tokio::spawn(read_capped(
            child.stdout.take(),
            used.clone(),
            cap,
            overflow.clone(),
        ));
        let stderr_task = tokio::spawn(read_capped(
            child.stderr.take(),
            used.clone(),
            cap,
            overflow.clone(),
        ));

        enum Waited {
            Exited(std::io::Result<ExitStatus>),
            TimedOut,
            Overflowed,
        }

        let deadline = Duration::from_millis(self.config.timeout_ms);
        let waited = tokio::select! {
            status = child.wait() => Waited::Exited(status),
            _ = tokio::time::sleep(deadline) => Waited::TimedOut,
            _ = overflow.notified() => Waited::Overflowed,
        };

        match waited {
            Waited::Exited(Ok(status)) => {
                let stdout = join_read(stdout_task).await;
                let stderr = join_read(stderr_task).await;
                if used.load(Ordering::Relaxed) > cap {
                    return ProcessOutcome::OutputExceeded;
                }
                ProcessOutcome::Completed {
                    status,
                    stdout,
                    stderr,
                }
            }
            Waited::Exited(Err(e)) => ProcessOutcome::SpawnFailed(format!("wait failed: {}", e)),
            Waited::TimedOut => {
                terminate(&mut child).await;
                ProcessOutcome::TimedOut
            }
            Waited::Overflowed => {
                terminate(&mut child).await;
                ProcessOutcome::OutputExceeded
            }
        }
    }

    fn translate_outcome(&self, hook: &Hook, outcome: ProcessOutcome) -> (HookOutput, Option<i32>) {
        match outcome {
            ProcessOutcome::SpawnFailed(e) => (
                HookOutput::failure(format!("failed to spawn hook '{}': {}", hook.id, e)),
                None,
            ),
            ProcessOutcome::TimedOut => {
                warn!(name: "Hooks", "hook '{}' timed out after {}ms", hook.id, self.config.timeout_ms);
                (
                    HookOutput::failure(format!(
                        "hook '{}' timed out after {}ms",
                        hook.id, self.config.timeout_ms
                    )),
                    None,
                )
            }
            ProcessOutcome::OutputExceeded => {
                warn!(name: "Hooks", "hook '{}' output exceeded {} bytes", hook.id, self.config.max_output_bytes);
                (
                    HookOutput::failure(format!(
                        "hook '{}' output exceeded {} bytes",
                        hook.id, self.config.max_output_bytes
                    )),
                    None,
                )
            }
            ProcessOutcome::Completed {
                status,
                stdout,
                stderr,
            } => {
                let code = status.code();
                if !status.success() {
                    let output = HookOutput::failure(format!(
                        "hook '{}' exited with code {}: {}",
                        hook.id,
                        code.unwrap_or(-1),
                        stderr.trim()
                    ));
                    return (output, code);
                }
                if stdout.trim().is_empty() {
                    return (
                        HookOutput::failure(format!("hook '{}' produced no output", hook.id)),
                        code,
                    );
                }
                match parse_hook_output(&stdout) {
                    Ok(output) => (output, code),
                    Err(e) => (HookOutput::failure(e.to_string()), code),
                }
            }
        }
    }
}

/// Read a stream to EOF, stopping early once the shared byte budget is
/// exhausted. Notifies `overflow` so the runner can terminate the child.
async fn read_capped<R: AsyncRead + Unpin>(
    stream: Option<R>,
    used: Arc<AtomicUsize>,
    cap: usize,
    overflow: Arc<Notify>,
) -> String {
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                let total = used.fetch_add(n, Ordering::Relaxed) + n;
                if total > cap {
                    overflow.notify_one();
                    break;
                }
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn join_read(task: JoinHandle<String>) -> String {
    task.await.unwrap_or_default()
}

/// Graceful termination: SIGTERM, a fixed grace window, then SIGKILL.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
                return;
            }
            debug!(name: "Hooks", "process {} survived SIGTERM, killing", pid);
        }
    }
    if let Err(e) = child.kill().await {
        debug!(name: "Hooks", "kill failed: {}", e);
    }
}
