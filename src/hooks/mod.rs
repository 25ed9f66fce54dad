//! Lifecycle hook system.
//!
//! Hooks are external scripts bound to fixed lifecycle events. Each
//! invocation spawns an isolated child process, writes a JSON payload to its
//! stdin, and expects a single JSON object on stdout:
//!
//! ```json
//! { "continue": true, "systemMessage": "optional", "data": {"k": "v"} }
//! ```
//!
//! A hook can veto the surrounding operation (`"continue": false`), inject a
//! message into the conversation (`systemMessage`), or pass data forward to
//! the next hook in the batch (`data`). Untrusted hooks (workspace,
//! downloaded, extension) must be approved before they run; approvals are
//! hash-verified so any change to the hook invalidates them.

pub mod events;
pub mod hook;
pub mod protocol;
pub mod registry;
pub mod runner;
pub mod tracer;
pub mod trust;

pub use events::{EventHandlingResult, HookEventHandler};
pub use hook::{Hook, HookEvent, HookSource};
pub use protocol::{HookInput, HookOutput, create_event_input, parse_hook_output, to_hook_input, validate_output};
pub use registry::{ExecutionPlan, HookRegistry, plan_execution};
pub use runner::{HookRunner, ParallelOutcome, SequentialOutcome};
pub use tracer::{ExecutionTracer, TraceEntry, TraceSummary};
pub use trust::{ApprovalPrompt, DenyAll, HookApproval, TrustStore, approval_source, hook_hash};
