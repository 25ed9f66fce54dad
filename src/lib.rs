//! Hookwire — lifecycle hook engine for LLM agent CLIs.
//!
//! Hooks are externally-executed scripts bound to fixed lifecycle events
//! (session start, before/after each model call, before/after each tool
//! invocation, ...). The host emits an event, matching hooks run as isolated
//! child processes, exchange a small JSON protocol over stdin/stdout, and can
//! veto the operation, inject a message into the conversation, or pass data
//! forward to the next hook.
//!
//! The crate is organized leaves-first:
//! - [`config`] — defaults, command/id safety rules
//! - [`hooks::protocol`] — host data ↔ wire JSON translation
//! - [`hooks::trust`] — hash-based approval ledger
//! - [`hooks::registry`] — hook storage and execution planning
//! - [`hooks::runner`] — sandboxed process execution, batch modes
//! - [`hooks::tracer`] — diagnostic side-channel recorder
//! - [`bus`] — generic priority pub/sub feeding events into the runner
//! - [`hooks::events`] — wires the bus to the runner per lifecycle event

pub mod bus;
pub mod config;
pub mod error;
pub mod hooks;

pub use bus::MessageBus;
pub use config::HooksConfig;
pub use error::HookError;
pub use hooks::{
    ExecutionTracer, Hook, HookEvent, HookEventHandler, HookInput, HookOutput, HookRegistry,
    HookRunner, HookSource, TrustStore,
};
