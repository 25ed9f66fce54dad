//! Generic priority publish-subscribe bus.
//!
//! Decouples event sources (agent loop, tool dispatcher, session manager)
//! from the hook runner. Listeners register against a specific event name or
//! a wildcard, each with a priority (higher runs first) and an optional
//! one-shot flag. `emit` runs matching listeners synchronously one after
//! another, isolating each listener's failure; `emit_sync` schedules the same
//! emission without the caller waiting. A bounded history ring retains recent
//! emissions for inspection.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{RwLock, oneshot};
use tracing::{debug, warn};

/// Default number of emissions kept in the history ring.
pub const DEFAULT_HISTORY_CAP: usize = 100;

/// One emission on the bus.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub event: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

type ListenerFn = Arc<dyn Fn(BusMessage) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct Listener {
    id: u64,
    /// `None` subscribes to every event (wildcard).
    event: Option<String>,
    priority: i32,
    once: bool,
    handler: ListenerFn,
}

impl Listener {
    fn matches(&self, event: &str) -> bool {
        self.event.as_deref().is_none_or(|e| e == event)
    }
}

#[derive(Default)]
struct BusState {
    listeners: Vec<Listener>,
    history: VecDeque<BusMessage>,
}

/// Priority pub/sub with bounded emission history. Share behind an [`Arc`].
pub struct MessageBus {
    state: RwLock<BusState>,
    next_id: AtomicU64,
    history_cap: usize,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP)
    }
}

impl MessageBus {
    pub fn new(history_cap: usize) -> Self {
        Self {
            state: RwLock::new(BusState::default()),
            next_id: AtomicU64::new(1),
            history_cap,
        }
    }

    /// Subscribe to one event. Returns the subscription id for
    /// [`unsubscribe`](Self::unsubscribe).
    pub async fn subscribe<F, Fut>(&self, event: &str, priority: i32, handler: F) -> u64
    where
        F: Fn(BusMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.add_listener(Some(event.to_string()), priority, false, handler)
            .await
    }

    /// Subscribe to one event for a single delivery.
    pub async fn subscribe_once<F, Fut>(&self, event: &str, priority: i32, handler: F) -> u64
    where
        F: Fn(BusMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.add_listener(Some(event.to_string()), priority, true, handler)
            .await
    }

    /// Subscribe to every event (wildcard).
    pub async fn subscribe_all<F, Fut>(&self, priority: i32, handler: F) -> u64
    where
        F: Fn(BusMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.add_listener(None, priority, false, handler).await
    }

    async fn add_listener<F, Fut>(
        &self,
        event: Option<String>,
        priority: i32,
        once: bool,
        handler: F,
    ) -> u64
    where
        F: Fn(BusMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handler: ListenerFn = Arc::new(move |msg| Box::pin(handler(msg)));
        let mut state = self.state.write().await;
        state.listeners.push(Listener {
            id,
            event,
            priority,
            once,
            handler,
        });
        id
    }

    /// Remove a listener. Returns true if it existed.
    pub async fn unsubscribe(&self, id: u64) -> bool {
        let mut state = self.state.write().await;
        let before = state.listeners.len();
        state.listeners.retain(|l| l.id != id);
        state.listeners.len() != before
    }

    pub async fn listener_count(&self) -> usize {
        self.state.read().await.listeners.len()
    }

    /// Emit an event and wait for every matching listener to finish.
    ///
    /// Listeners run in priority order (higher first, stable within a
    /// priority). A listener failure is logged and swallowed; the remaining
    /// listeners still run.
    pub async fn emit(&self, event: &str, data: Value) {
        let message = BusMessage {
            event: event.to_string(),
            data,
            timestamp: Utc::now(),
        };

        // Snapshot matching handlers and record history under one lock, then
        // run handlers without holding it so listeners can use the bus.
        let handlers: Vec<(u64, ListenerFn)> = {
            let mut state = self.state.write().await;
            state.history.push_back(message.clone());
            while state.history.len() > self.history_cap {
                state.history.pop_front();
            }

            let mut matching: Vec<&Listener> =
                state.listeners.iter().filter(|l| l.matches(event)).collect();
            matching.sort_by_key(|l| std::cmp::Reverse(l.priority));
            matching.iter().map(|l| (l.id, l.handler.clone())).collect()
        };

        if handlers.is_empty() {
            return;
        }
        debug!(name: "Bus", "emitting '{}' to {} listener(s)", event, handlers.len());

        let mut spent = Vec::new();
        for (id, handler) in handlers {
            if let Err(e) = handler(message.clone()).await {
                warn!(name: "Bus", "listener {} failed on '{}': {}", id, event, e);
            }
            spent.push(id);
        }

        // Drop one-shot listeners that were delivered to.
        let mut state = self.state.write().await;
        state.listeners.retain(|l| !(l.once && spent.contains(&l.id)));
    }

    /// Schedule an emission without waiting for listeners to run.
    pub fn emit_sync(self: &Arc<Self>, event: &str, data: Value) {
        let bus = Arc::clone(self);
        let event = event.to_string();
        tokio::spawn(async move {
            bus.emit(&event, data).await;
        });
    }

    /// Recent emissions, oldest first, bounded by the history cap.
    pub async fn history(&self) -> Vec<BusMessage> {
        self.state.read().await.history.iter().cloned().collect()
    }

    /// Wait for the next emission of `event`, or fail after `timeout`.
    pub async fn wait_for(&self, event: &str, timeout: Duration) -> anyhow::Result<BusMessage> {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(std::sync::Mutex::new(Some(tx)));

        let id = self
            .subscribe_once(event, i32::MAX, move |msg| {
                let tx = tx.clone();
                async move {
                    if let Some(tx) = tx.lock().expect("wait_for sender poisoned").take() {
                        let _ = tx.send(msg);
                    }
                    Ok(())
                }
            })
            .await;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(msg)) => Ok(msg),
            Ok(Err(_)) => {
                self.unsubscribe(id).await;
                Err(anyhow::anyhow!("wait_for '{}': bus dropped", event))
            }
            Err(_) => {
                self.unsubscribe(id).await;
                Err(anyhow::anyhow!(
                    "wait_for '{}': timed out after {:?}",
                    event,
                    timeout
                ))
            }
        }
    }
}
