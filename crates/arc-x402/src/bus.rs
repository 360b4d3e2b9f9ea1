//! Publish/subscribe event bus for inter-agent messaging.
//!
//! One [`EventBus`] instance is constructed at process start and shared via
//! `Arc` — there is no implicit global. State lives for the process lifetime;
//! [`EventBus::reset`] exists for test isolation only.
//!
//! Delivery policy: handlers run in registration order, and a failing handler
//! is logged and skipped — observation must never break the action under
//! observation.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::EVENT_HISTORY_CAPACITY;

/// Event types carried on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DepositInitiated,
    DepositCompleted,
    DepositFailed,
    WithdrawInitiated,
    WithdrawCompleted,
    WithdrawFailed,
    CompoundInitiated,
    CompoundCompleted,
    CompoundFailed,
    PaymentInitiated,
    PaymentCompleted,
    PaymentFailed,
    ReceiptGenerated,
    AgentStarted,
    AgentStopped,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::DepositInitiated => "deposit_initiated",
            EventType::DepositCompleted => "deposit_completed",
            EventType::DepositFailed => "deposit_failed",
            EventType::WithdrawInitiated => "withdraw_initiated",
            EventType::WithdrawCompleted => "withdraw_completed",
            EventType::WithdrawFailed => "withdraw_failed",
            EventType::CompoundInitiated => "compound_initiated",
            EventType::CompoundCompleted => "compound_completed",
            EventType::CompoundFailed => "compound_failed",
            EventType::PaymentInitiated => "payment_initiated",
            EventType::PaymentCompleted => "payment_completed",
            EventType::PaymentFailed => "payment_failed",
            EventType::ReceiptGenerated => "receipt_generated",
            EventType::AgentStarted => "agent_started",
            EventType::AgentStopped => "agent_stopped",
        }
    }
}

/// An immutable event. Created by any component, retained by the bus until
/// evicted FIFO past [`EVENT_HISTORY_CAPACITY`].
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub source_agent: Option<String>,
}

impl Event {
    pub fn new(event_type: EventType, data: Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            data,
            timestamp: Utc::now(),
            source_agent: None,
        }
    }

    pub fn from_agent(event_type: EventType, data: Value, source_agent: &str) -> Self {
        Self {
            source_agent: Some(source_agent.to_string()),
            ..Self::new(event_type, data)
        }
    }
}

/// Outcome of one handler invocation. The error string is logged, never
/// propagated to the publisher.
pub type HandlerResult = Result<(), String>;

type BoxedHandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// A subscriber callback. Use [`handler`] to build one from an async closure.
pub type EventHandler = Arc<dyn Fn(Event) -> BoxedHandlerFuture + Send + Sync>;

/// Wrap an async closure as an [`EventHandler`].
pub fn handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

struct Subscriber {
    name: String,
    callback: EventHandler,
}

#[derive(Default)]
struct Inner {
    subscribers: HashMap<EventType, Vec<Subscriber>>,
    history: VecDeque<Event>,
}

/// Central event bus. Cheap to share behind an `Arc`.
pub struct EventBus {
    inner: Mutex<Inner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // The lock is never held across an await, so poisoning can only come
        // from a panicking caller; the inner state is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a named handler for an event type.
    ///
    /// Registration is idempotent: a second `subscribe` with the same
    /// `(event_type, name)` pair has no effect.
    pub fn subscribe(&self, event_type: EventType, name: &str, callback: EventHandler) {
        let mut inner = self.lock();
        let subs = inner.subscribers.entry(event_type).or_default();
        if subs.iter().any(|s| s.name == name) {
            return;
        }
        subs.push(Subscriber {
            name: name.to_string(),
            callback,
        });
    }

    /// Remove a named handler. Unknown names are ignored.
    pub fn unsubscribe(&self, event_type: EventType, name: &str) {
        let mut inner = self.lock();
        if let Some(subs) = inner.subscribers.get_mut(&event_type) {
            subs.retain(|s| s.name != name);
        }
    }

    /// Publish an event: record it in history, then deliver to all current
    /// subscribers for its type in registration order.
    ///
    /// Handler errors are logged and do not stop delivery to the remaining
    /// handlers, nor do they fail the publish.
    pub async fn publish(&self, event: Event) {
        let snapshot: Vec<(String, EventHandler)> = {
            let mut inner = self.lock();
            inner.history.push_back(event.clone());
            while inner.history.len() > EVENT_HISTORY_CAPACITY {
                inner.history.pop_front();
            }
            inner
                .subscribers
                .get(&event.event_type)
                .map(|subs| {
                    subs.iter()
                        .map(|s| (s.name.clone(), Arc::clone(&s.callback)))
                        .collect()
                })
                .unwrap_or_default()
        };

        for (name, callback) in snapshot {
            if let Err(err) = callback(event.clone()).await {
                tracing::warn!(
                    handler = %name,
                    event_type = event.event_type.as_str(),
                    error = %err,
                    "event handler failed; continuing delivery"
                );
            }
        }
    }

    /// Snapshot of retained events, optionally filtered by type,
    /// most-recent-last, at most `limit` entries.
    pub fn get_history(&self, event_type: Option<EventType>, limit: usize) -> Vec<Event> {
        let inner = self.lock();
        let filtered: Vec<Event> = inner
            .history
            .iter()
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .cloned()
            .collect();
        let skip = filtered.len().saturating_sub(limit);
        filtered.into_iter().skip(skip).collect()
    }

    /// Drop retained events, keeping subscriptions.
    pub fn clear_history(&self) {
        self.lock().history.clear();
    }

    /// Drop all subscriptions and history. Intended for between-test resets.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.subscribers.clear();
        inner.history.clear();
    }

    pub fn subscriber_count(&self, event_type: EventType) -> usize {
        self.lock()
            .subscribers
            .get(&event_type)
            .map_or(0, |s| s.len())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
