//! Lifecycle event bus.
//!
//! A single-subject publish/subscribe registry scoped to one plugin
//! instance. `emit` fans out synchronously in subscription order and never
//! awaits handlers; anything needing asynchronous work schedules it and
//! returns. The bus also owns the plugin's lifecycle state, which only moves
//! forward.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tether_api::{BoxError, ChangeDescriptor, ServerConfig};

/// Fixed event vocabulary plus user-declared custom hook names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The compiler finished a build.
    Compiled,
    /// A new build started.
    Recompiling,
    /// Server configuration was produced.
    Setup,
    /// The server began initializing.
    Started,
    /// Server initialization completed; the update pipeline is active.
    Ready,
    /// A file change arrived.
    Update,
    /// A file was created.
    Add,
    /// A file was modified.
    Change,
    /// A file was removed.
    Unlink,
    /// A post-start build completed and a full reload was requested.
    Reload,
    /// User-declared hook name outside the fixed vocabulary.
    Custom(String),
}

impl EventKind {
    /// Map a declared hook-table name onto the vocabulary.
    pub fn from_name(name: &str) -> Self {
        match name {
            "compiled" => EventKind::Compiled,
            "recompiling" => EventKind::Recompiling,
            "setup" => EventKind::Setup,
            "start" | "started" => EventKind::Started,
            "ready" => EventKind::Ready,
            "update" => EventKind::Update,
            "add" => EventKind::Add,
            "change" => EventKind::Change,
            "unlink" => EventKind::Unlink,
            "reload" => EventKind::Reload,
            other => EventKind::Custom(other.to_string()),
        }
    }

    /// Canonical event name.
    pub fn name(&self) -> &str {
        match self {
            EventKind::Compiled => "compiled",
            EventKind::Recompiling => "recompiling",
            EventKind::Setup => "setup",
            EventKind::Started => "start",
            EventKind::Ready => "ready",
            EventKind::Update => "update",
            EventKind::Add => "add",
            EventKind::Change => "change",
            EventKind::Unlink => "unlink",
            EventKind::Reload => "reload",
            EventKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload passed to event handlers.
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// No payload.
    Empty,
    /// The change that triggered the event.
    Change(ChangeDescriptor),
    /// The configuration produced during setup.
    Config(Arc<ServerConfig>),
    /// A free-form status message.
    Message(String),
}

/// Outcome of a single handler invocation.
pub type HookResult = std::result::Result<(), BoxError>;

/// A subscribed event handler.
pub type Hook = Box<dyn FnMut(&EventPayload) -> HookResult + Send + Sync>;

/// Plugin lifecycle phases, in order. Transitions are monotonic and
/// forward-only; no phase is revisited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    /// Nothing has happened yet.
    #[default]
    Uninitialized,
    /// The first build finished and server configuration was produced.
    Configured,
    /// The server began initializing.
    Started,
    /// The server is serving and the update pipeline is active.
    Ready,
}

struct Subscription {
    once: bool,
    hook: Hook,
}

#[derive(Default)]
struct BusInner {
    handlers: HashMap<EventKind, Vec<Subscription>>,
    state: LifecycleState,
}

/// Single-subject publish/subscribe registry with one-shot and repeatable
/// subscriptions.
#[derive(Default)]
pub struct EventBus {
    inner: Mutex<BusInner>,
}

impl EventBus {
    /// Create an empty bus in the `Uninitialized` state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Repeatable subscription: `hook` fires on every publish of `kind`, in
    /// subscription order.
    pub fn on(&self, kind: EventKind, hook: Hook) {
        self.subscribe(kind, hook, false);
    }

    /// One-shot subscription: removed after its first firing.
    pub fn once(&self, kind: EventKind, hook: Hook) {
        self.subscribe(kind, hook, true);
    }

    fn subscribe(&self, kind: EventKind, hook: Hook, once: bool) {
        self.inner
            .lock()
            .handlers
            .entry(kind)
            .or_default()
            .push(Subscription { once, hook });
    }

    /// Synchronous fan-out to all current subscribers of `kind`, in
    /// subscription order.
    ///
    /// The subscriber list is snapshotted on entry: handlers subscribed
    /// during the fan-out fire on the next publish, and a handler may emit
    /// further events without deadlocking. A failing handler is reported and
    /// does not prevent later subscribers from firing.
    pub fn emit(&self, kind: &EventKind, payload: &EventPayload) {
        tracing::trace!(event = %kind, "emit");

        let mut batch = match self.inner.lock().handlers.get_mut(kind) {
            Some(slot) => std::mem::take(slot),
            None => return,
        };

        let mut retained = Vec::with_capacity(batch.len());
        for mut subscription in batch.drain(..) {
            if let Err(error) = (subscription.hook)(payload) {
                tracing::warn!(event = %kind, %error, "event handler failed");
            }
            if !subscription.once {
                retained.push(subscription);
            }
        }

        // Handlers subscribed while the lock was released landed in a fresh
        // slot; they must come after the surviving originals.
        let mut inner = self.inner.lock();
        let slot = inner.handlers.entry(kind.clone()).or_default();
        let added = std::mem::take(slot);
        *slot = retained;
        slot.extend(added);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.inner.lock().state
    }

    /// Advance the lifecycle state. Returns whether the state moved;
    /// attempted regressions are rejected.
    pub fn advance(&self, to: LifecycleState) -> bool {
        let mut inner = self.inner.lock();
        if to <= inner.state {
            tracing::warn!(from = ?inner.state, ?to, "rejected lifecycle transition");
            return false;
        }
        tracing::debug!(from = ?inner.state, ?to, "lifecycle transition");
        inner.state = to;
        true
    }

    /// Number of live subscriptions for an event.
    pub fn listener_count(&self, kind: &EventKind) -> usize {
        self.inner
            .lock()
            .handlers
            .get(kind)
            .map(|slot| slot.len())
            .unwrap_or(0)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        let events: Vec<String> = inner
            .handlers
            .iter()
            .map(|(kind, slot)| format!("{} ({})", kind, slot.len()))
            .collect();
        f.debug_struct("EventBus")
            .field("state", &inner.state)
            .field("events", &events)
            .finish()
    }
}
