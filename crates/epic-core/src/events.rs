//! Lifecycle Event Bus
//!
//! A small synchronous publish/subscribe bus. Every event name is namespaced
//! under [`EVENT_NAMESPACE`] before registration and dispatch, so listeners
//! for `"initialize"` are stored as `"Epic.initialize"`.
//!
//! The bus is an ordinary value: construct it once, wrap it in an `Arc` and
//! hand it to whoever needs to emit or listen.
//!
//! ```rust
//! use epic_core::events::{EpicEvent, EventBus, EventKind};
//!
//! let bus = EventBus::new();
//! bus.on(EventKind::Initialize, |_| println!("starting"))
//!     .on(EventKind::Ready, |_| println!("ready"));
//! bus.emit(EpicEvent::Initialize);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Prefix applied to every event name.
pub const EVENT_NAMESPACE: &str = "Epic.";

/// Protocol a listener was bound for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of the `listening` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenInfo {
    pub scheme: Scheme,
    /// Human readable bind target, e.g. `port 8080` or `pipe /run/epic.sock`.
    pub bind: String,
}

/// Events published by the framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpicEvent {
    Initialize,
    Initialized,
    Ready,
    Listening(ListenInfo),
}

impl EpicEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            EpicEvent::Initialize => EventKind::Initialize,
            EpicEvent::Initialized => EventKind::Initialized,
            EpicEvent::Ready => EventKind::Ready,
            EpicEvent::Listening(_) => EventKind::Listening,
        }
    }
}

/// Event names, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Initialize,
    Initialized,
    Ready,
    Listening,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Initialize => "initialize",
            EventKind::Initialized => "initialized",
            EventKind::Ready => "ready",
            EventKind::Listening => "listening",
        }
    }

    /// Name as stored in the bus, including the namespace.
    pub fn qualified_name(&self) -> String {
        format!("{}{}", EVENT_NAMESPACE, self.name())
    }
}

type Listener = Arc<dyn Fn(&EpicEvent) + Send + Sync>;

/// Named-event bus with one ordered listener list per event name.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Returns `self` for chaining.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> &Self
    where
        F: Fn(&EpicEvent) + Send + Sync + 'static,
    {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        listeners
            .entry(kind.qualified_name())
            .or_default()
            .push(Arc::new(listener));
        self
    }

    /// Deliver `event` to every listener registered for its name, in
    /// registration order. A panicking listener unwinds into the caller.
    pub fn emit(&self, event: EpicEvent) -> &Self {
        let name = event.kind().qualified_name();

        // Snapshot so listeners can register more listeners.
        let snapshot: Vec<Listener> = {
            let listeners = self
                .listeners
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match listeners.get(&name) {
                Some(list) => list.clone(),
                None => return self,
            }
        };

        debug!("Emitting {} to {} listener(s)", name, snapshot.len());
        for listener in snapshot {
            listener(&event);
        }
        self
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind.qualified_name())
            .map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = listeners.iter().map(|(k, v)| (k.clone(), v.len())).collect();
        names.sort();
        f.debug_struct("EventBus").field("listeners", &names).finish()
    }
}
