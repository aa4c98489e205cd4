//! Event subscriber registry.
//!
//! Two set-valued maps keyed by event name: one global, one per flatten-mode
//! session id. An event carrying a `sessionId` reaches the scoped handlers
//! for that id and the global handlers for its name; an event without one
//! reaches only the global handlers.
//!
//! Handlers run synchronously on the transport task, in arrival order.
//! Each call is isolated with `catch_unwind`, so a panicking handler neither
//! stops delivery to the others nor poisons the registry.

// ============================================================================
// Imports
// ============================================================================

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::identifiers::{HandlerId, SessionId};
use crate::protocol::{Event, ParsedEvent};
use crate::transport::EventSink;

// ============================================================================
// Types
// ============================================================================

/// Event handler callback type.
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handlers for one event name, in registration order.
type HandlerSet = Vec<(HandlerId, EventHandler)>;

/// Event name → handlers.
type HandlerMap = FxHashMap<String, HandlerSet>;

// ============================================================================
// EventRegistry
// ============================================================================

/// Subscriber maps owned by one connection.
#[derive(Default)]
pub struct EventRegistry {
    /// Handler token counter.
    next_id: AtomicU64,
    /// Handlers that see every matching event.
    global: Mutex<HandlerMap>,
    /// Handlers bound to one session id.
    scoped: Mutex<FxHashMap<SessionId, HandlerMap>>,
}

impl EventRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&self) -> HandlerId {
        HandlerId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Registers a global handler.
    pub fn on(&self, event: &str, handler: EventHandler) -> HandlerId {
        let id = self.allocate();
        self.global
            .lock()
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        trace!(event, %id, "Registered global handler");
        id
    }

    /// Removes a global handler. Returns `false` if it was not registered.
    pub fn off(&self, event: &str, id: HandlerId) -> bool {
        remove_from(&mut self.global.lock(), event, id)
    }

    /// Registers a handler scoped to one session id.
    pub fn on_session(&self, session_id: &SessionId, event: &str, handler: EventHandler) -> HandlerId {
        let id = self.allocate();
        self.scoped
            .lock()
            .entry(session_id.clone())
            .or_default()
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        trace!(event, %session_id, %id, "Registered scoped handler");
        id
    }

    /// Removes a scoped handler. Returns `false` if it was not registered.
    pub fn off_session(&self, session_id: &SessionId, event: &str, id: HandlerId) -> bool {
        let mut scoped = self.scoped.lock();
        let Some(map) = scoped.get_mut(session_id) else {
            return false;
        };

        let removed = remove_from(map, event, id);
        if map.is_empty() {
            scoped.remove(session_id);
        }
        removed
    }

    /// Drops every handler bound to a session id.
    pub fn remove_scope(&self, session_id: &SessionId) {
        if self.scoped.lock().remove(session_id).is_some() {
            debug!(%session_id, "Dropped scoped handlers");
        }
    }

    /// Drops all handlers.
    pub fn clear(&self) {
        self.global.lock().clear();
        self.scoped.lock().clear();
    }

    /// Returns the number of registered handlers (global and scoped).
    #[must_use]
    pub fn handler_count(&self) -> usize {
        let global: usize = self.global.lock().values().map(Vec::len).sum();
        let scoped: usize = self
            .scoped
            .lock()
            .values()
            .flat_map(|map| map.values())
            .map(Vec::len)
            .sum();
        global + scoped
    }

    /// Delivers an event to every matching handler.
    ///
    /// Returns the number of handlers invoked. The handler lists are copied
    /// out before any call, so handlers may register or remove handlers.
    pub fn dispatch(&self, event: &Event) -> usize {
        let mut targets: Vec<EventHandler> = Vec::new();

        if let Some(session_id) = &event.session_id
            && let Some(map) = self.scoped.lock().get(session_id)
            && let Some(set) = map.get(&event.method)
        {
            targets.extend(set.iter().map(|(_, h)| Arc::clone(h)));
        }

        if let Some(set) = self.global.lock().get(&event.method) {
            targets.extend(set.iter().map(|(_, h)| Arc::clone(h)));
        }

        for handler in &targets {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!(method = %event.method, "Event handler panicked");
            }
        }

        if event.method == "Target.detachedFromTarget"
            && let ParsedEvent::DetachedFromTarget { session_id } = event.parse()
        {
            self.remove_scope(&session_id);
        }

        targets.len()
    }
}

impl EventSink for EventRegistry {
    fn dispatch(&self, event: Event) {
        EventRegistry::dispatch(self, &event);
    }

    fn closed(&self) {
        self.clear();
    }
}

/// Removes one handler from a map, dropping the name if it empties.
fn remove_from(map: &mut HandlerMap, event: &str, id: HandlerId) -> bool {
    let Some(set) = map.get_mut(event) else {
        return false;
    };

    let before = set.len();
    set.retain(|(existing, _)| *existing != id);
    let removed = set.len() != before;

    if set.is_empty() {
        map.remove(event);
    }
    removed
}

// ============================================================================
// Tests
// ============================================================================
