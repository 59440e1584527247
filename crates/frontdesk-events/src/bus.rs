use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::types::{Event, EventKind};

/// A handler reacts to one event kind. Handlers enqueue work (outbox
/// rows, waitlist notices) — they never perform network I/O, keeping the
/// emitter path fast.
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;
    fn handle(&self, event: &Event) -> frontdesk_core::Result<()>;
}

/// Synchronous dispatch table from event kind to handlers.
///
/// Share a single instance process-wide as `Arc<EventBus>`. Handler
/// errors are logged, never propagated — emitting an event must not fail
/// the operation that caused it.
pub struct EventBus {
    handlers: RwLock<Vec<(EventKind, Arc<dyn EventHandler>)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .expect("event registry poisoned")
            .push((kind, handler));
    }

    pub fn emit(&self, event: &Event) {
        let handlers = self.handlers.read().expect("event registry poisoned");
        let kind = event.kind();
        for (_, handler) in handlers.iter().filter(|(k, _)| *k == kind) {
            match handler.handle(event) {
                Ok(()) => debug!(handler = handler.name(), event = ?kind, "event handled"),
                Err(e) => warn!(
                    handler = handler.name(),
                    event = ?kind,
                    error = %e,
                    "event handler failed"
                ),
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
