//! Per-call execution context.
//!
//! A [`Context`] bundles the store the hold ledger reads and writes, the
//! event sink, and the bypass switch for the locked-funds hook. Contexts are
//! cheap to clone and never mutated in place: the `with_*` methods return a
//! new value, so a bypass set for one call path cannot leak into another.

use std::sync::Arc;

use crate::events::{EventManager, HoldEvent};
use crate::store::KvStore;

#[derive(Clone)]
pub struct Context {
    store: Arc<dyn KvStore>,
    events: Arc<EventManager>,
    bypass_holds: bool,
}

impl Context {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            events: EventManager::new(),
            bypass_holds: false,
        }
    }

    pub fn store(&self) -> &dyn KvStore {
        self.store.as_ref()
    }

    pub fn event_manager(&self) -> &Arc<EventManager> {
        &self.events
    }

    pub fn emit(&self, event: HoldEvent) {
        self.events.emit(event);
    }

    /// Copy of this context whose locked-funds lookups report nothing on hold.
    pub fn with_bypass(&self) -> Self {
        Self {
            bypass_holds: true,
            ..self.clone()
        }
    }

    pub fn has_bypass(&self) -> bool {
        self.bypass_holds
    }

    pub fn with_event_manager(&self, events: Arc<EventManager>) -> Self {
        Self {
            events,
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("bypass_holds", &self.bypass_holds)
            .finish_non_exhaustive()
    }
}
