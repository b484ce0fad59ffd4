use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::coin::Coins;

/// Notifications emitted by the keeper, at most one per call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HoldEvent {
    HoldAdded {
        address: Address,
        amount: Coins,
        reason: String,
    },
    HoldReleased {
        address: Address,
        amount: Coins,
    },
}

impl HoldEvent {
    pub fn hold_added(address: &Address, amount: Coins, reason: &str) -> Self {
        HoldEvent::HoldAdded {
            address: address.clone(),
            amount,
            reason: reason.to_string(),
        }
    }

    pub fn hold_released(address: &Address, amount: Coins) -> Self {
        HoldEvent::HoldReleased {
            address: address.clone(),
            amount,
        }
    }
}

/// Collects the events emitted while a context is in use.
///
/// A discarding manager accepts and drops everything; genesis import runs
/// with one so loading state never queues notifications.
#[derive(Debug, Default)]
pub struct EventManager {
    events: Mutex<Vec<HoldEvent>>,
    discard: bool,
}

impl EventManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn discarding() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            discard: true,
        })
    }

    pub fn emit(&self, event: HoldEvent) {
        if self.discard {
            return;
        }
        tracing::debug!(?event, "emitting hold event");
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<HoldEvent> {
        self.events.lock().clone()
    }

    /// Remove and return everything emitted so far.
    pub fn drain(&self) -> Vec<HoldEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}
