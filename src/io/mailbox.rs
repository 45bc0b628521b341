// Single-slot button event mailbox
//
// The button side deposits one event and signals; the active state waits for
// the signal, then takes (and clears) the slot. A second deposit before the
// first is taken overwrites it.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;
use tracing::debug;

use crate::messages::ButtonEvent;

#[derive(Default)]
pub struct EventMailbox {
    slot: Mutex<Option<ButtonEvent>>,
    ready: Notify,
}

impl EventMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deposit an event and flag it available
    pub fn put(&self, event: ButtonEvent) {
        let replaced = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(event);
        if let Some(old) = replaced {
            debug!("Mailbox: {} overwritten by {}", old.code(), event.code());
        }
        self.ready.notify_one();
    }

    pub fn is_pending(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Wait until an event is pending (does not consume it)
    pub async fn ready(&self) {
        loop {
            if self.is_pending() {
                return;
            }
            self.ready.notified().await;
        }
    }

    /// Read and clear the slot
    pub fn take(&self) -> Option<ButtonEvent> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Producer handle: the mailbox plus the button lock shared with the state machine
#[derive(Clone)]
pub struct ButtonPort {
    mailbox: Arc<EventMailbox>,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl ButtonPort {
    pub fn new() -> Self {
        Self {
            mailbox: Arc::new(EventMailbox::new()),
            lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn mailbox(&self) -> &EventMailbox {
        &self.mailbox
    }

    pub fn lock(&self) -> &tokio::sync::Mutex<()> {
        &self.lock
    }

    /// Deposit an event once no reaction to a previous event is in progress
    pub async fn deliver(&self, event: ButtonEvent) {
        let _guard = self.lock.lock().await;
        debug!("Button event {}", event.code());
        self.mailbox.put(event);
    }
}

impl Default for ButtonPort {
    fn default() -> Self {
        Self::new()
    }
}
