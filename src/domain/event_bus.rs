//! Synchronous in-process bus for store events.
//!
//! [`EventBus`] keeps a table of subscribers keyed by exact event name.
//! [`EventBus::publish`] runs every subscriber for the event's name, in
//! registration order, on the caller's own stack: there is no queue, no
//! retry and no persistence. The first subscriber to fail stops delivery for
//! that emission and its error is handed back to the publisher.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use super::StoreEvent;
use crate::error::ControlPlaneError;

/// Callback invoked for every event published under a subscribed name.
///
/// Subscribers must be fast and idempotent; they run inline with the
/// mutation that produced the event.
pub type Subscriber = Arc<dyn Fn(&StoreEvent) -> Result<(), ControlPlaneError> + Send + Sync>;

/// Process-wide publish/subscribe channel for [`StoreEvent`]s.
///
/// Cloning the bus yields another handle onto the same subscriber table.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<HashMap<String, Vec<Subscriber>>>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<&String> = table.keys().collect();
        names.sort();
        f.debug_struct("EventBus").field("events", &names).finish()
    }
}

impl EventBus {
    /// Creates a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `subscriber` for events named exactly `event_name`.
    pub fn subscribe<F>(&self, event_name: impl Into<String>, subscriber: F)
    where
        F: Fn(&StoreEvent) -> Result<(), ControlPlaneError> + Send + Sync + 'static,
    {
        let event_name = event_name.into();
        tracing::debug!(event = %event_name, "subscriber registered");
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_name)
            .or_default()
            .push(Arc::new(subscriber));
    }

    /// Delivers `event` to every subscriber of its name.
    ///
    /// Returns the number of subscribers that handled the event. Publishing
    /// with no subscribers is not an error.
    ///
    /// # Errors
    ///
    /// Returns the error of the first subscriber that fails; subscribers
    /// registered after it do not see the event.
    pub fn publish(&self, event: &StoreEvent) -> Result<usize, ControlPlaneError> {
        let name = event.name();
        // Snapshot so subscribers may themselves subscribe without deadlock.
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
            .cloned()
            .unwrap_or_default();

        tracing::trace!(event = %name, subscribers = subscribers.len(), "emit");
        for (delivered, subscriber) in subscribers.iter().enumerate() {
            if let Err(err) = subscriber(event) {
                tracing::warn!(event = %name, delivered, error = %err, "subscriber failed, delivery aborted");
                return Err(err);
            }
        }
        Ok(subscribers.len())
    }

    /// Returns the number of subscribers registered for `event_name`.
    #[must_use]
    pub fn subscriber_count(&self, event_name: &str) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_name)
            .map_or(0, Vec::len)
    }
}
