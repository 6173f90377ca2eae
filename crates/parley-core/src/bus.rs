//! Synchronous in-process publish/subscribe.
//!
//! Listeners register per event kind and run in registration order on the
//! publishing call stack. There is no queue: `publish` returns after every
//! listener for that kind has run.
//!
//! # Failure isolation
//!
//! A listener returning `Err` does not stop dispatch. The failure is logged
//! and collected in the [`PublishReport`], and the remaining listeners still
//! see the event.

use std::{collections::HashMap, fmt, hash::Hash};

use crate::error::ListenerError;

/// Something that can be published on an [`EventBus`].
pub trait Event {
    /// Key listeners subscribe under.
    type Kind: Copy + Eq + Hash + fmt::Debug;

    /// Key this event is dispatched under.
    fn kind(&self) -> Self::Kind;
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Boxed listener callback.
pub type Listener<E> = Box<dyn FnMut(&E) -> Result<(), ListenerError>>;

/// Outcome of a single [`EventBus::publish`] call.
#[derive(Debug, Default)]
pub struct PublishReport {
    /// Listeners that ran, successful or not.
    pub delivered: usize,
    /// Listeners that returned an error, in dispatch order.
    pub failures: Vec<(ListenerId, ListenerError)>,
}

impl PublishReport {
    /// Returns true if every listener succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Synchronous publish/subscribe register keyed by event kind.
pub struct EventBus<E: Event> {
    listeners: HashMap<E::Kind, Vec<(ListenerId, Listener<E>)>>,
    next_id: u64,
}

impl<E: Event> EventBus<E> {
    /// Create a bus with no listeners.
    pub fn new() -> Self {
        Self { listeners: HashMap::new(), next_id: 0 }
    }

    /// Register `listener` for events of `kind`.
    ///
    /// Registering the same closure twice yields two independent listeners.
    pub fn subscribe<F>(&mut self, kind: E::Kind, listener: F) -> ListenerId
    where
        F: FnMut(&E) -> Result<(), ListenerError> + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.entry(kind).or_default().push((id, Box::new(listener)));
        id
    }

    /// Remove a listener.
    ///
    /// Returns `false` (and does nothing) if `id` is not registered for
    /// `kind`, so repeated removal is harmless.
    pub fn unsubscribe(&mut self, kind: E::Kind, id: ListenerId) -> bool {
        let Some(slot) = self.listeners.get_mut(&kind) else {
            return false;
        };

        let before = slot.len();
        slot.retain(|(existing, _)| *existing != id);
        let removed = slot.len() != before;

        if slot.is_empty() {
            self.listeners.remove(&kind);
        }
        removed
    }

    /// Deliver `event` to every listener registered for its kind.
    pub fn publish(&mut self, event: &E) -> PublishReport {
        let kind = event.kind();
        let mut report = PublishReport::default();

        let Some(slot) = self.listeners.get_mut(&kind) else {
            tracing::trace!(?kind, "no listeners for event");
            return report;
        };

        for (id, listener) in slot.iter_mut() {
            report.delivered += 1;
            if let Err(err) = listener(event) {
                tracing::warn!(?kind, listener = id.0, error = %err, "event listener failed");
                report.failures.push((*id, err));
            }
        }

        report
    }

    /// Number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }
}

impl<E: Event> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self.listeners.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventBus")
            .field("listeners", &counts)
            .field("next_id", &self.next_id)
            .finish()
    }
}
