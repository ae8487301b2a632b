// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Typed publish/subscribe bus.
//!
//! Handlers are keyed by channel name and invoked synchronously, in
//! registration order, on the publishing thread. The handler list is
//! snapshotted before dispatch, so a handler may subscribe or unsubscribe
//! without deadlocking; such changes take effect from the next publish.
//!
//! A [`Subscription`] is the only way to remove a handler. Dropping it
//! leaves the handler registered.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    channels: HashMap<String, Vec<(u64, Handler<T>)>>,
}

impl<T> Registry<T> {
    fn remove(&mut self, channel: &str, id: u64) -> bool {
        let Some(handlers) = self.channels.get_mut(channel) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(hid, _)| *hid != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            self.channels.remove(channel);
        }
        removed
    }
}

/// A publish/subscribe bus carrying values of type `T`.
pub struct Bus<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

/// The inbound event bus: channel is the envelope `type`, value its payload.
pub type EventBus = Bus<serde_json::Value>;

fn lock<T>(registry: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    // A panicking handler runs outside the lock, so poisoning only means a
    // panic inside our own bookkeeping; the map is still consistent.
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

impl<T: 'static> Bus<T> {
    pub fn new() -> Self {
        Bus {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                channels: HashMap::new(),
            })),
        }
    }

    /// Registers `handler` on `channel`.
    pub fn subscribe<F>(&self, channel: &str, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut reg = lock(&self.registry);
            let id = reg.next_id;
            reg.next_id += 1;
            reg.channels
                .entry(channel.to_string())
                .or_default()
                .push((id, Arc::new(handler)));
            id
        };

        let registry: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        let channel = channel.to_string();
        Subscription {
            remove: Box::new(move || match registry.upgrade() {
                Some(registry) => lock(&registry).remove(&channel, id),
                None => false,
            }),
        }
    }

    /// Delivers `value` to every handler on `channel`. Returns how many ran.
    pub fn publish(&self, channel: &str, value: &T) -> usize {
        let handlers: Vec<Handler<T>> = {
            let reg = lock(&self.registry);
            match reg.channels.get(channel) {
                Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return 0,
            }
        };
        for handler in &handlers {
            handler(value);
        }
        handlers.len()
    }

    /// Number of handlers registered on `channel`.
    pub fn handler_count(&self, channel: &str) -> usize {
        lock(&self.registry)
            .channels
            .get(channel)
            .map_or(0, Vec::len)
    }
}

impl<T: 'static> Default for Bus<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Capability to remove exactly one registered handler.
#[must_use = "a dropped Subscription can no longer be unsubscribed"]
pub struct Subscription {
    remove: Box<dyn FnOnce() -> bool + Send + Sync>,
}

impl Subscription {
    /// Removes the handler. Returns false if the bus is gone or the handler
    /// was already removed.
    pub fn unsubscribe(self) -> bool {
        (self.remove)()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
