// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handler registry and dispatch loop.
//!
//! Handler lists are copy-on-write behind an [`ArcSwap`]: register and
//! unregister publish a new list, and each delivery iterates the list that was
//! current when that event started. Removing a handler mid-dispatch therefore
//! leaves the in-flight delivery untouched and applies to the next event.
//!
//! Dispatch is serialized per bus instance. A dispatch that arrives while
//! another one is draining (from a handler, or from another thread) is queued
//! and delivered by the active drain, in arrival order.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use arc_swap::ArcSwap;
use tracing::{error, trace};

use crate::event::{BusEvent, EventKind};

/// A registered consumer callback.
pub type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

#[derive(Clone)]
struct Registration {
    id: u64,
    handler: Handler,
}

type Registry = HashMap<EventKind, Vec<Registration>>;

#[derive(Default)]
struct DispatchQueue {
    pending: VecDeque<BusEvent>,
    draining: bool,
}

struct BusInner {
    registry: ArcSwap<Registry>,
    next_id: AtomicU64,
    queue: Mutex<DispatchQueue>,
}

impl BusInner {
    fn remove(&self, kind: EventKind, id: u64) {
        self.registry.rcu(|current| {
            let mut next = Registry::clone(current);
            if let Some(list) = next.get_mut(&kind) {
                list.retain(|r| r.id != id);
                if list.is_empty() {
                    next.remove(&kind);
                }
            }
            next
        });
    }

    fn queue(&self) -> MutexGuard<'_, DispatchQueue> {
        // Handlers never run under this lock, so poisoning can only come from
        // a panic in queue bookkeeping itself; the queue is still consistent.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Per-event-kind multi-consumer dispatcher.
///
/// Cloning an `EventBus` yields another reference to the same bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.registry.load();
        let counts: HashMap<_, _> = registry.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}

impl EventBus {
    /// Create a bus with no handlers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                registry: ArcSwap::from_pointee(Registry::new()),
                next_id: AtomicU64::new(1),
                queue: Mutex::new(DispatchQueue::default()),
            }),
        }
    }

    /// Register `handler` for events of `kind`.
    ///
    /// The handler runs for every subsequent dispatch of that kind until the
    /// returned handle is unregistered.
    pub fn register<F>(&self, kind: EventKind, handler: F) -> SubscriptionHandle
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let registration = Registration {
            id,
            handler: Arc::new(handler),
        };

        self.inner.registry.rcu(|current| {
            let mut next = Registry::clone(current);
            next.entry(kind).or_default().push(registration.clone());
            next
        });

        trace!(kind = %kind, id, "bus handler registered");

        SubscriptionHandle {
            id,
            kind,
            active: AtomicBool::new(true),
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Unregister a handle. Equivalent to [`SubscriptionHandle::unregister`].
    pub fn unregister(&self, handle: &SubscriptionHandle) -> bool {
        handle.unregister()
    }

    /// Number of handlers currently registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.inner
            .registry
            .load()
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Deliver `event` to every handler registered for its kind.
    ///
    /// A handler that panics is logged and skipped; later handlers still run.
    pub fn dispatch(&self, event: BusEvent) {
        {
            let mut queue = self.inner.queue();
            queue.pending.push_back(event);
            if queue.draining {
                return;
            }
            queue.draining = true;
        }

        loop {
            let next = {
                let mut queue = self.inner.queue();
                match queue.pending.pop_front() {
                    Some(event) => event,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };
            self.deliver(&next);
        }
    }

    fn deliver(&self, event: &BusEvent) {
        let kind = event.kind();
        let registry = self.inner.registry.load_full();
        let Some(handlers) = registry.get(&kind) else {
            trace!(kind = %kind, "no handlers registered");
            return;
        };

        for registration in handlers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (registration.handler)(event)));
            if let Err(payload) = outcome {
                error!(
                    kind = %kind,
                    handler_id = registration.id,
                    panic = panic_message(payload.as_ref()),
                    "bus handler panicked; continuing with remaining handlers"
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Token returned by [`EventBus::register`].
///
/// Unregistering is idempotent: only the first call removes the handler.
/// A handle that outlives its bus unregisters as a no-op.
pub struct SubscriptionHandle {
    id: u64,
    kind: EventKind,
    active: AtomicBool,
    bus: Weak<BusInner>,
}

impl SubscriptionHandle {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Whether this handle has not been unregistered yet.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Remove the handler from its bus. Returns `true` only on the first call.
    pub fn unregister(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        if let Some(inner) = self.bus.upgrade() {
            inner.remove(self.kind, self.id);
            trace!(kind = %self.kind, id = self.id, "bus handler unregistered");
        }
        true
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("active", &self.is_active())
            .finish()
    }
}
