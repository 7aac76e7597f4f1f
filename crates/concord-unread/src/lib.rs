// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-thread and total unread counts for the signed-in user.
//!
//! Every read-receipt event triggers a full recompute from the store rather
//! than an incremental patch. Recomputes may overlap; each is tagged with a
//! sequence number and a result older than the last applied one is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use concord_bus::{BusEvent, EventBus, EventKind, SubscriptionHandle};
use concord_core::types::{UnreadCountSnapshot, UserId};
use concord_core::{ConcordError, MessageStore};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Keeps the latest unread snapshot and republishes it when it changes.
pub struct UnreadAggregator {
    store: Arc<dyn MessageStore>,
    user: UserId,
    bus: EventBus,
    next_seq: AtomicU64,
    applied: Mutex<Applied>,
    published: watch::Sender<UnreadCountSnapshot>,
}

#[derive(Default)]
struct Applied {
    seq: u64,
    snapshot: UnreadCountSnapshot,
}

impl UnreadAggregator {
    pub fn new(store: Arc<dyn MessageStore>, user: UserId, bus: EventBus) -> Self {
        let (published, _) = watch::channel(UnreadCountSnapshot::default());
        Self {
            store,
            user,
            bus,
            next_seq: AtomicU64::new(0),
            applied: Mutex::new(Applied::default()),
            published,
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// The most recently applied snapshot.
    pub fn snapshot(&self) -> UnreadCountSnapshot {
        self.lock().snapshot.clone()
    }

    /// Observes applied snapshots. Only changes are sent.
    pub fn subscribe(&self) -> watch::Receiver<UnreadCountSnapshot> {
        self.published.subscribe()
    }

    /// Recounts unread receipts from the store.
    ///
    /// A store failure keeps the previous snapshot. If a newer recompute has
    /// already been applied, this result is discarded and the newer one returned.
    pub async fn recompute(&self) -> UnreadCountSnapshot {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;

        match self.store.list_unread_receipts(&self.user).await {
            Ok(receipts) => self.apply(seq, UnreadCountSnapshot::from_receipts(&receipts)),
            Err(e) => {
                warn!(user = %self.user, seq, error = %e, "unread recompute failed, keeping previous counts");
                self.snapshot()
            }
        }
    }

    /// Runs the session-start recompute and recomputes on every receipt event after it.
    ///
    /// Must be called from within a tokio runtime. Unregistering the returned
    /// handle stops the automatic recomputes.
    pub async fn start(self: &Arc<Self>) -> Result<SubscriptionHandle, ConcordError> {
        let runtime = Handle::try_current()
            .map_err(|e| ConcordError::Internal(format!("unread aggregator needs a tokio runtime: {e}")))?;

        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = self.bus.register(EventKind::ReadReceiptUpdated, move |_event| {
            let Some(aggregator) = weak.upgrade() else {
                return;
            };
            runtime.spawn(async move {
                aggregator.recompute().await;
            });
        });

        self.recompute().await;
        Ok(handle)
    }

    fn apply(&self, seq: u64, fresh: UnreadCountSnapshot) -> UnreadCountSnapshot {
        let changed = {
            let mut applied = self.lock();
            if seq <= applied.seq {
                debug!(seq, applied = applied.seq, "discarding stale unread recompute");
                return applied.snapshot.clone();
            }
            applied.seq = seq;
            let changed = applied.snapshot != fresh;
            applied.snapshot = fresh.clone();
            // Watchers must never observe an older seq than `snapshot()`.
            if changed {
                self.published.send_replace(fresh.clone());
            }
            changed
        };

        if changed {
            debug!(user = %self.user, total = fresh.total(), "unread counts changed");
            self.bus.dispatch(BusEvent::UnreadCountsChanged(fresh.clone()));
        }
        fresh
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Applied> {
        self.applied.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
