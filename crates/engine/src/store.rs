//! In-memory progress state store.
//!
//! Holds the one global progress record plus per-photo records for transfers
//! currently in flight, and pushes every mutation to the single attached
//! notification channel. All operations are infallible in-memory mutation;
//! with no channel attached, notifications are silently dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use panovault_protocol::messages::Notification;
use panovault_protocol::types::{GlobalProgress, ItemProgress};

use crate::progress::{ProgressSink, ProgressUpdate};

/// How long a completed (or errored) item record stays visible before the
/// store deletes it. The live UI has rendered the terminal state by then.
pub const ITEM_EXPIRY: Duration = Duration::from_secs(5);

/// Point-in-time copy of all progress state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    pub global: GlobalProgress,
    pub items: HashMap<String, ItemProgress>,
}

struct ItemEntry {
    record: ItemProgress,
    /// Guards scheduled deletions: a record recreated after expiry gets a
    /// fresh generation, so a stale timer never deletes it.
    generation: u64,
}

struct StoreInner {
    global: GlobalProgress,
    items: HashMap<String, ItemEntry>,
    channel: Option<mpsc::UnboundedSender<Notification>>,
    next_generation: u64,
}

/// The progress state store.
///
/// Shared as `Arc<ProgressStore>` between the server handler (attach/detach,
/// reset) and the orchestrators (updates through [`ProgressSink`]).
pub struct ProgressStore {
    inner: Arc<Mutex<StoreInner>>,
    expiry: Duration,
}

impl Default for ProgressStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::with_expiry(ITEM_EXPIRY)
    }

    /// Creates a store with a custom item-record expiry.
    pub fn with_expiry(expiry: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                global: GlobalProgress::default(),
                items: HashMap::new(),
                channel: None,
                next_generation: 0,
            })),
            expiry,
        }
    }

    /// Returns a snapshot of the global record and all live item records.
    pub fn get(&self) -> ProgressSnapshot {
        let inner = self.inner.lock().unwrap();
        ProgressSnapshot {
            global: inner.global.clone(),
            items: inner
                .items
                .iter()
                .map(|(id, entry)| (id.clone(), entry.record.clone()))
                .collect(),
        }
    }

    /// Merges a patch and pushes the resulting notification.
    ///
    /// Item patches push only the affected record; global patches push the
    /// entire global record. An item patch that lands the record in a
    /// terminal state schedules its deletion after the expiry delay.
    pub fn update(&self, update: ProgressUpdate) {
        match update {
            ProgressUpdate::Global(patch) => {
                let mut inner = self.inner.lock().unwrap();
                patch.apply(&mut inner.global);
                let record = inner.global.clone();
                push(&inner, Notification::Global { record });
            }
            ProgressUpdate::Item { photo_id, patch } => {
                let terminal = patch.is_terminal();
                let generation;
                {
                    let mut inner = self.inner.lock().unwrap();
                    inner.next_generation += 1;
                    let fresh_generation = inner.next_generation;
                    let entry = inner.items.entry(photo_id.clone()).or_insert(ItemEntry {
                        record: ItemProgress::default(),
                        generation: fresh_generation,
                    });
                    patch.apply(&mut entry.record);
                    generation = entry.generation;
                    let record = entry.record.clone();
                    push(
                        &inner,
                        Notification::Item {
                            photo_id: photo_id.clone(),
                            record,
                        },
                    );
                }
                if terminal {
                    self.schedule_expiry(photo_id, generation);
                }
            }
        }
    }

    /// Binds the live notification channel.
    ///
    /// If a batch is mid-flight or any item records exist, immediately pushes
    /// a full snapshot so a (re)connecting client is not stale.
    pub fn attach(&self, channel: mpsc::UnboundedSender<Notification>) {
        let mut inner = self.inner.lock().unwrap();
        inner.channel = Some(channel);
        if inner.global.in_progress || !inner.items.is_empty() {
            let snapshot = Notification::Snapshot {
                global: inner.global.clone(),
                items: inner
                    .items
                    .iter()
                    .map(|(id, entry)| (id.clone(), entry.record.clone()))
                    .collect(),
            };
            push(&inner, snapshot);
        }
    }

    /// Clears the live channel reference.
    pub fn detach(&self) {
        self.inner.lock().unwrap().channel = None;
    }

    /// Reinitializes the global record and clears all item records.
    ///
    /// Called before a new batch so terminal state from the previous run does
    /// not leak into the new run's first notification.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.global = GlobalProgress::default();
        inner.items.clear();
    }

    fn schedule_expiry(&self, photo_id: String, generation: u64) {
        // Outside a runtime (plain unit tests), records simply never expire.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        let expiry = self.expiry;
        handle.spawn(async move {
            tokio::time::sleep(expiry).await;
            let mut inner = inner.lock().unwrap();
            if inner
                .items
                .get(&photo_id)
                .is_some_and(|entry| entry.generation == generation)
            {
                inner.items.remove(&photo_id);
            }
        });
    }
}

impl ProgressSink for ProgressStore {
    fn report(&self, update: ProgressUpdate) {
        self.update(update);
    }
}

fn push(inner: &StoreInner, notification: Notification) {
    if let Some(tx) = &inner.channel {
        // A closed receiver is equivalent to no channel: drop silently.
        let _ = tx.send(notification);
    }
}
