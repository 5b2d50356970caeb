//! Published, read-only lookup table of watched entries.

use crate::core::{WatchedEntry, WatchedEntrySet};
use crate::error::{Result, SyncError};
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// A watched entry together with the gate that serializes its change handling.
///
/// Holding the gate across write + reload guarantees that a second
/// notification for the same entry waits for the first to finish.
#[derive(Debug)]
pub struct EntrySlot {
    entry: WatchedEntry,
    gate: Mutex<()>,
}

impl EntrySlot {
    fn new(entry: WatchedEntry) -> Self {
        Self {
            entry,
            gate: Mutex::new(()),
        }
    }

    /// The entry this slot guards.
    pub fn entry(&self) -> &WatchedEntry {
        &self.entry
    }

    /// Wait for exclusive use of this entry.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().await
    }
}

#[derive(Debug)]
struct EntryTable {
    slots: Vec<Arc<EntrySlot>>,
}

/// Registry of watched entries, shared with every change handler.
///
/// The registry starts empty and is published exactly once, after the initial
/// sync succeeded. Reads are lock-free via `arc-swap`; since the table is never
/// replaced after publishing, every handler sees the same set.
///
/// # Examples
///
/// ```rust
/// use proxy_config_sync::core::{EntryRegistry, WatchedEntrySet};
///
/// let registry = EntryRegistry::new();
/// assert!(registry.resolve("app").is_none());
///
/// registry
///     .publish(WatchedEntrySet::parse("app*DEFAULT*/tmp/app.conf").unwrap())
///     .unwrap();
/// assert_eq!(registry.resolve("app").unwrap().group, "DEFAULT");
/// ```
#[derive(Clone, Default)]
pub struct EntryRegistry {
    table: Arc<ArcSwapOption<EntryTable>>,
}

impl EntryRegistry {
    /// Create an unpublished registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the entry set for concurrent lookup.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::AlreadyPublished` if a set was published before;
    /// the original set stays in place.
    pub fn publish(&self, set: WatchedEntrySet) -> Result<()> {
        let table = EntryTable {
            slots: set
                .iter()
                .cloned()
                .map(|entry| Arc::new(EntrySlot::new(entry)))
                .collect(),
        };

        let previous = self
            .table
            .compare_and_swap(&None::<Arc<EntryTable>>, Some(Arc::new(table)));
        if previous.is_some() {
            return Err(SyncError::AlreadyPublished);
        }
        Ok(())
    }

    /// Whether a set has been published.
    pub fn is_published(&self) -> bool {
        self.table.load().is_some()
    }

    /// Find the first entry with the given remote identifier.
    pub fn resolve(&self, remote_id: &str) -> Option<WatchedEntry> {
        let table = self.table.load_full()?;
        table
            .slots
            .iter()
            .find(|slot| slot.entry.remote_id == remote_id)
            .map(|slot| slot.entry.clone())
    }

    /// Find the slot for an exact `(remote_id, group)` identity.
    pub fn slot(&self, remote_id: &str, group: &str) -> Option<Arc<EntrySlot>> {
        let table = self.table.load_full()?;
        table
            .slots
            .iter()
            .find(|slot| slot.entry.matches(remote_id, group))
            .cloned()
    }

    /// Snapshot of all published entries, in input order.
    pub fn entries(&self) -> Vec<WatchedEntry> {
        self.table
            .load_full()
            .map(|table| table.slots.iter().map(|s| s.entry.clone()).collect())
            .unwrap_or_default()
    }
}
