//! HotkeyRegistry — the authoritative shortcut table.
//!
//! Shared as `Arc<HotkeyRegistry>` between the hook thread, which calls
//! [`HotkeyRegistry::lookup`] on every chord change, and the presentation
//! loop, which adds, removes and lists entries. A read-write lock lets
//! lookups run concurrently while each mutation holds the write lock for the
//! whole insert or remove, so readers only ever see an entry fully present
//! or fully absent.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use parking_lot::RwLock;

use super::ShortcutError;
use super::spec::{Chord, ShortcutSpec};

/// Stable identifier of a registered shortcut.
///
/// Assigned from a monotonic counter and never reused within a process, so
/// a [`crate::channel::FiredEvent`] still in flight for a removed entry can
/// never resolve to a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShortcutId(pub u64);

impl fmt::Display for ShortcutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One registered shortcut as seen by the UI table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutEntry {
    pub id: ShortcutId,
    pub spec: ShortcutSpec,
    pub message: String,
}

#[derive(Default)]
struct Inner {
    by_chord: HashMap<Chord, ShortcutId>,
    entries: BTreeMap<ShortcutId, ShortcutEntry>,
    next_id: u64,
}

#[derive(Default)]
pub struct HotkeyRegistry {
    inner: RwLock<Inner>,
}

impl HotkeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `spec` with `message` under the next id.
    ///
    /// Fails with [`ShortcutError::AlreadyExists`] (carrying the existing
    /// id) if an equal spec is present; nothing is mutated in that case.
    pub fn add(
        &self,
        spec: ShortcutSpec,
        message: impl Into<String>,
    ) -> Result<ShortcutId, ShortcutError> {
        let mut inner = self.inner.write();
        let chord = spec.chord();

        if let Some(&id) = inner.by_chord.get(&chord) {
            return Err(ShortcutError::AlreadyExists { spec, id });
        }

        let id = ShortcutId(inner.next_id);
        inner.next_id += 1;
        let message = message.into();
        tracing::info!(%id, shortcut = %spec, text = %message, "shortcut registered");
        inner.by_chord.insert(chord, id);
        inner.entries.insert(id, ShortcutEntry { id, spec, message });
        Ok(id)
    }

    /// Remove the entry for `spec`, returning it if it was present.
    ///
    /// Absent specs are a no-op. The write lock is held until both maps are
    /// updated, so once this returns no lookup can match the old entry.
    pub fn remove(&self, spec: &ShortcutSpec) -> Option<ShortcutEntry> {
        let mut inner = self.inner.write();
        let id = inner.by_chord.remove(&spec.chord())?;
        inner.entries.remove(&id)
    }

    /// Hot-path match of an observed chord. Never allocates.
    pub fn lookup(&self, chord: &Chord) -> Option<ShortcutId> {
        self.inner.read().by_chord.get(chord).copied()
    }

    /// Match a chord and copy out the whole entry under one read lock.
    pub fn resolve(&self, chord: &Chord) -> Option<ShortcutEntry> {
        let inner = self.inner.read();
        let id = inner.by_chord.get(chord)?;
        inner.entries.get(id).cloned()
    }

    /// Message of a live entry, or `None` if it has been removed.
    pub fn message(&self, id: ShortcutId) -> Option<String> {
        self.inner.read().entries.get(&id).map(|e| e.message.clone())
    }

    /// Point-in-time copy of all entries, ordered by id (registration order).
    pub fn snapshot(&self) -> Vec<ShortcutEntry> {
        self.inner.read().entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parse `raw` and add it. The UI-facing form of [`Self::add`].
    pub fn register_shortcut(
        &self,
        raw: &str,
        message: impl Into<String>,
    ) -> Result<ShortcutId, ShortcutError> {
        self.add(ShortcutSpec::parse(raw)?, message)
    }

    /// Parse `raw` and remove it. Removing an unregistered shortcut
    /// succeeds with `None`.
    pub fn unregister_shortcut(
        &self,
        raw: &str,
    ) -> Result<Option<ShortcutEntry>, ShortcutError> {
        let spec = ShortcutSpec::parse(raw)?;
        let removed = self.remove(&spec);
        match &removed {
            Some(entry) => tracing::info!(id = %entry.id, shortcut = %spec, "shortcut removed"),
            None => tracing::debug!(shortcut = %spec, "remove of unregistered shortcut ignored"),
        }
        Ok(removed)
    }

    pub fn list_shortcuts(&self) -> Vec<ShortcutEntry> {
        self.snapshot()
    }
}
