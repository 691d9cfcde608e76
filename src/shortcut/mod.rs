//! Shortcut model — normalized specs and the shared registry.

pub mod registry;
pub mod spec;

pub use registry::{HotkeyRegistry, ShortcutEntry, ShortcutId};
pub use spec::{Chord, Key, Modifiers, NamedKey, ShortcutSpec};

use crate::hook::HookError;

/// Errors surfaced to callers of the shortcut core.
#[derive(Debug, thiserror::Error)]
pub enum ShortcutError {
    /// The combination is empty or cannot be parsed. Rejected before the
    /// registry is touched.
    #[error("invalid shortcut {raw:?}: {reason}")]
    InvalidSpec { raw: String, reason: String },

    /// An equal normalized spec is already registered. No state changed.
    #[error("shortcut already added: {spec}")]
    AlreadyExists { spec: ShortcutSpec, id: ShortcutId },

    /// The OS keyboard hook could not be installed. Fatal at startup.
    #[error("keyboard hook could not be installed: {0}")]
    HookInstallFailed(#[from] HookError),
}
