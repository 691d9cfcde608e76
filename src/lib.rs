//! keyping — global keyboard shortcuts that flash a short message.
//!
//! The core is split along the thread boundary:
//!
//! - [`shortcut`]: normalized specs and the shared [`HotkeyRegistry`].
//! - [`hook`]: the keyboard hook thread (X11 backend) that matches held
//!   chords against the registry.
//! - [`channel`]: the bounded drop-oldest handoff to the UI side.
//! - [`notification`] / [`presentation`]: the tick-driven notification and
//!   the loop that delivers fired events to a [`presentation::Presenter`].
//! - [`control`] / [`config`]: stdin commands and CLI options for the binary.

pub mod channel;
pub mod config;
pub mod control;
pub mod hook;
pub mod notification;
pub mod presentation;
pub mod shortcut;

pub use shortcut::{HotkeyRegistry, ShortcutError, ShortcutId, ShortcutSpec};
