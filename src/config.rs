//! Command-line configuration.

use std::time::Duration;

use clap::Parser;

use crate::channel::MIN_CAPACITY;
use crate::hook::HookConfig;
use crate::notification::NotificationConfig;
use crate::shortcut::{Chord, Key, Modifiers, ShortcutSpec};

/// Shortcuts registered unless `--no-defaults` is given.
pub const DEFAULT_BINDINGS: [(Chord, &str); 2] = [
    (Chord::new(Modifiers::CTRL, Key::Char('C')), "Copied!"),
    (Chord::new(Modifiers::CTRL, Key::Char('V')), "Pasted!"),
];

/// Show a short notification whenever a global keyboard shortcut is pressed.
///
/// Reads `add`, `remove`, `list` and `quit` commands on stdin.
#[derive(Debug, Parser)]
#[command(name = "keyping", version)]
pub struct Cli {
    /// Register a shortcut, e.g. `--bind "Ctrl+Shift+S=Saved!"`. Repeatable.
    #[arg(long = "bind", value_name = "SPEC=MESSAGE", value_parser = parse_binding)]
    pub bindings: Vec<Binding>,

    /// Skip the built-in Ctrl+C / Ctrl+V shortcuts.
    ///
    /// Ctrl+C pressed in keyping's own terminal still interrupts it; focus
    /// another window to trigger the shortcut, or stop with `quit`.
    #[arg(long)]
    pub no_defaults: bool,

    /// Presentation tick period in milliseconds.
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u64).range(1..))]
    pub tick_ms: u64,

    /// Total notification lifetime in milliseconds, hold plus fade.
    #[arg(long, default_value_t = 1500)]
    pub lifetime_ms: u64,

    /// Opacity lost per tick while fading.
    #[arg(long, default_value_t = 0.05, value_parser = parse_fade_step)]
    pub fade_step: f32,

    /// Keyboard state poll interval in milliseconds.
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..=1000))]
    pub poll_ms: u64,

    /// Pending fired events kept while the UI is busy (oldest dropped first).
    #[arg(long, default_value_t = 8, value_parser = parse_capacity)]
    pub queue_capacity: usize,

    /// Log filter when RUST_LOG is unset (e.g. `debug`, `keyping=trace`).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// A `SPEC=MESSAGE` pair from the command line, normalized at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub spec: ShortcutSpec,
    pub message: String,
}

fn parse_binding(raw: &str) -> Result<Binding, String> {
    // The key may itself be '=' ("Ctrl+==Zoom"), so split at the first '='
    // with a non-empty spec before it and a message not starting with '='.
    let (spec, message) = raw
        .char_indices()
        .filter(|&(i, c)| c == '=' && i > 0)
        .map(|(i, _)| (&raw[..i], &raw[i + 1..]))
        .find(|(_, message)| !message.is_empty() && !message.starts_with('='))
        .ok_or_else(|| format!("expected SPEC=MESSAGE, got {raw:?}"))?;

    Ok(Binding {
        spec: spec.parse().map_err(|e| format!("{e}"))?,
        message: message.to_string(),
    })
}

fn parse_fade_step(raw: &str) -> Result<f32, String> {
    let step: f32 = raw.parse().map_err(|e| format!("{e}"))?;
    if step > 0.0 && step <= 1.0 {
        Ok(step)
    } else {
        Err("fade step must be in (0, 1]".to_string())
    }
}

fn parse_capacity(raw: &str) -> Result<usize, String> {
    let capacity: usize = raw.parse().map_err(|e| format!("{e}"))?;
    if capacity >= MIN_CAPACITY {
        Ok(capacity)
    } else {
        Err(format!("queue capacity must be at least {MIN_CAPACITY}"))
    }
}

impl Cli {
    pub fn notification(&self) -> NotificationConfig {
        NotificationConfig {
            tick: Duration::from_millis(self.tick_ms),
            lifetime: Duration::from_millis(self.lifetime_ms),
            fade_step: self.fade_step,
        }
    }

    pub fn hook(&self) -> HookConfig {
        HookConfig {
            poll_interval: Duration::from_millis(self.poll_ms),
            ..HookConfig::default()
        }
    }

    /// Defaults (unless disabled) followed by `--bind` entries, in
    /// registration order.
    pub fn all_bindings(&self) -> Vec<Binding> {
        let defaults = DEFAULT_BINDINGS
            .iter()
            .filter(|_| !self.no_defaults)
            .map(|&(chord, message)| Binding {
                spec: ShortcutSpec::from_chord(chord),
                message: message.to_string(),
            });
        defaults.chain(self.bindings.iter().cloned()).collect()
    }
}
