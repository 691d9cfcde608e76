//! Control commands — line-oriented add/remove/list for the shortcut table.
//!
//! The binary reads these from stdin and prints the reply on stdout:
//!
//! ```text
//! add ctrl+shift+s Saved!   ->  added 2 Ctrl+Shift+S
//! remove Ctrl+Shift+S       ->  removed Ctrl+Shift+S
//! list                      ->  <id>\t<spec>\t<message>, newest first
//! quit
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::shortcut::{HotkeyRegistry, ShortcutError, ShortcutSpec};

static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<verb>[A-Za-z]+)(?:\s+(?P<spec>\S+))?(?:\s+(?P<message>.*?))?\s*$")
        .expect("command pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add { spec: String, message: String },
    Remove { spec: String },
    List,
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command `{0}` (expected add, remove, list or quit)")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

impl Command {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
        if line.trim().is_empty() {
            return Ok(None);
        }
        let caps = COMMAND_RE
            .captures(line)
            .ok_or_else(|| CommandError::Unknown(line.trim().to_string()))?;

        let verb = caps["verb"].to_ascii_lowercase();
        let spec = caps.name("spec").map(|m| m.as_str().to_string());
        let message = caps
            .name("message")
            .map(|m| m.as_str().to_string())
            .filter(|m| !m.is_empty());

        let command = match verb.as_str() {
            "add" => match (spec, message) {
                (Some(spec), Some(message)) => Command::Add { spec, message },
                _ => return Err(CommandError::Usage("add <shortcut> <message>")),
            },
            "remove" | "rm" => match (spec, message) {
                (Some(spec), None) => Command::Remove { spec },
                _ => return Err(CommandError::Usage("remove <shortcut>")),
            },
            "list" | "ls" => Command::List,
            "quit" | "exit" => Command::Quit,
            _ => return Err(CommandError::Unknown(verb)),
        };
        Ok(Some(command))
    }

    /// Apply a table command to `registry` and render the reply.
    ///
    /// `Quit` has no reply; the caller handles shutdown.
    pub fn execute(&self, registry: &HotkeyRegistry) -> String {
        match self {
            Command::Add { spec, message } => {
                let added = ShortcutSpec::parse(spec).and_then(|spec| {
                    let id = registry.add(spec.clone(), message.as_str())?;
                    Ok((id, spec))
                });
                match added {
                    Ok((id, spec)) => format!("added {id} {spec}"),
                    Err(e @ ShortcutError::AlreadyExists { .. }) => {
                        tracing::warn!(error = %e, "duplicate shortcut rejected");
                        format!("error: {e}")
                    }
                    Err(e) => format!("error: {e}"),
                }
            }
            Command::Remove { spec } => match registry.unregister_shortcut(spec) {
                Ok(Some(entry)) => format!("removed {}", entry.spec),
                Ok(None) => format!("not registered {spec}"),
                Err(e) => format!("error: {e}"),
            },
            Command::List => render_table(registry),
            Command::Quit => String::new(),
        }
    }
}

/// Newest entry first, one tab-separated row per shortcut.
fn render_table(registry: &HotkeyRegistry) -> String {
    let entries = registry.list_shortcuts();
    if entries.is_empty() {
        return "(no shortcuts)".to_string();
    }
    entries
        .iter()
        .rev()
        .map(|e| format!("{}\t{}\t{}", e.id, e.spec, e.message))
        .collect::<Vec<_>>()
        .join("\n")
}
