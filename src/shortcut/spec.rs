//! Shortcut normalization — raw key-combination text to canonical chords.
//!
//! A [`ShortcutSpec`] is parsed from user input such as `"shift+ctrl+c"` and
//! rendered back as `"Ctrl+Shift+C"`. Equality is defined on the parsed
//! [`Chord`], so any two spellings of the same combination compare equal.

use std::fmt;
use std::str::FromStr;

use super::ShortcutError;

/// Modifier bit set. Canonical display order is Ctrl, Alt, Shift, Super.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    pub const CTRL: Modifiers = Modifiers(0b0001);
    pub const ALT: Modifiers = Modifiers(0b0010);
    pub const SHIFT: Modifiers = Modifiers(0b0100);
    pub const SUPER: Modifiers = Modifiers(0b1000);

    const ORDERED: [(Modifiers, &'static str); 4] = [
        (Self::CTRL, "Ctrl"),
        (Self::ALT, "Alt"),
        (Self::SHIFT, "Shift"),
        (Self::SUPER, "Super"),
    ];

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Modifiers) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Modifiers) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Modifiers) {
        self.0 &= !other.0;
    }

    /// Parse a single modifier token. Case-insensitive.
    fn from_token(token: &str) -> Option<Modifiers> {
        match token.to_ascii_lowercase().as_str() {
            "ctrl" | "control" | "ctl" => Some(Self::CTRL),
            "alt" | "option" | "opt" => Some(Self::ALT),
            "shift" => Some(Self::SHIFT),
            "super" | "win" | "windows" | "cmd" | "command" | "meta" | "logo" => {
                Some(Self::SUPER)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (flag, name) in Self::ORDERED {
            if self.contains(flag) {
                if !first {
                    f.write_str("+")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Non-character keys with a fixed name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NamedKey {
    Space,
    Enter,
    Tab,
    Escape,
    Backspace,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
    Print,
}

impl NamedKey {
    pub fn name(self) -> &'static str {
        match self {
            Self::Space => "Space",
            Self::Enter => "Enter",
            Self::Tab => "Tab",
            Self::Escape => "Esc",
            Self::Backspace => "Backspace",
            Self::Delete => "Delete",
            Self::Insert => "Insert",
            Self::Home => "Home",
            Self::End => "End",
            Self::PageUp => "PageUp",
            Self::PageDown => "PageDown",
            Self::Up => "Up",
            Self::Down => "Down",
            Self::Left => "Left",
            Self::Right => "Right",
            Self::Print => "Print",
        }
    }

    fn from_token(lower: &str) -> Option<NamedKey> {
        let key = match lower {
            "space" => Self::Space,
            "enter" | "return" => Self::Enter,
            "tab" => Self::Tab,
            "esc" | "escape" => Self::Escape,
            "backspace" => Self::Backspace,
            "delete" | "del" => Self::Delete,
            "insert" | "ins" => Self::Insert,
            "home" => Self::Home,
            "end" => Self::End,
            "pageup" | "pgup" => Self::PageUp,
            "pagedown" | "pgdown" | "pgdn" => Self::PageDown,
            "up" => Self::Up,
            "down" => Self::Down,
            "left" => Self::Left,
            "right" => Self::Right,
            "print" | "printscreen" => Self::Print,
            _ => return None,
        };
        Some(key)
    }
}

/// The single non-modifier key of a chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// Letter (always uppercase), digit or ASCII punctuation.
    Char(char),
    /// `F1`..=`F24`.
    Function(u8),
    Named(NamedKey),
}

impl Key {
    /// Build a character key, folding letters to uppercase.
    ///
    /// Returns `None` for anything outside printable ASCII or for space
    /// (which is [`NamedKey::Space`]).
    pub fn from_char(c: char) -> Option<Key> {
        if c.is_ascii_alphanumeric() || c.is_ascii_punctuation() {
            Some(Key::Char(c.to_ascii_uppercase()))
        } else if c == ' ' {
            Some(Key::Named(NamedKey::Space))
        } else {
            None
        }
    }

    fn from_token(token: &str) -> Option<Key> {
        let mut chars = token.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Key::from_char(c);
        }

        let lower = token.to_ascii_lowercase();
        if lower == "plus" {
            return Some(Key::Char('+'));
        }
        if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
            return (1..=24).contains(&n).then_some(Key::Function(n));
        }
        NamedKey::from_token(&lower).map(Key::Named)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{c}"),
            Key::Function(n) => write!(f, "F{n}"),
            Key::Named(named) => f.write_str(named.name()),
        }
    }
}

/// A modifier set plus exactly one key. `Copy`, so the hook thread can
/// build and hash one per poll without touching the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Chord {
    pub modifiers: Modifiers,
    pub key: Key,
}

impl Chord {
    pub const fn new(modifiers: Modifiers, key: Key) -> Self {
        Self { modifiers, key }
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.is_empty() {
            write!(f, "{}", self.key)
        } else {
            write!(f, "{}+{}", self.modifiers, self.key)
        }
    }
}

/// A normalized shortcut: the parsed chord and its canonical text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShortcutSpec {
    chord: Chord,
    canonical: String,
}

impl ShortcutSpec {
    /// Parse and normalize a raw combination such as `"shift+ctrl+c"`.
    pub fn parse(raw: &str) -> Result<Self, ShortcutError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(invalid(raw, "empty shortcut"));
        }

        // "Ctrl++" names the plus key itself.
        let (body, plus_key) = match raw.strip_suffix("++") {
            Some(body) => (body, true),
            None if raw == "+" => ("", true),
            None => (raw, false),
        };

        let mut modifiers = Modifiers::NONE;
        let mut key = plus_key.then_some(Key::Char('+'));

        for token in body.split('+').map(str::trim).filter(|t| !t.is_empty() || !plus_key) {
            if token.is_empty() {
                return Err(invalid(raw, "empty key token"));
            }
            if let Some(modifier) = Modifiers::from_token(token) {
                modifiers.insert(modifier);
                continue;
            }
            let parsed = Key::from_token(token)
                .ok_or_else(|| invalid(raw, &format!("unknown key `{token}`")))?;
            if key.replace(parsed).is_some() {
                return Err(invalid(raw, "more than one non-modifier key"));
            }
        }

        let key = key.ok_or_else(|| invalid(raw, "missing non-modifier key"))?;
        Ok(Self::from_chord(Chord::new(modifiers, key)))
    }

    pub fn from_chord(chord: Chord) -> Self {
        Self {
            canonical: chord.to_string(),
            chord,
        }
    }

    pub fn chord(&self) -> Chord {
        self.chord
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }
}

impl FromStr for ShortcutSpec {
    type Err = ShortcutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ShortcutSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

fn invalid(raw: &str, reason: &str) -> ShortcutError {
    ShortcutError::InvalidSpec {
        raw: raw.to_string(),
        reason: reason.to_string(),
    }
}
