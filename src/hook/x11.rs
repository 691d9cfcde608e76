//! X11 keyboard hook — key-state polling over an x11rb connection.
//!
//! Reads the global key bitmap with `QueryKeymap` and maps held keycodes to
//! a [`Chord`] through a keycode table built from the server's keyboard
//! mapping. Nothing is grabbed, so every keystroke still reaches the focused
//! window. Between polls the thread waits on the connection fd so a
//! `MappingNotify` (layout switch, xmodmap) rebuilds the table promptly.

use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::os::fd::{AsRawFd, BorrowedFd};
use std::time::Duration;
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::xproto::{self, Keysym, Mapping};
use x11rb::rust_connection::RustConnection;

use super::{Held, HookError, KeyboardHook};
use crate::shortcut::{Chord, Key, Modifiers, NamedKey};

/// What a keycode contributes to a chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyRole {
    Modifier(Modifiers),
    Key(Key),
    /// Lock keys, unmapped keycodes and keysyms outside the chord vocabulary.
    Ignored,
}

/// Map a keysym (first column of the keyboard mapping) to its role.
fn classify(keysym: Keysym) -> KeyRole {
    match keysym {
        0x20 => KeyRole::Key(Key::Named(NamedKey::Space)),
        0x21..=0x7e => char::from_u32(keysym)
            .and_then(Key::from_char)
            .map_or(KeyRole::Ignored, KeyRole::Key),
        // F1..=F24
        0xffbe..=0xffd5 => KeyRole::Key(Key::Function((keysym - 0xffbe + 1) as u8)),
        0xffe1 | 0xffe2 => KeyRole::Modifier(Modifiers::SHIFT),
        0xffe3 | 0xffe4 => KeyRole::Modifier(Modifiers::CTRL),
        0xffe9 | 0xffea => KeyRole::Modifier(Modifiers::ALT),
        // Meta_L/R, Super_L/R, Hyper_L/R
        0xffe7 | 0xffe8 | 0xffeb..=0xffee => KeyRole::Modifier(Modifiers::SUPER),
        _ => named(keysym).map_or(KeyRole::Ignored, |k| KeyRole::Key(Key::Named(k))),
    }
}

fn named(keysym: Keysym) -> Option<NamedKey> {
    let key = match keysym {
        0xff08 => NamedKey::Backspace,
        0xff09 => NamedKey::Tab,
        0xff0d | 0xff8d => NamedKey::Enter,
        0xff1b => NamedKey::Escape,
        0xff50 => NamedKey::Home,
        0xff51 => NamedKey::Left,
        0xff52 => NamedKey::Up,
        0xff53 => NamedKey::Right,
        0xff54 => NamedKey::Down,
        0xff55 => NamedKey::PageUp,
        0xff56 => NamedKey::PageDown,
        0xff57 => NamedKey::End,
        0xff61 => NamedKey::Print,
        0xff63 => NamedKey::Insert,
        0xffff => NamedKey::Delete,
        _ => return None,
    };
    Some(key)
}

/// Keycode → role lookup, indexed by raw keycode.
struct KeycodeTable {
    roles: [KeyRole; 256],
    /// Character the key types with Shift, when it differs from `roles`.
    shifted: [Option<Key>; 256],
}

impl KeycodeTable {
    fn load(conn: &RustConnection) -> Result<Self, HookError> {
        let setup = conn.setup();
        let (min, max) = (setup.min_keycode, setup.max_keycode);
        let count = max.saturating_sub(min).saturating_add(1);

        let reply = xproto::get_keyboard_mapping(conn, min, count)
            .map_err(|e| HookError::X11(format!("get_keyboard_mapping: {e}")))?
            .reply()
            .map_err(|e| HookError::X11(format!("get_keyboard_mapping reply: {e}")))?;

        Ok(Self::from_mapping(min, reply.keysyms_per_keycode, &reply.keysyms))
    }

    fn from_mapping(min_keycode: u8, per_keycode: u8, keysyms: &[Keysym]) -> Self {
        let mut roles = [KeyRole::Ignored; 256];
        let mut shifted = [None; 256];
        let per = usize::from(per_keycode.max(1));
        for (i, column) in keysyms.chunks(per).enumerate() {
            let keycode = usize::from(min_keycode) + i;
            if keycode >= roles.len() {
                break;
            }
            // Group 1: unshifted symbol, then the shifted one.
            let role = column.first().copied().map_or(KeyRole::Ignored, classify);
            roles[keycode] = role;
            if let (KeyRole::Key(base), Some(KeyRole::Key(upper @ Key::Char(_)))) =
                (role, column.get(1).copied().map(classify))
            {
                // Letters fold to the same key; only distinct characters count.
                shifted[keycode] = (upper != base).then_some(upper);
            }
        }
        Self { roles, shifted }
    }

    /// Fold a 256-bit key bitmap into the held keys. More than one
    /// non-modifier key held yields `None`.
    fn held(&self, pressed: &[u8; 32]) -> Option<Held> {
        let mut modifiers = Modifiers::NONE;
        let mut key = None;

        for (byte_index, byte) in pressed.iter().enumerate() {
            if *byte == 0 {
                continue;
            }
            for bit in 0..8usize {
                if *byte & (1u8 << bit) == 0 {
                    continue;
                }
                let keycode = byte_index * 8 + bit;
                match self.roles[keycode] {
                    KeyRole::Modifier(m) => modifiers.insert(m),
                    KeyRole::Key(k) => {
                        if key.replace((keycode, k)).is_some() {
                            return None;
                        }
                    }
                    KeyRole::Ignored => {}
                }
            }
        }

        let (keycode, key) = key?;
        let chord = Chord::new(modifiers, key);
        match self.shifted[keycode] {
            Some(upper) if modifiers.contains(Modifiers::SHIFT) => {
                let mut rest = modifiers;
                rest.remove(Modifiers::SHIFT);
                Some(Held::with_shifted(chord, Chord::new(rest, upper)))
            }
            _ => Some(Held::new(chord)),
        }
    }
}

/// Global keyboard hook backed by an X11 display connection.
pub struct X11Keyboard {
    conn: RustConnection,
    table: KeycodeTable,
}

impl X11Keyboard {
    /// Connect to `$DISPLAY`, load the keyboard mapping and verify that the
    /// key state can be read. Any failure here is fatal for the caller.
    pub fn install() -> Result<Self, HookError> {
        let (conn, _screen_num) = RustConnection::connect(None)
            .map_err(|e| HookError::Unsupported(format!("cannot connect to X display: {e}")))?;

        let table = KeycodeTable::load(&conn)?;
        let mut keyboard = Self { conn, table };

        // Probe once so a server refusing QueryKeymap fails at install.
        keyboard.pressed_chord()?;
        tracing::info!("X11 keyboard hook installed");
        Ok(keyboard)
    }

    fn reload_mapping(&mut self) {
        match KeycodeTable::load(&self.conn) {
            Ok(table) => {
                self.table = table;
                tracing::info!("keyboard mapping reloaded");
            }
            Err(e) => tracing::warn!(error = %e, "keeping previous keyboard mapping"),
        }
    }

    /// Drain queued events; returns whether the keyboard mapping changed.
    fn drain_events(&mut self) -> Result<bool, HookError> {
        let mut remap = false;
        loop {
            match self.conn.poll_for_event() {
                Ok(Some(Event::MappingNotify(ev))) => {
                    remap |= ev.request == Mapping::KEYBOARD;
                }
                Ok(Some(Event::Error(e))) => {
                    tracing::debug!(error = ?e, "X11 error event");
                }
                Ok(Some(_)) => {}
                Ok(None) => return Ok(remap),
                Err(e) => return Err(HookError::X11(format!("connection error: {e}"))),
            }
        }
    }
}

impl KeyboardHook for X11Keyboard {
    fn pressed_chord(&mut self) -> Result<Option<Held>, HookError> {
        let reply = xproto::query_keymap(&self.conn)
            .map_err(|e| HookError::X11(format!("query_keymap: {e}")))?
            .reply()
            .map_err(|e| HookError::X11(format!("query_keymap reply: {e}")))?;
        Ok(self.table.held(&reply.keys))
    }

    fn wait(&mut self, timeout: Duration) -> Result<(), HookError> {
        // Replies read during the last poll may have queued events that will
        // not make the fd readable again.
        let mut remap = self.drain_events()?;

        let raw_fd = self.conn.stream().as_raw_fd();
        // SAFETY: raw_fd is the X11 connection fd, valid while self.conn is alive.
        let borrowed = unsafe { BorrowedFd::borrow_raw(raw_fd) };
        let mut fds = [PollFd::new(borrowed, PollFlags::POLLIN)];
        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);

        let readable = match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(0) | Err(nix::Error::EINTR) => false,
            Ok(_) => true,
            Err(e) => return Err(HookError::X11(format!("poll on X11 fd: {e}"))),
        };

        if readable {
            remap |= self.drain_events()?;
        }
        if remap {
            self.reload_mapping();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::ChordTracker;
    use crate::shortcut::{HotkeyRegistry, ShortcutSpec};

    const MIN_KEYCODE: u8 = 8;

    /// Tiny mapping: keycode 8+i has keysyms[i*2] unshifted.
    fn table() -> KeycodeTable {
        let keysyms: Vec<Keysym> = vec![
            0xffe3, 0, // 8: Control_L
            0xffe1, 0, // 9: Shift_L
            0x63, 0x43, // 10: c / C
            0x76, 0x56, // 11: v / V
            0xffe5, 0, // 12: Caps_Lock
            0xffc2, 0, // 13: F5
            0x31, 0x21, // 14: 1 / !
            0, 0, // 15: NoSymbol
        ];
        KeycodeTable::from_mapping(MIN_KEYCODE, 2, &keysyms)
    }

    /// The keycodes a pc105 US layout reports, four keysyms per keycode.
    fn us_layout() -> KeycodeTable {
        let per = 4;
        let mut keysyms = vec![0; (255 - usize::from(MIN_KEYCODE) + 1) * per];
        let mut set = |keycode: usize, lower: Keysym, upper: Keysym| {
            let at = (keycode - usize::from(MIN_KEYCODE)) * per;
            keysyms[at] = lower;
            keysyms[at + 1] = upper;
        };
        set(10, 0x31, 0x21); // 1 / exclam
        set(20, 0x2d, 0x5f); // minus / underscore
        set(21, 0x3d, 0x2b); // equal / plus
        set(37, 0xffe3, 0); // Control_L
        set(50, 0xffe1, 0); // Shift_L
        set(54, 0x63, 0x43); // c / C
        set(61, 0x2f, 0x3f); // slash / question
        set(67, 0xffbe, 0xfed8); // F1 / XF86Switch_VT_1
        KeycodeTable::from_mapping(MIN_KEYCODE, per as u8, &keysyms)
    }

    fn bitmap(keycodes: &[u8]) -> [u8; 32] {
        let mut bits = [0u8; 32];
        for &kc in keycodes {
            bits[usize::from(kc / 8)] |= 1 << (kc % 8);
        }
        bits
    }

    fn chord_of(table: &KeycodeTable, keycodes: &[u8]) -> Option<String> {
        table.held(&bitmap(keycodes)).map(|held| held.chord.to_string())
    }

    fn spec(raw: &str) -> Chord {
        ShortcutSpec::parse(raw).unwrap().chord()
    }

    #[test]
    fn classify_covers_chord_vocabulary() {
        assert_eq!(classify(0x61), KeyRole::Key(Key::Char('A')));
        assert_eq!(classify(0x5a), KeyRole::Key(Key::Char('Z')));
        assert_eq!(classify(0x2f), KeyRole::Key(Key::Char('/')));
        assert_eq!(classify(0xffbe), KeyRole::Key(Key::Function(1)));
        assert_eq!(classify(0xffd5), KeyRole::Key(Key::Function(24)));
        assert_eq!(classify(0xffeb), KeyRole::Modifier(Modifiers::SUPER));
        assert_eq!(classify(0xffff), KeyRole::Key(Key::Named(NamedKey::Delete)));
        assert_eq!(classify(0xff7f), KeyRole::Ignored); // Num_Lock
        assert_eq!(classify(0x00e9), KeyRole::Ignored); // eacute
    }

    #[test]
    fn bitmap_folds_to_chord() {
        let table = table();
        assert_eq!(chord_of(&table, &[8, 10]).as_deref(), Some("Ctrl+C"));
        assert_eq!(chord_of(&table, &[9, 14]).as_deref(), Some("Shift+1"));
    }

    #[test]
    fn lock_keys_do_not_change_chord() {
        let table = table();
        let plain = table.held(&bitmap(&[8, 11]));
        let locked = table.held(&bitmap(&[8, 11, 12]));
        assert_eq!(plain, locked);
        assert_eq!(chord_of(&table, &[8, 11, 12]).as_deref(), Some("Ctrl+V"));
    }

    #[test]
    fn modifiers_alone_or_two_keys_are_not_chords() {
        let table = table();
        assert_eq!(table.held(&bitmap(&[])), None);
        assert_eq!(table.held(&bitmap(&[8, 9])), None);
        assert_eq!(table.held(&bitmap(&[8, 10, 11])), None);
        assert_eq!(table.held(&bitmap(&[15])), None);
    }

    #[test]
    fn function_key_without_modifiers() {
        let table = table();
        assert_eq!(chord_of(&table, &[13]).as_deref(), Some("F5"));
    }

    #[test]
    fn shifted_punctuation_reads_as_its_character() {
        let table = us_layout();

        let held = table.held(&bitmap(&[37, 50, 21])).unwrap();
        assert_eq!(held.chord, spec("Ctrl+Shift+="));
        assert_eq!(held.shifted, Some(spec("Ctrl++")));

        let held = table.held(&bitmap(&[37, 50, 10])).unwrap();
        assert_eq!(held.chord, spec("Ctrl+Shift+1"));
        assert_eq!(held.shifted, Some(spec("Ctrl+!")));

        let held = table.held(&bitmap(&[50, 61])).unwrap();
        assert_eq!(held.shifted, Some(spec("?")));
    }

    #[test]
    fn no_shifted_reading_without_shift_or_for_letters() {
        let table = us_layout();
        assert_eq!(table.held(&bitmap(&[37, 21])), Some(Held::new(spec("Ctrl+="))));
        assert_eq!(table.held(&bitmap(&[37, 50, 54])), Some(Held::new(spec("Ctrl+Shift+C"))));
        // Shifted keysym outside the chord vocabulary.
        assert_eq!(table.held(&bitmap(&[50, 67])), Some(Held::new(spec("Shift+F1"))));
    }

    #[test]
    fn registered_shifted_specs_fire_from_physical_keys() {
        let table = us_layout();
        let registry = HotkeyRegistry::new();
        let plus = registry.register_shortcut("ctrl+plus", "Zoom in").unwrap();
        let bang = registry.register_shortcut("Ctrl+!", "Bang").unwrap();
        let under = registry.register_shortcut("Ctrl+_", "Zoom out").unwrap();
        let mut tracker = ChordTracker::new();

        for (keycodes, expected) in [
            (&[37u8, 50, 21][..], plus),
            (&[37, 50, 10][..], bang),
            (&[37, 50, 20][..], under),
        ] {
            tracker.observe(None, &registry);
            let fired = tracker.observe(table.held(&bitmap(keycodes)), &registry);
            assert_eq!(fired.map(|e| e.shortcut_id), Some(expected), "{keycodes:?}");
        }

        // Without Shift the key is plain '=' and nothing fires.
        tracker.observe(None, &registry);
        assert!(tracker.observe(table.held(&bitmap(&[37, 21])), &registry).is_none());
    }
}
