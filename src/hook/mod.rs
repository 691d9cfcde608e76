//! Hook thread — reads global keyboard state and emits fired events.
//!
//! A [`KeyboardHook`] is the OS capability: report the chord currently held
//! and wait for the next poll. [`HookThread`] owns one on a dedicated
//! thread, matches each chord change against the shared
//! [`HotkeyRegistry`], and pushes a [`FiredEvent`] on a match. The hook only
//! observes key state, so keystrokes always reach the focused application.

pub mod x11;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::channel::{EventSender, FiredEvent, PushOutcome};
use crate::shortcut::{Chord, HotkeyRegistry, ShortcutError};

/// Keyboard hook failure.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// X11 connection or protocol error.
    #[error("X11: {0}")]
    X11(String),

    /// No usable display / platform backend.
    #[error("unsupported platform: {0}")]
    Unsupported(String),

    /// The hook thread could not be started.
    #[error("failed to spawn hook thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// One read of the keyboard: the held chord and, when Shift turns the key
/// into another character, the same keys read through that character.
///
/// On a US layout Ctrl+Shift+`=` is held as `Ctrl+Shift+=` with the
/// shifted reading `Ctrl++`, so both spellings can be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Held {
    pub chord: Chord,
    /// Shifted symbol with the Shift modifier consumed.
    pub shifted: Option<Chord>,
}

impl Held {
    pub const fn new(chord: Chord) -> Self {
        Self {
            chord,
            shifted: None,
        }
    }

    pub const fn with_shifted(chord: Chord, shifted: Chord) -> Self {
        Self {
            chord,
            shifted: Some(shifted),
        }
    }
}

impl From<Chord> for Held {
    fn from(chord: Chord) -> Self {
        Self::new(chord)
    }
}

/// OS capability to read the global keyboard state.
pub trait KeyboardHook: Send + 'static {
    /// The keys currently held, or `None` when no modifiers-plus-one-key
    /// combination is down.
    fn pressed_chord(&mut self) -> Result<Option<Held>, HookError>;

    /// Block until the next poll is due, for at most `timeout`.
    fn wait(&mut self, timeout: Duration) -> Result<(), HookError> {
        std::thread::sleep(timeout);
        Ok(())
    }
}

/// Hook thread tuning.
#[derive(Debug, Clone, Copy)]
pub struct HookConfig {
    /// Interval between key-state polls.
    pub poll_interval: Duration,
    /// Pause after a failed read before retrying.
    pub retry_backoff: Duration,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            retry_backoff: Duration::from_millis(250),
        }
    }
}

/// Edge detector: a chord fires once when it becomes held.
#[derive(Debug, Default)]
pub struct ChordTracker {
    held: Option<Held>,
}

impl ChordTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the current keys. Returns a fired event when they changed to a
    /// registered chord. The unshifted chord is matched before the shifted
    /// reading.
    pub fn observe(
        &mut self,
        current: Option<Held>,
        registry: &HotkeyRegistry,
    ) -> Option<FiredEvent> {
        if current == self.held {
            return None;
        }
        self.held = current;
        let held = current?;
        let id = registry
            .lookup(&held.chord)
            .or_else(|| held.shifted.and_then(|shifted| registry.lookup(&shifted)))?;
        Some(FiredEvent::new(id))
    }
}

/// The running hook thread. Dropping it stops and joins the thread.
pub struct HookThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl HookThread {
    /// Move `hook` onto a dedicated thread and start polling.
    ///
    /// Fails with [`ShortcutError::HookInstallFailed`] if the thread cannot
    /// be spawned.
    pub fn spawn<H: KeyboardHook>(
        hook: H,
        registry: Arc<HotkeyRegistry>,
        events: EventSender,
        config: HookConfig,
    ) -> Result<Self, ShortcutError> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("keyboard-hook".into())
            .spawn(move || run(hook, &registry, &events, &thread_stop, config))
            .map_err(HookError::Spawn)?;

        tracing::debug!(poll_ms = config.poll_interval.as_millis() as u64, "hook thread started");
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread to stop and join it. The hook (and its OS
    /// connection) is dropped on the thread before this returns.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("hook thread panicked");
            }
        }
    }
}

impl Drop for HookThread {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn run<H: KeyboardHook>(
    mut hook: H,
    registry: &HotkeyRegistry,
    events: &EventSender,
    stop: &AtomicBool,
    config: HookConfig,
) {
    let mut tracker = ChordTracker::new();
    let mut failures: u32 = 0;

    while !stop.load(Ordering::Relaxed) {
        match hook.pressed_chord() {
            Ok(chord) => {
                if failures > 0 {
                    tracing::info!(failures, "keyboard read recovered");
                    failures = 0;
                }
                if let Some(event) = tracker.observe(chord, registry) {
                    tracing::debug!(id = %event.shortcut_id, "shortcut fired");
                    if events.push(event) == PushOutcome::Disconnected {
                        tracing::error!(
                            id = %event.shortcut_id,
                            "event receiver dropped, stopping hook thread"
                        );
                        return;
                    }
                }
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                tracing::warn!(error = %e, failures, "keyboard read failed, retrying");
                std::thread::sleep(config.retry_backoff);
                continue;
            }
        }

        if let Err(e) = hook.wait(config.poll_interval) {
            tracing::warn!(error = %e, "keyboard wait failed");
            std::thread::sleep(config.poll_interval);
        }
    }

    tracing::debug!("hook thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel;
    use crate::shortcut::ShortcutSpec;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Instant;

    fn chord(raw: &str) -> Chord {
        ShortcutSpec::parse(raw).unwrap().chord()
    }

    fn held(raw: &str) -> Option<Held> {
        Some(Held::new(chord(raw)))
    }

    #[test]
    fn tracker_fires_once_per_press() {
        let registry = HotkeyRegistry::new();
        let id = registry.register_shortcut("Ctrl+C", "Copied!").unwrap();
        let mut tracker = ChordTracker::new();

        let keys = held("ctrl+c");
        assert_eq!(tracker.observe(keys, &registry).map(|e| e.shortcut_id), Some(id));
        assert!(tracker.observe(keys, &registry).is_none(), "holding must not refire");
        assert!(tracker.observe(None, &registry).is_none());
        assert_eq!(tracker.observe(keys, &registry).map(|e| e.shortcut_id), Some(id));
    }

    #[test]
    fn tracker_ignores_unregistered_chords() {
        let registry = HotkeyRegistry::new();
        registry.register_shortcut("Ctrl+C", "Copied!").unwrap();
        let mut tracker = ChordTracker::new();

        assert!(tracker.observe(held("ctrl+x"), &registry).is_none());
        assert!(tracker.observe(held("ctrl+shift+c"), &registry).is_none());
    }

    #[test]
    fn tracker_matches_shifted_reading() {
        let registry = HotkeyRegistry::new();
        let plus = registry.register_shortcut("Ctrl++", "Zoom in").unwrap();
        let mut tracker = ChordTracker::new();

        let keys = Some(Held::with_shifted(chord("ctrl+shift+="), chord("ctrl+plus")));
        assert_eq!(tracker.observe(keys, &registry).map(|e| e.shortcut_id), Some(plus));

        // An exact registration of the unshifted chord takes precedence.
        let exact = registry.register_shortcut("Ctrl+Shift+=", "Equal").unwrap();
        tracker.observe(None, &registry);
        assert_eq!(tracker.observe(keys, &registry).map(|e| e.shortcut_id), Some(exact));
    }

    #[test]
    fn tracker_misses_removed_shortcut() {
        let registry = HotkeyRegistry::new();
        registry.register_shortcut("F9", "nine").unwrap();
        registry.unregister_shortcut("f9").unwrap();
        let mut tracker = ChordTracker::new();
        assert!(tracker.observe(held("F9"), &registry).is_none());
    }

    /// Replays scripted reads; `Err` entries simulate transient failures.
    struct Scripted {
        reads: Arc<Mutex<VecDeque<Result<Option<Held>, HookError>>>>,
    }

    impl KeyboardHook for Scripted {
        fn pressed_chord(&mut self) -> Result<Option<Held>, HookError> {
            self.reads.lock().unwrap().pop_front().unwrap_or(Ok(None))
        }

        fn wait(&mut self, _timeout: Duration) -> Result<(), HookError> {
            std::thread::sleep(Duration::from_millis(1));
            Ok(())
        }
    }

    #[test]
    fn thread_retries_transient_failures_and_keeps_firing() {
        let registry = Arc::new(HotkeyRegistry::new());
        let id = registry.register_shortcut("Alt+Q", "q").unwrap();
        let (tx, rx) = channel::bounded(4);

        let reads = Arc::new(Mutex::new(VecDeque::from([
            Err(HookError::X11("transient".into())),
            Ok(held("alt+q")),
        ])));
        let hook = HookThread::spawn(
            Scripted {
                reads: Arc::clone(&reads),
            },
            Arc::clone(&registry),
            tx,
            HookConfig {
                poll_interval: Duration::from_millis(1),
                retry_backoff: Duration::from_millis(1),
            },
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let event = loop {
            if let Some(event) = rx.try_recv() {
                break event;
            }
            assert!(Instant::now() < deadline, "no event delivered");
            std::thread::sleep(Duration::from_millis(1));
        };
        assert_eq!(event.shortcut_id, id);
        assert!(hook.is_running());

        hook.shutdown();
        assert!(rx.is_terminated());
    }

    #[test]
    fn thread_exits_when_receiver_is_dropped() {
        let registry = Arc::new(HotkeyRegistry::new());
        registry.register_shortcut("Alt+Q", "q").unwrap();
        let (tx, rx) = channel::bounded(4);
        drop(rx);

        let reads = Arc::new(Mutex::new(VecDeque::from([Ok(held("alt+q"))])));
        let hook = HookThread::spawn(Scripted { reads }, registry, tx, HookConfig::default()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while hook.is_running() {
            assert!(Instant::now() < deadline, "hook thread did not exit");
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}
