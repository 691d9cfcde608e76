//! Presentation loop — the UI side of the hook/UI boundary.
//!
//! [`Presentation::on_tick`] is called from the UI's own scheduling point.
//! It advances the live notification, then polls the event channel and
//! turns each fired event into [`Presenter`] callbacks. Nothing here is ever
//! called from the hook thread.

use std::io::Write;
use std::sync::Arc;

use crate::channel::{EventReceiver, FiredEvent};
use crate::notification::{NotificationController, NotificationUpdate, Phase};
use crate::shortcut::{HotkeyRegistry, ShortcutId};

/// Output surface for fired shortcuts and the notification.
pub trait Presenter {
    /// A registered shortcut fired (table highlighting).
    fn shortcut_fired(&mut self, id: ShortcutId, message: &str);

    /// A notification became visible at full opacity.
    fn notification_shown(&mut self, message: &str);

    fn opacity_changed(&mut self, opacity: f32);

    /// The notification finished fading.
    fn notification_closed(&mut self);
}

/// Writes notifications as lines to a writer (stdout in the binary).
pub struct ConsolePresenter<W: Write> {
    out: W,
}

impl<W: Write> ConsolePresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Presenter for ConsolePresenter<W> {
    fn shortcut_fired(&mut self, id: ShortcutId, message: &str) {
        tracing::debug!(%id, text = message, "shortcut fired");
    }

    fn notification_shown(&mut self, message: &str) {
        if let Err(e) = writeln!(self.out, ">> {message}").and_then(|()| self.out.flush()) {
            tracing::warn!(error = %e, "failed to write notification");
        }
    }

    fn opacity_changed(&mut self, opacity: f32) {
        tracing::trace!(opacity, "notification fading");
    }

    fn notification_closed(&mut self) {
        tracing::debug!("notification closed");
    }
}

pub struct Presentation<P: Presenter> {
    registry: Arc<HotkeyRegistry>,
    events: EventReceiver,
    controller: NotificationController,
    presenter: P,
    dropped_seen: u64,
}

impl<P: Presenter> Presentation<P> {
    pub fn new(
        registry: Arc<HotkeyRegistry>,
        events: EventReceiver,
        controller: NotificationController,
        presenter: P,
    ) -> Self {
        Self {
            registry,
            events,
            controller,
            presenter,
            dropped_seen: 0,
        }
    }

    /// One UI tick: advance the fade, then deliver pending fired events.
    ///
    /// Returns how many events were delivered.
    pub fn on_tick(&mut self) -> usize {
        match self.controller.tick() {
            Some(NotificationUpdate::Opacity(opacity)) => self.presenter.opacity_changed(opacity),
            Some(NotificationUpdate::Closed) => self.presenter.notification_closed(),
            None => {}
        }

        let mut delivered = 0;
        while let Some(event) = self.events.try_recv() {
            if self.deliver(event) {
                delivered += 1;
            }
        }

        let dropped = self.events.dropped();
        if dropped > self.dropped_seen {
            tracing::info!(
                newly_dropped = dropped - self.dropped_seen,
                dropped_total = dropped,
                "fired events were dropped while the UI was busy"
            );
            self.dropped_seen = dropped;
        }
        delivered
    }

    fn deliver(&mut self, event: FiredEvent) -> bool {
        // The entry may have been removed after the hook matched it.
        let Some(message) = self.registry.message(event.shortcut_id) else {
            tracing::debug!(id = %event.shortcut_id, "fired shortcut no longer registered");
            return false;
        };

        tracing::info!(
            id = %event.shortcut_id,
            latency_ms = event.timestamp.elapsed().as_millis() as u64,
            "delivering notification"
        );
        self.presenter.shortcut_fired(event.shortcut_id, &message);
        self.presenter.notification_shown(&message);
        self.controller.notify(message);
        true
    }

    pub fn phase(&self) -> Phase {
        self.controller.phase()
    }

    pub fn controller(&self) -> &NotificationController {
        &self.controller
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// `true` once the hook side has gone away and the queue is empty.
    pub fn is_disconnected(&self) -> bool {
        self.events.is_terminated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{self, EventSender};

    #[derive(Debug, Default)]
    struct Recorder {
        fired: Vec<(ShortcutId, String)>,
        shown: Vec<String>,
        opacities: Vec<f32>,
        closed: usize,
    }

    impl Presenter for Recorder {
        fn shortcut_fired(&mut self, id: ShortcutId, message: &str) {
            self.fired.push((id, message.to_string()));
        }

        fn notification_shown(&mut self, message: &str) {
            self.shown.push(message.to_string());
        }

        fn opacity_changed(&mut self, opacity: f32) {
            self.opacities.push(opacity);
        }

        fn notification_closed(&mut self) {
            self.closed += 1;
        }
    }

    fn setup() -> (Arc<HotkeyRegistry>, EventSender, Presentation<Recorder>) {
        let registry = Arc::new(HotkeyRegistry::new());
        let (tx, rx) = channel::bounded(4);
        let presentation = Presentation::new(
            Arc::clone(&registry),
            rx,
            NotificationController::default(),
            Recorder::default(),
        );
        (registry, tx, presentation)
    }

    #[test]
    fn fired_event_shows_message() {
        let (registry, tx, mut presentation) = setup();
        let id = registry.register_shortcut("Ctrl+V", "Pasted!").unwrap();
        tx.push(FiredEvent::new(id));

        assert_eq!(presentation.on_tick(), 1);
        assert_eq!(presentation.phase(), Phase::Visible);
        assert_eq!(presentation.presenter().fired, vec![(id, "Pasted!".to_string())]);
        assert_eq!(presentation.presenter().shown, vec!["Pasted!".to_string()]);
    }

    #[test]
    fn event_for_removed_shortcut_is_skipped() {
        let (registry, tx, mut presentation) = setup();
        let id = registry.register_shortcut("Ctrl+V", "Pasted!").unwrap();
        tx.push(FiredEvent::new(id));
        registry.unregister_shortcut("Ctrl+V").unwrap();

        assert_eq!(presentation.on_tick(), 0);
        assert_eq!(presentation.phase(), Phase::Idle);
        assert!(presentation.presenter().shown.is_empty());
    }

    #[test]
    fn latest_event_wins_within_a_tick() {
        let (registry, tx, mut presentation) = setup();
        let a = registry.register_shortcut("Ctrl+C", "Copied!").unwrap();
        let b = registry.register_shortcut("Ctrl+V", "Pasted!").unwrap();
        tx.push(FiredEvent::new(a));
        tx.push(FiredEvent::new(b));

        assert_eq!(presentation.on_tick(), 2);
        let state = presentation.controller().state().unwrap();
        assert_eq!(state.message, "Pasted!");
    }

    #[test]
    fn notification_runs_to_close_across_ticks() {
        let (registry, tx, mut presentation) = setup();
        let id = registry.register_shortcut("F2", "two").unwrap();
        tx.push(FiredEvent::new(id));
        presentation.on_tick();

        for _ in 0..30 {
            presentation.on_tick();
        }
        let recorder = presentation.presenter();
        assert_eq!(recorder.closed, 1);
        assert_eq!(recorder.opacities.len(), 19);
        assert!(recorder.opacities.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(presentation.phase(), Phase::Idle);
    }

    #[test]
    fn console_presenter_writes_lines() {
        let mut console = ConsolePresenter::new(Vec::new());
        console.notification_shown("Copied!");
        console.opacity_changed(0.5);
        console.notification_closed();
        assert_eq!(String::from_utf8(console.into_inner()).unwrap(), ">> Copied!\n");
    }
}
