//! NotificationController — tick-driven show / hold / fade / close.
//!
//! One notification is live at a time. [`NotificationController::notify`]
//! always wins: it replaces the message, resets opacity to 1.0 and restarts
//! the lifetime, whatever state the previous notification was in.
//!
//! The lifetime is split into a hold phase at full opacity followed by a
//! fade phase that lowers opacity by a fixed step per tick. Fade progress is
//! counted in whole steps so the close tick does not depend on float drift.

use std::time::Duration;

/// Timing of a notification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotificationConfig {
    pub tick: Duration,
    pub lifetime: Duration,
    pub fade_step: f32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(50),
            lifetime: Duration::from_millis(1500),
            fade_step: 0.05,
        }
    }
}

/// Opacity below which a fading notification closes.
pub const CLOSE_THRESHOLD: f32 = 0.05;

impl NotificationConfig {
    /// Whole ticks in the lifetime (at least one).
    pub fn lifetime_ticks(&self) -> u32 {
        let tick = self.tick.as_millis().max(1);
        (self.lifetime.as_millis() / tick).clamp(1, u32::MAX as u128) as u32
    }

    /// Fade steps needed to go from 1.0 to below [`CLOSE_THRESHOLD`].
    pub fn fade_ticks(&self) -> u32 {
        let step = f64::from(self.fade_step.clamp(0.001, 1.0));
        let threshold = f64::from(CLOSE_THRESHOLD);
        // Smallest n with 1 - n*step < threshold. Ratios that are whole up
        // to f32 noise (0.95 / 0.05) snap to the integer.
        let ratio = (1.0 - threshold) / step;
        let whole = if (ratio - ratio.round()).abs() < 1e-4 {
            ratio.round()
        } else {
            ratio.floor()
        };
        (whole as u32).saturating_add(1)
    }

    /// Ticks spent at full opacity before fading starts.
    pub fn hold_ticks(&self) -> u32 {
        self.lifetime_ticks().saturating_sub(self.fade_ticks())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Visible,
    Fading,
}

/// The live notification.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationState {
    pub message: String,
    pub opacity: f32,
    pub remaining_ticks: u32,
}

/// What a tick changed, for the presenter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NotificationUpdate {
    Opacity(f32),
    Closed,
}

#[derive(Debug)]
pub struct NotificationController {
    config: NotificationConfig,
    phase: Phase,
    state: Option<NotificationState>,
    hold_left: u32,
    fade_done: u32,
}

impl NotificationController {
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            state: None,
            hold_left: 0,
            fade_done: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> Option<&NotificationState> {
        self.state.as_ref()
    }

    pub fn opacity(&self) -> f32 {
        self.state.as_ref().map_or(0.0, |s| s.opacity)
    }

    /// Show `message` at full opacity, interrupting any current notification.
    pub fn notify(&mut self, message: impl Into<String>) {
        self.phase = Phase::Visible;
        self.hold_left = self.config.hold_ticks();
        self.fade_done = 0;
        self.state = Some(NotificationState {
            message: message.into(),
            opacity: 1.0,
            remaining_ticks: self.config.hold_ticks() + self.config.fade_ticks(),
        });
    }

    /// Advance one tick.
    pub fn tick(&mut self) -> Option<NotificationUpdate> {
        let state = self.state.as_mut()?;
        state.remaining_ticks = state.remaining_ticks.saturating_sub(1);

        match self.phase {
            Phase::Idle => None,
            Phase::Visible => {
                self.hold_left = self.hold_left.saturating_sub(1);
                if self.hold_left == 0 {
                    self.phase = Phase::Fading;
                }
                // A zero hold starts fading on this same tick.
                if self.config.hold_ticks() == 0 {
                    return self.fade_step();
                }
                None
            }
            Phase::Fading => self.fade_step(),
        }
    }

    fn fade_step(&mut self) -> Option<NotificationUpdate> {
        let state = self.state.as_mut()?;
        self.fade_done += 1;

        if self.fade_done >= self.config.fade_ticks() {
            self.phase = Phase::Idle;
            self.state = None;
            return Some(NotificationUpdate::Closed);
        }

        // Still open, so float noise must not show it below the threshold.
        let opacity = (1.0 - self.fade_done as f32 * self.config.fade_step).max(CLOSE_THRESHOLD);
        // Monotonic: never raise opacity while fading.
        state.opacity = opacity.min(state.opacity);
        Some(NotificationUpdate::Opacity(state.opacity))
    }
}

impl Default for NotificationController {
    fn default() -> Self {
        Self::new(NotificationConfig::default())
    }
}
