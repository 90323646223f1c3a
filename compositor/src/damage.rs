//! Damage and repaint scheduler: decides when a frame is painted and what
//! dirty area it must cover.

use std::time::Duration;

use tracing::{debug, trace};
use x11rb::protocol::xfixes::Region;
use x11rb::protocol::xproto::Window as WindowId;

/// Damage notifications within one frame past this count promote the
/// window's damage to "fully damaged", compressing the rest of the frame's
/// notifications for it into a no-op.
pub const DEFAULT_COARSEN_THRESHOLD: u32 = 20;

const DEFAULT_REFRESH_RATE_HZ: u32 = 50;
const MIN_PAINT_INTERVAL: Duration = Duration::from_millis(10);

/// What a single damage notification resolves to, once translated against
/// the per-window and per-frame state. The caller performs the named X11
/// side effect; this module only decides which one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageAction {
    /// Treat the whole window as damaged; subtract the damage object
    /// entirely server-side, no region arithmetic needed.
    FullRepaint,
    /// Accumulator already covers the window; subtract the damage object
    /// entirely, nothing more to union.
    AlreadyFull,
    /// Create a temporary region, subtract the server damage object into
    /// it, translate to root coordinates and union into the accumulator.
    Partial,
}

/// Per-window state the scheduler needs beyond what `Window` already
/// tracks, namely whether the accumulated dirty area already covers it.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowDamageState {
    pub painted_since_viewable: bool,
    pub accumulator_covers_window: bool,
}

pub struct DamageScheduler {
    coarsen_threshold: u32,
    paint_interval: Duration,
    /// True once at least one rectangle has been unioned into the
    /// accumulator since the last successful paint.
    accumulator_dirty: bool,
}

impl DamageScheduler {
    pub fn new(coarsen_threshold: u32, refresh_rate_hz: Option<u32>) -> Self {
        DamageScheduler {
            coarsen_threshold,
            paint_interval: Self::interval_for_rate(refresh_rate_hz),
            accumulator_dirty: false,
        }
    }

    pub fn with_default_rate(coarsen_threshold: u32) -> Self {
        Self::new(coarsen_threshold, None)
    }

    fn interval_for_rate(refresh_rate_hz: Option<u32>) -> Duration {
        let hz = refresh_rate_hz.unwrap_or(DEFAULT_REFRESH_RATE_HZ).max(1);
        let interval = Duration::from_secs_f64(1.0 / hz as f64);
        interval.max(MIN_PAINT_INTERVAL)
    }

    pub fn paint_interval(&self) -> Duration {
        self.paint_interval
    }

    /// Re-derives the paint interval from a freshly-advertised refresh
    /// rate (e.g. after a RandR screen-change notification).
    pub fn set_refresh_rate(&mut self, refresh_rate_hz: Option<u32>) {
        self.paint_interval = Self::interval_for_rate(refresh_rate_hz);
    }

    /// Decides the action for a damage notification on window `id`, given
    /// its current damage state and damage-notify counter, and updates
    /// that counter/state in place.
    pub fn on_damage_notify(
        &mut self,
        id: WindowId,
        state: &mut WindowDamageState,
        damage_notify_counter: &mut u32,
    ) -> DamageAction {
        *damage_notify_counter += 1;
        self.accumulator_dirty = true;

        let action = if !state.painted_since_viewable {
            DamageAction::FullRepaint
        } else if state.accumulator_covers_window {
            DamageAction::AlreadyFull
        } else {
            DamageAction::Partial
        };

        if *damage_notify_counter >= self.coarsen_threshold {
            trace!(id, counter = *damage_notify_counter, "damage: coarsening to full repaint");
            state.accumulator_covers_window = true;
        }

        if matches!(action, DamageAction::FullRepaint | DamageAction::AlreadyFull) {
            state.accumulator_covers_window = true;
        }

        action
    }

    pub fn accumulator_is_dirty(&self) -> bool {
        self.accumulator_dirty
    }

    /// Called after a successful paint: clears the scheduler's dirty flag.
    /// Per-window counters and `accumulator_covers_window` flags are reset
    /// by the caller alongside the registry iteration that subtracts each
    /// window's server-side damage.
    pub fn mark_painted(&mut self) {
        self.accumulator_dirty = false;
        debug!("damage: accumulator cleared after paint");
    }
}

/// Handle to the single server-side damaged-region accumulator. The
/// concrete region id is allocated once at startup and lives for the
/// process's lifetime; this wrapper only tracks whether it is logically
/// empty, since XFixes regions have no cheap "is empty" query.
pub struct Accumulator {
    pub region: Region,
}

impl Accumulator {
    pub fn new(region: Region) -> Self {
        Accumulator { region }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_damage_since_viewable_is_full_repaint() {
        let mut scheduler = DamageScheduler::with_default_rate(DEFAULT_COARSEN_THRESHOLD);
        let mut state = WindowDamageState::default();
        let mut counter = 0;
        let action = scheduler.on_damage_notify(1, &mut state, &mut counter);
        assert_eq!(action, DamageAction::FullRepaint);
        assert_eq!(counter, 1);
        assert!(state.accumulator_covers_window);
    }

    #[test]
    fn subsequent_damage_after_full_cover_is_already_full() {
        let mut scheduler = DamageScheduler::with_default_rate(DEFAULT_COARSEN_THRESHOLD);
        let mut state = WindowDamageState {
            painted_since_viewable: true,
            accumulator_covers_window: true,
        };
        let mut counter = 0;
        let action = scheduler.on_damage_notify(1, &mut state, &mut counter);
        assert_eq!(action, DamageAction::AlreadyFull);
    }

    #[test]
    fn partial_damage_when_painted_and_not_covering() {
        let mut scheduler = DamageScheduler::with_default_rate(DEFAULT_COARSEN_THRESHOLD);
        let mut state = WindowDamageState {
            painted_since_viewable: true,
            accumulator_covers_window: false,
        };
        let mut counter = 0;
        let action = scheduler.on_damage_notify(1, &mut state, &mut counter);
        assert_eq!(action, DamageAction::Partial);
    }

    #[test]
    fn crossing_coarsen_threshold_promotes_to_full_cover() {
        let mut scheduler = DamageScheduler::with_default_rate(3);
        let mut state = WindowDamageState {
            painted_since_viewable: true,
            accumulator_covers_window: false,
        };
        let mut counter = 0;
        scheduler.on_damage_notify(1, &mut state, &mut counter);
        scheduler.on_damage_notify(1, &mut state, &mut counter);
        let action = scheduler.on_damage_notify(1, &mut state, &mut counter);
        assert_eq!(action, DamageAction::Partial);
        assert!(state.accumulator_covers_window);
    }

    #[test]
    fn paint_interval_clamped_to_minimum() {
        let scheduler = DamageScheduler::new(DEFAULT_COARSEN_THRESHOLD, Some(500));
        assert_eq!(scheduler.paint_interval(), MIN_PAINT_INTERVAL);
    }

    #[test]
    fn paint_interval_defaults_to_20ms() {
        let scheduler = DamageScheduler::new(DEFAULT_COARSEN_THRESHOLD, None);
        assert_eq!(scheduler.paint_interval(), Duration::from_millis(20));
    }

    #[test]
    fn mark_painted_clears_dirty_flag() {
        let mut scheduler = DamageScheduler::with_default_rate(DEFAULT_COARSEN_THRESHOLD);
        let mut state = WindowDamageState::default();
        let mut counter = 0;
        scheduler.on_damage_notify(1, &mut state, &mut counter);
        assert!(scheduler.accumulator_is_dirty());
        scheduler.mark_painted();
        assert!(!scheduler.accumulator_is_dirty());
    }
}
