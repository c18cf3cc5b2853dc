//! Timed boost windows derived from the game state.
use std::fmt;
use std::time::Duration;

use crate::numbers::{rate_to_period, u32_to_f64};
use crate::state::GameState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoostKind {
    AutoClick,
    Special,
}

impl BoostKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::AutoClick => "auto-click",
            Self::Special => "special auto-click",
        }
    }
}

impl fmt::Display for BoostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether a boost is running at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoostPhase {
    Inactive,
    Active { ends_at: i64 },
}

/// Parameters of a boost timer: how often it fires and when it stops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoostWindow {
    pub rate_hz: f64,
    pub ends_at: i64,
}

impl BoostWindow {
    /// A boost is active strictly before its end time.
    #[must_use]
    pub const fn is_active_at(&self, now: i64) -> bool {
        now < self.ends_at
    }

    #[must_use]
    pub const fn phase_at(&self, now: i64) -> BoostPhase {
        if self.is_active_at(now) {
            BoostPhase::Active {
                ends_at: self.ends_at,
            }
        } else {
            BoostPhase::Inactive
        }
    }

    /// Interval between automatic clicks, `None` for a zero rate.
    #[must_use]
    pub fn period(&self) -> Option<Duration> {
        rate_to_period(self.rate_hz)
    }

    #[must_use]
    pub fn remaining_ms(&self, now: i64) -> i64 {
        (self.ends_at - now).max(0)
    }
}

impl GameState {
    /// The auto-click window, present while an end time is recorded.
    #[must_use]
    pub fn auto_click_window(&self) -> Option<BoostWindow> {
        self.auto_click_end_time.map(|ends_at| BoostWindow {
            rate_hz: self.auto_click_reward,
            ends_at,
        })
    }

    #[must_use]
    pub fn special_auto_click_window(&self, rate: u32) -> Option<BoostWindow> {
        self.special_auto_click_end_time
            .map(|ends_at| BoostWindow {
                rate_hz: u32_to_f64(rate),
                ends_at,
            })
    }

    #[must_use]
    pub fn boost_window(&self, kind: BoostKind, special_rate: u32) -> Option<BoostWindow> {
        match kind {
            BoostKind::AutoClick => self.auto_click_window(),
            BoostKind::Special => self.special_auto_click_window(special_rate),
        }
    }

    #[must_use]
    pub fn boost_phase(&self, kind: BoostKind, now: i64) -> BoostPhase {
        // The rate does not influence the phase.
        self.boost_window(kind, 0)
            .map_or(BoostPhase::Inactive, |window| window.phase_at(now))
    }
}

/// Format the time left until `ends_at` as `HH:MM:SS`, clamped at zero.
#[must_use]
pub fn format_remaining(ends_at: i64, now: i64) -> String {
    let total_secs = (ends_at - now).max(0) / 1_000;
    let hours = total_secs / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::BOOST_DURATION_MS;

    #[test]
    fn window_is_active_strictly_before_end() {
        let window = BoostWindow {
            rate_hz: 2.0,
            ends_at: 10_000,
        };
        assert!(window.is_active_at(9_999));
        assert!(!window.is_active_at(10_000));
        assert_eq!(window.phase_at(0), BoostPhase::Active { ends_at: 10_000 });
        assert_eq!(window.phase_at(20_000), BoostPhase::Inactive);
        assert_eq!(window.period(), Some(Duration::from_millis(500)));
        assert_eq!(window.remaining_ms(12_000), 0);
    }

    #[test]
    fn windows_follow_state() {
        let mut state = GameState::default();
        assert_eq!(state.auto_click_window(), None);
        assert_eq!(state.boost_phase(BoostKind::Special, 0), BoostPhase::Inactive);

        state.auto_click_reward = 3.0;
        state.auto_click_end_time = Some(BOOST_DURATION_MS);
        state.special_auto_click_end_time = Some(5_000);
        assert_eq!(
            state.auto_click_window(),
            Some(BoostWindow {
                rate_hz: 3.0,
                ends_at: BOOST_DURATION_MS
            })
        );
        let special = state.special_auto_click_window(7).unwrap();
        assert_eq!(special.period(), rate_to_period(7.0));
        assert_eq!(
            state.boost_phase(BoostKind::Special, 4_999),
            BoostPhase::Active { ends_at: 5_000 }
        );
    }

    #[test]
    fn remaining_formats_as_clock() {
        assert_eq!(format_remaining(BOOST_DURATION_MS, 0), "24:00:00");
        assert_eq!(format_remaining(3_723_999, 0), "01:02:03");
        assert_eq!(format_remaining(0, 5_000), "00:00:00");
    }
}
