// =============================================================================
// Session Calendar — market-open classification and lookback selection
// =============================================================================
//
// A session is a daily [open, close] time-of-day band on weekdays. Weekends
// are always closed; holidays and early closes are not modelled.
//
// The lookback window used by the bar-speed estimator depends on the session
// state: a short window while the market is active, a longer one otherwise so
// that thin overnight trading still yields enough bars.
// =============================================================================

use anyhow::{bail, Result};
use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::types::SessionState;

/// Upper bound accepted for either lookback length.
pub const MAX_WINDOW_MINUTES: u32 = 500;

fn default_open_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default()
}

fn default_close_time() -> NaiveTime {
    NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default()
}

fn default_minutes_when_open() -> u32 {
    10
}

fn default_minutes_when_closed() -> u32 {
    60
}

// =============================================================================
// SessionCalendar
// =============================================================================

/// Daily session boundaries, expressed in the exchange's local time.
///
/// Only the hour and minute of each boundary are used; seconds are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCalendar {
    #[serde(default = "default_open_time")]
    pub open_time_of_day: NaiveTime,
    #[serde(default = "default_close_time")]
    pub close_time_of_day: NaiveTime,
}

impl Default for SessionCalendar {
    fn default() -> Self {
        Self {
            open_time_of_day: default_open_time(),
            close_time_of_day: default_close_time(),
        }
    }
}

impl SessionCalendar {
    /// Classify `reference_time` against this calendar.
    pub fn classify(&self, reference_time: NaiveDateTime) -> SessionState {
        classify_session(reference_time, self)
    }
}

/// The session is open iff `reference_time` lies in `[open, close]` of its
/// own date (both ends inclusive) and that date is not a Saturday or Sunday.
pub fn classify_session(reference_time: NaiveDateTime, calendar: &SessionCalendar) -> SessionState {
    if matches!(reference_time.weekday(), Weekday::Sat | Weekday::Sun) {
        return SessionState::Closed;
    }

    let date = reference_time.date();
    let open = date.and_time(whole_minute(calendar.open_time_of_day));
    let close = date.and_time(whole_minute(calendar.close_time_of_day));

    if reference_time >= open && reference_time <= close {
        SessionState::Open
    } else {
        SessionState::Closed
    }
}

fn whole_minute(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}

// =============================================================================
// WindowConfig
// =============================================================================

/// Lookback lengths as written in a config file, before bounds checks.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RawWindowConfig {
    #[serde(default = "default_minutes_when_open")]
    pub minutes_when_open: u32,
    #[serde(default = "default_minutes_when_closed")]
    pub minutes_when_closed: u32,
}

/// Lookback lengths in minutes for each session state.
///
/// Both lengths are in `1..=MAX_WINDOW_MINUTES`; the only way to obtain a
/// value (including through serde) is via [`WindowConfig::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawWindowConfig")]
pub struct WindowConfig {
    minutes_when_open: u32,
    minutes_when_closed: u32,
}

impl WindowConfig {
    pub fn new(minutes_when_open: u32, minutes_when_closed: u32) -> Result<Self> {
        for (name, minutes) in [
            ("minutes_when_open", minutes_when_open),
            ("minutes_when_closed", minutes_when_closed),
        ] {
            if minutes == 0 || minutes > MAX_WINDOW_MINUTES {
                bail!("{name} must be within 1..={MAX_WINDOW_MINUTES}, got {minutes}");
            }
        }
        Ok(Self {
            minutes_when_open,
            minutes_when_closed,
        })
    }

    pub fn minutes_when_open(&self) -> u32 {
        self.minutes_when_open
    }

    pub fn minutes_when_closed(&self) -> u32 {
        self.minutes_when_closed
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            minutes_when_open: default_minutes_when_open(),
            minutes_when_closed: default_minutes_when_closed(),
        }
    }
}

impl TryFrom<RawWindowConfig> for WindowConfig {
    type Error = anyhow::Error;

    fn try_from(raw: RawWindowConfig) -> Result<Self> {
        Self::new(raw.minutes_when_open, raw.minutes_when_closed)
    }
}

/// Lookback length for the given session state.
pub fn select_window_minutes(state: SessionState, config: &WindowConfig) -> u32 {
    match state {
        SessionState::Open => config.minutes_when_open,
        SessionState::Closed => config.minutes_when_closed,
    }
}
