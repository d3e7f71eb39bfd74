// =============================================================================
// Bar Speed — empirical bar duration and bars-per-minute for tick charts
// =============================================================================
//
// For tick-aggregated charts bar duration is not fixed. This indicator looks
// back over a trailing window ending at the latest closed bar and reports:
//
//   bars_per_minute       = round1(bar_count / window_minutes)
//   avg_bar_duration_secs = round1(window_minutes * 60 / bar_count)   (0 if no bars)
//
// The window length depends on whether the market session is open.
//
// Duration is the window length divided by the bar count, not the elapsed
// time between the first and last bar in the window. When the window edge
// falls inside a bar the figure is slightly off; this is the accepted
// approximation.
//
// Rounding is half-to-even at one decimal.
// =============================================================================

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use tracing::debug;

use crate::market_data::HistoryProvider;
use crate::session::{select_window_minutes, SessionCalendar, WindowConfig};
use crate::types::{Aggregation, SessionState};

/// Shown in place of the whole panel on non-tick charts.
pub const UNSUPPORTED_AGGREGATION_MESSAGE: &str =
    "The Bar Speed Indicator\nonly works on Tick Charts";

/// Shown in place of the rate lines when the window holds no bars.
pub const INSUFFICIENT_DATA_MESSAGE: &str = "Interval does not contain enough bars";

// =============================================================================
// Readings
// =============================================================================

/// One bar-rate measurement. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarRateSample {
    pub reference_time: NaiveDateTime,
    pub window_minutes: u32,
    pub bar_count: usize,
    pub bars_per_minute: f64,
    pub avg_bar_duration_secs: f64,
}

impl BarRateSample {
    pub fn has_bars(&self) -> bool {
        self.bar_count > 0
    }
}

/// Conditions reported to the user instead of a rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Advisory {
    /// The chart is not tick-aggregated.
    UnsupportedAggregation(Aggregation),
}

impl Advisory {
    pub fn message(&self) -> &'static str {
        match self {
            Self::UnsupportedAggregation(_) => UNSUPPORTED_AGGREGATION_MESSAGE,
        }
    }
}

/// Outcome of one bar-close update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BarSpeedReading {
    Sample(BarRateSample),
    Advisory(Advisory),
}

// =============================================================================
// Computation
// =============================================================================

/// Round to one decimal, ties to even.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

/// Measure the bar rate over the `window_minutes` ending at `reference_time`.
///
/// `window_minutes` must be at least 1 (guaranteed by [`WindowConfig`]).
/// Non-tick charts yield [`Advisory::UnsupportedAggregation`] without
/// querying history.
pub fn compute_rate<P: HistoryProvider + ?Sized>(
    reference_time: NaiveDateTime,
    window_minutes: u32,
    provider: &P,
) -> BarSpeedReading {
    let aggregation = provider.current_aggregation();
    if !aggregation.is_tick() {
        return BarSpeedReading::Advisory(Advisory::UnsupportedAggregation(aggregation));
    }

    let window_start = reference_time - Duration::minutes(i64::from(window_minutes));
    let bar_count = provider.count_bars_in_range(
        provider.active_symbol(),
        &aggregation,
        window_start,
        reference_time,
    );

    let minutes = f64::from(window_minutes);
    let window_secs = minutes * 60.0;
    let bars = bar_count as f64;

    let bars_per_minute = round1(bars / minutes);
    let avg_bar_duration_secs = if bar_count > 0 {
        round1(window_secs / bars)
    } else {
        0.0
    };

    BarSpeedReading::Sample(BarRateSample {
        reference_time,
        window_minutes,
        bar_count,
        bars_per_minute,
        avg_bar_duration_secs,
    })
}

/// `"45s"`, `"1m"`, `"1m 30s"`, `"2m 5s"`.
///
/// Durations of a minute or more show whole minutes, plus the whole-second
/// remainder when it is at least one second. Shorter durations keep their
/// fractional part (`"12.5s"`).
pub fn format_duration(seconds: f64) -> String {
    if seconds >= 60.0 {
        let minutes = (seconds / 60.0).floor();
        let remainder = (seconds.trunc() as i64) % 60;
        if remainder >= 1 {
            format!("{minutes}m {remainder}s")
        } else {
            format!("{minutes}m")
        }
    } else {
        format!("{seconds}s")
    }
}

/// Three-line panel text for a reading.
pub fn render_bar_speed(reading: &BarSpeedReading) -> String {
    let sample = match reading {
        BarSpeedReading::Advisory(advisory) => return advisory.message().to_string(),
        BarSpeedReading::Sample(sample) => sample,
    };

    let mut text = format!("BAR SPEED [last {}m]\n", sample.window_minutes);
    if !sample.has_bars() {
        text.push_str(INSUFFICIENT_DATA_MESSAGE);
        return text;
    }

    let plural = if sample.bars_per_minute >= 2.0 { "s" } else { "" };
    text.push_str(&format!(
        "1 bar = {}\n1 min = {} bar{plural}",
        format_duration(sample.avg_bar_duration_secs),
        sample.bars_per_minute,
    ));
    text
}

// =============================================================================
// Estimator
// =============================================================================

/// Session-aware bar-rate estimator.
#[derive(Debug, Clone)]
pub struct BarRateEstimator {
    calendar: SessionCalendar,
    windows: WindowConfig,
}

impl BarRateEstimator {
    pub fn new(calendar: SessionCalendar, windows: WindowConfig) -> Self {
        Self { calendar, windows }
    }

    /// Session state and lookback length applicable at `reference_time`.
    pub fn window_for(&self, reference_time: NaiveDateTime) -> (SessionState, u32) {
        let state = self.calendar.classify(reference_time);
        (state, select_window_minutes(state, &self.windows))
    }

    /// Produce a fresh reading for the bar that closed at `reference_time`.
    pub fn on_bar_close<P: HistoryProvider + ?Sized>(
        &self,
        reference_time: NaiveDateTime,
        provider: &P,
    ) -> BarSpeedReading {
        let (session, window_minutes) = self.window_for(reference_time);
        let reading = compute_rate(reference_time, window_minutes, provider);

        match &reading {
            BarSpeedReading::Sample(s) => debug!(
                reference_time = %s.reference_time,
                session = %session,
                window_minutes = s.window_minutes,
                bar_count = s.bar_count,
                bars_per_minute = s.bars_per_minute,
                avg_bar_duration_secs = s.avg_bar_duration_secs,
                "bar speed sample"
            ),
            BarSpeedReading::Advisory(advisory) => debug!(
                reference_time = %reference_time,
                advisory = ?advisory,
                "bar speed unavailable"
            ),
        }

        reading
    }
}
