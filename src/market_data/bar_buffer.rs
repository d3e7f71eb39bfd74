use std::collections::{HashMap, VecDeque};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDateTime};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::session::MAX_WINDOW_MINUTES;
use crate::types::Aggregation;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLC bar of chart history. Times are exchange-local.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Time of the first trade in the bar.
    pub time_left: NaiveDateTime,
    /// Time of the last trade in the bar.
    pub time_right: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Number of trade ticks aggregated into the bar.
    #[serde(default)]
    pub ticks: u64,
    #[serde(default = "default_closed")]
    pub is_closed: bool,
}

fn default_closed() -> bool {
    true
}

impl Bar {
    /// High minus low.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Composite key that identifies a unique bar series.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SeriesKey {
    pub symbol: String,
    pub aggregation: Aggregation,
}

impl SeriesKey {
    pub fn new(symbol: impl Into<String>, aggregation: Aggregation) -> Self {
        Self {
            symbol: symbol.into(),
            aggregation,
        }
    }
}

impl std::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.aggregation)
    }
}

// ---------------------------------------------------------------------------
// BarBuffer -- thread-safe ring buffer per (symbol, aggregation)
// ---------------------------------------------------------------------------

/// Bars of one series in open-time order, forming bar (if any) last.
#[derive(Debug, Default)]
struct Series {
    bars: VecDeque<Bar>,
    /// Open time of the newest bar ever trimmed from the front.
    evicted_through: Option<NaiveDateTime>,
}

impl Series {
    /// Number of leading bars that are closed. Only the last bar can be forming.
    fn closed_len(&self) -> usize {
        match self.bars.back() {
            Some(last) if !last.is_closed => self.bars.len() - 1,
            _ => self.bars.len(),
        }
    }
}

/// Ring buffer holding the recent bars per series. The forming bar is
/// updated in place until it closes.
///
/// Closed bars are trimmed from the front only when the series holds more
/// than `max_bars` AND the front bar opened more than `retention` before the
/// newest closed bar. Every bar inside the retention horizon is kept no
/// matter how many there are, so range counts over any lookback window up to
/// `retention` stay exact.
pub struct BarBuffer {
    buffers: RwLock<HashMap<SeriesKey, Series>>,
    max_bars: usize,
    retention: Duration,
}

impl BarBuffer {
    /// Buffer that retains at least the longest lookback window accepted by
    /// the bar-speed estimator.
    pub fn new(max_bars: usize) -> Self {
        Self::with_retention(max_bars, Duration::minutes(i64::from(MAX_WINDOW_MINUTES)))
    }

    pub fn with_retention(max_bars: usize, retention: Duration) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            max_bars,
            retention,
        }
    }

    /// Insert or replace the latest bar for `key`.
    ///
    /// A bar with the same `time_left` as a still-forming last bar replaces
    /// it. Closed bars trigger trimming of bars past the retention horizon.
    pub fn update(&self, key: SeriesKey, bar: Bar) {
        let mut map = self.buffers.write();
        let series = map.entry(key).or_default();
        let ring = &mut series.bars;

        if let Some(last) = ring.back() {
            if !last.is_closed && last.time_left == bar.time_left {
                ring.pop_back();
            }
        }

        let closed = bar.is_closed;
        let horizon = bar.time_left - self.retention;
        ring.push_back(bar);
        if closed {
            while ring.len() > self.max_bars {
                match ring.front() {
                    Some(front) if front.time_left < horizon => {
                        series.evicted_through = Some(front.time_left);
                        ring.pop_front();
                    }
                    _ => break,
                }
            }
        }
    }

    /// The most recent `count` bars, forming bar included, oldest first.
    pub fn get_recent(&self, key: &SeriesKey, count: usize) -> Vec<Bar> {
        let map = self.buffers.read();
        match map.get(key) {
            Some(series) => {
                let start = series.bars.len().saturating_sub(count);
                series.bars.iter().skip(start).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Most recent bar (forming or closed) and the bar before it.
    pub fn current_and_previous(&self, key: &SeriesKey) -> (Option<Bar>, Option<Bar>) {
        let map = self.buffers.read();
        match map.get(key) {
            Some(series) => {
                let mut rev = series.bars.iter().rev();
                let current = rev.next().cloned();
                let previous = rev.next().cloned();
                (current, previous)
            }
            None => (None, None),
        }
    }

    /// Open time of the most recent closed bar.
    pub fn last_closed_time(&self, key: &SeriesKey) -> Option<NaiveDateTime> {
        let map = self.buffers.read();
        map.get(key)
            .and_then(|series| series.bars.iter().rev().find(|b| b.is_closed).map(|b| b.time_left))
    }

    /// Number of closed bars whose open time lies in `[from, to]`.
    ///
    /// Logs a warning when bars inside the range have already been trimmed,
    /// since the count is then a lower bound.
    pub fn count_closed_in_range(
        &self,
        key: &SeriesKey,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> usize {
        let map = self.buffers.read();
        let Some(series) = map.get(key) else {
            return 0;
        };

        if let Some(evicted) = series.evicted_through {
            if evicted >= from {
                warn!(
                    series = %key,
                    from = %from,
                    evicted_through = %evicted,
                    "range starts before the oldest retained bar, count is incomplete"
                );
            }
        }

        let closed = series.closed_len();
        let lo = series.bars.partition_point(|b| b.time_left < from).min(closed);
        let hi = series.bars.partition_point(|b| b.time_left <= to).min(closed);
        hi.saturating_sub(lo)
    }

    /// Whether bars opening at or after `from` have been trimmed for `key`.
    #[cfg(test)]
    pub fn is_truncated_from(&self, key: &SeriesKey, from: NaiveDateTime) -> bool {
        let map = self.buffers.read();
        map.get(key)
            .and_then(|series| series.evicted_through)
            .is_some_and(|evicted| evicted >= from)
    }

    /// Total number of bars (including any forming bar) stored for `key`.
    #[cfg(test)]
    pub fn count(&self, key: &SeriesKey) -> usize {
        let map = self.buffers.read();
        map.get(key).map_or(0, |series| series.bars.len())
    }
}

// ---------------------------------------------------------------------------
// Bar history files
// ---------------------------------------------------------------------------

/// Load a JSON array of bars, sorted by open time.
pub fn load_bars(path: impl AsRef<Path>) -> Result<Vec<Bar>> {
    let path = path.as_ref();

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read bar history from {}", path.display()))?;

    let mut bars = parse_bars(&content)
        .with_context(|| format!("failed to parse bar history from {}", path.display()))?;
    bars.sort_by_key(|b| b.time_left);

    info!(path = %path.display(), count = bars.len(), "bar history loaded");
    Ok(bars)
}

fn parse_bars(text: &str) -> Result<Vec<Bar>> {
    let bars: Vec<Bar> = serde_json::from_str(text).context("invalid bar JSON")?;
    for bar in &bars {
        if bar.high < bar.low {
            anyhow::bail!("bar at {} has high {} below low {}", bar.time_left, bar.high, bar.low);
        }
        if bar.time_right < bar.time_left {
            anyhow::bail!("bar at {} ends before it starts", bar.time_left);
        }
    }
    debug!(count = bars.len(), "parsed bars");
    Ok(bars)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 13)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn sample_bar(offset_secs: i64, close: f64, is_closed: bool) -> Bar {
        let time_left = t0() + Duration::seconds(offset_secs);
        Bar {
            time_left,
            time_right: time_left + Duration::seconds(4),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            ticks: 500,
            is_closed,
        }
    }

    fn make_key(sym: &str) -> SeriesKey {
        SeriesKey::new(sym, Aggregation::Tick(500))
    }

    #[test]
    fn ring_buffer_trimming() {
        let buf = BarBuffer::with_retention(3, Duration::zero());
        let key = make_key("MNQ");

        for i in 0..5 {
            buf.update(key.clone(), sample_bar(i * 5, 100.0 + i as f64, true));
        }

        assert_eq!(buf.count(&key), 3);
        let closes: Vec<f64> = buf.get_recent(&key, 10).iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![102.0, 103.0, 104.0]);

        let last_two: Vec<f64> = buf.get_recent(&key, 2).iter().map(|b| b.close).collect();
        assert_eq!(last_two, vec![103.0, 104.0]);
    }

    #[test]
    fn bars_inside_retention_survive_max_bars() {
        // Far more bars inside the retention horizon than max_bars allows.
        let buf = BarBuffer::with_retention(100, Duration::minutes(5));
        let key = make_key("MNQ");
        for i in 0..=600 {
            buf.update(key.clone(), sample_bar(i, 100.0, true));
        }

        // Bars older than 600s - 300s were trimmed, everything newer kept.
        assert_eq!(buf.count(&key), 301);
        let to = t0() + Duration::seconds(600);
        let from = to - Duration::minutes(5);
        assert_eq!(buf.count_closed_in_range(&key, from, to), 301);
        assert!(!buf.is_truncated_from(&key, from));
        assert!(buf.is_truncated_from(&key, from - Duration::seconds(1)));
    }

    #[test]
    fn default_retention_covers_longest_window() {
        let buf = BarBuffer::new(20_000);
        let key = make_key("MNQ");
        for i in 0..=30_000 {
            buf.update(key.clone(), sample_bar(i, 100.0, true));
        }
        let to = t0() + Duration::seconds(30_000);
        let from = to - Duration::minutes(i64::from(MAX_WINDOW_MINUTES));
        assert_eq!(buf.count_closed_in_range(&key, from, to), 30_001);
    }

    #[test]
    fn in_progress_replacement() {
        let buf = BarBuffer::new(10);
        let key = make_key("MES");

        buf.update(key.clone(), sample_bar(0, 50.0, false));
        buf.update(key.clone(), sample_bar(0, 51.0, false));
        assert_eq!(buf.count(&key), 1);
        assert_eq!(buf.last_closed_time(&key), None);

        buf.update(key.clone(), sample_bar(0, 52.0, true));
        assert_eq!(buf.count(&key), 1);
        assert_eq!(buf.last_closed_time(&key), Some(t0()));
    }

    #[test]
    fn range_count_is_inclusive_and_skips_forming_bar() {
        let buf = BarBuffer::new(100);
        let key = make_key("MNQ");
        for i in 0..10 {
            buf.update(key.clone(), sample_bar(i * 60, 100.0, true));
        }
        buf.update(key.clone(), sample_bar(600, 100.0, false));

        let from = t0() + Duration::seconds(60);
        let to = t0() + Duration::seconds(300);
        // Bars at 60, 120, 180, 240, 300.
        assert_eq!(buf.count_closed_in_range(&key, from, to), 5);

        let all = buf.count_closed_in_range(&key, t0(), t0() + Duration::hours(1));
        assert_eq!(all, 10);
    }

    #[test]
    fn current_and_previous_bars() {
        let buf = BarBuffer::new(10);
        let key = make_key("MNQ");
        assert_eq!(buf.current_and_previous(&key), (None, None));

        buf.update(key.clone(), sample_bar(0, 100.0, true));
        buf.update(key.clone(), sample_bar(5, 101.0, false));
        let (current, previous) = buf.current_and_previous(&key);
        assert_eq!(current.unwrap().close, 101.0);
        assert_eq!(previous.unwrap().close, 100.0);
    }

    #[test]
    fn series_are_isolated_by_aggregation() {
        let buf = BarBuffer::new(10);
        let tick = make_key("MNQ");
        let minute = SeriesKey::new("MNQ", Aggregation::Time(60));
        buf.update(tick.clone(), sample_bar(0, 100.0, true));
        assert_eq!(buf.count(&tick), 1);
        assert_eq!(buf.count(&minute), 0);
    }

    #[test]
    fn parse_bars_ok() {
        let json = r#"[
            { "time_left": "2024-03-13T10:00:00", "time_right": "2024-03-13T10:00:04",
              "open": 18000.0, "high": 18002.5, "low": 17999.75, "close": 18001.0, "ticks": 500 }
        ]"#;
        let bars = parse_bars(json).expect("should parse");
        assert_eq!(bars.len(), 1);
        assert!(bars[0].is_closed);
        assert_eq!(bars[0].ticks, 500);
        assert!((bars[0].range() - 2.75).abs() < 1e-9);
    }

    #[test]
    fn parse_bars_rejects_inverted_range() {
        let json = r#"[
            { "time_left": "2024-03-13T10:00:00", "time_right": "2024-03-13T10:00:04",
              "open": 1.0, "high": 1.0, "low": 2.0, "close": 1.0 }
        ]"#;
        assert!(parse_bars(json).is_err());
    }
}
