// =============================================================================
// History access contracts
// =============================================================================
//
// Indicators never touch the bar store directly. They see the chart through
// two narrow contracts: a history provider that answers range-count queries
// for the active series, and a reference clock that reports the open time of
// the latest fully closed bar.
// =============================================================================

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::market_data::bar_buffer::{Bar, BarBuffer, SeriesKey};
use crate::types::Aggregation;

/// Range queries against chart history.
pub trait HistoryProvider {
    /// Symbol of the chart the indicator is attached to.
    fn active_symbol(&self) -> &str;

    /// Aggregation of the chart the indicator is attached to.
    fn current_aggregation(&self) -> Aggregation;

    /// Number of closed bars whose open time lies in `[from, to]`.
    /// Returns 0 when the provider has no data for the window.
    fn count_bars_in_range(
        &self,
        symbol: &str,
        aggregation: &Aggregation,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> usize;
}

/// Source of the reference instant for bar-close computations.
pub trait ReferenceClock {
    /// Open time of the latest fully closed bar (never the forming one).
    fn current_bar_reference_time(&self) -> Option<NaiveDateTime>;
}

/// View of one series in a shared [`BarBuffer`].
#[derive(Clone)]
pub struct ChartFeed {
    buffer: Arc<BarBuffer>,
    key: SeriesKey,
}

impl ChartFeed {
    pub fn new(buffer: Arc<BarBuffer>, key: SeriesKey) -> Self {
        Self { buffer, key }
    }

    pub fn push(&self, bar: Bar) {
        self.buffer.update(self.key.clone(), bar);
    }

    pub fn recent_bars(&self, count: usize) -> Vec<Bar> {
        self.buffer.get_recent(&self.key, count)
    }

    pub fn current_and_previous(&self) -> (Option<Bar>, Option<Bar>) {
        self.buffer.current_and_previous(&self.key)
    }
}

impl HistoryProvider for ChartFeed {
    fn active_symbol(&self) -> &str {
        &self.key.symbol
    }

    fn current_aggregation(&self) -> Aggregation {
        self.key.aggregation
    }

    fn count_bars_in_range(
        &self,
        symbol: &str,
        aggregation: &Aggregation,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> usize {
        let key = SeriesKey::new(symbol, *aggregation);
        self.buffer.count_closed_in_range(&key, from, to)
    }
}

impl ReferenceClock for ChartFeed {
    fn current_bar_reference_time(&self) -> Option<NaiveDateTime> {
        self.buffer.last_closed_time(&self.key)
    }
}
