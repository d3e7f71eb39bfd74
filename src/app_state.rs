// =============================================================================
// Overlay Engine — latest indicator values and the paint step
// =============================================================================
//
// Two entry points drive the engine:
//
//   on_bar_close(reference_time) — recompute Bar Speed from history
//   render(&snapshot, viewport)  — turn a snapshot into positioned overlays
//
// Each update builds a new immutable value and swaps it into its slot whole.
// Paint takes an `Arc` clone of each slot, so a reader never observes a
// half-written value and formatting runs without holding any lock.
//
// Thread safety:
//   - parking_lot::RwLock around each `Option<Arc<_>>` slot.
//   - AtomicU64 version bumped on every swap.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDateTime;
use parking_lot::RwLock;
use tracing::debug;

use crate::indicators::atr::AtrSource;
use crate::indicators::bar_size::{render_bar_size, BarSizeSnapshot};
use crate::indicators::bar_speed::{render_bar_speed, BarRateEstimator, BarSpeedReading};
use crate::market_data::{Bar, ChartFeed, ReferenceClock};
use crate::overlay::{TextOverlay, Viewport};
use crate::runtime_config::OverlayConfig;
use crate::types::Rgb;

/// Point-in-time view of everything the paint step needs.
#[derive(Debug, Clone, Default)]
pub struct FrameSnapshot {
    pub version: u64,
    pub bar_speed: Option<Arc<BarSpeedReading>>,
    pub bar_size: Option<Arc<BarSizeSnapshot>>,
}

pub struct OverlayEngine {
    config: OverlayConfig,
    feed: ChartFeed,
    estimator: BarRateEstimator,
    atr: Box<dyn AtrSource + Send + Sync>,

    bar_speed: RwLock<Option<Arc<BarSpeedReading>>>,
    bar_size: RwLock<Option<Arc<BarSizeSnapshot>>>,

    /// Incremented on every slot swap.
    version: AtomicU64,
}

impl OverlayEngine {
    pub fn new(config: OverlayConfig, feed: ChartFeed, atr: Box<dyn AtrSource + Send + Sync>) -> Self {
        let estimator = BarRateEstimator::new(config.bar_speed.session, config.bar_speed.windows);
        Self {
            config,
            feed,
            estimator,
            atr,
            bar_speed: RwLock::new(None),
            bar_size: RwLock::new(None),
            version: AtomicU64::new(0),
        }
    }

    // ── Updates ─────────────────────────────────────────────────────────

    /// Feed a forming-bar update and refresh the bar-size values.
    pub fn on_tick(&self, bar: Bar) {
        self.feed.push(bar);
        self.refresh_bar_size();
    }

    /// Feed a closed bar, then recompute every overlay.
    ///
    /// Returns the new Bar Speed reading, or `None` while the chart has no
    /// closed bar to use as the reference time.
    pub fn ingest_closed_bar(&self, bar: Bar) -> Option<Arc<BarSpeedReading>> {
        self.feed.push(bar);
        self.refresh_bar_size();
        let reference_time = self.feed.current_bar_reference_time()?;
        self.on_bar_close(reference_time)
    }

    /// Recompute Bar Speed for the bar closed at `reference_time`.
    ///
    /// Returns `None` when the overlay is disabled.
    pub fn on_bar_close(&self, reference_time: NaiveDateTime) -> Option<Arc<BarSpeedReading>> {
        if !self.config.bar_speed.enabled {
            return None;
        }
        let reading = Arc::new(self.estimator.on_bar_close(reference_time, &self.feed));
        *self.bar_speed.write() = Some(reading.clone());
        self.version.fetch_add(1, Ordering::Relaxed);
        Some(reading)
    }

    fn refresh_bar_size(&self) {
        if !self.config.bar_size.enabled {
            return;
        }
        let (current, previous) = self.feed.current_and_previous();
        let snapshot = BarSizeSnapshot::capture(
            current.as_ref(),
            previous.as_ref(),
            self.atr.current_atr(),
        );

        let (atr_series, tr_series) =
            snapshot.series_values(&self.config.bar_size, &self.config.symbol);
        debug!(atr = atr_series, tr = tr_series, "bar size update");

        *self.bar_size.write() = Some(Arc::new(snapshot));
        self.version.fetch_add(1, Ordering::Relaxed);
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            version: self.version.load(Ordering::Relaxed),
            bar_speed: self.bar_speed.read().clone(),
            bar_size: self.bar_size.read().clone(),
        }
    }

    /// Positioned overlays for one paint. Pure with respect to `snapshot`.
    pub fn render(&self, snapshot: &FrameSnapshot, viewport: Viewport) -> Vec<(TextOverlay, i32, i32)> {
        let mut overlays = Vec::with_capacity(2);

        if let Some(snap) = &snapshot.bar_size {
            let params = &self.config.bar_size;
            if let Some(text) = render_bar_size(snap, params, &self.config.symbol) {
                overlays.push(TextOverlay::styled(text, &params.style));
            }
        }

        if let Some(reading) = &snapshot.bar_speed {
            let style = &self.config.bar_speed.style;
            let overlay = TextOverlay::styled(render_bar_speed(reading), style);
            let overlay = match reading.as_ref() {
                BarSpeedReading::Advisory(_) => overlay.with_color(Rgb::RED),
                BarSpeedReading::Sample(_) => overlay,
            };
            overlays.push(overlay);
        }

        overlays
            .into_iter()
            .map(|o| {
                let (x, y) = o.position(viewport);
                (o, x, y)
            })
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    use crate::indicators::bar_speed::{Advisory, UNSUPPORTED_AGGREGATION_MESSAGE};
    use crate::market_data::{BarBuffer, SeriesKey};
    use crate::session::WindowConfig;
    use crate::types::Aggregation;

    struct FixedAtr(Option<f64>);

    impl AtrSource for FixedAtr {
        fn current_atr(&self) -> Option<f64> {
            self.0
        }
    }

    fn t0() -> NaiveDateTime {
        // Wednesday, inside the default 09:30-17:00 session.
        NaiveDate::from_ymd_opt(2024, 3, 13)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn bar(offset_secs: i64, is_closed: bool) -> Bar {
        let time_left = t0() + Duration::seconds(offset_secs);
        Bar {
            time_left,
            time_right: time_left + Duration::seconds(4),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.0,
            ticks: 500,
            is_closed,
        }
    }

    fn engine(aggregation: Aggregation) -> OverlayEngine {
        let config = OverlayConfig {
            aggregation,
            ..OverlayConfig::default()
        };
        let feed = ChartFeed::new(
            Arc::new(BarBuffer::new(1_000)),
            SeriesKey::new(config.symbol.name.clone(), aggregation),
        );
        OverlayEngine::new(config, feed, Box::new(FixedAtr(Some(10.0))))
    }

    #[test]
    fn nothing_to_draw_before_first_update() {
        let engine = engine(Aggregation::Tick(500));
        let snap = engine.snapshot();
        assert_eq!(snap.version, 0);
        assert!(engine.render(&snap, Viewport { width: 800, height: 600 }).is_empty());
    }

    #[test]
    fn bar_close_replaces_reading() {
        let engine = engine(Aggregation::Tick(500));
        // 120 bars, one every 5 seconds, ending at t0 + 595s.
        for i in 0..120 {
            engine.ingest_closed_bar(bar(i * 5, true));
        }
        let first = engine.snapshot();
        let reading = first.bar_speed.clone().unwrap();
        match reading.as_ref() {
            BarSpeedReading::Sample(s) => {
                assert_eq!(s.window_minutes, 10);
                assert_eq!(s.bar_count, 120);
                assert_eq!(s.bars_per_minute, 12.0);
                assert_eq!(s.avg_bar_duration_secs, 5.0);
            }
            other => panic!("unexpected reading {other:?}"),
        }

        engine.ingest_closed_bar(bar(600, true));
        let second = engine.snapshot();
        assert!(second.version > first.version);
        // The earlier snapshot still holds its own value.
        assert!(!Arc::ptr_eq(&reading, second.bar_speed.as_ref().unwrap()));
    }

    #[test]
    fn render_places_both_panels() {
        let engine = engine(Aggregation::Tick(500));
        for i in 0..120 {
            engine.ingest_closed_bar(bar(i * 5, true));
        }
        let overlays = engine.render(&engine.snapshot(), Viewport { width: 1280, height: 720 });
        assert_eq!(overlays.len(), 2);

        let (size, x, y) = &overlays[0];
        assert!(size.text.starts_with("BarSize"));
        assert_eq!((*x, *y), (1050, 10));

        let (speed, x, y) = &overlays[1];
        assert_eq!(speed.text, "BAR SPEED [last 10m]\n1 bar = 5s\n1 min = 12 bars");
        assert_eq!(speed.color, Rgb::LIGHT_GRAY);
        assert_eq!((*x, *y), (1050, 100));
    }

    #[test]
    fn time_chart_draws_red_advisory() {
        let engine = engine(Aggregation::Time(60));
        let reading = engine.ingest_closed_bar(bar(0, true)).unwrap();
        assert_eq!(
            *reading,
            BarSpeedReading::Advisory(Advisory::UnsupportedAggregation(Aggregation::Time(60)))
        );
        let overlays = engine.render(&engine.snapshot(), Viewport { width: 800, height: 600 });
        let (speed, _, _) = overlays.last().unwrap();
        assert_eq!(speed.text, UNSUPPORTED_AGGREGATION_MESSAGE);
        assert_eq!(speed.color, Rgb::RED);
    }

    #[test]
    fn forming_bar_updates_size_but_not_speed() {
        let engine = engine(Aggregation::Tick(500));
        engine.on_tick(bar(0, false));
        let snap = engine.snapshot();
        assert!(snap.bar_speed.is_none());
        let size = snap.bar_size.unwrap();
        assert_eq!(size.current_range, 2.0);
        assert_eq!(size.atr, 10.0);
    }

    #[test]
    fn long_window_counts_more_bars_than_max_bars() {
        let mut config = OverlayConfig::default();
        config.bar_speed.windows = WindowConfig::new(10, 500).unwrap();
        let feed = ChartFeed::new(
            Arc::new(BarBuffer::new(config.max_bars)),
            SeriesKey::new(config.symbol.name.clone(), config.aggregation),
        );
        let engine = OverlayEngine::new(config, feed, Box::new(FixedAtr(None)));

        // Saturday: the 500-minute closed-session window applies.
        let saturday = NaiveDate::from_ymd_opt(2024, 3, 16)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut last = None;
        for i in 0..=30_000 {
            let time_left = saturday + Duration::seconds(i);
            last = engine.ingest_closed_bar(Bar {
                time_left,
                time_right: time_left,
                ..bar(0, true)
            });
        }

        match last.unwrap().as_ref() {
            BarSpeedReading::Sample(s) => {
                assert_eq!(s.window_minutes, 500);
                assert_eq!(s.bar_count, 30_001);
                assert_eq!(s.bars_per_minute, 60.0);
                assert_eq!(s.avg_bar_duration_secs, 1.0);
            }
            other => panic!("unexpected reading {other:?}"),
        }
    }

    #[test]
    fn disabled_bar_speed_produces_no_reading() {
        let mut config = OverlayConfig::default();
        config.bar_speed.enabled = false;
        let feed = ChartFeed::new(
            Arc::new(BarBuffer::new(10)),
            SeriesKey::new(config.symbol.name.clone(), config.aggregation),
        );
        let engine = OverlayEngine::new(config, feed, Box::new(FixedAtr(None)));
        assert!(engine.ingest_closed_bar(bar(0, true)).is_none());
        assert!(engine.snapshot().bar_speed.is_none());
    }
}
