// =============================================================================
// Average True Range (ATR) — host-side reference source
// =============================================================================
//
// The bar-size panel reads ATR from whatever the host chart provides through
// the `AtrSource` contract. `BarAtr` is the in-process stand-in used by the
// replay binary.
//
// True Range (TR) for each bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// Smoothing:
//   Sma    — mean of the last `period` TR values (the chart default)
//   Wilder — ATR_0 = SMA of first `period` TR values,
//            ATR_t = (ATR_{t-1} * (period - 1) + TR_t) / period
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::market_data::{Bar, ChartFeed};

/// Anything that can report the ATR of the active chart, in price points.
pub trait AtrSource {
    fn current_atr(&self) -> Option<f64>;
}

/// Moving-average mode applied to the true-range series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtrSmoothing {
    Sma,
    Wilder,
}

impl Default for AtrSmoothing {
    fn default() -> Self {
        Self::Sma
    }
}

/// Compute the most recent ATR value from bars (oldest first).
///
/// # Returns
/// `None` when:
/// - `period` is zero.
/// - There are fewer than `period + 1` bars.
/// - The result is non-finite.
pub fn calculate_atr(bars: &[Bar], period: usize, smoothing: AtrSmoothing) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }

    let tr_values: Vec<f64> = bars
        .windows(2)
        .map(|pair| {
            let (prev, bar) = (&pair[0], &pair[1]);
            let hc = (bar.high - prev.close).abs();
            let lc = (bar.low - prev.close).abs();
            bar.range().max(hc).max(lc)
        })
        .collect();

    let atr = match smoothing {
        AtrSmoothing::Sma => {
            let tail = &tr_values[tr_values.len() - period..];
            tail.iter().sum::<f64>() / period as f64
        }
        AtrSmoothing::Wilder => {
            let period_f = period as f64;
            let mut atr = tr_values[..period].iter().sum::<f64>() / period_f;
            for &tr in &tr_values[period..] {
                atr = (atr * (period_f - 1.0) + tr) / period_f;
            }
            atr
        }
    };

    if atr.is_finite() {
        Some(atr)
    } else {
        None
    }
}

/// ATR over the most recent bars of a chart feed, forming bar included.
pub struct BarAtr {
    feed: ChartFeed,
    period: usize,
    smoothing: AtrSmoothing,
}

impl BarAtr {
    pub fn new(feed: ChartFeed, period: usize, smoothing: AtrSmoothing) -> Self {
        Self {
            feed,
            period,
            smoothing,
        }
    }
}

impl AtrSource for BarAtr {
    fn current_atr(&self) -> Option<f64> {
        let bars = self.feed.recent_bars(self.period * 4 + 1);
        calculate_atr(&bars, self.period, self.smoothing)
    }
}
