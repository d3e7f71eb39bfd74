// =============================================================================
// Bar Size — ATR, previous / current bar range and position sizing
// =============================================================================
//
// Values are shown in price points or converted to ticks. With risk printing
// on, every row also shows how many contracts fit a fixed currency risk when
// the stop is placed the row's range (plus a few extra ticks) away:
//
//   contracts = max_risk / ((range / tick_size + add_ticks) * tick_cost)
//
// A zero range gives zero contracts.
// =============================================================================

use serde::Serialize;

use crate::market_data::Bar;
use crate::runtime_config::BarSizeParams;
use crate::types::SymbolSpec;

/// Width every label is padded to.
const COLUMN_WIDTH: usize = 15;

/// Price distance in display units.
pub fn to_display_units(points: f64, in_ticks: bool, tick_size: f64) -> f64 {
    if in_ticks {
        points / tick_size
    } else {
        points
    }
}

/// Contracts that can be traded for `max_risk` with a stop `range` points
/// (plus `add_ticks`) away.
pub fn risk_contracts(range: f64, symbol: &SymbolSpec, max_risk: f64, add_ticks: u32) -> f64 {
    if range <= 0.0 {
        return 0.0;
    }
    let risk_in_ticks = range / symbol.tick_size + f64::from(add_ticks);
    max_risk / (risk_in_ticks * symbol.tick_cost)
}

/// Raw inputs of one bar-size update, in price points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BarSizeSnapshot {
    pub atr: f64,
    pub previous_range: f64,
    pub current_range: f64,
}

impl BarSizeSnapshot {
    /// Missing bars or ATR read as zero.
    pub fn capture(current: Option<&Bar>, previous: Option<&Bar>, atr: Option<f64>) -> Self {
        Self {
            atr: atr.unwrap_or(0.0),
            previous_range: previous.map_or(0.0, Bar::range),
            current_range: current.map_or(0.0, Bar::range),
        }
    }

    /// Values of the two plotted line series: `(atr, true_range)`.
    pub fn series_values(&self, params: &BarSizeParams, symbol: &SymbolSpec) -> (f64, f64) {
        (
            to_display_units(self.atr, params.atr_in_ticks, symbol.tick_size),
            to_display_units(self.current_range, params.tr_in_ticks, symbol.tick_size),
        )
    }
}

/// Panel text, or `None` when every row is switched off.
pub fn render_bar_size(
    snapshot: &BarSizeSnapshot,
    params: &BarSizeParams,
    symbol: &SymbolSpec,
) -> Option<String> {
    if !params.print_atr && !params.print_previous_tr && !params.print_current_tr {
        return None;
    }

    let mut text = format!("{:<width$}", "BarSize", width = COLUMN_WIDTH);
    if params.print_risk {
        text.push_str(&format!("  Risk ${}", params.max_risk));
    }
    text.push('\n');

    let atr = to_display_units(snapshot.atr, params.atr_in_ticks, symbol.tick_size);
    let atr_label = if params.atr_in_ticks {
        format!("ATR[{}]: {atr:.1}", params.atr_period)
    } else {
        format!("ATR[{}]: {atr:.2}", params.atr_period)
    };

    let rows = [
        (params.print_atr, atr_label, snapshot.atr),
        (
            params.print_previous_tr,
            range_label("Previous", snapshot.previous_range, params, symbol),
            snapshot.previous_range,
        ),
        (
            params.print_current_tr,
            range_label("Current", snapshot.current_range, params, symbol),
            snapshot.current_range,
        ),
    ];

    for (enabled, label, range) in rows {
        if !enabled {
            continue;
        }
        text.push_str(&format!("{label:<width$}", width = COLUMN_WIDTH));
        if params.print_risk {
            let contracts = risk_contracts(range, symbol, params.max_risk, params.risk_add_ticks);
            text.push_str(&format!("|  {contracts:.1}"));
        }
        text.push('\n');
    }

    Some(text)
}

fn range_label(name: &str, range: f64, params: &BarSizeParams, symbol: &SymbolSpec) -> String {
    let value = to_display_units(range, params.tr_in_ticks, symbol.tick_size);
    if params.tr_in_ticks {
        format!("{name}: {value:.0}")
    } else {
        format!("{name}: {value:.2}")
    }
}
