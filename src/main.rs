// =============================================================================
// Chart Overlays — Replay Entry Point
// =============================================================================
//
// Replays a recorded bar history through the overlay engine the way a chart
// host would: every bar close is followed by a repaint, and the rendered
// panels are written to the log.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod app_state;
mod driver;
mod indicators;
mod market_data;
mod overlay;
mod runtime_config;
mod session;
mod types;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::OverlayEngine;
use crate::indicators::atr::BarAtr;
use crate::market_data::{load_bars, BarBuffer, ChartFeed, SeriesKey};
use crate::overlay::{LogSink, Viewport};
use crate::runtime_config::OverlayConfig;

/// Chart area assumed when laying out the replayed panels.
const REPLAY_VIEWPORT: Viewport = Viewport {
    width: 1280,
    height: 720,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path =
        std::env::var("OVERLAY_CONFIG").unwrap_or_else(|_| "overlay_config.json".into());
    let mut config = OverlayConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        OverlayConfig::default()
    });

    // Leave an editable copy of the defaults behind on first run.
    if !std::path::Path::new(&config_path).exists() {
        if let Err(e) = config.save(&config_path) {
            warn!(error = %e, "Failed to write default config");
        }
    }

    if let Ok(symbol) = std::env::var("OVERLAY_SYMBOL") {
        let symbol = symbol.trim().to_uppercase();
        if !symbol.is_empty() {
            config.symbol.name = symbol;
        }
    }

    info!(
        symbol = %config.symbol.name,
        aggregation = %config.aggregation,
        open_window = config.bar_speed.windows.minutes_when_open(),
        closed_window = config.bar_speed.windows.minutes_when_closed(),
        "Overlay replay starting"
    );

    // ── 2. History ───────────────────────────────────────────────────────
    let bars_path = std::env::var("OVERLAY_BARS").unwrap_or_else(|_| "bars.json".into());
    let bars = load_bars(&bars_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load bar history, replaying nothing");
        Vec::new()
    });

    let buffer = Arc::new(BarBuffer::new(config.max_bars));
    let key = SeriesKey::new(config.symbol.name.clone(), config.aggregation);
    info!(series = %key, bars = bars.len(), "Replaying history");
    let feed = ChartFeed::new(buffer, key);
    let atr = BarAtr::new(
        feed.clone(),
        config.bar_size.atr_period,
        config.bar_size.atr_smoothing,
    );

    // ── 3. Engine & event loop ───────────────────────────────────────────
    let engine = OverlayEngine::new(config, feed, Box::new(atr));

    let (tx, rx) = mpsc::channel(driver::EVENT_CHANNEL_CAPACITY);
    let producer = tokio::spawn(driver::replay_bars(bars, REPLAY_VIEWPORT, tx));

    let mut sink = LogSink;
    let frames = driver::run_event_loop(&engine, rx, &mut sink).await;

    producer.await.context("bar replay task panicked")??;

    info!(frames, "Overlay replay finished");
    Ok(())
}
