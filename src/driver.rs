// =============================================================================
// Chart Event Driver — single-consumer update / paint loop
// =============================================================================
//
// The host chart delivers three kinds of events: forming-bar ticks, bar
// closes and paint requests. They all arrive on one channel and are handled
// one at a time, so an update never overlaps a paint and each paint sees the
// values from the most recent completed update.
// =============================================================================

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::app_state::OverlayEngine;
use crate::market_data::Bar;
use crate::overlay::{OverlaySink, Viewport};

/// Capacity of the chart event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 1_024;

#[derive(Debug, Clone)]
pub enum ChartEvent {
    /// The forming bar changed.
    Tick(Bar),
    /// A bar closed.
    BarClosed(Bar),
    /// The chart needs repainting.
    Paint(Viewport),
}

/// Drain `events` until every sender is dropped. Returns the number of
/// frames painted.
pub async fn run_event_loop<S: OverlaySink>(
    engine: &OverlayEngine,
    mut events: mpsc::Receiver<ChartEvent>,
    sink: &mut S,
) -> usize {
    let mut frames = 0usize;

    while let Some(event) = events.recv().await {
        match event {
            ChartEvent::Tick(bar) => engine.on_tick(bar),
            ChartEvent::BarClosed(bar) => {
                let time_left = bar.time_left;
                debug!(
                    time_left = %time_left,
                    ticks = bar.ticks,
                    range = bar.range(),
                    "bar closed"
                );
                if engine.ingest_closed_bar(bar).is_none() {
                    debug!(time_left = %time_left, "bar closed without a bar speed reading");
                }
            }
            ChartEvent::Paint(viewport) => {
                let snapshot = engine.snapshot();
                debug!(version = snapshot.version, "paint");
                for (overlay, x, y) in engine.render(&snapshot, viewport) {
                    sink.draw(&overlay, x, y);
                }
                frames += 1;
            }
        }
    }

    info!(frames, "chart event stream ended");
    frames
}

/// Send every bar as a close followed by a repaint.
pub async fn replay_bars(
    bars: Vec<Bar>,
    viewport: Viewport,
    events: mpsc::Sender<ChartEvent>,
) -> Result<()> {
    for bar in bars {
        events
            .send(ChartEvent::BarClosed(bar))
            .await
            .context("chart event loop closed")?;
        events
            .send(ChartEvent::Paint(viewport))
            .await
            .context("chart event loop closed")?;
    }
    Ok(())
}
