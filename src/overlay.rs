// =============================================================================
// Text Overlays — what gets drawn on the chart and where
// =============================================================================
//
// Indicators produce plain strings. This module wraps them with placement
// and font information and hands them to an `OverlaySink`, which owns the
// actual pixel rendering.
// =============================================================================

use serde::Serialize;
use tracing::info;

use crate::runtime_config::OverlayStyle;
use crate::types::{Anchor, Rgb};

/// Monospace face keeps the padded columns aligned.
pub const FONT_FAMILY: &str = "Consolas";

/// Chart drawing area in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Viewport {
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FontSpec {
    pub family: &'static str,
    pub size: u32,
}

/// A block of text anchored to a chart corner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextOverlay {
    pub text: String,
    pub anchor: Anchor,
    pub x_offset: i32,
    pub y_offset: i32,
    pub font: FontSpec,
    pub color: Rgb,
}

impl TextOverlay {
    pub fn styled(text: String, style: &OverlayStyle) -> Self {
        Self {
            text,
            anchor: style.anchor,
            x_offset: style.x_offset,
            y_offset: style.y_offset,
            font: FontSpec {
                family: FONT_FAMILY,
                size: style.font_size,
            },
            color: style.font_color,
        }
    }

    pub fn with_color(mut self, color: Rgb) -> Self {
        self.color = color;
        self
    }

    /// Absolute top-left position of the text block in `viewport`.
    pub fn position(&self, viewport: Viewport) -> (i32, i32) {
        self.anchor
            .resolve(viewport.width, viewport.height, self.x_offset, self.y_offset)
    }
}

/// Consumer of positioned overlays (the chart renderer).
pub trait OverlaySink {
    fn draw(&mut self, overlay: &TextOverlay, x: i32, y: i32);
}

/// Sink that writes every overlay to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl OverlaySink for LogSink {
    fn draw(&mut self, overlay: &TextOverlay, x: i32, y: i32) {
        info!(
            x,
            y,
            color = %overlay.color,
            font_size = overlay.font.size,
            "\n{}",
            overlay.text
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn styled_overlay_takes_placement_from_style() {
        let style = OverlayStyle {
            font_color: Rgb::RED,
            font_size: 12,
            anchor: Anchor::BottomLeft,
            x_offset: 15,
            y_offset: 40,
        };
        let overlay = TextOverlay::styled("hi".into(), &style);
        assert_eq!(overlay.font, FontSpec { family: "Consolas", size: 12 });
        assert_eq!(overlay.color, Rgb::RED);
        assert_eq!(overlay.position(Viewport { width: 1000, height: 500 }), (15, 460));
        assert_eq!(overlay.with_color(Rgb::LIGHT_GRAY).color, Rgb::LIGHT_GRAY);
    }
}
