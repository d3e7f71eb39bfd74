// =============================================================================
// Runtime Configuration — overlay settings with atomic save
// =============================================================================
//
// Every user-facing input of the two overlays lives here: session hours and
// lookback windows for Bar Speed, unit and risk settings for Bar Size, and
// the text placement of each panel.
//
// All fields carry `#[serde(default)]` so that adding new fields never breaks
// loading an older config file. Bounds are checked by `validate()` on load;
// the lookback windows are checked when `WindowConfig` is deserialised.
//
// =============================================================================

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::indicators::atr::AtrSmoothing;
use crate::session::{SessionCalendar, WindowConfig};
use crate::types::{Aggregation, Anchor, Rgb, SymbolSpec};

pub const MIN_FONT_SIZE: u32 = 6;
pub const MAX_FONT_SIZE: u32 = 36;
pub const MAX_RISK: f64 = 1_000_000.0;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_font_color() -> Rgb {
    Rgb::LIGHT_GRAY
}

fn default_font_size() -> u32 {
    10
}

fn default_x_offset() -> i32 {
    230
}

fn default_bar_speed_style() -> OverlayStyle {
    OverlayStyle {
        y_offset: 100,
        ..OverlayStyle::default()
    }
}

fn default_bar_size_style() -> OverlayStyle {
    OverlayStyle {
        y_offset: 10,
        ..OverlayStyle::default()
    }
}

fn default_atr_period() -> usize {
    14
}

fn default_max_risk() -> f64 {
    75.0
}

fn default_risk_add_ticks() -> u32 {
    2
}

fn default_max_bars() -> usize {
    20_000
}

// =============================================================================
// OverlayStyle
// =============================================================================

/// Where and how a text panel is drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayStyle {
    #[serde(default = "default_font_color")]
    pub font_color: Rgb,

    /// Point size, 6..=36.
    #[serde(default = "default_font_size")]
    pub font_size: u32,

    /// Corner the offsets are measured from.
    #[serde(default)]
    pub anchor: Anchor,

    #[serde(default = "default_x_offset")]
    pub x_offset: i32,

    #[serde(default)]
    pub y_offset: i32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            font_color: default_font_color(),
            font_size: default_font_size(),
            anchor: Anchor::TopRight,
            x_offset: default_x_offset(),
            y_offset: 0,
        }
    }
}

impl OverlayStyle {
    fn validate(&self, panel: &str) -> Result<()> {
        if !(MIN_FONT_SIZE..=MAX_FONT_SIZE).contains(&self.font_size) {
            bail!(
                "{panel}.font_size must be within {MIN_FONT_SIZE}..={MAX_FONT_SIZE}, got {}",
                self.font_size
            );
        }
        if self.x_offset < 0 || self.y_offset < 0 {
            bail!(
                "{panel} offsets must be non-negative, got ({}, {})",
                self.x_offset,
                self.y_offset
            );
        }
        Ok(())
    }
}

// =============================================================================
// BarSpeedParams
// =============================================================================

/// Inputs of the Bar Speed overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSpeedParams {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Regular session hours used to pick the lookback window.
    #[serde(default)]
    pub session: SessionCalendar,

    /// Lookback minutes inside / outside the session.
    #[serde(default)]
    pub windows: WindowConfig,

    #[serde(default = "default_bar_speed_style")]
    pub style: OverlayStyle,
}

impl Default for BarSpeedParams {
    fn default() -> Self {
        Self {
            enabled: true,
            session: SessionCalendar::default(),
            windows: WindowConfig::default(),
            style: default_bar_speed_style(),
        }
    }
}

// =============================================================================
// BarSizeParams
// =============================================================================

/// Inputs of the Bar Size (ATR / true range) overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSizeParams {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Show bar ranges in ticks rather than price points.
    #[serde(default = "default_true")]
    pub tr_in_ticks: bool,

    /// Show ATR in ticks rather than price points.
    #[serde(default = "default_true")]
    pub atr_in_ticks: bool,

    #[serde(default = "default_atr_period")]
    pub atr_period: usize,

    #[serde(default)]
    pub atr_smoothing: AtrSmoothing,

    #[serde(default = "default_true")]
    pub print_atr: bool,

    #[serde(default = "default_true")]
    pub print_previous_tr: bool,

    #[serde(default = "default_true")]
    pub print_current_tr: bool,

    /// Append the contract count for `max_risk` to every row.
    #[serde(default = "default_true")]
    pub print_risk: bool,

    /// Maximum currency risk per trade.
    #[serde(default = "default_max_risk")]
    pub max_risk: f64,

    /// Extra ticks added to each range before sizing.
    #[serde(default = "default_risk_add_ticks")]
    pub risk_add_ticks: u32,

    #[serde(default = "default_bar_size_style")]
    pub style: OverlayStyle,
}

impl Default for BarSizeParams {
    fn default() -> Self {
        Self {
            enabled: true,
            tr_in_ticks: true,
            atr_in_ticks: true,
            atr_period: default_atr_period(),
            atr_smoothing: AtrSmoothing::Sma,
            print_atr: true,
            print_previous_tr: true,
            print_current_tr: true,
            print_risk: true,
            max_risk: default_max_risk(),
            risk_add_ticks: default_risk_add_ticks(),
            style: default_bar_size_style(),
        }
    }
}

// =============================================================================
// OverlayConfig
// =============================================================================

/// Top-level configuration for the overlay engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Contract the chart is showing.
    #[serde(default)]
    pub symbol: SymbolSpec,

    /// Chart aggregation of the replayed history.
    #[serde(default)]
    pub aggregation: Aggregation,

    /// Bars retained per series beyond the longest lookback window. Bars
    /// inside that window are never trimmed.
    #[serde(default = "default_max_bars")]
    pub max_bars: usize,

    #[serde(default)]
    pub bar_speed: BarSpeedParams,

    #[serde(default)]
    pub bar_size: BarSizeParams,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            symbol: SymbolSpec::default(),
            aggregation: Aggregation::default(),
            max_bars: default_max_bars(),
            bar_speed: BarSpeedParams::default(),
            bar_size: BarSizeParams::default(),
        }
    }
}

impl OverlayConfig {
    /// Load and validate configuration from a JSON file at `path`.
    ///
    /// A missing file is an error so the caller can fall back to defaults
    /// with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read overlay config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse overlay config from {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("invalid overlay config in {}", path.display()))?;

        info!(
            path = %path.display(),
            symbol = %config.symbol.name,
            aggregation = %config.aggregation,
            "overlay config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise overlay config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "overlay config saved (atomic)");
        Ok(())
    }

    /// Check every bound that serde defaults cannot enforce.
    pub fn validate(&self) -> Result<()> {
        if !(self.symbol.tick_size > 0.0 && self.symbol.tick_size.is_finite()) {
            bail!("symbol.tick_size must be positive, got {}", self.symbol.tick_size);
        }
        if !(self.symbol.tick_cost > 0.0 && self.symbol.tick_cost.is_finite()) {
            bail!("symbol.tick_cost must be positive, got {}", self.symbol.tick_cost);
        }
        if self.max_bars == 0 {
            bail!("max_bars must be at least 1");
        }
        if self.bar_size.atr_period == 0 {
            bail!("bar_size.atr_period must be at least 1");
        }
        if !(0.0..=MAX_RISK).contains(&self.bar_size.max_risk) {
            bail!(
                "bar_size.max_risk must be within 0..={MAX_RISK}, got {}",
                self.bar_size.max_risk
            );
        }
        self.bar_speed.style.validate("bar_speed.style")?;
        self.bar_size.style.validate("bar_size.style")?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = OverlayConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.aggregation, Aggregation::Tick(500));
        assert_eq!(cfg.bar_speed.windows.minutes_when_open(), 10);
        assert_eq!(cfg.bar_speed.windows.minutes_when_closed(), 60);
        assert_eq!(cfg.bar_speed.style.x_offset, 230);
        assert_eq!(cfg.bar_speed.style.y_offset, 100);
        assert_eq!(cfg.bar_size.style.y_offset, 10);
        assert_eq!(cfg.bar_size.atr_period, 14);
        assert_eq!(cfg.bar_size.risk_add_ticks, 2);
        assert!((cfg.bar_size.max_risk - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: OverlayConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, OverlayConfig::default());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{
            "aggregation": { "Time": 60 },
            "bar_speed": { "session": { "open_time_of_day": "08:00:00" }, "windows": { "minutes_when_open": 5 } },
            "bar_size": { "tr_in_ticks": false, "style": { "font_size": 12 } }
        }"#;
        let cfg: OverlayConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.aggregation, Aggregation::Time(60));
        assert_eq!(cfg.bar_speed.windows.minutes_when_open(), 5);
        assert_eq!(cfg.bar_speed.windows.minutes_when_closed(), 60);
        assert_eq!(
            cfg.bar_speed.session.open_time_of_day,
            chrono::NaiveTime::from_hms_opt(8, 0, 0).unwrap()
        );
        assert!(!cfg.bar_size.tr_in_ticks);
        assert!(cfg.bar_size.atr_in_ticks);
        assert_eq!(cfg.bar_size.style.font_size, 12);
        assert_eq!(cfg.bar_size.style.x_offset, 230);
    }

    #[test]
    fn zero_window_is_rejected_at_parse() {
        let json = r#"{ "bar_speed": { "windows": { "minutes_when_closed": 0 } } }"#;
        assert!(serde_json::from_str::<OverlayConfig>(json).is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut cfg = OverlayConfig::default();
        cfg.bar_speed.style.font_size = 40;
        assert!(cfg.validate().is_err());

        let mut cfg = OverlayConfig::default();
        cfg.symbol.tick_size = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = OverlayConfig::default();
        cfg.bar_size.atr_period = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = OverlayConfig::default();
        cfg.bar_size.style.x_offset = -1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = std::env::temp_dir().join(format!("overlay-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("overlay_config.json");

        let mut cfg = OverlayConfig::default();
        cfg.bar_size.max_risk = 150.0;
        cfg.bar_speed.windows = WindowConfig::new(15, 90).unwrap();
        cfg.save(&path).unwrap();

        let loaded = OverlayConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
