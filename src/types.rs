// =============================================================================
// Shared types used across the overlay engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Whether the market is inside its regular session at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Open,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// How the chart groups raw trades into bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Aggregation {
    /// Fixed number of trade ticks per bar.
    Tick(u32),
    /// Fixed wall-clock length per bar, in seconds.
    Time(u32),
    /// Fixed traded volume per bar.
    Volume(u64),
    /// Fixed price range per bar, in ticks.
    Range(u32),
}

impl Aggregation {
    pub fn is_tick(&self) -> bool {
        matches!(self, Self::Tick(_))
    }
}

impl Default for Aggregation {
    fn default() -> Self {
        Self::Tick(500)
    }
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tick(n) => write!(f, "{n} Tick"),
            Self::Time(secs) => write!(f, "{secs}s"),
            Self::Volume(v) => write!(f, "{v} Volume"),
            Self::Range(r) => write!(f, "{r} Range"),
        }
    }
}

/// Chart corner that overlay offsets are measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Anchor {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Default for Anchor {
    fn default() -> Self {
        Self::TopRight
    }
}

impl Anchor {
    /// Resolve corner-relative offsets into absolute viewport coordinates.
    ///
    /// Right anchors measure `x_offset` leftwards from the right edge, bottom
    /// anchors measure `y_offset` upwards from the bottom edge.
    pub fn resolve(&self, width: i32, height: i32, x_offset: i32, y_offset: i32) -> (i32, i32) {
        match self {
            Self::TopLeft => (x_offset, y_offset),
            Self::TopRight => (width - x_offset, y_offset),
            Self::BottomLeft => (x_offset, height - y_offset),
            Self::BottomRight => (width - x_offset, height - y_offset),
        }
    }
}

/// 24-bit text colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const LIGHT_GRAY: Rgb = Rgb { r: 211, g: 211, b: 211 };
    pub const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Contract metadata needed to convert price distances into ticks and money.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSpec {
    pub name: String,
    /// Minimum price increment.
    pub tick_size: f64,
    /// Currency value of one tick for one contract.
    pub tick_cost: f64,
}

impl Default for SymbolSpec {
    fn default() -> Self {
        Self {
            name: "MNQ".to_string(),
            tick_size: 0.25,
            tick_cost: 0.5,
        }
    }
}
