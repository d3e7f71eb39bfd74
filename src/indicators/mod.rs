// =============================================================================
// Chart Overlay Indicators
// =============================================================================
//
// Pure computations and text formatting for the two overlays. Nothing in
// here owns state between updates; the engine in `app_state` keeps the
// latest values.

pub mod atr;
pub mod bar_size;
pub mod bar_speed;
