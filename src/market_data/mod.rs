pub mod bar_buffer;
pub mod history;

pub use bar_buffer::{load_bars, Bar, BarBuffer, SeriesKey};
pub use history::{ChartFeed, HistoryProvider, ReferenceClock};
