use polars::prelude::*;

/// Keeps rows whose `index` falls on `weekday` (0 = Monday … 6 = Sunday).
/// Rows without an index timestamp are dropped.
pub fn filter_weekday(frame: LazyFrame, index: &str, weekday: u8) -> LazyFrame {
    // polars numbers weekdays from Monday = 1
    frame.filter(col(index).dt().weekday().eq(lit(i32::from(weekday) + 1)))
}
