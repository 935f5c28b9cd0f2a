//! Tabular data on polars.
//!
//! Inputs load as string columns and are cast to the declared
//! [`ColumnType`]s; a typed frame holds the index column first, then the
//! declared columns in the order they appear in the source file.

mod io;
mod types;

pub use io::{Schema, read_frame, read_text_frame, split_by_index, write_frame};
pub use types::{ColumnType, TIME_UNIT, parse_timestamp, timestamps};
