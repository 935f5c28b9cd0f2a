//! Declared column types and timestamp parsing.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Accepted layouts for datetime cells, tried in order. `%.f` also matches
/// an absent fraction.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %H:%M",
];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y%m%d"];

/// Unit every timestamp column is stored in.
pub const TIME_UNIT: TimeUnit = TimeUnit::Microseconds;

/// Column type as declared in a task's `dtypes` map.
///
/// Accepts both the short names and the numpy-style names used by existing
/// task registries (`int64`, `float64`, `object`, `datetime64`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[serde(alias = "int64", alias = "integer")]
    Int,
    #[serde(alias = "float64", alias = "double")]
    Float,
    #[serde(alias = "object", alias = "str", alias = "string")]
    Text,
    #[serde(alias = "datetime64", alias = "timestamp", alias = "date")]
    Datetime,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::Float)
    }

    pub fn data_type(self) -> DataType {
        match self {
            ColumnType::Int => DataType::Int64,
            ColumnType::Float => DataType::Float64,
            ColumnType::Text => DataType::String,
            ColumnType::Datetime => DataType::Datetime(TIME_UNIT, None),
        }
    }

    pub(crate) fn describe(self) -> &'static str {
        match self {
            ColumnType::Int => "an integer",
            ColumnType::Float => "a float",
            ColumnType::Text => "text",
            ColumnType::Datetime => "a timestamp",
        }
    }
}

/// Parses a date or datetime cell. Date-only values land on midnight and
/// values carrying a UTC offset are converted to UTC.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Reads a datetime column back as chrono values.
pub fn timestamps(column: &Column) -> PolarsResult<Vec<Option<NaiveDateTime>>> {
    let micros = column
        .cast(&ColumnType::Datetime.data_type())?
        .cast(&DataType::Int64)?;
    Ok(micros
        .i64()?
        .into_iter()
        .map(|v| v.and_then(DateTime::from_timestamp_micros).map(|ts| ts.naive_utc()))
        .collect())
}
