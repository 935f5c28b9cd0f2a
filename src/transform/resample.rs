//! Time-bucket grouping and aggregation.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::aggregate::{Aggregation, checked_sums};
use crate::error::TransformError;

/// Width of the time buckets the index is grouped into.
///
/// Day and longer buckets are labelled by their right edge (the Sunday ending
/// a week, the last day of a month or year); hourly buckets by their start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Frequency {
    Hourly,
    Daily,
    Weekly,
    #[default]
    MonthEnd,
    YearEnd,
}

impl Frequency {
    /// Maps a timestamp expression to its bucket label.
    pub fn bucket(self, ts: Expr) -> Expr {
        match self {
            Frequency::Hourly => ts.dt().truncate(lit("1h")),
            Frequency::Daily => ts.dt().truncate(lit("1d")),
            // weeks truncate to Monday
            Frequency::Weekly => ts.dt().truncate(lit("1w")).dt().offset_by(lit("6d")),
            Frequency::MonthEnd => ts.dt().truncate(lit("1d")).dt().month_end(),
            Frequency::YearEnd => ts
                .dt()
                .truncate(lit("1y"))
                .dt()
                .offset_by(lit("1y"))
                .dt()
                .offset_by(lit("-1d")),
        }
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('1') {
            "H" | "h" => Ok(Frequency::Hourly),
            "D" | "d" => Ok(Frequency::Daily),
            "W" | "W-SUN" => Ok(Frequency::Weekly),
            "M" | "ME" => Ok(Frequency::MonthEnd),
            "Y" | "YE" | "A" => Ok(Frequency::YearEnd),
            other => Err(format!("unsupported resample frequency '{other}'")),
        }
    }
}

impl TryFrom<String> for Frequency {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Frequency> for String {
    fn from(value: Frequency) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Frequency::Hourly => "H",
            Frequency::Daily => "D",
            Frequency::Weekly => "W",
            Frequency::MonthEnd => "M",
            Frequency::YearEnd => "Y",
        };
        f.write_str(s)
    }
}

/// Groups `frame` by time bucket of `index` and `group_by`, aggregating every
/// other column.
///
/// Rows without an index timestamp or with a null group value are skipped.
/// The result holds the bucket label under the index name, then the group
/// columns, then the aggregated columns, one row per observed group ordered
/// by bucket and group values.
pub fn resample(
    mut frame: LazyFrame,
    index: &str,
    group_by: &[String],
    frequency: Frequency,
    aggregation: Aggregation,
    engine: Engine,
) -> Result<DataFrame, TransformError> {
    let schema = frame.collect_schema()?;
    let key_names: Vec<&str> = std::iter::once(index)
        .chain(group_by.iter().map(String::as_str))
        .collect();
    if let Some(missing) = key_names.iter().find(|k| !schema.contains(k)) {
        return Err(TransformError::MissingColumn(missing.to_string()));
    }

    let values: Vec<(&str, &DataType)> = schema
        .iter()
        .map(|(name, dtype)| (name.as_str(), dtype))
        .filter(|(name, _)| !key_names.contains(name))
        .collect();
    if aggregation.numeric_only() {
        if let Some((name, _)) = values.iter().find(|(_, t)| !t.is_primitive_numeric()) {
            return Err(TransformError::NonNumeric {
                operation: aggregation.name(),
                column: name.to_string(),
            });
        }
    }

    // integer sums are collected per group and added with overflow checks
    let exact_sums: Vec<&str> = values
        .iter()
        .filter(|(_, t)| aggregation == Aggregation::Sum && t.is_integer())
        .map(|(name, _)| *name)
        .collect();
    let aggs: Vec<Expr> = values
        .iter()
        .map(|(name, _)| {
            if exact_sums.contains(name) {
                col(*name)
            } else {
                aggregation.expr(name)
            }
        })
        .collect();

    let keys: Vec<Expr> = key_names.iter().map(|k| col(*k)).collect();
    let present = keys
        .iter()
        .cloned()
        .map(Expr::is_not_null)
        .reduce(|a, b| a.and(b))
        .unwrap_or_else(|| lit(true));

    let mut out = frame
        .filter(present)
        .with_column(frequency.bucket(col(index)).alias(index))
        .group_by(keys)
        .agg(aggs)
        .sort(key_names.clone(), SortMultipleOptions::default())
        .collect_with_engine(engine)?;

    for name in exact_sums {
        checked_sums(&mut out, name)?;
    }
    Ok(out)
}
