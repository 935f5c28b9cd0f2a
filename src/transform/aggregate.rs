//! Aggregation functions applied to each (bucket, group) slice.

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::TransformError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Sum,
    Mean,
    Median,
    Min,
    Max,
    Count,
    First,
    Last,
}

impl Aggregation {
    pub fn name(self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Mean => "mean",
            Aggregation::Median => "median",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Count => "count",
            Aggregation::First => "first",
            Aggregation::Last => "last",
        }
    }

    /// Whether the function only makes sense over numbers.
    pub fn numeric_only(self) -> bool {
        matches!(self, Aggregation::Sum | Aggregation::Mean | Aggregation::Median)
    }

    /// Group-by expression for one value column. Nulls are skipped; `first`
    /// and `last` follow row order.
    pub fn expr(self, column: &str) -> Expr {
        let values = col(column);
        match self {
            Aggregation::Sum => values.sum(),
            Aggregation::Mean => values.mean(),
            Aggregation::Median => values.median(),
            Aggregation::Min => values.min(),
            Aggregation::Max => values.max(),
            Aggregation::Count => values.count().cast(DataType::Int64),
            Aggregation::First => values.drop_nulls().first(),
            Aggregation::Last => values.drop_nulls().last(),
        }
    }
}

/// Replaces a column of per-group integer lists with their sums, failing
/// instead of wrapping when a sum leaves the `i64` range.
pub fn checked_sums(frame: &mut DataFrame, column: &str) -> Result<(), TransformError> {
    let overflow = || TransformError::Overflow {
        column: column.to_string(),
    };

    let lists = frame.column(column)?.list()?;
    let mut sums = Vec::with_capacity(lists.len());
    for group in lists {
        let total = match group {
            Some(values) => values
                .i64()?
                .into_iter()
                .flatten()
                .try_fold(0i64, |acc, v| acc.checked_add(v))
                .ok_or_else(overflow)?,
            None => 0,
        };
        sums.push(total);
    }

    frame.with_column(Column::new(column.into(), sums))?;
    Ok(())
}
