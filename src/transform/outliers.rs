//! Interquartile-range outlier removal for differenced counters.
//!
//! A row is dropped when any target column is negative or above three times
//! that column's IQR. A constant column has an IQR of zero, so every positive
//! value in it is dropped as well. Nulls never cause a drop.

use polars::prelude::*;

use crate::error::TransformError;

/// Upper discard limit per column; `None` when the column has no values.
pub type Limits = Vec<(String, Option<f64>)>;

fn quartile(column: &str, q: f64) -> Expr {
    col(column)
        .cast(DataType::Float64)
        .quantile(lit(q), QuantileMethod::Linear)
        .alias(format!("{column}_q{}", (q * 100.0) as u8))
}

/// Computes `3 × (Q75 − Q25)` for each column over the whole frame.
/// Quartiles interpolate linearly between closest ranks.
pub fn upper_limits(
    mut frame: LazyFrame,
    columns: &[String],
    engine: Engine,
) -> Result<Limits, TransformError> {
    let schema = frame.collect_schema()?;
    if let Some(missing) = columns.iter().find(|c| !schema.contains(c)) {
        return Err(TransformError::MissingColumn(missing.clone()));
    }

    let exprs: Vec<Expr> = columns
        .iter()
        .flat_map(|c| [quartile(c, 0.25), quartile(c, 0.75)])
        .collect();
    let quartiles = frame.select(exprs).collect_with_engine(engine)?;

    columns
        .iter()
        .map(|c| -> Result<_, TransformError> {
            let q25 = quartiles.column(&format!("{c}_q25"))?.f64()?.get(0);
            let q75 = quartiles.column(&format!("{c}_q75"))?.f64()?.get(0);
            Ok((c.clone(), q25.zip(q75).map(|(lo, hi)| 3.0 * (hi - lo))))
        })
        .collect()
}

/// Drops rows outside the given `(column, limit)` bands.
pub fn apply_limits(frame: LazyFrame, limits: &Limits) -> LazyFrame {
    let discard = limits
        .iter()
        .map(|(name, limit)| {
            let value = col(name.as_str());
            let out_of_band = match limit {
                Some(limit) => value.clone().lt(lit(0.0)).or(value.gt(lit(*limit))),
                None => value.lt(lit(0.0)),
            };
            out_of_band.fill_null(lit(false))
        })
        .reduce(|a, b| a.or(b));

    match discard {
        Some(discard) => frame.filter(discard.not()),
        None => frame,
    }
}

/// Removes outlier rows, computing each column's band over the whole frame.
pub fn remove_outliers(
    frame: LazyFrame,
    columns: &[String],
    engine: Engine,
) -> Result<LazyFrame, TransformError> {
    let limits = upper_limits(frame.clone(), columns, engine)?;
    Ok(apply_limits(frame, &limits))
}
