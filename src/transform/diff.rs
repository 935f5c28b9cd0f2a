use polars::prelude::*;
use polars::series::ops::NullBehavior;

use crate::config::DiffSpec;
use crate::error::TransformError;

/// Replaces each source column with its row-to-row difference.
///
/// Derived columns are appended in configured order as floats; the first row
/// and any row next to a null are left null. Differences follow row order,
/// so a frame built by concatenating partitions diffs across their seams.
pub fn apply_diff(mut frame: LazyFrame, spec: &DiffSpec) -> Result<LazyFrame, TransformError> {
    let schema = frame.collect_schema()?;
    for source in &spec.columns {
        let dtype = schema
            .get(source)
            .ok_or_else(|| TransformError::MissingColumn(source.clone()))?;
        if !dtype.is_primitive_numeric() {
            return Err(TransformError::NonNumeric {
                operation: "diff",
                column: source.clone(),
            });
        }
    }

    let replaced = |name: &str| spec.columns.iter().chain(&spec.derived_columns).any(|c| c == name);
    let kept = schema
        .iter_names()
        .filter(|name| !replaced(name))
        .map(|name| col(name.clone()));
    let derived = spec
        .columns
        .iter()
        .zip(&spec.derived_columns)
        .map(|(source, target)| {
            col(source.as_str())
                .cast(DataType::Float64)
                .diff(lit(1), NullBehavior::Ignore)
                .alias(target.as_str())
        });

    Ok(frame.select(kept.chain(derived).collect::<Vec<_>>()))
}
