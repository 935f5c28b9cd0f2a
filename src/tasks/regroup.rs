use polars::prelude::*;
use tracing::{error, info, warn};

use super::RunSummary;
use crate::codec;
use crate::config::TaskConfig;
use crate::error::{TaskError, TransformError};
use crate::frame::{read_text_frame, write_frame};
use crate::store::ObjectStore;

/// Merges every object in the input container and writes one output object
/// per distinct value of the `split_by` columns, named after that value.
///
/// Multiple split columns are joined with `_` to form the name. Rows with an
/// empty split value are dropped.
#[tracing::instrument(skip_all, fields(task_type = %config.task_type))]
pub async fn regroup(
    store: &dyn ObjectStore,
    config: &TaskConfig,
    gzip: bool,
) -> Result<RunSummary, TaskError> {
    let result = run(store, config, gzip).await;
    match &result {
        Ok(summary) => info!(
            files = summary.files_processed,
            groups = summary.objects_written,
            "Regroup complete"
        ),
        Err(e) => error!(error = %e, "Regroup failed"),
    }
    result
}

async fn run(store: &dyn ObjectStore, config: &TaskConfig, gzip: bool) -> Result<RunSummary, TaskError> {
    let split_by = config.split_columns()?.to_vec();
    let objects = store.read_all_objects(&config.input).await?;
    let mut summary = RunSummary {
        files_processed: objects.len(),
        ..RunSummary::default()
    };

    let span = tracing::Span::current();
    let groups = tokio::task::spawn_blocking(move || {
        span.in_scope(|| -> Result<Vec<_>, TransformError> {
            let frames = objects
                .into_iter()
                .map(|(key, body)| read_text_frame(&codec::decode(&key, body)?))
                .collect::<Result<Vec<_>, _>>()?;
            split_rows(combine(frames)?, &split_by)?
                .into_iter()
                .map(|(name, rows)| -> Result<_, TransformError> {
                    let body = codec::encode(write_frame(&rows)?, gzip)?;
                    Ok((codec::output_key(&name, gzip), body))
                })
                .collect()
        })
    })
    .await??;

    store.create_container(&config.output).await?;
    for (key, body) in groups {
        store.write_object(&config.output, &key, body).await?;
        summary.objects_written += 1;
    }

    Ok(summary)
}

/// Stacks frames, unioning their columns in first-seen order. Cells a frame
/// does not have are null.
fn combine(frames: Vec<DataFrame>) -> Result<DataFrame, TransformError> {
    if frames.is_empty() {
        return Ok(DataFrame::empty());
    }
    let frames: Vec<LazyFrame> = frames.into_iter().map(IntoLazy::lazy).collect();
    let combined = concat_lf_diagonal(frames, UnionArgs::default())?.collect()?;
    info!(rows = combined.height(), "Input combined");
    Ok(combined)
}

/// Splits rows by the joined values of the split columns, in first-seen
/// order of those values.
fn split_rows(frame: DataFrame, split_by: &[String]) -> Result<Vec<(String, DataFrame)>, TransformError> {
    if let Some(missing) = split_by.iter().find(|c| frame.get_column_index(c).is_none()) {
        return Err(TransformError::MissingColumn(missing.clone()));
    }

    let present = split_by
        .iter()
        .map(|c| col(c.as_str()).is_not_null())
        .reduce(|a, b| a.and(b))
        .unwrap_or_else(|| lit(true));
    let rows = frame.height();
    let kept = frame.lazy().filter(present).collect()?;
    if kept.height() < rows {
        warn!(dropped = rows - kept.height(), "Rows without a split value were dropped");
    }
    if kept.height() == 0 {
        return Ok(Vec::new());
    }

    kept.partition_by_stable(split_by.iter().map(String::as_str), true)?
        .into_iter()
        .map(|part| -> Result<_, TransformError> {
            let name = split_by
                .iter()
                .map(|c| -> Result<String, TransformError> {
                    Ok(part.column(c)?.str()?.get(0).unwrap_or_default().to_string())
                })
                .collect::<Result<Vec<_>, TransformError>>()?
                .join("_");
            Ok((name, part))
        })
        .collect()
}
