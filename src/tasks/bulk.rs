use polars::prelude::*;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, error, info, warn};

use super::{RunSummary, resample_pipeline};
use crate::codec;
use crate::config::{ResampleSettings, TaskConfig, task_suffix};
use crate::error::{TaskError, TransformError};
use crate::frame::{read_frame, split_by_index, write_frame};
use crate::naming::parse_year;
use crate::store::ObjectStore;

/// Resamples every object under `<year>/` in the input container as one
/// dataset per year.
///
/// Partitions load concurrently and are concatenated lazily in key order,
/// with each partition's columns matched by name to the first partition's
/// layout. The year then runs through the same pipeline as a single file,
/// collected by the streaming engine, so the output equals a single-file run
/// over the concatenated partitions. One output object is written per time
/// bucket, named `<year>/<suffix>_<i>.csv`.
#[tracing::instrument(skip_all, fields(task_type = %config.task_type))]
pub async fn perform_bulk(
    store: Arc<dyn ObjectStore>,
    config: &TaskConfig,
    settings: &ResampleSettings,
    years: &[String],
) -> Result<RunSummary, TaskError> {
    let result = run(store, config, settings, years).await;
    match &result {
        Ok(summary) => info!(
            processed = summary.files_processed,
            written = summary.objects_written,
            "Bulk resample complete"
        ),
        Err(e) => error!(error = %e, "Bulk resample failed"),
    }
    result
}

async fn run(
    store: Arc<dyn ObjectStore>,
    config: &TaskConfig,
    settings: &ResampleSettings,
    years: &[String],
) -> Result<RunSummary, TaskError> {
    config.validate_for_resample()?;
    let years = years
        .iter()
        .map(|y| parse_year(y))
        .collect::<Result<Vec<_>, _>>()?;

    store.create_container(&config.output).await?;

    let config = Arc::new(config.clone());
    let settings = Arc::new(settings.clone());
    let mut summary = RunSummary::default();

    for year in &years {
        let keys = store.list_objects(&config.input, &format!("{year}/")).await?;
        if keys.is_empty() {
            warn!(year, "No input objects for year");
            continue;
        }
        info!(year, partitions = keys.len(), "Loading partitions");
        summary.files_processed += keys.len();

        let partitions = load_partitions(&store, &config, settings.concurrency, keys).await?;
        let buckets = {
            let config = Arc::clone(&config);
            let settings = Arc::clone(&settings);
            let span = tracing::Span::current();
            tokio::task::spawn_blocking(move || {
                span.in_scope(|| -> Result<Vec<_>, TransformError> {
                    resample_year(partitions, &config, &settings)?
                        .into_iter()
                        .map(|bucket| -> Result<_, TransformError> {
                            let body = codec::encode(write_frame(&bucket)?, settings.gzip)?;
                            Ok((bucket.height(), body))
                        })
                        .collect()
                })
            })
            .await??
        };

        let suffix = task_suffix(&config.task_type);
        for (i, (groups, body)) in buckets.into_iter().enumerate() {
            let key = codec::output_key(&format!("{year}/{suffix}_{i}.csv"), settings.gzip);
            store.write_object(&config.output, &key, body).await?;
            debug!(output = %key, groups, "Wrote bucket");
            summary.objects_written += 1;
        }
        info!(year, written = summary.objects_written, "Year complete");
    }

    Ok(summary)
}

async fn load_partitions(
    store: &Arc<dyn ObjectStore>,
    config: &Arc<TaskConfig>,
    concurrency: usize,
    keys: Vec<String>,
) -> Result<Vec<DataFrame>, TaskError> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = Vec::with_capacity(keys.len());

    for key in keys {
        let store = Arc::clone(store);
        let config = Arc::clone(config);
        let semaphore = Arc::clone(&semaphore);
        let span = tracing::debug_span!("load_partition", key = %key);

        tasks.push(tokio::spawn(
            async move {
                let _permit = semaphore.acquire_owned().await;
                load_partition(store.as_ref(), config, key).await
            }
            .instrument(span),
        ));
    }

    // awaited in key order, whatever order the tasks finish in
    let mut partitions = Vec::with_capacity(tasks.len());
    for task in tasks {
        partitions.push(task.await??);
    }
    Ok(partitions)
}

async fn load_partition(
    store: &dyn ObjectStore,
    config: Arc<TaskConfig>,
    key: String,
) -> Result<DataFrame, TaskError> {
    let body = store.read_object(&config.input, &key).await?;

    let span = tracing::Span::current();
    let frame = tokio::task::spawn_blocking(move || {
        span.in_scope(|| {
            let body = codec::decode(&key, body)?;
            let frame = read_frame(&body, &config.schema())?;
            debug!(rows = frame.height(), "Partition loaded");
            Ok::<_, TransformError>(frame)
        })
    })
    .await??;
    Ok(frame)
}

/// Concatenates a year's partitions and resamples them, returning the result
/// split into one frame per time bucket.
fn resample_year(
    partitions: Vec<DataFrame>,
    config: &TaskConfig,
    settings: &ResampleSettings,
) -> Result<Vec<DataFrame>, TransformError> {
    let Some(first) = partitions.first() else {
        return Ok(Vec::new());
    };
    // partitions may order their columns differently
    let layout = first.get_column_names_owned();

    let frames = partitions
        .into_iter()
        .map(|partition| -> Result<LazyFrame, TransformError> {
            Ok(partition.select(layout.clone())?.lazy())
        })
        .collect::<Result<Vec<_>, TransformError>>()?;
    let year = concat(frames, UnionArgs::default())?;

    let result = resample_pipeline(year, config, settings, Engine::Streaming)?;
    split_by_index(&result, &config.index_column)
}
