use polars::prelude::{Engine, IntoLazy};
use tracing::{debug, error, info, warn};

use super::{RunSummary, WorkUnit, resample_pipeline};
use crate::codec;
use crate::config::{ResampleSettings, TaskConfig, TaskKind};
use crate::error::{TaskError, TransformError};
use crate::frame::{read_frame, write_frame};
use crate::naming::{FileNamer, turnstile_files};
use crate::store::ObjectStore;

/// Resamples each input file of a work unit into an output file of the same
/// name.
///
/// Files are processed strictly one after another. A candidate that does not
/// exist is skipped; any other failure stops the run and is returned. Outputs
/// written before the failure are left in place.
#[tracing::instrument(skip_all, fields(task_type = %config.task_type))]
pub async fn perform(
    store: &dyn ObjectStore,
    config: &TaskConfig,
    settings: &ResampleSettings,
    namer: &dyn FileNamer,
    work_unit: &WorkUnit,
) -> Result<RunSummary, TaskError> {
    let result = run(store, config, settings, namer, work_unit).await;
    match &result {
        Ok(summary) => info!(
            processed = summary.files_processed,
            skipped = summary.files_skipped,
            "Resample task complete"
        ),
        Err(e) => error!(error = %e, "Resample task failed"),
    }
    result
}

async fn run(
    store: &dyn ObjectStore,
    config: &TaskConfig,
    settings: &ResampleSettings,
    namer: &dyn FileNamer,
    work_unit: &WorkUnit,
) -> Result<RunSummary, TaskError> {
    config.validate_for_resample()?;

    let files = candidate_files(config.kind(), namer, work_unit)?;
    info!(count = files.len(), "Processing candidate files");

    store.create_container(&config.output).await?;

    let mut summary = RunSummary::default();
    for file in &files {
        let body = match store.read_object(&config.input, file).await {
            Ok(body) => body,
            Err(e) if e.is_not_found() => {
                debug!(file, "Input file absent, skipping");
                summary.files_skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        resample_file(store, config, settings, file, body)
            .await
            .inspect_err(|e| error!(file, error = %e, "Failed to resample file"))?;
        summary.files_processed += 1;
        summary.objects_written += 1;
    }

    Ok(summary)
}

fn candidate_files(
    kind: TaskKind,
    namer: &dyn FileNamer,
    work_unit: &WorkUnit,
) -> Result<Vec<String>, TaskError> {
    let token = match work_unit {
        WorkUnit::Files(files) => return Ok(files.clone()),
        WorkUnit::Token(token) => token,
    };

    let files = match kind {
        TaskKind::GreenCabs | TaskKind::YellowCabs => namer.candidate_files(kind, token)?,
        TaskKind::Transit => turnstile_files(token)?,
        TaskKind::Traffic | TaskKind::Other => {
            warn!(%kind, token, "No file naming rule for this task kind");
            Vec::new()
        }
    };
    Ok(files)
}

async fn resample_file(
    store: &dyn ObjectStore,
    config: &TaskConfig,
    settings: &ResampleSettings,
    file: &str,
    body: bytes::Bytes,
) -> Result<(), TaskError> {
    let (key, groups, out) = {
        let config = config.clone();
        let settings = settings.clone();
        let file = file.to_string();
        let span = tracing::Span::current();
        tokio::task::spawn_blocking(move || {
            span.in_scope(|| transform_file(&config, &settings, &file, body))
        })
        .await??
    };

    store.write_object(&config.output, &key, out).await?;
    info!(file, output = %key, groups, "Wrote resampled file");
    Ok(())
}

/// Decodes, resamples and re-encodes one input body. Returns the output key,
/// the number of groups and the encoded output.
fn transform_file(
    config: &TaskConfig,
    settings: &ResampleSettings,
    file: &str,
    body: bytes::Bytes,
) -> Result<(String, usize, bytes::Bytes), TransformError> {
    let body = codec::decode(file, body)?;
    let frame = read_frame(&body, &config.schema())?;
    debug!(file, rows = frame.height(), "Loaded input file");

    let result = resample_pipeline(frame.lazy(), config, settings, Engine::InMemory)?;
    let out = codec::encode(write_frame(&result)?, settings.gzip)?;
    Ok((codec::output_key(file, settings.gzip), result.height(), out))
}
