//! Task entry points.
//!
//! - [`perform`] resamples one input file at a time.
//! - [`perform_bulk`] resamples a whole year of partition files at once.
//! - [`regroup`] merges a container's files and re-splits them by column value.
//!
//! Every task takes its [`TaskConfig`](crate::config::TaskConfig) and store
//! explicitly and reports what it did in a [`RunSummary`]. Parsing and
//! transforming run on tokio's blocking pool.

mod bulk;
mod regroup;
mod single;

pub use bulk::perform_bulk;
pub use regroup::regroup;
pub use single::perform;

use polars::prelude::{DataFrame, Engine, LazyFrame};

use crate::config::{ResampleSettings, TaskConfig, TaskKind};
use crate::error::TransformError;
use crate::transform::{diff, filter, outliers, resample};

/// Identifies the input files of a single-file run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkUnit {
    /// A date-scoped token such as `2021-03`, resolved per task kind.
    Token(String),
    /// Explicit input keys.
    Files(Vec<String>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Input objects read and transformed.
    pub files_processed: usize,
    /// Candidate inputs that did not exist.
    pub files_skipped: usize,
    /// Output objects written.
    pub objects_written: usize,
}

/// Transit counters go through outlier removal on their differenced columns.
fn removes_outliers(config: &TaskConfig) -> bool {
    config.kind() == TaskKind::Transit
}

/// Diff, outlier, weekday and resample stages over a loaded frame. The
/// single-file and bulk tasks share this so their results agree.
fn resample_pipeline(
    frame: LazyFrame,
    config: &TaskConfig,
    settings: &ResampleSettings,
    engine: Engine,
) -> Result<DataFrame, TransformError> {
    let mut frame = frame;
    if config.diff.compute {
        frame = diff::apply_diff(frame, &config.diff)?;
    }
    if removes_outliers(config) {
        frame = outliers::remove_outliers(frame, &config.diff.derived_columns, engine)?;
    }
    if let Some(weekday) = settings.weekday {
        frame = filter::filter_weekday(frame, &config.index_column, weekday);
    }
    resample::resample(
        frame,
        &config.index_column,
        config.group_columns(),
        settings.frequency,
        config.aggregation,
        engine,
    )
}
