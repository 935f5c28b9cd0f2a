//! CLI entry point for the transport resampling pipeline.
//!
//! Provides subcommands for resampling one work unit file by file, resampling
//! whole years as partitioned datasets, and regrouping a container by column
//! value.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use transport_resample::{
    config::{ResampleSettings, TaskRegistry},
    naming::TlcFileNamer,
    store::{LocalStore, ObjectStore, S3Store},
    tasks::{self, WorkUnit},
};

#[derive(Parser)]
#[command(name = "transport_resample")]
#[command(about = "Resample and regroup transportation datasets in object storage", long_about = None)]
struct Cli {
    /// Task registry JSON file
    #[arg(long, env = "TASK_CONFIG_PATH", default_value = "config/tasks.json")]
    config: String,

    /// Use a directory tree instead of S3 (containers are subdirectories)
    #[arg(long, global = true)]
    local_root: Option<PathBuf>,

    /// Gzip output objects
    #[arg(long, global = true, default_value_t = false)]
    gzip: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resample each file of a work unit (e.g. "2021-03")
    Resample {
        /// Task type, e.g. rs-transit
        task_type: String,

        /// Date-scoped work unit token
        #[arg(required_unless_present = "files")]
        work_unit: Option<String>,

        /// Explicit input keys instead of a work unit token
        #[arg(long, value_delimiter = ',')]
        files: Option<Vec<String>>,
    },
    /// Resample whole years of partition files
    ResampleBulk {
        /// Task type, e.g. rs-ycabs
        task_type: String,

        /// Years to process, e.g. 2019 2020
        #[arg(required = true)]
        years: Vec<String>,

        /// Maximum number of partitions processed at once
        #[arg(short, long)]
        concurrency: Option<usize>,
    },
    /// Concatenate a container's files and split them by column value
    Regroup {
        /// Task type with a split_by column, e.g. rg-gcabs
        task_type: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/transport_resample.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("transport_resample.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let registry = TaskRegistry::load(&cli.config)?;
    let mut settings: ResampleSettings = registry.settings().clone();
    settings.gzip |= cli.gzip;

    let store: Arc<dyn ObjectStore> = match &cli.local_root {
        Some(root) => {
            info!(root = %root.display(), "Using local object store");
            Arc::new(LocalStore::new(root))
        }
        None => Arc::new(S3Store::from_env().await),
    };

    match cli.command {
        Commands::Resample {
            task_type,
            work_unit,
            files,
        } => {
            let config = registry.resolve(&task_type)?;
            let work_unit = match (files, work_unit) {
                (Some(files), _) => WorkUnit::Files(files),
                (None, Some(token)) => WorkUnit::Token(token),
                (None, None) => anyhow::bail!("either a work unit or --files is required"),
            };
            info!(task_type = %task_type, ?work_unit, "Resampling");

            let summary = tasks::perform(store.as_ref(), &config, &settings, &TlcFileNamer, &work_unit)
                .await
                .with_context(|| format!("resample failed for task type {task_type}"))?;
            info!(?summary, "Done");
        }
        Commands::ResampleBulk {
            task_type,
            years,
            concurrency,
        } => {
            let config = registry.resolve(&task_type)?;
            if let Some(concurrency) = concurrency {
                settings.concurrency = concurrency;
            }
            info!(task_type = %task_type, ?years, "Bulk resampling");

            let summary = tasks::perform_bulk(Arc::clone(&store), &config, &settings, &years)
                .await
                .with_context(|| format!("bulk resample failed for task type {task_type}"))?;
            info!(?summary, "Done");
        }
        Commands::Regroup { task_type } => {
            let config = registry.resolve(&task_type)?;
            info!(task_type = %task_type, "Regrouping");

            let summary = tasks::regroup(store.as_ref(), &config, settings.gzip)
                .await
                .with_context(|| format!("regroup failed for task type {task_type}"))?;
            info!(?summary, "Done");
        }
    }

    Ok(())
}
