//! Task configuration registry.
//!
//! Stored as a JSON file holding the shared resample settings and one entry
//! per task type:
//! ```json
//! {
//!   "resample": { "weekday": 2, "frequency": "1M" },
//!   "tasks": {
//!     "rs-transit": {
//!       "input": "cl-transit",
//!       "output": "rs-transit",
//!       "dtypes": { "STATION": "object", "DATE": "object", "ENTRIES": "int64" },
//!       "date_columns": ["DATE"],
//!       "diff": { "compute": true, "columns": ["ENTRIES"], "derived_columns": ["ENTRIES_DIFF"] },
//!       "group": { "compute": true, "by_columns": ["STATION"] },
//!       "aggregation": "sum",
//!       "index_column": "DATE"
//!     }
//!   }
//! }
//! ```
//! Configs are resolved once per run and passed by reference into the tasks.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::ConfigError;
use crate::frame::{ColumnType, Schema};
use crate::transform::{Aggregation, Frequency};

/// Dataset family a task type belongs to, taken from the suffix of the task
/// type (`rs-transit` → [`TaskKind::Transit`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    GreenCabs,
    YellowCabs,
    Transit,
    Traffic,
    Other,
}

impl TaskKind {
    pub fn from_task_type(task_type: &str) -> Self {
        match task_suffix(task_type) {
            "gcabs" => TaskKind::GreenCabs,
            "ycabs" => TaskKind::YellowCabs,
            "transit" => TaskKind::Transit,
            "traffic" => TaskKind::Traffic,
            _ => TaskKind::Other,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::GreenCabs => "gcabs",
            TaskKind::YellowCabs => "ycabs",
            TaskKind::Transit => "transit",
            TaskKind::Traffic => "traffic",
            TaskKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// Part of a task type after its last `-`.
pub fn task_suffix(task_type: &str) -> &str {
    task_type.rsplit('-').next().unwrap_or(task_type)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffSpec {
    #[serde(default)]
    pub compute: bool,
    #[serde(default, alias = "cols")]
    pub columns: Vec<String>,
    #[serde(default, alias = "new_cols")]
    pub derived_columns: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    #[serde(default)]
    pub compute: bool,
    #[serde(default, alias = "by_cols")]
    pub by_columns: Vec<String>,
}

/// Everything a task needs to know about one task type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(skip)]
    pub task_type: String,
    #[serde(alias = "in")]
    pub input: String,
    #[serde(alias = "out")]
    pub output: String,
    #[serde(default)]
    pub dtypes: BTreeMap<String, ColumnType>,
    #[serde(default, alias = "date_cols")]
    pub date_columns: Vec<String>,
    #[serde(default)]
    pub diff: DiffSpec,
    #[serde(default)]
    pub group: GroupSpec,
    #[serde(default, alias = "aggr_func")]
    pub aggregation: Aggregation,
    #[serde(default, alias = "index")]
    pub index_column: String,
    #[serde(default)]
    pub split_by: Option<Vec<String>>,
}

impl TaskConfig {
    pub fn kind(&self) -> TaskKind {
        TaskKind::from_task_type(&self.task_type)
    }

    pub fn schema(&self) -> Schema<'_> {
        Schema {
            dtypes: &self.dtypes,
            date_columns: &self.date_columns,
            index_column: &self.index_column,
        }
    }

    /// Grouping columns used alongside the time bucket.
    pub fn group_columns(&self) -> &[String] {
        if self.group.compute {
            &self.group.by_columns
        } else {
            &[]
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::Invalid {
            task_type: self.task_type.clone(),
            reason: reason.into(),
        }
    }

    /// Checks the fields the resample tasks rely on.
    pub fn validate_for_resample(&self) -> Result<(), ConfigError> {
        if self.index_column.is_empty() {
            return Err(self.invalid("index_column is not set"));
        }
        if !self.date_columns.contains(&self.index_column) {
            return Err(self.invalid(format!(
                "index column '{}' must be listed in date_columns",
                self.index_column
            )));
        }

        let declared = |c: &String| self.dtypes.contains_key(c);
        if let Some(c) = self.date_columns.iter().find(|c| !declared(c)) {
            return Err(self.invalid(format!("date column '{c}' has no dtype")));
        }
        if let Some(c) = self.group_columns().iter().find(|c| !declared(c)) {
            return Err(self.invalid(format!("group column '{c}' has no dtype")));
        }

        if self.diff.compute {
            if self.diff.columns.len() != self.diff.derived_columns.len() {
                return Err(self.invalid(format!(
                    "diff has {} source columns but {} derived columns",
                    self.diff.columns.len(),
                    self.diff.derived_columns.len()
                )));
            }
            if let Some(c) = self.diff.columns.iter().find(|c| !declared(c)) {
                return Err(self.invalid(format!("diff column '{c}' has no dtype")));
            }
            if let Some(c) = self.diff.derived_columns.iter().find(|c| declared(c)) {
                return Err(self.invalid(format!("derived column '{c}' shadows a declared column")));
            }
        } else if self.kind() == TaskKind::Transit {
            return Err(self.invalid("transit tasks need diff columns for outlier removal"));
        }

        Ok(())
    }

    /// Checks the fields the regrouper relies on and returns the split columns.
    pub fn split_columns(&self) -> Result<&[String], ConfigError> {
        match self.split_by.as_deref() {
            Some(cols) if !cols.is_empty() => Ok(cols),
            _ => Err(self.invalid("split_by is not set")),
        }
    }
}

/// Settings shared by every resample task in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleSettings {
    /// Weekday kept by the filter stage, 0 = Monday … 6 = Sunday.
    /// `None` disables the filter.
    pub weekday: Option<u8>,
    #[serde(alias = "freq")]
    pub frequency: Frequency,
    /// Gzip output objects and append `.gz` to their keys.
    pub gzip: bool,
    /// Upper bound on partitions processed at once by the bulk task.
    pub concurrency: usize,
}

impl Default for ResampleSettings {
    fn default() -> Self {
        Self {
            weekday: Some(2),
            frequency: Frequency::MonthEnd,
            gzip: false,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    resample: ResampleSettings,
    tasks: HashMap<String, TaskConfig>,
}

/// Task type → configuration lookup.
#[derive(Debug, Clone)]
pub struct TaskRegistry {
    settings: ResampleSettings,
    entries: HashMap<String, TaskConfig>,
}

impl TaskRegistry {
    /// Loads the registry from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_json(&content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let file: RegistryFile = serde_json::from_str(content)?;
        let entries = file
            .tasks
            .into_iter()
            .map(|(task_type, mut config)| {
                config.task_type = task_type.clone();
                (task_type, config)
            })
            .collect();
        Ok(Self {
            settings: file.resample,
            entries,
        })
    }

    pub fn settings(&self) -> &ResampleSettings {
        &self.settings
    }

    pub fn resolve(&self, task_type: &str) -> Result<TaskConfig, ConfigError> {
        let config = self
            .entries
            .get(task_type)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownTask(task_type.to_string()))?;

        if let Some(weekday) = self.settings.weekday.filter(|w| *w > 6) {
            return Err(config.invalid(format!("weekday {weekday} is outside 0..=6")));
        }
        Ok(config)
    }
}
