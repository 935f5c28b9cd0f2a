//! Candidate input filenames for a work unit.

use chrono::{Datelike, Months, NaiveDate};

use crate::config::TaskKind;
use crate::error::TransformError;

/// Resolves a cab work-unit token into the input filenames it covers.
pub trait FileNamer: Send + Sync {
    fn candidate_files(&self, kind: TaskKind, token: &str) -> Result<Vec<String>, TransformError>;
}

/// Names monthly TLC trip files: `green_tripdata_2021-03.csv`,
/// `yellow_tripdata_2021-03.csv`.
///
/// Tokens are a single month (`2021-03`) or an inclusive range
/// (`2021-01:2021-06`).
#[derive(Debug, Clone, Default)]
pub struct TlcFileNamer;

impl FileNamer for TlcFileNamer {
    fn candidate_files(&self, kind: TaskKind, token: &str) -> Result<Vec<String>, TransformError> {
        let prefix = match kind {
            TaskKind::GreenCabs => "green",
            TaskKind::YellowCabs => "yellow",
            _ => return Ok(Vec::new()),
        };

        let (start, end) = match token.split_once(':') {
            Some((a, b)) => (parse_month(a)?, parse_month(b)?),
            None => {
                let month = parse_month(token)?;
                (month, month)
            }
        };
        if end < start {
            return Err(TransformError::WorkUnit(token.to_string()));
        }

        let mut files = Vec::new();
        let mut month = Some(start);
        while let Some(m) = month.filter(|m| *m <= end) {
            files.push(format!("{prefix}_tripdata_{}.csv", m.format("%Y-%m")));
            month = m.checked_add_months(Months::new(1));
        }
        Ok(files)
    }
}

/// Daily turnstile files for a `YYYY-MM` token, days 01 through 31.
///
/// Short months produce names for days that do not exist; those objects are
/// simply absent from the store.
pub fn turnstile_files(token: &str) -> Result<Vec<String>, TransformError> {
    let month = parse_month(token)?;
    let stem = format!("turnstile_{}{:02}", month.year(), month.month());
    Ok((1..=31).map(|day| format!("{stem}{day:02}.txt")).collect())
}

/// Parses `YYYY-MM` (month may be unpadded) into the first day of the month.
fn parse_month(token: &str) -> Result<NaiveDate, TransformError> {
    let invalid = || TransformError::WorkUnit(token.to_string());
    let (year, month) = token.trim().split_once('-').ok_or_else(invalid)?;
    if year.len() != 4 {
        return Err(invalid());
    }
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)
}

/// Validates a bulk-task year (`2021`).
pub fn parse_year(token: &str) -> Result<String, TransformError> {
    let token = token.trim();
    if token.len() == 4 && token.chars().all(|c| c.is_ascii_digit()) {
        Ok(token.to_string())
    } else {
        Err(TransformError::WorkUnit(token.to_string()))
    }
}
