use chrono::NaiveTime;
use polars::prelude::*;
use std::collections::BTreeMap;
use std::io::Cursor;
use tracing::debug;

use super::{ColumnType, parse_timestamp, timestamps};
use crate::error::TransformError;

const DATE_ONLY: &str = "%Y-%m-%d";
const DATE_TIME: &str = "%Y-%m-%d %H:%M:%S";

/// Column contract used when loading a typed frame.
#[derive(Debug, Clone, Copy)]
pub struct Schema<'a> {
    pub dtypes: &'a BTreeMap<String, ColumnType>,
    pub date_columns: &'a [String],
    pub index_column: &'a str,
}

impl Schema<'_> {
    fn dtype_of(&self, column: &str) -> Option<ColumnType> {
        if column == self.index_column || self.date_columns.iter().any(|c| c == column) {
            Some(ColumnType::Datetime)
        } else {
            self.dtypes.get(column).copied()
        }
    }
}

/// Loads CSV bytes as string columns.
///
/// Headers and cells are trimmed, empty cells become null, and rows shorter
/// or longer than the header are padded or cut.
pub fn read_text_frame(body: &[u8]) -> Result<DataFrame, TransformError> {
    let mut frame = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .map_parse_options(|opts| opts.with_truncate_ragged_lines(true))
        .into_reader_with_file_handle(Cursor::new(body))
        .finish()?;

    let names: Vec<String> = frame
        .get_column_names()
        .iter()
        .map(|name| name.trim().to_string())
        .collect();
    frame.set_column_names(names)?;

    let columns = frame
        .get_columns()
        .iter()
        .map(trim_cells)
        .collect::<PolarsResult<Vec<_>>>()?;
    Ok(DataFrame::new(columns)?)
}

fn trim_cells(column: &Column) -> PolarsResult<Column> {
    let trimmed: StringChunked = column
        .str()?
        .into_iter()
        .map(|cell| cell.map(str::trim).filter(|s| !s.is_empty()))
        .collect();
    Ok(trimmed.with_name(column.name().clone()).into_column())
}

/// Loads CSV bytes into a typed frame.
///
/// The index column comes first as a timestamp column, followed by the other
/// columns named in `dtypes` in file order. Declared date columns are parsed
/// as timestamps whatever their dtype entry says. A cell that does not parse
/// as its declared type fails the load with its row and column.
pub fn read_frame(body: &[u8], schema: &Schema<'_>) -> Result<DataFrame, TransformError> {
    let raw = read_text_frame(body)?;

    let required = schema
        .dtypes
        .keys()
        .chain(schema.date_columns)
        .map(String::as_str)
        .chain([schema.index_column]);
    for name in required {
        if raw.get_column_index(name).is_none() {
            return Err(TransformError::MissingColumn(name.to_string()));
        }
    }

    let mut columns = vec![typed_column(raw.column(schema.index_column)?, ColumnType::Datetime)?];
    for column in raw.get_columns() {
        if column.name().as_str() == schema.index_column {
            continue;
        }
        if let Some(dtype) = schema.dtype_of(column.name()) {
            columns.push(typed_column(column, dtype)?);
        }
    }

    let frame = DataFrame::new(columns)?;
    debug!(rows = frame.height(), columns = frame.width(), "Frame loaded");
    Ok(frame)
}

fn typed_column(raw: &Column, dtype: ColumnType) -> Result<Column, TransformError> {
    match dtype {
        ColumnType::Text => Ok(raw.clone()),
        ColumnType::Datetime => parse_datetime_column(raw),
        ColumnType::Int | ColumnType::Float => {
            let parsed = raw.cast(&dtype.data_type())?;
            if parsed.null_count() > raw.null_count() {
                return Err(first_parse_failure(raw, &parsed, dtype));
            }
            Ok(parsed)
        }
    }
}

fn parse_datetime_column(raw: &Column) -> Result<Column, TransformError> {
    let mut micros = Vec::with_capacity(raw.len());
    for (row, cell) in raw.str()?.into_iter().enumerate() {
        let value = match cell {
            None => None,
            Some(text) => {
                let ts = parse_timestamp(text).ok_or_else(|| TransformError::Parse {
                    row,
                    column: raw.name().to_string(),
                    value: text.to_string(),
                    expected: ColumnType::Datetime.describe(),
                })?;
                Some(ts.and_utc().timestamp_micros())
            }
        };
        micros.push(value);
    }
    Ok(Column::new(raw.name().clone(), micros).cast(&ColumnType::Datetime.data_type())?)
}

/// First row where a present cell became null during a cast.
fn first_parse_failure(raw: &Column, parsed: &Column, dtype: ColumnType) -> TransformError {
    let present = raw.is_not_null();
    let failed = parsed.is_null();
    let row = (&present)
        .into_iter()
        .zip(&failed)
        .position(|(p, f)| p == Some(true) && f == Some(true))
        .unwrap_or_default();
    let value = raw
        .str()
        .ok()
        .and_then(|cells| cells.get(row))
        .unwrap_or_default()
        .to_string();

    TransformError::Parse {
        row,
        column: raw.name().to_string(),
        value,
        expected: dtype.describe(),
    }
}

/// Serializes a frame as CSV with a header row.
///
/// A timestamp column prints as dates when every value in it falls on
/// midnight, and with the time of day otherwise. Floats keep a decimal point.
pub fn write_frame(frame: &DataFrame) -> Result<Vec<u8>, TransformError> {
    let columns = frame
        .get_columns()
        .iter()
        .map(render_timestamps)
        .collect::<Result<Vec<_>, _>>()?;
    let mut rendered = DataFrame::new(columns)?;

    let mut out = Vec::new();
    CsvWriter::new(&mut out)
        .include_header(true)
        .finish(&mut rendered)?;
    Ok(out)
}

fn render_timestamps(column: &Column) -> Result<Column, TransformError> {
    if !matches!(column.dtype(), DataType::Datetime(..)) {
        return Ok(column.clone());
    }
    let with_time = timestamps(column)?
        .into_iter()
        .flatten()
        .any(|ts| ts.time() != NaiveTime::MIN);
    let format = if with_time { DATE_TIME } else { DATE_ONLY };

    let text = column.datetime()?.to_string(format)?;
    Ok(text.with_name(column.name().clone()).into_column())
}

/// Splits a frame sorted on `index` into consecutive runs sharing an index
/// value. Each run is a zero-copy slice of the input.
pub fn split_by_index(frame: &DataFrame, index: &str) -> Result<Vec<DataFrame>, TransformError> {
    let keys = frame.column(index)?.cast(&DataType::Int64)?;
    let keys: Vec<Option<i64>> = keys.i64()?.into_iter().collect();

    let mut parts = Vec::new();
    let mut start = 0;
    for end in 1..=keys.len() {
        if end == keys.len() || keys[end] != keys[start] {
            parts.push(frame.slice(start as i64, end - start));
            start = end;
        }
    }
    Ok(parts)
}
