//! CSV adapter for observation tables.
//!
//! The first column holds the timestamp (RFC 3339, naive `YYYY-MM-DD HH:MM:SS`
//! read as UTC, or epoch milliseconds); every other column is numeric. Empty,
//! `nan` and `null` cells load as missing and missing cells are written empty.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use csv::StringRecord;
use thiserror::Error;
use tracing::info;

use crate::table::{ObservationTable, TableError};

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV input has no header row")]
    MissingHeader,
    #[error("line {line} has {found} fields, header has {expected}")]
    RaggedRow {
        line: usize,
        found: usize,
        expected: usize,
    },
    #[error("failed to parse {column} value '{value}' at line {line}")]
    ParseField {
        column: String,
        line: usize,
        value: String,
    },
    #[error("invalid timestamp '{value}' at line {line}")]
    InvalidTimestamp { line: usize, value: String },
    #[error(transparent)]
    Table(#[from] TableError),
}

pub fn read_observation_csv(path: &Path) -> Result<ObservationTable, LoadError> {
    let file = fs::File::open(path)?;
    let table = read_observation_csv_from(file)?;
    info!(
        component = "loader",
        event = "loader.csv.read",
        path = %path.display(),
        rows = table.len(),
        columns = table.columns().len()
    );
    Ok(table)
}

pub fn read_observation_csv_from<R: Read>(reader: R) -> Result<ObservationTable, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(LoadError::MissingHeader);
    }
    let names: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut index = Vec::new();
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        // 1-based file line; the header occupies line 1
        let line = record
            .position()
            .map_or(row + 2, |pos| pos.line() as usize);
        if record.len() != headers.len() {
            return Err(LoadError::RaggedRow {
                line,
                found: record.len(),
                expected: headers.len(),
            });
        }
        index.push(parse_timestamp(&record, line)?);
        for (col, name) in names.iter().enumerate() {
            values[col].push(parse_cell(&record, col + 1, name, line)?);
        }
    }

    Ok(ObservationTable::from_columns(
        index,
        names.into_iter().zip(values).collect(),
    )?)
}

pub fn write_feature_csv(table: &ObservationTable, path: &Path) -> Result<(), LoadError> {
    let file = fs::File::create(path)?;
    write_feature_csv_to(table, file)?;
    info!(
        component = "loader",
        event = "loader.csv.written",
        path = %path.display(),
        rows = table.len(),
        columns = table.columns().len()
    );
    Ok(())
}

pub fn write_feature_csv_to<W: Write>(table: &ObservationTable, writer: W) -> Result<(), LoadError> {
    let mut writer = csv::Writer::from_writer(writer);

    let mut header = vec!["timestamp"];
    header.extend(table.column_names());
    writer.write_record(&header)?;

    for (row, ts) in table.index().iter().enumerate() {
        let mut record = StringRecord::with_capacity(0, table.columns().len() + 1);
        record.push_field(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true));
        for column in table.columns() {
            let value = column.values[row];
            if value.is_nan() {
                record.push_field("");
            } else {
                record.push_field(&value.to_string());
            }
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn parse_timestamp(record: &StringRecord, line: usize) -> Result<DateTime<Utc>, LoadError> {
    let raw = record.get(0).unwrap_or_default();
    let invalid = || LoadError::InvalidTimestamp {
        line,
        value: raw.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    let millis = raw.parse::<i64>().map_err(|_| invalid())?;
    Utc.timestamp_millis_opt(millis).single().ok_or_else(invalid)
}

fn parse_cell(
    record: &StringRecord,
    idx: usize,
    column: &str,
    line: usize,
) -> Result<f64, LoadError> {
    let raw = record.get(idx).unwrap_or_default();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") || raw.eq_ignore_ascii_case("null") {
        return Ok(f64::NAN);
    }
    raw.parse::<f64>().map_err(|_| LoadError::ParseField {
        column: column.to_string(),
        line,
        value: raw.to_string(),
    })
}
