//! Ingestion boundary: turns a columnar input source into normalized
//! [`SensorRecord`]s.
//!
//! Sources hand over loosely-typed rows (column name -> raw string). Field
//! names vary between sensor firmwares, so every measurement accepts a list
//! of aliases in a fixed priority order; the first alias present in the row
//! wins, even if its value later fails to parse. Numeric fields default to
//! `0` and the timestamp defaults to the capture time. A row is dropped only
//! when its temperature or humidity still is not a number after defaulting,
//! which in practice means the source literally said `NaN`.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::{now_iso, SensorRecord};

/// One raw row as delivered by a source: column name to unparsed value.
pub type RawRow = HashMap<String, String>;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Source unreadable: {0}")]
    Unreadable(String),

    #[error("Source has no header row: {0}")]
    MissingHeader(String),
}

/// A columnar input the record store can load from.
pub trait RecordSource: Send + Sync {
    /// Human-readable description for log lines.
    fn description(&self) -> String;

    /// Every raw row the source currently holds, in source order.
    fn fetch_rows(&self) -> Result<Vec<RawRow>, IngestError>;
}

const TIMESTAMP_ALIASES: &[&str] = &["timestamp", "time", "created_at", "date"];
const TEMPERATURE_ALIASES: &[&str] = &["temperature", "temp"];
const HUMIDITY_ALIASES: &[&str] = &["humidity", "hum"];
const BATTERY_ALIASES: &[&str] = &["battery_voltage", "battery", "voltage"];
const MOTION_ALIASES: &[&str] = &["motion", "motion_detected", "pir"];

fn first_alias<'a>(row: &'a RawRow, aliases: &[&str]) -> Option<&'a str> {
    aliases
        .iter()
        .find_map(|name| row.get(*name))
        .map(String::as_str)
}

fn numeric_field(row: &RawRow, aliases: &[&str]) -> f64 {
    first_alias(row, aliases)
        .and_then(|value| value.parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn timestamp_field(row: &RawRow) -> String {
    match first_alias(row, TIMESTAMP_ALIASES) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => now_iso(),
    }
}

/// Normalizes one raw row, or `None` when the row must be dropped because
/// temperature or humidity is still not a number after defaulting.
pub fn normalize_row(row: &RawRow, id: u64) -> Option<SensorRecord> {
    let temperature = numeric_field(row, TEMPERATURE_ALIASES);
    let humidity = numeric_field(row, HUMIDITY_ALIASES);

    if temperature.is_nan() || humidity.is_nan() {
        log::warn!("Dropping malformed row: non-numeric temperature or humidity");
        return None;
    }

    Some(SensorRecord {
        id,
        timestamp: timestamp_field(row),
        temperature,
        humidity,
        battery_voltage: numeric_field(row, BATTERY_ALIASES),
        motion: numeric_field(row, MOTION_ALIASES),
    })
}

/// A comma-separated file with a header row naming the columns.
pub struct CsvFileSource {
    path: PathBuf,
}

impl CsvFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSource for CsvFileSource {
    fn description(&self) -> String {
        format!("csv file {}", self.path.display())
    }

    fn fetch_rows(&self) -> Result<Vec<RawRow>, IngestError> {
        let content = fs::read_to_string(&self.path)
            .map_err(|e| IngestError::Unreadable(format!("{}: {}", self.path.display(), e)))?;

        // Robust line handling: trim lines and ignore empty ones.
        let mut lines = content
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty());

        let header = lines
            .next()
            .ok_or_else(|| IngestError::MissingHeader(self.path.display().to_string()))?;
        let columns: Vec<String> = header
            .split(',')
            .map(|c| c.trim().to_lowercase())
            .collect();

        let mut rows = Vec::new();
        for line in lines {
            let mut row = RawRow::new();
            for (i, value) in line.split(',').enumerate() {
                if let Some(name) = columns.get(i) {
                    row.insert(name.clone(), value.trim().to_string());
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }
}
