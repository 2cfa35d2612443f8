//! Durable append-only CSV table.
//!
//! Layout: a `timestamp` column (RFC 3339) followed by one column per
//! account. An empty field marks an absent value. When a sample names an
//! account that the header does not know yet, the file is rewritten once
//! with the widened header; every other append adds a single line.

use crate::core::config::TIMESTAMP_COLUMN;
use crate::core::error::MonitorError;
use crate::core::sample::{Sample, SampleSeries};
use crate::store::SampleStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Naive layouts written by earlier tools, read as local time.
const NAIVE_TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
];

pub struct CsvSampleStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl CsvSampleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    fn read_header(&self) -> Result<Option<Vec<String>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        match reader.byte_records().next() {
            Some(record) => Ok(Some(decode_lossy(&record?).iter().map(str::to_string).collect())),
            None => Ok(None),
        }
    }

    fn write_sample(&self, sample: &Sample) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        match self.read_header()? {
            Some(header) if sample.accounts().all(|a| header.iter().any(|h| h == a)) => {
                self.append_row(&header, sample)
            }
            Some(header) => {
                let mut widened = header;
                for account in sample.accounts() {
                    if !widened.iter().any(|h| h == account) {
                        widened.push(account.to_string());
                    }
                }
                debug!(columns = widened.len(), "Widening CSV header");
                self.rewrite_with(&widened, sample)
            }
            None => {
                let mut header = vec![TIMESTAMP_COLUMN.to_string()];
                header.extend(sample.accounts().map(str::to_string));
                self.rewrite_with(&header, sample)
            }
        }
    }

    fn append_row(&self, header: &[String], sample: &Sample) -> Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {} for append", self.path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(row_for(header, sample))?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_data()
            .with_context(|| format!("Failed to sync {}", self.path.display()))?;
        Ok(())
    }

    /// Rewrites the table under `header`, carrying existing rows over and
    /// appending `sample`. The new file replaces the old one atomically.
    fn rewrite_with(&self, header: &[String], sample: &Sample) -> Result<()> {
        let (old_header, records) = self.read_table()?.unwrap_or_default();
        let tmp_path = self.path.with_extension("csv.tmp");

        {
            let file = File::create(&tmp_path)
                .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_writer(file);
            writer.write_record(header)?;
            for record in &records {
                let mut row = vec![String::new(); header.len()];
                for (column, field) in old_header.iter().zip(record.iter()) {
                    if let Some(i) = header.iter().position(|h| h == column) {
                        row[i] = field.to_string();
                    }
                }
                writer.write_record(&row)?;
            }
            writer.write_record(row_for(header, sample))?;
            let mut file = writer.into_inner().map_err(|e| e.into_error())?;
            file.flush()?;
            file.sync_all()
                .with_context(|| format!("Failed to sync {}", tmp_path.display()))?;
        }

        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!(
                "Failed to move {} over {}",
                tmp_path.display(),
                self.path.display()
            )
        })?;
        Ok(())
    }

    /// Header and raw records, or `None` if the file does not exist.
    fn read_table(&self) -> Result<Option<(Vec<String>, Vec<csv::StringRecord>)>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        let header: Vec<String> = decode_lossy(reader.byte_headers()?)
            .iter()
            .map(str::to_string)
            .collect();
        let mut records = Vec::new();
        for record in reader.byte_records() {
            records.push(decode_lossy(&record?));
        }
        Ok(Some((header, records)))
    }

    fn read_series(&self) -> Result<Option<SampleSeries>> {
        let Some((header, rows)) = self.read_table()? else {
            return Ok(None);
        };

        let timestamp_index = header
            .iter()
            .position(|h| h == TIMESTAMP_COLUMN)
            .unwrap_or(0);

        let mut samples = Vec::with_capacity(rows.len());
        for (line, record) in rows.iter().enumerate() {
            let raw_timestamp = record.get(timestamp_index).unwrap_or("");
            let Some(timestamp) = parse_timestamp(raw_timestamp) else {
                warn!(row = line + 1, raw_timestamp, "Skipping row with unreadable timestamp");
                continue;
            };

            let mut sample = Sample::new(timestamp);
            for (i, column) in header.iter().enumerate() {
                if i == timestamp_index || column.trim().is_empty() {
                    continue;
                }
                let value = parse_value(record.get(i).unwrap_or(""), column);
                sample = sample.with_value(column.clone(), value);
            }
            samples.push(sample);
        }

        if samples.is_empty() {
            return Ok(None);
        }
        Ok(Some(SampleSeries::from_samples(&samples)))
    }
}

/// Decodes a raw record, replacing invalid UTF-8 so that one damaged field
/// only ever costs that field.
fn decode_lossy(record: &csv::ByteRecord) -> csv::StringRecord {
    match csv::StringRecord::from_byte_record(record.clone()) {
        Ok(record) => record,
        Err(e) => {
            warn!(error = %e, "Replacing invalid UTF-8 in CSV record");
            record
                .iter()
                .map(|field| String::from_utf8_lossy(field).into_owned())
                .collect()
        }
    }
}

fn row_for(header: &[String], sample: &Sample) -> Vec<String> {
    header
        .iter()
        .map(|column| {
            if column == TIMESTAMP_COLUMN {
                sample
                    .timestamp
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true)
            } else {
                sample
                    .value(column)
                    .filter(|v| !v.is_nan())
                    .map(|v| v.to_string())
                    .unwrap_or_default()
            }
        })
        .collect()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS.iter().find_map(|format| {
        let naive = NaiveDateTime::parse_from_str(raw, format).ok()?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|ts| ts.with_timezone(&Utc))
    })
}

fn parse_value(raw: &str, column: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty()
        || raw.eq_ignore_ascii_case("nan")
        || raw.eq_ignore_ascii_case("none")
        || raw.eq_ignore_ascii_case("null")
    {
        return None;
    }
    match raw.parse::<f64>() {
        Ok(value) if !value.is_nan() => Some(value),
        _ => {
            warn!(column, raw, "Unreadable value, treating as absent");
            None
        }
    }
}

#[async_trait]
impl SampleStore for CsvSampleStore {
    async fn append(&self, sample: &Sample) -> Result<(), MonitorError> {
        let _guard = self.lock.write().await;
        self.write_sample(sample)
            .map_err(|e| MonitorError::StoreWriteFailed(format!("{e:#}")))?;
        debug!(path = %self.path.display(), "CSV store APPEND");
        Ok(())
    }

    async fn load_all(&self) -> Result<Option<SampleSeries>, MonitorError> {
        let _guard = self.lock.read().await;
        self.read_series()
            .map_err(|e| MonitorError::StoreReadFailed(format!("{e:#}")))
    }
}
