//! Daily CSV log writer.
//!
//! One file per calendar day, named `<prefix>_<YYYYMMDD>.csv`. A flush never
//! appends at the byte level: existing rows are read back, the new rows are
//! concatenated, and the whole file is rewritten through a sibling temp file
//! and an atomic rename, so an interrupted flush cannot destroy what an
//! earlier session (or an earlier run the same day) already persisted.

use crate::core::{ConvertedSample, DurableLog};
#[cfg(feature = "storage_csv")]
use crate::core::LOG_HEADER;
use crate::error::{AppResult, DaqError};
#[cfg(feature = "storage_csv")]
use chrono::Local;
use chrono::NaiveDate;
use std::path::PathBuf;

/// Writer for the per-day sample log.
#[cfg(feature = "storage_csv")]
#[derive(Debug, Clone)]
pub struct DailyLogWriter {
    dir: PathBuf,
    prefix: String,
}

#[cfg(feature = "storage_csv")]
impl DailyLogWriter {
    /// Creates a writer targeting `dir`, naming files with `prefix`.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Log file path for a calendar date.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}_{}.csv", self.prefix, date.format("%Y%m%d")))
    }

    /// Merges `rows` into the log file for `date`, rewriting it in full.
    pub fn append_for_date(
        &self,
        date: NaiveDate,
        rows: &[ConvertedSample],
    ) -> AppResult<PathBuf> {
        let path = self.path_for(date);
        if rows.is_empty() {
            return Ok(path);
        }

        std::fs::create_dir_all(&self.dir).map_err(|e| {
            DaqError::Storage(format!("cannot create '{}': {e}", self.dir.display()))
        })?;

        // Prior content, header excluded, kept verbatim.
        let mut records: Vec<csv::StringRecord> = Vec::new();
        if path.exists() {
            let mut reader = csv::Reader::from_path(&path)
                .map_err(|e| DaqError::Storage(format!("cannot read '{}': {e}", path.display())))?;
            for record in reader.records() {
                records.push(record.map_err(|e| {
                    DaqError::Storage(format!("corrupt row in '{}': {e}", path.display()))
                })?);
            }
        }

        let tmp = path.with_extension("csv.tmp");
        let mut writer = csv::Writer::from_path(&tmp)
            .map_err(|e| DaqError::Storage(format!("cannot write '{}': {e}", tmp.display())))?;
        writer
            .write_record(LOG_HEADER)
            .map_err(|e| DaqError::Storage(e.to_string()))?;
        for record in &records {
            writer
                .write_record(record)
                .map_err(|e| DaqError::Storage(e.to_string()))?;
        }
        for sample in rows {
            writer
                .write_record([
                    sample.timestamp_string(),
                    render_value(sample.emf),
                    render_value(sample.tc_temp),
                    render_value(sample.resistance),
                    render_value(sample.prt_temp),
                ])
                .map_err(|e| DaqError::Storage(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| DaqError::Storage(e.to_string()))?;
        drop(writer);

        std::fs::rename(&tmp, &path).map_err(|e| {
            DaqError::Storage(format!("cannot replace '{}': {e}", path.display()))
        })?;

        log::debug!(
            "Rewrote '{}' with {} existing + {} new rows",
            path.display(),
            records.len(),
            rows.len()
        );
        Ok(path)
    }
}

#[cfg(feature = "storage_csv")]
impl DurableLog for DailyLogWriter {
    fn append(&self, rows: &[ConvertedSample]) -> AppResult<PathBuf> {
        self.append_for_date(Local::now().date_naive(), rows)
    }
}

/// NaN quantities become empty fields, like a spreadsheet export.
#[cfg(feature = "storage_csv")]
fn render_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        format!("{value}")
    }
}

#[cfg(not(feature = "storage_csv"))]
#[derive(Debug, Clone)]
pub struct DailyLogWriter;

#[cfg(not(feature = "storage_csv"))]
impl DailyLogWriter {
    pub fn new(_dir: impl Into<PathBuf>, _prefix: impl Into<String>) -> Self {
        Self
    }

    pub fn append_for_date(
        &self,
        _date: NaiveDate,
        _rows: &[ConvertedSample],
    ) -> AppResult<PathBuf> {
        Err(DaqError::FeatureNotEnabled("storage_csv".to_string()))
    }
}

#[cfg(not(feature = "storage_csv"))]
impl DurableLog for DailyLogWriter {
    fn append(&self, _rows: &[ConvertedSample]) -> AppResult<PathBuf> {
        Err(DaqError::FeatureNotEnabled("storage_csv".to_string()))
    }
}
