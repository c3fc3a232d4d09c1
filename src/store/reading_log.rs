use crate::error::StoreError;
use crate::readings::Sample;
use chrono_tz::Tz;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// Timestamp layout written to the log, offset included
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%z";

/// Durable destination for appended samples
///
/// Implementations write synchronously; the caller blocks until the record
/// is written or the write fails.
#[cfg_attr(test, mockall::automock)]
pub trait ReadingSink: Send {
    /// Append one record for `sample`
    fn append(&mut self, sample: &Sample) -> Result<(), StoreError>;
}

/// One row of the reading log
///
/// `insulin` and `carbs` are carried through for manual annotation and are
/// never interpreted by the watcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogRecord {
    pub timestamp: String,
    pub value: f64,
    pub trend: u8,
    pub insulin: Option<f64>,
    pub carbs: Option<f64>,
}

impl LogRecord {
    /// Build a record for `sample` with its timestamp rendered in `tz`
    pub fn from_sample(sample: &Sample, tz: &Tz) -> Self {
        Self {
            timestamp: sample
                .local_time(tz)
                .format(LOG_TIMESTAMP_FORMAT)
                .to_string(),
            value: sample.value,
            trend: sample.trend.code(),
            insulin: None,
            carbs: None,
        }
    }

    /// Attach treatment annotations to the record
    pub fn with_treatment(mut self, insulin: Option<f64>, carbs: Option<f64>) -> Self {
        self.insulin = insulin;
        self.carbs = carbs;
        self
    }
}

/// Append-only CSV log of readings
///
/// The header row is written once, when the file is created (or found
/// empty). Each append opens the file, writes one row and closes it again so
/// an externally rotated or deleted log is simply recreated.
#[derive(Debug, Clone)]
pub struct CsvReadingLog {
    path: PathBuf,
    tz: Tz,
}

impl CsvReadingLog {
    /// Create a log writer for `path`, rendering timestamps in `tz`
    pub fn new(path: impl Into<PathBuf>, tz: Tz) -> Self {
        Self {
            path: path.into(),
            tz,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an already-built record
    ///
    /// # Errors
    ///
    /// Returns `StoreError::IoError` if the file cannot be opened and
    /// `StoreError::CsvError` if the row cannot be written.
    pub fn append_record(&self, record: &LogRecord) -> Result<(), StoreError> {
        let needs_header = match fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;

        debug!(
            "Appended reading {} at {} to {}",
            record.value,
            record.timestamp,
            self.path.display()
        );
        Ok(())
    }

    /// Read every record back from the log
    pub fn read_all(&self) -> Result<Vec<LogRecord>, StoreError> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut records = Vec::new();
        for row in reader.deserialize() {
            records.push(row?);
        }
        Ok(records)
    }
}

impl ReadingSink for CsvReadingLog {
    fn append(&mut self, sample: &Sample) -> Result<(), StoreError> {
        self.append_record(&LogRecord::from_sample(sample, &self.tz))
    }
}
