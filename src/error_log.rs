//! Run-wide log of recoverable errors.
//!
//! Errors that do not stop a message (an attachment that could not be
//! written, a message skipped after a failed fetch) are collected here and
//! written to `errors.txt` when the driver flushes the log.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::warn;

use crate::error::{MailError, Result};

/// File name of the error log inside the log directory.
pub const ERROR_LOG_FILE: &str = "errors.txt";

/// Where recoverable errors go.
pub trait ErrorSink {
    fn record(&mut self, message: String);

    /// Messages recorded so far, oldest first.
    fn entries(&self) -> Vec<String>;
}

/// One recorded error.
#[derive(Debug, Clone)]
pub struct ErrorEntry {
    pub recorded_at: DateTime<Local>,
    pub message: String,
}

/// Append-only error log with an explicit flush.
#[derive(Debug, Default)]
pub struct ErrorLog {
    entries: Vec<ErrorEntry>,
    flushed: usize,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorEntry> {
        self.entries.iter()
    }

    /// Append not-yet-flushed entries to `{log_dir}/errors.txt`.
    ///
    /// The directory is created if missing; failing to create it is fatal.
    /// Returns the log file path, or `None` when there was nothing to write.
    pub fn flush(&mut self, log_dir: &Path) -> Result<Option<PathBuf>> {
        if self.flushed == self.entries.len() {
            return Ok(None);
        }

        std::fs::create_dir_all(log_dir).map_err(|e| MailError::DirectoryCreation {
            path: log_dir.to_path_buf(),
            source: e,
        })?;

        let path = log_dir.join(ERROR_LOG_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| MailError::io(&path, e))?;

        for entry in &self.entries[self.flushed..] {
            write!(
                file,
                "\r\n{} - {}",
                entry.recorded_at.format("%d.%m.%Y %H:%M"),
                entry.message
            )
            .map_err(|e| MailError::io(&path, e))?;
        }
        self.flushed = self.entries.len();
        Ok(Some(path))
    }
}

impl ErrorSink for ErrorLog {
    fn record(&mut self, message: String) {
        warn!(error = %message, "Recorded error");
        self.entries.push(ErrorEntry {
            recorded_at: Local::now(),
            message,
        });
    }

    fn entries(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.message.clone()).collect()
    }
}
