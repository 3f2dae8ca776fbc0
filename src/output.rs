//! Result types returned by batch extraction.

use crate::error::FileError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of processing one PDF in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutcome {
    /// The PDF that was processed.
    pub path: PathBuf,
    /// Pages sent to the model (0 if rendering failed).
    pub pages: usize,
    /// Raw model reply, when the completion succeeded.
    pub reply: Option<String>,
    /// Wall-clock time spent on this file.
    pub duration_ms: u64,
    /// Set when this file failed; the batch carried on.
    pub error: Option<FileError>,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything a batch run did, in processing order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub files: Vec<FileOutcome>,
    pub total_duration_ms: u64,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.files.len()
    }

    pub fn succeeded(&self) -> usize {
        self.files.iter().filter(|f| f.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    /// Iterate over the per-file errors.
    pub fn errors(&self) -> impl Iterator<Item = &FileError> {
        self.files.iter().filter_map(|f| f.error.as_ref())
    }
}
