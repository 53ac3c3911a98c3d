//! Per-file outcomes and the aggregated batch report.

use crate::downloader::{FailureKind, Transfer, TransferError};
use serde::Serialize;
use std::path::PathBuf;

use super::DownloadTask;

/// Outcome of one [`DownloadTask`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadResult {
    pub file_type: String,
    pub url: String,
    pub destination: PathBuf,
    pub success: bool,
    /// Bytes written, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    /// Hex SHA-256 of the written file, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadResult {
    pub(crate) fn from_outcome(task: DownloadTask, outcome: Result<Transfer, TransferError>) -> Self {
        match outcome {
            Ok(transfer) => Self::succeeded(task, transfer.bytes, transfer.sha256),
            Err(e) => Self::failed(task, e.kind(), e.to_string()),
        }
    }

    pub(crate) fn succeeded(task: DownloadTask, bytes: u64, sha256: String) -> Self {
        Self {
            file_type: task.file_type,
            url: task.url,
            destination: task.destination,
            success: true,
            bytes: Some(bytes),
            sha256: Some(sha256),
            failure: None,
            error: None,
        }
    }

    pub(crate) fn failed(task: DownloadTask, kind: FailureKind, error: String) -> Self {
        Self {
            file_type: task.file_type,
            url: task.url,
            destination: task.destination,
            success: false,
            bytes: None,
            sha256: None,
            failure: Some(kind),
            error: Some(error),
        }
    }
}

/// Results of one batch run, in configuration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    pub output_dir: PathBuf,
    pub results: Vec<DownloadResult>,
}

impl DownloadReport {
    pub fn new(output_dir: PathBuf, results: Vec<DownloadResult>) -> Self {
        Self {
            output_dir,
            results,
        }
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn successful(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.successful()
    }

    pub fn failed_keys(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.file_type.as_str())
            .collect()
    }

    /// True when every attempted transfer succeeded (vacuously true for an empty batch).
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    pub fn get(&self, file_type: &str) -> Option<&DownloadResult> {
        self.results.iter().find(|r| r.file_type == file_type)
    }

    /// `(file_type, success)` pairs in configuration order.
    pub fn outcomes(&self) -> Vec<(String, bool)> {
        self.results
            .iter()
            .map(|r| (r.file_type.clone(), r.success))
            .collect()
    }

    /// Report with derived counts, for machine consumption.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "output_dir": self.output_dir,
            "total": self.total(),
            "successful": self.successful(),
            "failed": self.failed(),
            "failed_files": self.failed_keys(),
            "results": self.results,
        })
    }

    pub(crate) fn log_summary(&self) {
        let rule = "=".repeat(60);
        tracing::info!("{}", rule);
        tracing::info!(
            "download summary: {}/{} successful",
            self.successful(),
            self.total()
        );
        if self.failed() > 0 {
            tracing::warn!("failed downloads: {}", self.failed());
            tracing::warn!("failed files: {:?}", self.failed_keys());
        }
        tracing::info!("{}", rule);
    }
}
