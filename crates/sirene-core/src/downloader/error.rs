//! Transfer error type and its failure-kind classification.

use serde::Serialize;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Coarse failure class of a transfer, reported per file in the batch report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Http,
    Network,
    Io,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Http => "http",
            FailureKind::Network => "network",
            FailureKind::Io => "io",
        };
        f.write_str(s)
    }
}

/// Error returned by a single transfer. Never escapes the batch layer.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// URL does not parse or is not http(s).
    #[error("not an http(s) URL: {0}")]
    InvalidUrl(String),
    /// Curl reported an error (timeout, connection, TLS, ...).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// Final response had a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// Body was shorter (or longer) than the advertised Content-Length.
    #[error("incomplete transfer: expected {expected} bytes, got {received}")]
    Incomplete { expected: u64, received: u64 },
    /// Local filesystem failure (create dir, write, rename).
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TransferError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        TransferError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            TransferError::Curl(e) if e.is_operation_timedout() => FailureKind::Timeout,
            TransferError::Curl(_) | TransferError::InvalidUrl(_) | TransferError::Incomplete { .. } => {
                FailureKind::Network
            }
            TransferError::Http(_) => FailureKind::Http,
            TransferError::Io { .. } => FailureKind::Io,
        }
    }
}
