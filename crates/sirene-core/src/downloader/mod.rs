//! Single-stream HTTP GET downloader for large bulk files.
//!
//! The body is streamed chunk by chunk into `<destination>.part` and renamed
//! to the destination only when the transfer completed and matched the
//! advertised length. The SHA-256 of the body is computed while streaming, so
//! the file is never read back. Memory use is bounded by the chunk size
//! regardless of file size. There is no retry and no resume: a failed file is fetched again
//! from byte zero on the next run.

mod error;
mod head;
mod progress;

pub use error::{FailureKind, TransferError};

use crate::url_model::is_http_url;
use head::ResponseHead;
use indicatif::{MultiProgress, ProgressBar};
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default read chunk / receive buffer size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Default connect timeout, also used as the read-stall timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Suffix of the in-progress file before the final rename.
pub const PART_SUFFIX: &str = ".part";

/// Per-transfer options.
#[derive(Clone)]
pub struct FetchOptions {
    pub chunk_size: usize,
    pub show_progress: bool,
    pub timeout: Duration,
    /// Shared bar group when several transfers run concurrently.
    pub progress: Option<MultiProgress>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            show_progress: true,
            timeout: DEFAULT_TIMEOUT,
            progress: None,
        }
    }
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("chunk_size", &self.chunk_size)
            .field("show_progress", &self.show_progress)
            .field("timeout", &self.timeout)
            .field("grouped_progress", &self.progress.is_some())
            .finish()
    }
}

/// A completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub url: String,
    pub destination: PathBuf,
    pub bytes: u64,
    pub content_length: Option<u64>,
    /// Lowercase hex SHA-256 of the body as written.
    pub sha256: String,
}

/// Path of the in-progress file: `file.parquet` → `file.parquet.part`.
pub fn part_path(destination: &Path) -> PathBuf {
    let mut o = destination.as_os_str().to_owned();
    o.push(PART_SUFFIX);
    PathBuf::from(o)
}

/// Downloads `url` to `destination`. Every failure is logged with its kind and
/// returned as a [`TransferError`]; nothing panics and no partial file is left
/// at `destination`.
pub fn fetch(url: &str, destination: &Path, options: &FetchOptions) -> Result<Transfer, TransferError> {
    tracing::debug!(url = %url, destination = %destination.display(), "starting download");
    let result = fetch_via_part(url, destination, options);
    match &result {
        Ok(t) => tracing::info!(
            "successfully downloaded {} ({:.2} MB)",
            destination.display(),
            t.bytes as f64 / 1_048_576.0
        ),
        Err(e) => log_failure(url, destination, e),
    }
    result
}

/// Boolean form of [`fetch`]: true only if the transfer completed.
pub fn download_file(url: &str, local_path: &Path, chunk_size: usize, show_progress: bool) -> bool {
    let options = FetchOptions {
        chunk_size,
        show_progress,
        ..FetchOptions::default()
    };
    fetch(url, local_path, &options).is_ok()
}

fn log_failure(url: &str, destination: &Path, e: &TransferError) {
    let kind = e.kind();
    match kind {
        FailureKind::Timeout => tracing::error!(%kind, "timeout downloading {}: {}", url, e),
        FailureKind::Http => tracing::error!(%kind, "HTTP error downloading {}: {}", url, e),
        FailureKind::Network => tracing::error!(%kind, "error downloading {}: {}", url, e),
        FailureKind::Io => {
            tracing::error!(%kind, "error writing file {}: {}", destination.display(), e)
        }
    }
}

fn fetch_via_part(url: &str, destination: &Path, options: &FetchOptions) -> Result<Transfer, TransferError> {
    if !is_http_url(url) {
        return Err(TransferError::InvalidUrl(url.to_string()));
    }
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| TransferError::io(parent, e))?;
    }

    let part = part_path(destination);
    let label = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let outcome = stream_to_file(url, &part, &label, options).and_then(|body| {
        fs::rename(&part, destination).map_err(|e| TransferError::io(destination, e))?;
        Ok(Transfer {
            url: url.to_string(),
            destination: destination.to_path_buf(),
            bytes: body.bytes,
            content_length: body.content_length,
            sha256: body.sha256,
        })
    });
    if outcome.is_err() && part.exists() {
        if let Err(e) = fs::remove_file(&part) {
            tracing::warn!("could not remove {}: {}", part.display(), e);
        }
    }
    outcome
}

struct Body {
    bytes: u64,
    content_length: Option<u64>,
    sha256: String,
}

/// Streams the body of a successful response into `path`, hashing it on the way.
fn stream_to_file(
    url: &str,
    path: &Path,
    label: &str,
    options: &FetchOptions,
) -> Result<Body, TransferError> {
    let file = File::create(path).map_err(|e| TransferError::io(path, e))?;
    let mut writer = BufWriter::with_capacity(options.chunk_size.max(1), file);
    let head = RefCell::new(ResponseHead::default());
    let mut hasher = Sha256::new();
    let mut written = 0u64;
    let mut bar: Option<ProgressBar> = None;
    let mut write_error: Option<io::Error> = None;

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(options.timeout)?;
    // Read timeout: abort when nothing arrives for `timeout`.
    easy.low_speed_limit(1)?;
    easy.low_speed_time(options.timeout)?;
    easy.buffer_size(options.chunk_size.max(1))?;

    let performed = {
        let mut transfer = easy.transfer();
        transfer.header_function(|line| {
            head.borrow_mut().feed(line);
            true
        })?;
        transfer.write_function(|data| {
            let head = head.borrow();
            // Error bodies are drained, not stored.
            if !head.is_success() {
                return Ok(data.len());
            }
            if bar.is_none() && options.show_progress {
                if let Some(total) = head.content_length.filter(|n| *n > 0) {
                    bar = Some(progress::transfer_bar(total, label, options.progress.as_ref()));
                }
            }
            match writer.write_all(data) {
                Ok(()) => {
                    hasher.update(data);
                    written += data.len() as u64;
                    if let Some(b) = &bar {
                        b.inc(data.len() as u64);
                    }
                    Ok(data.len())
                }
                Err(e) => {
                    write_error = Some(e);
                    Ok(0) // abort transfer
                }
            }
        })?;
        transfer.perform()
    };

    if let Some(b) = bar.take() {
        if performed.is_ok() {
            b.finish();
        } else {
            b.abandon();
        }
    }

    if let Err(e) = performed {
        if e.is_write_error() {
            if let Some(io_err) = write_error.take() {
                return Err(TransferError::io(path, io_err));
            }
        }
        return Err(TransferError::Curl(e));
    }

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(TransferError::Http(code));
    }

    writer.flush().map_err(|e| TransferError::io(path, e))?;
    let file = writer
        .into_inner()
        .map_err(|e| TransferError::io(path, e.into_error()))?;
    file.sync_all().map_err(|e| TransferError::io(path, e))?;

    let content_length = head.into_inner().content_length;
    if let Some(expected) = content_length {
        if expected != written {
            return Err(TransferError::Incomplete {
                expected,
                received: written,
            });
        }
    }
    let sha256 = hex::encode(hasher.finalize());
    tracing::debug!("received {} bytes from {} (sha256 {})", written, url, sha256);
    Ok(Body {
        bytes: written,
        content_length,
        sha256,
    })
}
