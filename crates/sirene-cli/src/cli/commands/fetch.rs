//! `sirene fetch` – download one URL.

use anyhow::Result;
use sirene_core::downloader::{self, FetchOptions};
use std::path::Path;

pub async fn run_fetch(url: &str, path: &Path, chunk_size: usize, show_progress: bool) -> Result<bool> {
    let options = FetchOptions {
        chunk_size,
        show_progress,
        ..FetchOptions::default()
    };
    let url = url.to_string();
    let dest = path.to_path_buf();
    let outcome = tokio::task::spawn_blocking(move || downloader::fetch(&url, &dest, &options)).await?;
    match outcome {
        Ok(transfer) => {
            println!(
                "{}  {} ({} bytes)",
                transfer.sha256,
                transfer.destination.display(),
                transfer.bytes
            );
            Ok(true)
        }
        Err(e) => {
            eprintln!("download failed ({}): {}", e.kind(), e);
            Ok(false)
        }
    }
}
