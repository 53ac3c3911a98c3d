//! `sirene download` – fetch the configured INSEE files.

use anyhow::Result;
use sirene_core::batch::{self, BatchOptions, DownloadReport};
use sirene_core::config::Configuration;
use sirene_core::downloader::FetchOptions;
use std::path::PathBuf;
use std::time::Duration;

/// Parsed `download` arguments.
#[derive(Debug, Clone)]
pub struct DownloadArgs {
    pub output_dir: Option<PathBuf>,
    pub files: Vec<String>,
    pub jobs: usize,
    pub chunk_size: usize,
    pub timeout_secs: u64,
    pub show_progress: bool,
    pub json: bool,
}

impl DownloadArgs {
    fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            output_dir: self.output_dir.clone(),
            selected: if self.files.is_empty() {
                None
            } else {
                Some(self.files.iter().cloned().collect())
            },
            jobs: self.jobs.max(1),
            fetch: FetchOptions {
                chunk_size: self.chunk_size,
                show_progress: self.show_progress,
                timeout: Duration::from_secs(self.timeout_secs),
                progress: None,
            },
        }
    }
}

/// Runs the batch and prints the report. Returns whether every transfer succeeded.
pub async fn run_download(cfg: &Configuration, args: DownloadArgs) -> Result<bool> {
    let report = batch::run(cfg, &args.batch_options()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.to_json())?);
    } else {
        print_table(&report);
        print_digests(&report);
    }

    Ok(report.all_succeeded())
}

fn print_table(report: &DownloadReport) {
    if report.total() == 0 {
        println!("No files selected.");
        return;
    }
    println!("{:<28} {:<8} {}", "FILE TYPE", "STATUS", "DETAIL");
    for r in &report.results {
        let (status, detail) = if r.success {
            (
                "ok",
                format!(
                    "{} ({:.2} MB)",
                    r.destination.display(),
                    r.bytes.unwrap_or(0) as f64 / 1_048_576.0
                ),
            )
        } else {
            ("failed", r.error.clone().unwrap_or_default())
        };
        println!("{:<28} {:<8} {}", r.file_type, status, detail);
    }
    println!(
        "{}/{} successful -> {}",
        report.successful(),
        report.total(),
        report.output_dir.display()
    );
}

/// `sha256sum`-style lines for the files written by this run.
fn print_digests(report: &DownloadReport) {
    for r in &report.results {
        if let Some(digest) = &r.sha256 {
            println!("{}  {}", digest, r.destination.display());
        }
    }
}
