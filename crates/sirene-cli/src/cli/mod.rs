//! CLI for the SIRENE bulk downloader.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sirene_core::config::Configuration;
use sirene_core::logging::{ConsoleStream, LoggerOptions};
use std::path::{Path, PathBuf};
use tracing::Level;

use commands::{run_config, run_download, run_fetch, DownloadArgs};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "sirene")]
#[command(about = "Download INSEE SIRENE bulk extracts into the bronze data tier", long_about = None)]
pub struct Cli {
    /// YAML configuration file (default: configs/config.yaml, then $XDG_CONFIG_HOME/sirene/config.yaml).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory for log files.
    #[arg(long, global = true, default_value = "logs", value_name = "DIR")]
    pub log_dir: PathBuf,

    /// Log file name inside the log directory (default: app_<YYYYMMDD_HHMMSS>.log).
    #[arg(long, global = true, value_name = "NAME")]
    pub log_file: Option<String>,

    /// Log level (error, warn, info, debug, trace). RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "info", value_name = "LEVEL")]
    pub log_level: Level,

    /// Do not log to the console (stdout, or stderr with `download --json`).
    #[arg(long, global = true)]
    pub no_console_log: bool,

    /// Do not write a log file.
    #[arg(long, global = true)]
    pub no_file_log: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download the configured INSEE files.
    Download {
        /// Destination directory (default: <paths.bronze>/<YYYY-MM>).
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Only download this file type (repeatable), e.g. --file stock_etablissement.
        #[arg(long = "file", value_name = "TYPE")]
        files: Vec<String>,

        /// Run up to N transfers concurrently (default 1).
        #[arg(long, default_value = "1", value_name = "N")]
        jobs: usize,

        /// Receive buffer size in bytes.
        #[arg(long, default_value = "8192", value_name = "BYTES")]
        chunk_size: usize,

        /// Connect / stall timeout in seconds.
        #[arg(long, default_value = "30", value_name = "SECS")]
        timeout: u64,

        /// Hide progress bars.
        #[arg(long)]
        no_progress: bool,

        /// Print the report as JSON on stdout; console logging moves to stderr.
        #[arg(long)]
        json: bool,
    },

    /// Download a single URL to a local path.
    Fetch {
        /// Direct HTTP/HTTPS URL.
        url: String,

        /// Local destination file.
        path: PathBuf,

        /// Receive buffer size in bytes.
        #[arg(long, default_value = "8192", value_name = "BYTES")]
        chunk_size: usize,

        /// Hide the progress bar.
        #[arg(long)]
        no_progress: bool,
    },

    /// Show the resolved download URLs, metadata and data paths.
    Config,
}

impl Cli {
    pub fn logger_options(&self) -> LoggerOptions {
        LoggerOptions {
            directory: self.log_dir.clone(),
            file_name: self.log_file.clone(),
            level: self.log_level,
            console_enabled: !self.no_console_log,
            console_stream: self.console_stream(),
            file_enabled: !self.no_file_log,
        }
    }

    /// stdout carries the report for `download --json`, so logs go to stderr.
    fn console_stream(&self) -> ConsoleStream {
        match self.command {
            CliCommand::Download { json: true, .. } => ConsoleStream::Stderr,
            _ => ConsoleStream::Stdout,
        }
    }

    /// Dispatch the subcommand. `Ok(false)` means it ran but some transfer failed.
    pub async fn run(self) -> Result<bool> {
        match self.command {
            CliCommand::Download {
                output_dir,
                files,
                jobs,
                chunk_size,
                timeout,
                no_progress,
                json,
            } => {
                let cfg = load_config(self.config.as_deref())?;
                let args = DownloadArgs {
                    output_dir,
                    files,
                    jobs,
                    chunk_size,
                    timeout_secs: timeout,
                    show_progress: !no_progress,
                    json,
                };
                run_download(&cfg, args).await
            }
            CliCommand::Fetch {
                url,
                path,
                chunk_size,
                no_progress,
            } => run_fetch(&url, &path, chunk_size, !no_progress).await,
            CliCommand::Config => {
                let cfg = load_config(self.config.as_deref())?;
                run_config(&cfg)?;
                Ok(true)
            }
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Configuration> {
    let cfg = match path {
        Some(p) => Configuration::load(p)?,
        None => Configuration::load_default()?,
    };
    tracing::debug!("loaded config from {:?}", cfg.source());
    Ok(cfg)
}

#[cfg(test)]
mod tests;
