//! CLI command handlers, one per file.

mod config;
mod download;
mod fetch;

pub use config::run_config;
pub use download::{run_download, DownloadArgs};
pub use fetch::run_fetch;
