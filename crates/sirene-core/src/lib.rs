pub mod batch;
pub mod config;
pub mod downloader;
pub mod logging;
pub mod url_model;

pub use batch::{download_insee_files, BatchOptions, DownloadReport, DownloadResult};
pub use config::Configuration;
pub use downloader::{download_file, fetch, FetchOptions};
