//! Batch download of the configured INSEE files.
//!
//! Resolves `insee.download_urls` from the configuration, keeps the
//! `<file_type>_url` entries (optionally filtered by file type), resolves the
//! destination directory (`<bronze>/<YYYY-MM>` unless one is given) and
//! fetches every file. Individual failures never stop the batch; the returned
//! [`DownloadReport`] is the only signal of partial failure.

mod report;

pub use report::{DownloadReport, DownloadResult};

use crate::config::{ConfigError, Configuration};
use crate::downloader::{self, FailureKind, FetchOptions};
use crate::url_model::{destination_filename, sanitize_filename};
use chrono::NaiveDate;
use indicatif::MultiProgress;
use std::collections::{BTreeSet, HashSet};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;

/// Suffix marking a downloadable entry in `insee.download_urls`.
pub const URL_KEY_SUFFIX: &str = "_url";

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to create output directory {}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One selected file: logical type, source URL and local destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub file_type: String,
    pub url: String,
    pub destination: PathBuf,
}

/// Options for [`run`].
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Destination directory; defaults to `<bronze>/<YYYY-MM>`.
    pub output_dir: Option<PathBuf>,
    /// File types to fetch; `None` or an empty set means all configured files.
    pub selected: Option<BTreeSet<String>>,
    /// Maximum concurrent transfers (1 = strictly sequential).
    pub jobs: usize,
    pub fetch: FetchOptions,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            output_dir: None,
            selected: None,
            jobs: 1,
            fetch: FetchOptions::default(),
        }
    }
}

/// `<bronze>/<YYYY-MM>` for the month containing `today`.
pub fn monthly_dir(bronze: &Path, today: NaiveDate) -> PathBuf {
    bronze.join(today.format("%Y-%m").to_string())
}

/// Destination directory for a batch: `output_dir`, else the current month under bronze.
pub fn resolve_output_dir(
    config: &Configuration,
    output_dir: Option<&Path>,
) -> Result<PathBuf, ConfigError> {
    match output_dir {
        Some(dir) => Ok(dir.to_path_buf()),
        None => Ok(monthly_dir(
            &config.bronze_dir()?,
            chrono::Local::now().date_naive(),
        )),
    }
}

/// Builds the tasks for the `<file_type>_url` entries of `urls`, in order.
/// Other keys are skipped with a warning. With a non-empty `selected`, only
/// file types present in both the configuration and the selection are kept.
/// Every task gets a distinct destination: when two URLs end in the same file
/// name, the later one is renamed `<stem>-<file_type>.<ext>`.
pub fn plan_tasks(
    urls: &[(String, String)],
    selected: Option<&BTreeSet<String>>,
    output_dir: &Path,
) -> Vec<DownloadTask> {
    let filter = selected.filter(|s| !s.is_empty());
    let mut tasks = Vec::new();
    let mut taken: HashSet<String> = HashSet::new();
    for (key, url) in urls {
        let Some(file_type) = key.strip_suffix(URL_KEY_SUFFIX).filter(|t| !t.is_empty()) else {
            tracing::warn!(
                "ignoring download_urls entry `{}`: key does not end in `{}`",
                key,
                URL_KEY_SUFFIX
            );
            continue;
        };
        if filter.is_some_and(|f| !f.contains(file_type)) {
            continue;
        }
        let mut name = destination_filename(url);
        if taken.contains(&name) {
            let renamed = disambiguate(&name, file_type, &taken);
            tracing::warn!(
                "`{}` and an earlier entry both resolve to {}; saving `{}` as {}",
                key,
                name,
                file_type,
                renamed
            );
            name = renamed;
        }
        taken.insert(name.clone());
        tasks.push(DownloadTask {
            file_type: file_type.to_string(),
            url: url.clone(),
            destination: output_dir.join(&name),
        });
    }
    if let Some(filter) = filter {
        for wanted in filter {
            if !tasks.iter().any(|t| &t.file_type == wanted) {
                tracing::warn!("requested file type `{}` is not configured", wanted);
            }
        }
    }
    tasks
}

/// `data.parquet` + `b` → `data-b.parquet`, then `data-b-2.parquet`, ... until unused.
fn disambiguate(name: &str, file_type: &str, taken: &HashSet<String>) -> String {
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    let build = |suffix: String| {
        let candidate = match ext {
            Some(ext) => format!("{}-{}.{}", stem, suffix, ext),
            None => format!("{}-{}", stem, suffix),
        };
        sanitize_filename(&candidate)
    };
    let first = build(file_type.to_string());
    if !taken.contains(&first) {
        return first;
    }
    (2..)
        .map(|n| build(format!("{}-{}", file_type, n)))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or(first)
}

/// Runs a batch: resolve, create the destination directory, fetch every
/// selected file, log a summary. Only configuration faults and failure to
/// create the destination directory are returned as errors.
pub async fn run(config: &Configuration, options: &BatchOptions) -> Result<DownloadReport, BatchError> {
    let urls = config.download_urls();
    let output_dir = resolve_output_dir(config, options.output_dir.as_deref())?;

    tokio::fs::create_dir_all(&output_dir)
        .await
        .map_err(|source| BatchError::CreateDir {
            path: output_dir.clone(),
            source,
        })?;

    tracing::info!("starting INSEE data download to {}", output_dir.display());
    tracing::info!(
        "timestamp: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    let tasks = plan_tasks(&urls, options.selected.as_ref(), &output_dir);
    let keys: Vec<&str> = tasks.iter().map(|t| t.file_type.as_str()).collect();
    tracing::info!("files to download: {:?}", keys);

    let results = run_tasks(tasks, options.jobs, &options.fetch).await;
    let report = DownloadReport::new(output_dir, results);
    report.log_summary();
    Ok(report)
}

/// Fetches `tasks` with at most `jobs` transfers in flight. Results land in
/// per-index slots so the output order is the input order whatever the
/// completion order.
async fn run_tasks(tasks: Vec<DownloadTask>, jobs: usize, fetch: &FetchOptions) -> Vec<DownloadResult> {
    let jobs = jobs.max(1);
    let mut fetch = fetch.clone();
    if jobs > 1 && fetch.show_progress && fetch.progress.is_none() {
        fetch.progress = Some(MultiProgress::new());
    }

    let planned = tasks.clone();
    let mut slots: Vec<Option<DownloadResult>> = vec![None; tasks.len()];
    let mut pending = tasks.into_iter().enumerate();
    let mut join_set = JoinSet::new();

    loop {
        while join_set.len() < jobs {
            let Some((index, task)) = pending.next() else {
                break;
            };
            tracing::info!(
                "downloading {}: {}",
                task.file_type,
                task.destination
                    .file_name()
                    .map(|n| n.to_string_lossy())
                    .unwrap_or_default()
            );
            tracing::debug!("URL: {}", task.url);
            tracing::debug!("destination: {}", task.destination.display());
            let opts = fetch.clone();
            join_set.spawn_blocking(move || (index, fetch_task(task, &opts)));
        }

        let Some(joined) = join_set.join_next().await else {
            break;
        };
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(e) => tracing::error!("download task did not complete: {}", e),
        }
    }

    slots
        .into_iter()
        .zip(planned)
        .map(|(slot, task)| {
            slot.unwrap_or_else(|| {
                DownloadResult::failed(task, FailureKind::Io, "download task aborted".to_string())
            })
        })
        .collect()
}

/// One transfer, with panics turned into a failed result so siblings are unaffected.
fn fetch_task(task: DownloadTask, options: &FetchOptions) -> DownloadResult {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        downloader::fetch(&task.url, &task.destination, options)
    }));
    match outcome {
        Ok(outcome) => DownloadResult::from_outcome(task, outcome),
        Err(_) => {
            tracing::error!("download of {} panicked", task.url);
            DownloadResult::failed(task, FailureKind::Io, "download panicked".to_string())
        }
    }
}

/// Downloads the configured INSEE files sequentially with progress bars and
/// returns `(file_type, success)` in configuration order.
pub async fn download_insee_files(
    config: &Configuration,
    output_dir: Option<&Path>,
    files_to_download: Option<&[&str]>,
) -> Result<Vec<(String, bool)>, BatchError> {
    let options = BatchOptions {
        output_dir: output_dir.map(Path::to_path_buf),
        selected: files_to_download.map(|files| files.iter().map(|f| f.to_string()).collect()),
        ..BatchOptions::default()
    };
    Ok(run(config, &options).await?.outcomes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn selection(types: &[&str]) -> BTreeSet<String> {
        types.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn monthly_dir_is_zero_padded() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            monthly_dir(Path::new("/data/bronze"), d),
            PathBuf::from("/data/bronze/2024-03")
        );
    }

    #[test]
    fn plan_keeps_url_entries_in_order() {
        let table = urls(&[
            ("stock_unitelegale_url", "https://h/StockUniteLegale.parquet"),
            ("portal", "https://h/"),
            ("stock_etablissement_url", "https://h/StockEtablissement.parquet"),
        ]);
        let tasks = plan_tasks(&table, None, Path::new("/out"));
        let types: Vec<_> = tasks.iter().map(|t| t.file_type.as_str()).collect();
        assert_eq!(types, ["stock_unitelegale", "stock_etablissement"]);
        assert_eq!(
            tasks[1].destination,
            PathBuf::from("/out/StockEtablissement.parquet")
        );
        assert_eq!(tasks[1].url, "https://h/StockEtablissement.parquet");
    }

    #[test]
    fn plan_filters_by_intersection() {
        let table = urls(&[("a_url", "http://x/f1.parquet"), ("b_url", "http://x/f2.parquet")]);
        let selected = selection(&["a", "zzz"]);
        let tasks = plan_tasks(&table, Some(&selected), Path::new("/out"));
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].file_type, "a");
        assert_eq!(tasks[0].destination, PathBuf::from("/out/f1.parquet"));
    }

    #[test]
    fn empty_selection_means_all() {
        let table = urls(&[("a_url", "http://x/f1.parquet"), ("b_url", "http://x/f2.parquet")]);
        let tasks = plan_tasks(&table, Some(&BTreeSet::new()), Path::new("/out"));
        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn shared_file_names_get_distinct_destinations() {
        let table = urls(&[
            ("a_url", "http://x/v1/data.parquet"),
            ("b_url", "http://x/v2/data.parquet"),
            ("c_url", "http://x/v3/data.parquet"),
            ("d_url", "http://x/v4/README"),
            ("e_url", "http://y/README"),
        ]);
        let tasks = plan_tasks(&table, None, Path::new("/out"));
        let names: Vec<_> = tasks
            .iter()
            .map(|t| t.destination.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(
            names,
            ["data.parquet", "data-b.parquet", "data-c.parquet", "README", "README-e"]
        );
    }

    #[test]
    fn renamed_destination_skips_names_already_in_use() {
        let table = urls(&[
            ("first_url", "http://x/data.parquet"),
            ("other_url", "http://x/data-b.parquet"),
            ("b_url", "http://x/v2/data.parquet"),
        ]);
        let tasks = plan_tasks(&table, None, Path::new("/out"));
        assert_eq!(tasks[2].destination, PathBuf::from("/out/data-b-2.parquet"));
    }

    #[test]
    fn bare_suffix_key_is_ignored() {
        let table = urls(&[("_url", "http://x/f.parquet")]);
        assert!(plan_tasks(&table, None, Path::new("/out")).is_empty());
    }

    #[test]
    fn output_dir_override_skips_bronze_lookup() {
        let cfg = Configuration::from_yaml_str("insee: {}\n").unwrap();
        assert_eq!(
            resolve_output_dir(&cfg, Some(Path::new("/custom"))).unwrap(),
            PathBuf::from("/custom")
        );
        assert!(matches!(
            resolve_output_dir(&cfg, None),
            Err(ConfigError::MissingKey(_))
        ));
    }

    #[test]
    fn default_output_dir_is_current_month_under_bronze() {
        let cfg = Configuration::from_yaml_str("paths:\n  bronze: /data/bronze\n").unwrap();
        let dir = resolve_output_dir(&cfg, None).unwrap();
        let expected = chrono::Local::now().format("%Y-%m").to_string();
        assert_eq!(dir, Path::new("/data/bronze").join(expected));
    }

    #[tokio::test]
    async fn missing_bronze_fails_before_any_transfer() {
        let cfg = Configuration::from_yaml_str(
            "insee:\n  download_urls:\n    a_url: http://127.0.0.1:9/f1.parquet\n",
        )
        .unwrap();
        let err = run(&cfg, &BatchOptions::default()).await.unwrap_err();
        assert!(matches!(err, BatchError::Config(ConfigError::MissingKey(_))));
    }

    #[tokio::test]
    async fn empty_configuration_gives_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Configuration::from_yaml_str("paths: {}\n").unwrap();
        let options = BatchOptions {
            output_dir: Some(dir.path().join("out")),
            ..BatchOptions::default()
        };
        let report = run(&cfg, &options).await.unwrap();
        assert_eq!(report.total(), 0);
        assert!(dir.path().join("out").is_dir());
    }
}
