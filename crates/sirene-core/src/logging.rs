//! Named log sinks (console + timestamped file) wired into `tracing`.
//!
//! A [`LogRegistry`] hands out one [`LogSink`] per name; asking for the same
//! name twice returns the existing sink, so handlers are never attached twice.
//! The process-wide registry is [`LogRegistry::global`]; tests build their own.

use anyhow::Result;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Default directory for log files, relative to the working directory.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Stream used by the console handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleStream {
    #[default]
    Stdout,
    /// Keeps stdout free for machine-readable output.
    Stderr,
}

/// Options for a named sink. Only used when the sink is first created.
#[derive(Debug, Clone)]
pub struct LoggerOptions {
    pub directory: PathBuf,
    /// File name inside `directory`; `None` means `app_<YYYYMMDD_HHMMSS>.log`.
    pub file_name: Option<String>,
    pub level: Level,
    pub console_enabled: bool,
    pub console_stream: ConsoleStream,
    pub file_enabled: bool,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_LOG_DIR),
            file_name: None,
            level: Level::INFO,
            console_enabled: true,
            console_stream: ConsoleStream::Stdout,
            file_enabled: true,
        }
    }
}

/// `app_<YYYYMMDD_HHMMSS>.log` for the current local time.
pub fn timestamped_file_name() -> String {
    format!("app_{}.log", chrono::Local::now().format("%Y%m%d_%H%M%S"))
}

enum Handler {
    Console(ConsoleStream),
    File { path: PathBuf, file: Mutex<File> },
}

impl Handler {
    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        match self {
            Handler::Console(ConsoleStream::Stdout) => io::stdout().lock().write_all(buf),
            Handler::Console(ConsoleStream::Stderr) => io::stderr().lock().write_all(buf),
            Handler::File { file, .. } => file
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .write_all(buf),
        }
    }

    fn flush(&self) -> io::Result<()> {
        match self {
            Handler::Console(ConsoleStream::Stdout) => io::stdout().lock().flush(),
            Handler::Console(ConsoleStream::Stderr) => io::stderr().lock().flush(),
            Handler::File { file, .. } => file
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .flush(),
        }
    }
}

/// A named destination for formatted log lines. Every line goes to each handler once.
pub struct LogSink {
    name: String,
    level: Level,
    handlers: Vec<Handler>,
}

impl LogSink {
    fn open(name: &str, options: &LoggerOptions) -> io::Result<Self> {
        let mut handlers = Vec::with_capacity(2);
        if options.console_enabled {
            handlers.push(Handler::Console(options.console_stream));
        }
        if options.file_enabled {
            fs::create_dir_all(&options.directory)?;
            let file_name = options
                .file_name
                .clone()
                .unwrap_or_else(timestamped_file_name);
            let path = options.directory.join(file_name);
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            handlers.push(Handler::File {
                path,
                file: Mutex::new(file),
            });
        }
        Ok(Self {
            name: name.to_string(),
            level: options.level,
            handlers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Stream of the console handler, if console output is enabled.
    pub fn console_stream(&self) -> Option<ConsoleStream> {
        self.handlers.iter().find_map(|h| match h {
            Handler::Console(stream) => Some(*stream),
            Handler::File { .. } => None,
        })
    }

    /// Path of the file handler, if file output is enabled.
    pub fn log_file(&self) -> Option<&Path> {
        self.handlers.iter().find_map(|h| match h {
            Handler::File { path, .. } => Some(path.as_path()),
            Handler::Console(_) => None,
        })
    }

    /// Flushes every handler; the first error is returned after all were tried.
    pub fn flush(&self) -> io::Result<()> {
        first_error(self.handlers.iter().map(Handler::flush))
    }

    /// Writes `buf` to every handler. A failing handler (e.g. a closed stdout
    /// pipe) does not keep the line from the others.
    fn write_line(&self, buf: &[u8]) -> io::Result<()> {
        first_error(self.handlers.iter().map(|h| h.write_all(buf)))
    }

    /// Build a `tracing` subscriber writing to this sink.
    /// `RUST_LOG` overrides the sink level when set.
    pub fn subscriber(self: &Arc<Self>) -> impl tracing::Subscriber + Send + Sync + 'static {
        let filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::from_level(self.level).into())
            .from_env_lossy();
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(SinkWriter(Arc::clone(self)))
            .with_ansi(false)
            .finish()
    }
}

/// `MakeWriter` handing out handles to a shared sink.
#[derive(Clone)]
pub struct SinkWriter(Arc<LogSink>);

impl<'a> MakeWriter<'a> for SinkWriter {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl io::Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write_line(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

fn first_error(results: impl Iterator<Item = io::Result<()>>) -> io::Result<()> {
    let mut first = Ok(());
    for result in results {
        if first.is_ok() {
            first = result;
        }
    }
    first
}

/// Registry of named sinks.
#[derive(Default)]
pub struct LogRegistry {
    sinks: Mutex<HashMap<String, Arc<LogSink>>>,
}

impl LogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry, created on first use.
    pub fn global() -> &'static LogRegistry {
        static GLOBAL: OnceLock<LogRegistry> = OnceLock::new();
        GLOBAL.get_or_init(LogRegistry::new)
    }

    /// Return the sink registered under `name`, creating it with `options` if absent.
    /// Options passed for an existing name are ignored.
    pub fn get_or_create(&self, name: &str, options: &LoggerOptions) -> io::Result<Arc<LogSink>> {
        let mut sinks = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sink) = sinks.get(name) {
            return Ok(Arc::clone(sink));
        }
        let sink = Arc::new(LogSink::open(name, options)?);
        sinks.insert(name.to_string(), Arc::clone(&sink));
        Ok(sink)
    }

    pub fn get(&self, name: &str) -> Option<Arc<LogSink>> {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.sinks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Flushes the process sink when dropped. Keep it alive for the whole of `main`.
pub struct LoggingGuard {
    sink: Arc<LogSink>,
}

impl Drop for LoggingGuard {
    fn drop(&mut self) {
        let _ = self.sink.flush();
    }
}

/// Create (or reuse) the sink `name` in the global registry and install it as the
/// global `tracing` subscriber. Later calls keep the first subscriber.
pub fn init(name: &str, options: &LoggerOptions) -> Result<LoggingGuard> {
    let sink = LogRegistry::global().get_or_create(name, options)?;
    if tracing::subscriber::set_global_default(sink.subscriber()).is_ok() {
        match sink.log_file() {
            Some(path) => tracing::info!("logging initialized at {}", path.display()),
            None => tracing::debug!("logging initialized (console only)"),
        }
    }
    Ok(LoggingGuard { sink })
}

/// Stderr-only logging, used when the file sink cannot be created.
pub fn init_stderr(level: Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_only(dir: &Path, file_name: &str) -> LoggerOptions {
        LoggerOptions {
            directory: dir.to_path_buf(),
            file_name: Some(file_name.to_string()),
            console_enabled: false,
            ..LoggerOptions::default()
        }
    }

    #[test]
    fn default_options() {
        let opts = LoggerOptions::default();
        assert_eq!(opts.directory, PathBuf::from("logs"));
        assert!(opts.file_name.is_none());
        assert_eq!(opts.level, Level::INFO);
        assert!(opts.console_enabled);
        assert!(opts.file_enabled);
    }

    #[test]
    fn timestamped_name_shape() {
        let name = timestamped_file_name();
        assert!(name.starts_with("app_"));
        assert!(name.ends_with(".log"));
        // app_ + YYYYMMDD_HHMMSS + .log
        assert_eq!(name.len(), 4 + 15 + 4);
    }

    #[test]
    fn same_name_returns_same_sink() {
        let dir = tempfile::tempdir().unwrap();
        let registry = LogRegistry::new();
        let opts = file_only(dir.path(), "run.log");
        let a = registry.get_or_create("ingestion", &opts).unwrap();
        let b = registry.get_or_create("ingestion", &opts).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.handler_count(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn repeated_setup_writes_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let registry = LogRegistry::new();
        let opts = file_only(dir.path(), "run.log");
        registry.get_or_create("ingestion", &opts).unwrap();
        let sink = registry.get_or_create("ingestion", &opts).unwrap();

        tracing::subscriber::with_default(sink.subscriber(), || {
            tracing::warn!("third call");
        });
        sink.flush().unwrap();

        let content = fs::read_to_string(dir.path().join("run.log")).unwrap();
        let lines: Vec<_> = content.lines().filter(|l| l.contains("third call")).collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("WARN"));
    }

    #[test]
    fn file_disabled_creates_no_directory() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("nested");
        let registry = LogRegistry::new();
        let opts = LoggerOptions {
            directory: log_dir.clone(),
            file_enabled: false,
            ..LoggerOptions::default()
        };
        let sink = registry.get_or_create("console", &opts).unwrap();
        assert_eq!(sink.handler_count(), 1);
        assert!(sink.log_file().is_none());
        assert!(!log_dir.exists());
    }

    #[test]
    fn file_is_opened_in_append_mode() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("run.log"), "previous line\n").unwrap();
        let registry = LogRegistry::new();
        let sink = registry
            .get_or_create("append", &file_only(dir.path(), "run.log"))
            .unwrap();
        tracing::subscriber::with_default(sink.subscriber(), || {
            tracing::info!("next line");
        });
        sink.flush().unwrap();
        let content = fs::read_to_string(dir.path().join("run.log")).unwrap();
        assert!(content.starts_with("previous line\n"));
        assert!(content.contains("next line"));
    }

    #[test]
    fn distinct_names_get_distinct_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let registry = LogRegistry::new();
        let a = registry
            .get_or_create("a", &file_only(dir.path(), "a.log"))
            .unwrap();
        let b = registry
            .get_or_create("b", &file_only(dir.path(), "b.log"))
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
        assert!(registry.get("a").is_some());
        assert!(registry.get("c").is_none());
    }

    #[test]
    fn console_can_target_stderr() {
        let registry = LogRegistry::new();
        let opts = LoggerOptions {
            console_stream: ConsoleStream::Stderr,
            file_enabled: false,
            ..LoggerOptions::default()
        };
        let sink = registry.get_or_create("json", &opts).unwrap();
        assert_eq!(sink.console_stream(), Some(ConsoleStream::Stderr));

        let plain = LoggerOptions {
            file_enabled: false,
            ..LoggerOptions::default()
        };
        let default = registry.get_or_create("plain", &plain).unwrap();
        assert_eq!(default.console_stream(), Some(ConsoleStream::Stdout));
    }

    #[test]
    fn failing_handler_does_not_drop_line_for_others() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let read_only = dir.path().join("read_only.log");
        fs::write(&read_only, "").unwrap();
        let good = dir.path().join("good.log");
        let sink = Arc::new(LogSink {
            name: "split".to_string(),
            level: Level::INFO,
            handlers: vec![
                Handler::File {
                    path: read_only.clone(),
                    file: Mutex::new(File::open(&read_only).unwrap()),
                },
                Handler::File {
                    path: good.clone(),
                    file: Mutex::new(File::create(&good).unwrap()),
                },
            ],
        });

        let mut writer = SinkWriter(Arc::clone(&sink));
        assert!(writer.write(b"kept line\n").is_err());
        assert_eq!(fs::read_to_string(&good).unwrap(), "kept line\n");
        assert_eq!(fs::read_to_string(&read_only).unwrap(), "");
    }
}
