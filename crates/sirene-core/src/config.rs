//! YAML project configuration: INSEE download URLs, metadata and data-lake paths.
//!
//! The document is parsed once into a [`Configuration`]; the sub-views
//! (`download_urls`, `metadata`, `data_paths`) are read-only projections
//! computed on demand. A missing section yields an empty view, never an error.

use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default configuration path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

/// XDG prefix: the fallback lives at `$XDG_CONFIG_HOME/sirene/config.yaml`.
pub const XDG_PREFIX: &str = "sirene";

/// File name looked up under the XDG prefix when the default path is absent.
const CONFIG_FILE_NAME: &str = "config.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read configuration file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed configuration document {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("missing configuration key `{0}`")]
    MissingKey(&'static str),
    #[error("cannot resolve XDG config directory")]
    Xdg(#[from] xdg::BaseDirectoriesError),
}

/// Parsed configuration document.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    source: Option<PathBuf>,
    document: Mapping,
}

impl Configuration {
    /// Load and parse the YAML document at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let document = parse_document(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(Self {
            source: Some(path.to_path_buf()),
            document,
        })
    }

    /// Load from [`default_path`]. Every call re-reads the file.
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load(&default_path()?)
    }

    /// Parse an in-memory YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let document = parse_document(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<memory>"),
            source,
        })?;
        Ok(Self {
            source: None,
            document,
        })
    }

    /// Path the document was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// `insee.download_urls` in document order. Non-string entries are skipped.
    pub fn download_urls(&self) -> Vec<(String, String)> {
        let Some(section) = self.section(&["insee", "download_urls"]) else {
            return Vec::new();
        };
        section
            .iter()
            .filter_map(|(k, v)| match (k.as_str(), v.as_str()) {
                (Some(key), Some(url)) => Some((key.to_string(), url.to_string())),
                _ => {
                    tracing::warn!("skipping non-string download_urls entry: {:?}", k);
                    None
                }
            })
            .collect()
    }

    /// `insee.metadata`, free-form.
    pub fn metadata(&self) -> Mapping {
        self.section(&["insee", "metadata"])
            .cloned()
            .unwrap_or_default()
    }

    /// `paths`: tier name to local directory.
    pub fn data_paths(&self) -> HashMap<String, PathBuf> {
        let Some(section) = self.section(&["paths"]) else {
            return HashMap::new();
        };
        section
            .iter()
            .filter_map(|(k, v)| match (k.as_str(), v.as_str()) {
                (Some(tier), Some(dir)) => Some((tier.to_string(), PathBuf::from(dir))),
                _ => {
                    tracing::warn!("skipping non-string paths entry: {:?}", k);
                    None
                }
            })
            .collect()
    }

    /// The raw-data tier directory (`paths.bronze`).
    pub fn bronze_dir(&self) -> Result<PathBuf, ConfigError> {
        self.data_paths()
            .remove("bronze")
            .ok_or(ConfigError::MissingKey("paths.bronze"))
    }

    fn section(&self, keys: &[&str]) -> Option<&Mapping> {
        let mut current = &self.document;
        for key in keys {
            current = current.get(*key)?.as_mapping()?;
        }
        Some(current)
    }
}

/// An empty document is treated as an empty mapping; any other non-mapping root is malformed.
fn parse_document(text: &str) -> Result<Mapping, serde_yaml::Error> {
    match serde_yaml::from_str::<Value>(text)? {
        Value::Null => Ok(Mapping::new()),
        other => serde_yaml::from_value(other),
    }
}

/// Resolve the configuration path: `configs/config.yaml` if it exists,
/// otherwise `$XDG_CONFIG_HOME/sirene/config.yaml` if that exists.
/// Falls back to the relative default so the `NotFound` error names it.
pub fn default_path() -> Result<PathBuf, ConfigError> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix(XDG_PREFIX)?;
    Ok(default_path_in(Path::new(""), &xdg_dirs))
}

/// [`default_path`] with an explicit base directory and XDG lookup.
pub fn default_path_in(base: &Path, xdg_dirs: &xdg::BaseDirectories) -> PathBuf {
    let local = base.join(DEFAULT_CONFIG_PATH);
    if local.exists() {
        return local;
    }
    xdg_dirs.find_config_file(CONFIG_FILE_NAME).unwrap_or(local)
}

fn resolve<T>(
    config: Option<&Configuration>,
    view: impl FnOnce(&Configuration) -> T,
) -> Result<T, ConfigError> {
    match config {
        Some(cfg) => Ok(view(cfg)),
        None => Ok(view(&Configuration::load_default()?)),
    }
}

/// Download URLs from `config`, or from a fresh load of the default file.
pub fn download_urls(config: Option<&Configuration>) -> Result<Vec<(String, String)>, ConfigError> {
    resolve(config, Configuration::download_urls)
}

/// INSEE metadata from `config`, or from a fresh load of the default file.
pub fn metadata(config: Option<&Configuration>) -> Result<Mapping, ConfigError> {
    resolve(config, Configuration::metadata)
}

/// Data paths from `config`, or from a fresh load of the default file.
pub fn data_paths(config: Option<&Configuration>) -> Result<HashMap<String, PathBuf>, ConfigError> {
    resolve(config, Configuration::data_paths)
}
