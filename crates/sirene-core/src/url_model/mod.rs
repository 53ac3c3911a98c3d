//! URL validation and local filename derivation for bulk extracts.

mod path;
mod sanitize;

pub use path::filename_from_url_path;
pub use sanitize::sanitize_filename;

/// Filename used when the URL path yields nothing usable.
pub const DEFAULT_FILENAME: &str = "download.bin";

/// Derives the local filename for a download from the final URL path segment,
/// sanitized for the filesystem. Falls back to [`DEFAULT_FILENAME`].
///
/// - `destination_filename("https://files.example.org/StockEtablissement_utf8.parquet")` → `"StockEtablissement_utf8.parquet"`
pub fn destination_filename(url: &str) -> String {
    let Some(raw) = filename_from_url_path(url) else {
        return DEFAULT_FILENAME.to_string();
    };
    let sanitized = sanitize_filename(&raw);
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        sanitized
    }
}

/// True when `url` parses and uses the `http` or `https` scheme.
pub fn is_http_url(url: &str) -> bool {
    url::Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}
