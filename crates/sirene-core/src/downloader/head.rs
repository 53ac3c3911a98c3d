//! Incremental parsing of response header lines delivered by curl.

/// Status and length of the current response. Reset on every status line so
/// that, after redirects, it describes the final response only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ResponseHead {
    pub status: Option<u32>,
    pub content_length: Option<u64>,
}

impl ResponseHead {
    pub fn feed(&mut self, raw: &[u8]) {
        let Ok(line) = std::str::from_utf8(raw) else {
            return;
        };
        let line = line.trim();
        if line.starts_with("HTTP/") {
            *self = ResponseHead {
                status: line.split_whitespace().nth(1).and_then(|s| s.parse().ok()),
                content_length: None,
            };
            return;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                self.content_length = value.trim().parse().ok();
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(200..=299))
    }
}
