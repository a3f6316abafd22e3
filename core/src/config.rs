//! Client configuration.

use std::time::Duration;

use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_MEDIA_URL: &str = "http://localhost:8000/media";

/// Endpoints and timing knobs for `ApiClient` and the stores.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub media_url: String,
    /// Per-attempt request timeout.
    pub timeout: Duration,
    /// Additional attempts after the first one on timeout/network failure.
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Lifetime of a cached GET response.
    pub cache_ttl: Duration,
    pub search_debounce: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            media_url: DEFAULT_MEDIA_URL.to_string(),
            timeout: Duration::from_secs(15),
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
            cache_ttl: Duration::from_secs(5 * 60),
            search_debounce: Duration::from_millis(500),
        }
    }
}

impl ApiConfig {
    pub fn new(base_url: &str) -> Self {
        Self::default().with_base_url(base_url)
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_media_url(mut self, media_url: &str) -> Self {
        self.media_url = media_url.trim_end_matches('/').to_string();
        self
    }

    /// Defaults overridden by `BOOKSHELF_API_URL`, `BOOKSHELF_MEDIA_URL` and
    /// `BOOKSHELF_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("BOOKSHELF_API_URL") {
            config = config.with_base_url(&url);
        }
        if let Ok(url) = std::env::var("BOOKSHELF_MEDIA_URL") {
            config = config.with_media_url(&url);
        }
        if let Ok(raw) = std::env::var("BOOKSHELF_TIMEOUT_MS") {
            match raw.parse::<u64>() {
                Ok(ms) => config.timeout = Duration::from_millis(ms),
                Err(_) => warn!(value = %raw, "ignoring invalid BOOKSHELF_TIMEOUT_MS"),
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_backend_layout() {
        let config = ApiConfig::default();
        assert_eq!(config.base_url, "http://localhost:8000/api");
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let config = ApiConfig::new("http://example.test/api/").with_media_url("http://m.test/");
        assert_eq!(config.base_url, "http://example.test/api");
        assert_eq!(config.media_url, "http://m.test");
    }
}
