//! Cover image URLs on the static-media host.

use crate::client::ApiClient;

/// Characters that cannot appear in a cover file name.
const UNSAFE_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// `{media_url}/covers/{id}_{safe_title}.jpg`
pub fn cover_url(media_url: &str, id: u64, title: &str) -> String {
    let safe_title = if title.is_empty() {
        "unknown".to_string()
    } else {
        title.replace(UNSAFE_CHARS, "_")
    };
    format!("{}/covers/{id}_{safe_title}.jpg", media_url.trim_end_matches('/'))
}

pub fn default_cover_url(media_url: &str) -> String {
    format!("{}/covers/default.jpg", media_url.trim_end_matches('/'))
}

impl ApiClient {
    /// Cover of book `id` on the configured media host.
    pub fn cover_url(&self, id: u64, title: &str) -> String {
        cover_url(&self.config().media_url, id, title)
    }

    pub fn default_cover_url(&self) -> String {
        default_cover_url(&self.config().media_url)
    }
}
