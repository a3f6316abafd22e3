//! In-memory GET response cache with an injectable clock.
//!
//! One `ResponseCache` belongs to one `ApiClient`. Entries older than the
//! TTL are treated as absent and dropped on lookup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::http::HttpRequest;

/// Source of "now" for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Cache key: request path followed by the JSON-serialized query map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_request(request: &HttpRequest) -> Self {
        let params: serde_json::Map<String, serde_json::Value> = request
            .query
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        Self(format!("{}{}", request.path, serde_json::Value::Object(params)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub body: String,
    pub headers: Vec<(String, String)>,
    pub captured_at: Instant,
}

pub struct ResponseCache {
    entries: HashMap<CacheKey, CacheEntry>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            clock,
        }
    }

    /// Returns a fresh entry, evicting it if it has expired.
    pub fn get(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let now = self.clock.now();
        let entry = self.entries.get(key)?;
        if now.saturating_duration_since(entry.captured_at) < self.ttl {
            return Some(entry.clone());
        }
        self.entries.remove(key);
        None
    }

    pub fn insert(&mut self, key: CacheKey, body: String, headers: Vec<(String, String)>) {
        let entry = CacheEntry {
            body,
            headers,
            captured_at: self.clock.now(),
        };
        self.entries.insert(key, entry);
    }

    pub fn invalidate(&mut self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
