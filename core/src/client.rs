//! HTTP client wrapper: auth header, GET response cache, retry.
//!
//! # Design
//! The API modules build `HttpRequest`s and parse `HttpResponse`s without
//! I/O. `ApiClient::send` is the single place where a request meets the
//! network, and it applies, in order:
//! 1. JSON headers and `Authorization: Token <token>` when a token is stored.
//! 2. The response cache for GETs that did not opt out with `noCache`.
//! 3. The transport, retried on timeout/network failure only.
//! 4. Status handling: HTTP errors are logged and returned, never retried.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, warn};

use crate::cache::{CacheKey, Clock, ResponseCache, SystemClock};
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
use crate::session::Session;

pub const AUTH_SCHEME: &str = "Token";

pub struct ApiClient {
    config: ApiConfig,
    transport: Arc<dyn Transport>,
    cache: Mutex<ResponseCache>,
    session: Arc<Session>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url)
            .field("cache", &*self.cache())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Client over the production reqwest transport.
    pub fn new(config: ApiConfig, session: Arc<Session>) -> Self {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()), session)
    }

    pub fn with_transport(
        config: ApiConfig,
        transport: Arc<dyn Transport>,
        session: Arc<Session>,
    ) -> Self {
        Self::with_clock(config, transport, session, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: ApiConfig,
        transport: Arc<dyn Transport>,
        session: Arc<Session>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = ResponseCache::with_clock(config.cache_ttl, clock);
        Self {
            config,
            transport,
            cache: Mutex::new(cache),
            session,
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn cache(&self) -> MutexGuard<'_, ResponseCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn clear_cache(&self) {
        self.cache().clear();
        debug!("response cache cleared");
    }

    pub fn cached_entries(&self) -> usize {
        self.cache().len()
    }

    /// Execute `request` and return a 2xx response, or the error that ended
    /// the last attempt.
    pub async fn send(&self, mut request: HttpRequest) -> Result<HttpResponse, ApiError> {
        request.set_header("Content-Type", "application/json");
        request.set_header("Accept", "application/json");
        let authenticated = match self.session.token() {
            Some(token) => {
                request.set_header("Authorization", format!("{AUTH_SCHEME} {token}"));
                true
            }
            None => false,
        };

        let cache_key = (!request.method.is_mutation() && !request.bypasses_cache())
            .then(|| CacheKey::for_request(&request));

        if let Some(key) = &cache_key {
            let cached = self.cache().get(key);
            if let Some(entry) = cached {
                debug!(cache_key = key.as_str(), "serving cached response");
                return Ok(HttpResponse {
                    status: 200,
                    headers: entry.headers,
                    body: entry.body,
                });
            }
        }

        let response = self.execute_with_retry(&request).await?;

        if let Err(err) = check_status(&response, &request.path) {
            error!(
                status = response.status,
                body = %response.body,
                url = %request.path,
                "API request failed"
            );
            if response.status == 401 && authenticated {
                warn!(url = %request.path, "token rejected, clearing session");
                if let Err(e) = self.session.clear() {
                    error!(error = %e, "failed to remove stored token");
                }
            }
            return Err(err);
        }

        if let Some(key) = cache_key {
            self.cache()
                .insert(key, response.body.clone(), response.headers.clone());
        } else if request.method.is_mutation() {
            self.clear_cache();
        }
        Ok(response)
    }

    async fn execute_with_retry(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let max_retries = self.config.max_retries;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self
                .transport
                .execute(&self.config.base_url, request, self.config.timeout)
                .await
            {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt <= max_retries => {
                    warn!(
                        url = %request.path,
                        attempt,
                        max_retries,
                        error = %e,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => {
                    error!(
                        url = %request.path,
                        method = request.method.as_str(),
                        timeout_ms = self.config.timeout.as_millis() as u64,
                        retry_count = attempt - 1,
                        error = %e,
                        "API request got no response"
                    );
                    return Err(ApiError::Transport {
                        source: e,
                        url: request.path.clone(),
                        attempts: attempt,
                    });
                }
            }
        }
    }
}

/// Map non-success status codes to the appropriate `ApiError` variant.
pub(crate) fn check_status(response: &HttpResponse, url: &str) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    if response.status == 404 {
        return Err(ApiError::NotFound {
            url: url.to_string(),
        });
    }
    Err(ApiError::Http {
        status: response.status,
        body: response.body.clone(),
        url: url.to_string(),
    })
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    response: &HttpResponse,
    url: &str,
) -> Result<T, ApiError> {
    check_status(response, url)?;
    serde_json::from_str(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))
}

pub(crate) fn to_body<T: serde::Serialize>(input: &T) -> Result<String, ApiError> {
    serde_json::to_string(input).map_err(|e| ApiError::Serialization(e.to_string()))
}
