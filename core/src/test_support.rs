//! Scripted transport and storage doubles for unit tests.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::client::ApiClient;
use crate::config::ApiConfig;
use crate::http::{HttpRequest, HttpResponse, Transport, TransportError};
use crate::session::Session;
use crate::storage::{MemoryTokenStorage, TokenStorage};

pub(crate) fn test_config() -> ApiConfig {
    let mut config = ApiConfig::new("http://api.test/api").with_media_url("http://api.test/media");
    config.retry_delay = Duration::from_millis(10);
    config
}

type Outcome = (Duration, Result<HttpResponse, TransportError>);

/// Replays queued outcomes in order and records every request it sees.
/// Running out of outcomes is a network error.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    outcomes: Mutex<VecDeque<Outcome>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn push(&self, delay: Duration, outcome: Result<HttpResponse, TransportError>) {
        self.outcomes.lock().unwrap().push_back((delay, outcome));
    }

    pub(crate) fn push_ok(&self, body: &str) {
        self.push_status(200, body);
    }

    /// Answer 200 with `body` after `delay` of tokio time.
    pub(crate) fn push_delayed_ok(&self, delay: Duration, body: &str) {
        self.push(delay, Ok(HttpResponse::ok(body)));
    }

    pub(crate) fn push_status(&self, status: u16, body: &str) {
        self.push(Duration::ZERO, Ok(HttpResponse::with_status(status, body)));
    }

    pub(crate) fn push_err(&self, err: TransportError) {
        self.push(Duration::ZERO, Err(err));
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(
        &self,
        _base_url: &str,
        request: &HttpRequest,
        _timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.outcomes.lock().unwrap().pop_front();
        let (delay, outcome) = next.unwrap_or_else(|| {
            (
                Duration::ZERO,
                Err(TransportError::Network("script exhausted".into())),
            )
        });
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}

/// Storage that accepts tokens but can never remove them.
#[derive(Default)]
pub(crate) struct StickyTokenStorage {
    inner: MemoryTokenStorage,
}

impl TokenStorage for StickyTokenStorage {
    fn load(&self) -> Option<String> {
        self.inner.load()
    }

    fn store(&self, token: &str) -> io::Result<()> {
        self.inner.store(token)
    }

    fn remove(&self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only storage"))
    }
}

/// Client over `transport` with an empty (or pre-seeded) token storage.
pub(crate) fn scripted_client(
    transport: Arc<ScriptedTransport>,
    token: Option<&str>,
) -> Arc<ApiClient> {
    let storage = match token {
        Some(t) => MemoryTokenStorage::with_token(t),
        None => MemoryTokenStorage::new(),
    };
    client_with_storage(transport, Arc::new(storage))
}

pub(crate) fn client_with_storage(
    transport: Arc<ScriptedTransport>,
    storage: Arc<dyn TokenStorage>,
) -> Arc<ApiClient> {
    let session = Arc::new(Session::restore(storage));
    Arc::new(ApiClient::with_transport(test_config(), transport, session))
}
