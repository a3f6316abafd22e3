//! Error types and the error classifier for the catalog API client.
//!
//! # Design
//! `ApiError` keeps enough context (status, raw payload, URL, attempts) for
//! diagnostics. Stores never match on payload text themselves: they call
//! `ApiError::kind()`, which reduces every failure to a closed `ErrorKind`
//! set derived from the status code and payload shape.

use serde_json::Value;
use thiserror::Error;

use crate::http::TransportError;

/// Errors returned by `ApiClient` and the API modules.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No HTTP response was received, even after retrying.
    #[error("{url}: {source} (after {attempts} attempts)")]
    Transport {
        source: TransportError,
        url: String,
        attempts: u32,
    },

    /// The server returned 404.
    #[error("{url}: resource not found")]
    NotFound { url: String },

    /// The server returned a non-2xx status other than 404.
    #[error("{url}: HTTP {status}: {body}")]
    Http {
        status: u16,
        body: String,
        url: String,
    },

    /// The response body could not be decoded into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be encoded as JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The login response matched none of the known envelopes.
    #[error("unrecognized login response: {0}")]
    UnrecognizedLogin(String),

    /// An operation that needs a session was called without a token.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Durable token storage failed.
    #[error("token storage: {0}")]
    Storage(#[from] std::io::Error),
}

/// Closed classification of failures, used by the stores to pick a recovery
/// path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Timeout,
    Validation,
    Conflict,
    Unauthorized,
    Unknown,
}

/// Payload fragments the backend emits when a uniqueness constraint trips.
const DUPLICATE_MARKERS: &[&str] = &["unique", "已经评论", "Duplicate entry"];

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::NotFound { .. } => Some(404),
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Transport { source, .. } => match source {
                TransportError::Timeout => ErrorKind::Timeout,
                TransportError::Network(_) | TransportError::Body(_) => ErrorKind::Network,
            },
            ApiError::NotAuthenticated => ErrorKind::Unauthorized,
            ApiError::Http { status, body, .. } => classify_status(*status, body),
            _ => ErrorKind::Unknown,
        }
    }

    /// A human-readable message taken from the response payload: the
    /// `detail` field, a plain string body, or the joined field errors.
    pub fn server_message(&self) -> Option<String> {
        let ApiError::Http { body, .. } = self else {
            return None;
        };
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => {
                if let Some(detail) = map.get("detail").and_then(Value::as_str) {
                    return Some(detail.to_string());
                }
                let joined = map
                    .values()
                    .map(|v| match v {
                        Value::Array(items) => items
                            .iter()
                            .map(value_text)
                            .collect::<Vec<_>>()
                            .join(", "),
                        other => value_text(other),
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                (!joined.is_empty()).then_some(joined)
            }
            Ok(Value::String(s)) => Some(s),
            _ => {
                let trimmed = body.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn classify_status(status: u16, body: &str) -> ErrorKind {
    match status {
        401 => ErrorKind::Unauthorized,
        409 => ErrorKind::Conflict,
        400 | 500 if is_duplicate_payload(body) => ErrorKind::Conflict,
        400 | 422 => ErrorKind::Validation,
        _ => ErrorKind::Unknown,
    }
}

fn is_duplicate_payload(body: &str) -> bool {
    let has_marker = |s: &str| DUPLICATE_MARKERS.iter().any(|m| s.contains(m));

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        if map
            .get("detail")
            .and_then(Value::as_str)
            .is_some_and(has_marker)
        {
            return true;
        }
        if map
            .get("non_field_errors")
            .and_then(Value::as_array)
            .is_some_and(|errors| errors.iter().filter_map(Value::as_str).any(has_marker))
        {
            return true;
        }
    }
    body.contains("unique") || body.contains("Duplicate entry")
}
