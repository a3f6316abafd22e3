//! Async API client and client-side state for the bookshelf catalog service.
//!
//! # Overview
//! The catalog backend exposes books, categories, reviews and user accounts
//! over a JSON REST API. This crate wraps it in three layers:
//! - `ApiClient`: auth header injection, a 5-minute GET response cache and
//!   retry on timeout/network failure, over a pluggable `Transport`.
//! - `api`: one `build_*` / `parse_*` pair per endpoint plus an async
//!   method on `ApiClient`; list payloads are normalized to a sequence.
//! - `store`: `BookStore` and `UserStore`, which hold fetched collections and
//!   the session and report failures through a `Notifier`.
//!
//! # Design
//! - Request building and response parsing stay free of I/O, so every
//!   endpoint can be tested from plain data.
//! - The token lives in durable `TokenStorage` and in `Session`; both are
//!   only ever written together.
//! - Failures are classified into a closed `ErrorKind` set before the
//!   stores decide how to recover.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod media;
pub mod normalize;
pub mod notify;
pub mod session;
pub mod storage;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::LoginPayload;
pub use cache::{CacheKey, Clock, ResponseCache, SystemClock};
pub use client::ApiClient;
pub use config::ApiConfig;
pub use error::{ApiError, ErrorKind};
pub use http::{HttpMethod, HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
pub use notify::{ChannelNotifier, Notice, NoticeLevel, Notifier, TracingNotifier};
pub use session::{Session, SessionState};
pub use storage::{FileTokenStorage, MemoryTokenStorage, TokenStorage};
pub use store::{AddReviewOutcome, BookStore, UserStore};
pub use types::{
    Book, Category, CategoryRef, Credentials, NewReview, NewUser, Review, ReviewId, UpdateReview,
    UpdateUser, User, UserSummary,
};
