//! Domain API modules.
//!
//! Each operation comes as a deterministic `build_*` that produces an
//! `HttpRequest`, a `parse_*` that consumes an `HttpResponse`, and an async
//! method on `ApiClient` that runs both through `ApiClient::send`. Paths are
//! relative to the configured base URL.

pub mod books;
pub mod categories;
pub mod reviews;
pub mod users;

pub use users::LoginPayload;
