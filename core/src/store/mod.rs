//! Client state stores.
//!
//! # Design
//! Stores hold fetched collections behind a `std::sync::Mutex` that is never
//! held across an `.await`. `loading` and `error` belong to the store, not
//! to an operation: when two actions overlap, whichever finishes last
//! decides their final value.

pub mod book_store;
pub mod user_store;

pub use book_store::{count_books_per_category, AddReviewOutcome, BookState, BookStore};
pub use user_store::UserStore;

use crate::error::{ApiError, ErrorKind};

pub(crate) const NO_RESPONSE: &str = "The server did not respond, please check your network connection";

/// Message for failures without a more specific wording.
pub(crate) fn describe(err: &ApiError, action: &str) -> String {
    match err.kind() {
        ErrorKind::Network | ErrorKind::Timeout => NO_RESPONSE.to_string(),
        _ => match err.server_message() {
            Some(detail) => format!("{action}: {detail}"),
            None => format!("{action}: {err}"),
        },
    }
}
