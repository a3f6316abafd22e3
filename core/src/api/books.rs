//! Book listing, detail and search.

use tracing::info;

use crate::client::{check_status, parse_json, ApiClient};
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::normalize::{decode_list_str, decode_records, BOOK_LIST};
use crate::types::Book;

pub const BOOKS_PATH: &str = "/books/books/";
pub const SEARCH_PATH: &str = "/books/books/search/";

/// Page size hint sent with the full listing.
pub const LIST_PAGE_SIZE: u32 = 100;

pub fn book_path(id: u64) -> String {
    format!("{BOOKS_PATH}{id}/")
}

/// Full listing. `timestamp_ms` busts any intermediate cache; pagination is
/// disabled where the backend supports it.
pub fn build_list_books(timestamp_ms: i64) -> HttpRequest {
    HttpRequest::get(BOOKS_PATH)
        .no_cache()
        .with_query("t", timestamp_ms)
        .with_query("page_size", LIST_PAGE_SIZE)
        .with_query("no_page", true)
}

pub fn parse_list_books(response: &HttpResponse) -> Result<Vec<Book>, ApiError> {
    check_status(response, BOOKS_PATH)?;
    let (items, shape) = decode_list_str(&response.body, BOOK_LIST);
    let books: Vec<Book> = decode_records(items);
    info!(count = books.len(), ?shape, "received books");
    Ok(books)
}

pub fn build_get_book(id: u64) -> HttpRequest {
    HttpRequest::get(book_path(id)).no_cache()
}

pub fn parse_get_book(response: &HttpResponse, id: u64) -> Result<Book, ApiError> {
    parse_json(response, &book_path(id))
}

pub fn build_search_books(query: &str) -> HttpRequest {
    HttpRequest::get(SEARCH_PATH).with_query("q", query).no_cache()
}

pub fn parse_search_books(response: &HttpResponse) -> Result<Vec<Book>, ApiError> {
    check_status(response, SEARCH_PATH)?;
    let (items, _) = decode_list_str(&response.body, BOOK_LIST);
    Ok(decode_records(items))
}

impl ApiClient {
    pub async fn list_books(&self, timestamp_ms: i64) -> Result<Vec<Book>, ApiError> {
        info!("requesting all books");
        let response = self.send(build_list_books(timestamp_ms)).await?;
        parse_list_books(&response)
    }

    pub async fn get_book(&self, id: u64) -> Result<Book, ApiError> {
        let response = self.send(build_get_book(id)).await?;
        parse_get_book(&response, id)
    }

    pub async fn search_books(&self, query: &str) -> Result<Vec<Book>, ApiError> {
        let response = self.send(build_search_books(query)).await?;
        parse_search_books(&response)
    }
}
