//! Categories and the books filed under them.

use tracing::info;

use crate::client::{check_status, parse_json, ApiClient};
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::normalize::{decode_list_str, decode_records, BOOK_LIST, CATEGORY_LIST};
use crate::types::{Book, Category};

pub const CATEGORIES_PATH: &str = "/books/categories/";

pub fn category_path(id: u64) -> String {
    format!("{CATEGORIES_PATH}{id}/")
}

pub fn category_books_path(id: u64) -> String {
    format!("{CATEGORIES_PATH}{id}/books/")
}

pub fn build_list_categories(timestamp_ms: i64) -> HttpRequest {
    HttpRequest::get(CATEGORIES_PATH)
        .no_cache()
        .with_query("t", timestamp_ms)
}

pub fn parse_list_categories(response: &HttpResponse) -> Result<Vec<Category>, ApiError> {
    check_status(response, CATEGORIES_PATH)?;
    let (items, shape) = decode_list_str(&response.body, CATEGORY_LIST);
    let categories: Vec<Category> = decode_records::<Category>(items)
        .into_iter()
        .map(Category::with_placeholders)
        .collect();
    info!(count = categories.len(), ?shape, "received categories");
    Ok(categories)
}

pub fn build_get_category(id: u64) -> HttpRequest {
    HttpRequest::get(category_path(id)).no_cache()
}

pub fn parse_get_category(response: &HttpResponse, id: u64) -> Result<Category, ApiError> {
    parse_json::<Category>(response, &category_path(id)).map(Category::with_placeholders)
}

pub fn build_category_books(id: u64) -> HttpRequest {
    HttpRequest::get(category_books_path(id))
}

pub fn parse_category_books(response: &HttpResponse, id: u64) -> Result<Vec<Book>, ApiError> {
    check_status(response, &category_books_path(id))?;
    let (items, _) = decode_list_str(&response.body, BOOK_LIST);
    Ok(decode_records(items))
}

impl ApiClient {
    pub async fn list_categories(&self, timestamp_ms: i64) -> Result<Vec<Category>, ApiError> {
        info!("requesting all categories");
        let response = self.send(build_list_categories(timestamp_ms)).await?;
        parse_list_categories(&response)
    }

    pub async fn get_category(&self, id: u64) -> Result<Category, ApiError> {
        let response = self.send(build_get_category(id)).await?;
        parse_get_category(&response, id)
    }

    pub async fn category_books(&self, id: u64) -> Result<Vec<Book>, ApiError> {
        let response = self.send(build_category_books(id)).await?;
        parse_category_books(&response, id)
    }
}
