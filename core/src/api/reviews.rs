//! Reviews (comments) attached to books.

use serde_json::Value;
use tracing::{debug, info};

use crate::api::books::book_path;
use crate::client::{check_status, parse_json, to_body, ApiClient};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::normalize::{decode_list_str, REVIEW_LIST};
use crate::types::{NewReview, Review, UpdateReview};

pub const COMMENTS_PATH: &str = "/books/comments/";

pub fn book_reviews_path(book_id: u64) -> String {
    format!("{}reviews/", book_path(book_id))
}

pub fn comment_path(id: u64) -> String {
    format!("{COMMENTS_PATH}{id}/")
}

pub fn build_list_reviews(book_id: u64) -> HttpRequest {
    HttpRequest::get(book_reviews_path(book_id)).no_cache()
}

pub fn parse_list_reviews(response: &HttpResponse, book_id: u64) -> Result<Vec<Review>, ApiError> {
    check_status(response, &book_reviews_path(book_id))?;
    let (items, shape) = decode_list_str(&response.body, REVIEW_LIST);
    debug!(book_id, count = items.len(), ?shape, "received reviews");
    Ok(items
        .iter()
        .map(|item| Review::from_value(item, book_id))
        .collect())
}

pub fn build_add_review(input: &NewReview) -> Result<HttpRequest, ApiError> {
    Ok(HttpRequest::new(HttpMethod::Post, COMMENTS_PATH).with_json_body(to_body(input)?))
}

pub fn parse_add_review(response: &HttpResponse, book_id: u64) -> Result<Review, ApiError> {
    let value: Value = parse_json(response, COMMENTS_PATH)?;
    Ok(Review::from_value(&value, book_id))
}

pub fn build_update_review(id: u64, input: &UpdateReview) -> Result<HttpRequest, ApiError> {
    Ok(HttpRequest::new(HttpMethod::Put, comment_path(id)).with_json_body(to_body(input)?))
}

pub fn parse_update_review(
    response: &HttpResponse,
    id: u64,
    book_id: u64,
) -> Result<Review, ApiError> {
    let value: Value = parse_json(response, &comment_path(id))?;
    Ok(Review::from_value(&value, book_id))
}

pub fn build_delete_review(id: u64) -> HttpRequest {
    HttpRequest::new(HttpMethod::Delete, comment_path(id))
}

pub fn parse_delete_review(response: &HttpResponse, id: u64) -> Result<(), ApiError> {
    check_status(response, &comment_path(id))
}

impl ApiClient {
    pub async fn list_reviews(&self, book_id: u64) -> Result<Vec<Review>, ApiError> {
        info!(book_id, "requesting reviews");
        let response = self.send(build_list_reviews(book_id)).await?;
        parse_list_reviews(&response, book_id)
    }

    pub async fn add_review(&self, input: &NewReview) -> Result<Review, ApiError> {
        let response = self.send(build_add_review(input)?).await?;
        parse_add_review(&response, input.book)
    }

    /// `book_id` fills the review's book when the response omits it.
    pub async fn update_review(
        &self,
        id: u64,
        book_id: u64,
        input: &UpdateReview,
    ) -> Result<Review, ApiError> {
        let response = self.send(build_update_review(id, input)?).await?;
        parse_update_review(&response, id, book_id)
    }

    pub async fn delete_review(&self, id: u64) -> Result<(), ApiError> {
        let response = self.send(build_delete_review(id)).await?;
        parse_delete_review(&response, id)
    }
}
