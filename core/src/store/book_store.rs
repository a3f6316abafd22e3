//! Book, category and review state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::client::ApiClient;
use crate::error::{ApiError, ErrorKind};
use crate::notify::Notifier;
use crate::store::{describe, NO_RESPONSE};
use crate::types::{Book, Category, NewReview, Review, ReviewId, UpdateReview};

const BOOKS_FAILED: &str = "Failed to load books, please try again later";
const CATEGORIES_FAILED: &str = "Failed to load categories, please try again later";
const REVIEWS_FAILED: &str = "Failed to load reviews, please try again later";
const SEARCH_FAILED: &str = "Book search failed, please try again later";
const ALREADY_REVIEWED: &str =
    "You have already reviewed this book, refreshing your existing review";

#[derive(Debug, Clone, Default)]
pub struct BookState {
    pub books: Vec<Book>,
    pub categories: Vec<Category>,
    /// Reviews per book id, filled on first request for that book.
    pub reviews: HashMap<u64, Vec<Review>>,
    pub search_results: Vec<Book>,
    pub loading: bool,
    pub error: Option<String>,
    pub last_fetch: Option<DateTime<Utc>>,
}

/// Result of `BookStore::add_review` when no hard error occurred.
#[derive(Debug, Clone, PartialEq)]
pub enum AddReviewOutcome {
    Added(Review),
    /// The server returned a review by a user who already had one cached
    /// for this book; it replaced the cached one.
    Updated(Review),
    /// The server rejected a second review by the same user. Cached reviews
    /// for the book were refetched.
    AlreadyReviewed,
}

/// Recount books per category. Categories with id 0 and books whose
/// category is missing or unknown are skipped.
pub fn count_books_per_category(books: &[Book], categories: &mut [Category]) {
    let mut counts: HashMap<u64, u64> = categories
        .iter()
        .filter(|c| c.id != 0)
        .map(|c| (c.id, 0))
        .collect();

    for book in books {
        if let Some(count) = book.category_id().and_then(|id| counts.get_mut(&id)) {
            *count += 1;
        }
    }

    for category in categories.iter_mut().filter(|c| c.id != 0) {
        category.count = counts.get(&category.id).copied().unwrap_or(0);
    }
}

pub struct BookStore {
    api: Arc<ApiClient>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<BookState>,
    search_generation: AtomicU64,
}

impl BookStore {
    pub fn new(api: Arc<ApiClient>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            api,
            notifier,
            state: Mutex::new(BookState::default()),
            search_generation: AtomicU64::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, BookState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) {
        let mut state = self.state();
        state.loading = true;
        state.error = None;
    }

    fn finish(&self) {
        self.state().loading = false;
    }

    fn fail(&self, message: &str) {
        self.state().error = Some(message.to_string());
        self.notifier.error(message);
    }

    pub fn snapshot(&self) -> BookState {
        self.state().clone()
    }

    pub fn books(&self) -> Vec<Book> {
        self.state().books.clone()
    }

    pub fn categories(&self) -> Vec<Category> {
        self.state().categories.clone()
    }

    pub fn total_books(&self) -> usize {
        self.state().books.len()
    }

    pub fn reviews_for(&self, book_id: u64) -> Option<Vec<Review>> {
        self.state().reviews.get(&book_id).cloned()
    }

    pub fn search_results(&self) -> Vec<Book> {
        self.state().search_results.clone()
    }

    pub fn loading(&self) -> bool {
        self.state().loading
    }

    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn last_fetch(&self) -> Option<DateTime<Utc>> {
        self.state().last_fetch
    }

    pub fn clear_data(&self) {
        let mut state = self.state();
        state.books.clear();
        state.categories.clear();
        state.reviews.clear();
        state.search_results.clear();
        state.last_fetch = None;
        info!("cleared book and category data");
    }

    /// Drop cached reviews for one book, or for all books with `None`.
    pub fn clear_book_reviews(&self, book_id: Option<u64>) {
        let mut state = self.state();
        match book_id {
            Some(id) => {
                if state.reviews.remove(&id).is_some() {
                    debug!(book_id = id, "cleared cached reviews");
                }
            }
            None => {
                state.reviews.clear();
                debug!("cleared all cached reviews");
            }
        }
    }

    /// Replace the book collection. Returns an empty list on failure.
    pub async fn fetch_books(&self) -> Vec<Book> {
        self.begin();
        let timestamp = Utc::now().timestamp_millis();
        let result = self.api.list_books(timestamp).await;

        let books = match result {
            Ok(books) => {
                let mut state = self.state();
                state.books = books;
                let BookState {
                    books, categories, ..
                } = &mut *state;
                count_books_per_category(books, categories);
                state.last_fetch = Some(Utc::now());
                info!(count = state.books.len(), "loaded books");
                state.books.clone()
            }
            Err(e) => {
                error!(error = %e, "failed to load books");
                self.fail(BOOKS_FAILED);
                Vec::new()
            }
        };
        self.finish();
        books
    }

    /// Replace the category collection. Returns an empty list on failure.
    pub async fn fetch_categories(&self) -> Vec<Category> {
        self.begin();
        let timestamp = Utc::now().timestamp_millis();
        let result = self.api.list_categories(timestamp).await;

        let categories = match result {
            Ok(categories) => {
                let mut state = self.state();
                state.categories = categories;
                let BookState {
                    books, categories, ..
                } = &mut *state;
                count_books_per_category(books, categories);
                state.last_fetch = Some(Utc::now());
                info!(count = state.categories.len(), "loaded categories");
                state.categories.clone()
            }
            Err(e) => {
                error!(error = %e, "failed to load categories");
                self.fail(CATEGORIES_FAILED);
                Vec::new()
            }
        };
        self.finish();
        categories
    }

    /// Reviews for `book_id`, from the per-book cache when present.
    pub async fn fetch_book_reviews(&self, book_id: u64) -> Vec<Review> {
        if let Some(cached) = self.reviews_for(book_id) {
            debug!(book_id, "using cached reviews");
            return cached;
        }

        self.begin();
        let result = self.api.list_reviews(book_id).await;
        let reviews = match result {
            Ok(reviews) => {
                self.state().reviews.insert(book_id, reviews.clone());
                reviews
            }
            Err(e) => {
                error!(book_id, error = %e, "failed to load reviews");
                self.fail(REVIEWS_FAILED);
                Vec::new()
            }
        };
        self.finish();
        reviews
    }

    /// Post a review. A duplicate review is reported as a warning and
    /// resolved by refetching the book's reviews; other failures are
    /// returned.
    pub async fn add_review(&self, input: NewReview) -> Result<AddReviewOutcome, ApiError> {
        self.begin();
        let book_id = input.book;
        let result = self.api.add_review(&input).await;

        let outcome = match result {
            Ok(review) => {
                let outcome = self.merge_review(book_id, review);
                match &outcome {
                    AddReviewOutcome::Updated(_) => self.notifier.success("Review updated"),
                    _ => self.notifier.success("Review added"),
                }
                Ok(outcome)
            }
            Err(e) if e.kind() == ErrorKind::Conflict => {
                warn!(book_id, error = %e, "duplicate review rejected");
                self.state().error = Some(ALREADY_REVIEWED.to_string());
                self.notifier.warning(ALREADY_REVIEWED);
                self.refresh_reviews(book_id).await;
                Ok(AddReviewOutcome::AlreadyReviewed)
            }
            Err(e) => {
                error!(book_id, error = %e, "failed to add review");
                let message = match (e.kind(), e.status()) {
                    (ErrorKind::Network | ErrorKind::Timeout, _) => NO_RESPONSE.to_string(),
                    (_, Some(400 | 500)) => format!(
                        "Review failed: {}",
                        e.server_message().unwrap_or_else(|| "server error".to_string())
                    ),
                    (_, Some(status)) => format!("Failed to add review ({status})"),
                    _ => describe(&e, "Failed to add review"),
                };
                self.fail(&message);
                Err(e)
            }
        };
        self.finish();
        outcome
    }

    fn merge_review(&self, book_id: u64, review: Review) -> AddReviewOutcome {
        let mut state = self.state();
        let Some(cached) = state.reviews.get_mut(&book_id) else {
            return AddReviewOutcome::Added(review);
        };
        let existing = review
            .user
            .id
            .and_then(|uid| cached.iter().position(|r| r.user.id == Some(uid)));
        match existing {
            Some(index) => {
                cached[index] = review.clone();
                AddReviewOutcome::Updated(review)
            }
            None => {
                cached.push(review.clone());
                AddReviewOutcome::Added(review)
            }
        }
    }

    /// Refetch reviews for a book, replacing the cached list. Failures are
    /// logged and otherwise ignored.
    async fn refresh_reviews(&self, book_id: u64) {
        self.clear_book_reviews(Some(book_id));
        match self.api.list_reviews(book_id).await {
            Ok(reviews) => {
                self.state().reviews.insert(book_id, reviews);
            }
            Err(e) => error!(book_id, error = %e, "failed to refresh reviews"),
        }
    }

    pub async fn update_review(
        &self,
        review_id: u64,
        book_id: u64,
        input: UpdateReview,
    ) -> Result<Review, ApiError> {
        self.begin();
        let result = self.api.update_review(review_id, book_id, &input).await;
        let outcome = match result {
            Ok(review) => {
                if let Some(cached) = self.state().reviews.get_mut(&book_id) {
                    match cached
                        .iter_mut()
                        .find(|r| r.id == ReviewId::Server(review_id))
                    {
                        Some(slot) => *slot = review.clone(),
                        None => cached.push(review.clone()),
                    }
                }
                self.notifier.success("Review updated");
                Ok(review)
            }
            Err(e) => {
                error!(review_id, error = %e, "failed to update review");
                self.fail(&describe(&e, "Failed to update review"));
                Err(e)
            }
        };
        self.finish();
        outcome
    }

    pub async fn delete_review(&self, review_id: u64, book_id: u64) -> Result<(), ApiError> {
        self.begin();
        let result = self.api.delete_review(review_id).await;
        let outcome = match result {
            Ok(()) => {
                if let Some(cached) = self.state().reviews.get_mut(&book_id) {
                    cached.retain(|r| r.id != ReviewId::Server(review_id));
                }
                self.notifier.success("Review deleted");
                Ok(())
            }
            Err(e) => {
                error!(review_id, error = %e, "failed to delete review");
                self.fail(&describe(&e, "Failed to delete review"));
                Err(e)
            }
        };
        self.finish();
        outcome
    }

    /// Debounced search. Each call waits out the debounce window; if a newer
    /// call arrived meanwhile this one returns `None` without a request.
    /// A response that arrives after a newer call started is not applied.
    pub async fn search_books(&self, query: &str) -> Option<Vec<Book>> {
        let generation = self.search_generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.api.config().search_debounce).await;
        if self.search_generation.load(Ordering::SeqCst) != generation {
            debug!(query, "search superseded before dispatch");
            return None;
        }

        self.begin();
        let result = self.api.search_books(query).await;
        if self.search_generation.load(Ordering::SeqCst) != generation {
            debug!(query, "discarding stale search result");
            self.finish();
            return None;
        }

        let books = match result {
            Ok(books) => {
                self.state().search_results = books.clone();
                books
            }
            Err(e) => {
                error!(query, error = %e, "search failed");
                self.fail(SEARCH_FAILED);
                Vec::new()
            }
        };
        self.finish();
        Some(books)
    }

    /// Load books and categories concurrently and wait for both.
    pub async fn initialize(&self) {
        tokio::join!(self.fetch_books(), self.fetch_categories());
    }

    /// Recompute per-category book counts, loading data first if either
    /// collection is empty.
    pub async fn update_categories_book_count(&self) -> Vec<Category> {
        let needs_load = {
            let state = self.state();
            state.books.is_empty() || state.categories.is_empty()
        };
        if needs_load {
            info!("books or categories missing, loading before counting");
            self.initialize().await;
        }

        let mut state = self.state();
        let BookState {
            books, categories, ..
        } = &mut *state;
        count_books_per_category(books, categories);
        debug!(
            counts = ?categories.iter().map(|c| (c.id, c.count)).collect::<Vec<_>>(),
            "category counts updated"
        );
        categories.clone()
    }
}
