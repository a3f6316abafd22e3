use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug)]
pub struct Book {
    pub id: u64,
    pub title: String,
    pub author: String,
    pub category_id: u64,
    pub isbn: String,
    pub description: String,
    pub publisher: String,
    pub publish_date: String,
    pub price_cents: u64,
    pub pages: u32,
    pub language: String,
}

#[derive(Clone, Debug)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub password: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Clone, Debug)]
pub struct Comment {
    pub id: u64,
    pub book: u64,
    pub user: u64,
    pub content: String,
    pub rating: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Default)]
pub struct Db {
    pub categories: Vec<Category>,
    pub books: Vec<Book>,
    pub users: HashMap<u64, User>,
    pub tokens: HashMap<String, u64>,
    pub comments: Vec<Comment>,
    next_user_id: u64,
    next_comment_id: u64,
}

#[derive(Deserialize)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Deserialize)]
pub struct UpdateUserInput {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
pub struct CommentInput {
    pub book: u64,
    pub content: String,
    pub rating: i64,
}

#[derive(Deserialize)]
pub struct UpdateCommentInput {
    pub content: Option<String>,
    pub rating: Option<i64>,
}

#[derive(Deserialize, Default)]
pub struct ListParams {
    pub no_page: Option<String>,
    pub page_size: Option<usize>,
    pub q: Option<String>,
}

const DEFAULT_PAGE_SIZE: usize = 10;

/// Shared server state. `hits` counts every request the router receives.
#[derive(Clone, Default)]
pub struct AppState {
    pub db: Arc<RwLock<Db>>,
    hits: Arc<AtomicU64>,
}

impl AppState {
    /// Catalog with three categories, five books and two users
    /// (`demo`/`demo123`, `reader`/`reader123`). `demo` has reviewed book 1.
    pub fn seeded() -> Self {
        let mut db = Db {
            categories: vec![
                category(1, "Fiction", "Novels and short stories"),
                category(2, "Science", "Popular science"),
                category(3, "History", "World history"),
            ],
            books: vec![
                book(1, "The Rust Programming Language", "Steve Klabnik", 1, 3990),
                book(2, "A Brief History of Time", "Stephen Hawking", 2, 2550),
                book(3, "Sapiens", "Yuval Noah Harari", 3, 4200),
                book(4, "Dune", "Frank Herbert", 1, 1999),
                book(5, "Cosmos: A Personal Voyage", "Carl Sagan", 2, 3000),
            ],
            next_user_id: 1,
            ..Db::default()
        };
        for (username, password) in [("demo", "demo123"), ("reader", "reader123")] {
            let id = db.next_user_id;
            db.next_user_id += 1;
            db.users.insert(
                id,
                User {
                    id,
                    username: username.to_string(),
                    password: password.to_string(),
                    email: format!("{username}@example.com"),
                    first_name: String::new(),
                    last_name: String::new(),
                },
            );
        }
        let now = now();
        db.comments.push(Comment {
            id: 1,
            book: 1,
            user: 1,
            content: "Clear and thorough.".to_string(),
            rating: 5,
            created_at: now.clone(),
            updated_at: now,
        });
        db.next_comment_id = 2;

        Self {
            db: Arc::new(RwLock::new(db)),
            hits: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::SeqCst)
    }
}

fn category(id: u64, name: &str, description: &str) -> Category {
    Category {
        id,
        name: name.to_string(),
        description: description.to_string(),
    }
}

fn book(id: u64, title: &str, author: &str, category_id: u64, price_cents: u64) -> Book {
    Book {
        id,
        title: title.to_string(),
        author: author.to_string(),
        category_id,
        isbn: format!("97800000000{id:02}"),
        description: format!("{title} by {author}"),
        publisher: "Example Press".to_string(),
        publish_date: "2020-01-01".to_string(),
        price_cents,
        pages: 300,
        language: "English".to_string(),
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

type ApiResult<T> = Result<T, (StatusCode, Json<Value>)>;

fn detail(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "detail": message })))
}

fn field_error(field: &str, message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ field: [message] })))
}

pub fn app() -> Router {
    app_with_state(AppState::seeded())
}

pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .route("/api/users/token-auth/", post(token_auth))
        .route("/api/users/users/", post(register))
        .route("/api/users/users/me/", get(current_user))
        .route("/api/users/users/{id}/", put(update_user))
        .route("/api/books/books/", get(list_books))
        .route("/api/books/books/search/", get(search_books))
        .route("/api/books/books/{id}/", get(get_book))
        .route("/api/books/books/{id}/reviews/", get(book_reviews))
        .route("/api/books/categories/", get(list_categories))
        .route("/api/books/categories/{id}/", get(get_category))
        .route("/api/books/categories/{id}/books/", get(category_books))
        .route("/api/books/comments/", post(create_comment))
        .route(
            "/api/books/comments/{id}/",
            put(update_comment).delete(delete_comment),
        )
        .layer(middleware::from_fn_with_state(state.clone(), count_hits))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, AppState::seeded()).await
}

pub async fn run_with_state(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

async fn count_hits(State(state): State<AppState>, request: Request, next: Next) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    tracing::debug!(method = %request.method(), uri = %request.uri(), "request");
    next.run(request).await
}

// --- serialization ---

fn user_json(user: &User) -> Value {
    json!({
        "id": user.id,
        "username": user.username,
        "email": user.email,
        "first_name": user.first_name,
        "last_name": user.last_name,
    })
}

fn category_json(category: &Category) -> Value {
    json!({
        "id": category.id,
        "name": category.name,
        "description": category.description,
    })
}

fn comment_json(db: &Db, comment: &Comment) -> Value {
    let username = db
        .users
        .get(&comment.user)
        .map(|u| u.username.clone())
        .unwrap_or_default();
    json!({
        "id": comment.id,
        "book": comment.book,
        "user": { "id": comment.user, "username": username },
        "content": comment.content,
        "rating": comment.rating,
        "created_at": comment.created_at,
        "updated_at": comment.updated_at,
    })
}

fn book_json(db: &Db, book: &Book) -> Value {
    let ratings: Vec<i64> = db
        .comments
        .iter()
        .filter(|c| c.book == book.id)
        .map(|c| c.rating)
        .collect();
    let average = if ratings.is_empty() {
        0.0
    } else {
        ratings.iter().sum::<i64>() as f64 / ratings.len() as f64
    };
    json!({
        "id": book.id,
        "title": book.title,
        "author": book.author,
        "category": db
            .categories
            .iter()
            .find(|c| c.id == book.category_id)
            .map(category_json),
        "cover": null,
        "isbn": book.isbn,
        "description": book.description,
        "publisher": book.publisher,
        "publish_date": book.publish_date,
        "price": format!("{}.{:02}", book.price_cents / 100, book.price_cents % 100),
        "pages": book.pages,
        "language": book.language,
        "average_rating": average,
        "comments_count": ratings.len(),
    })
}

/// DRF-style pagination unless `no_page` is present.
fn paginate(items: Vec<Value>, params: &ListParams) -> Value {
    if params.no_page.is_some() {
        return Value::Array(items);
    }
    let size = params.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
    let count = items.len();
    let next = (count > size).then_some("?page=2");
    let results: Vec<Value> = items.into_iter().take(size).collect();
    json!({
        "count": count,
        "next": next,
        "previous": null,
        "results": results,
    })
}

fn authenticate(db: &Db, headers: &HeaderMap) -> ApiResult<u64> {
    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            detail(
                StatusCode::UNAUTHORIZED,
                "Authentication credentials were not provided.",
            )
        })?;
    header
        .strip_prefix("Token ")
        .and_then(|token| db.tokens.get(token).copied())
        .ok_or_else(|| detail(StatusCode::UNAUTHORIZED, "Invalid token."))
}

// --- users ---

async fn token_auth(
    State(state): State<AppState>,
    Json(input): Json<LoginInput>,
) -> ApiResult<Json<Value>> {
    let mut db = state.db.write().await;
    let user = db
        .users
        .values()
        .find(|u| u.username == input.username && u.password == input.password)
        .cloned()
        .ok_or_else(|| field_error("non_field_errors", "Unable to log in with provided credentials."))?;
    let token = Uuid::new_v4().simple().to_string();
    db.tokens.insert(token.clone(), user.id);
    Ok(Json(json!({ "token": token, "user": user_json(&user) })))
}

async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut db = state.db.write().await;
    if db.users.values().any(|u| u.username == input.username) {
        return Err(field_error(
            "username",
            "A user with that username already exists.",
        ));
    }
    let id = db.next_user_id;
    db.next_user_id += 1;
    let user = User {
        id,
        username: input.username,
        password: input.password,
        email: input.email,
        first_name: String::new(),
        last_name: String::new(),
    };
    let body = user_json(&user);
    db.users.insert(id, user);
    Ok((StatusCode::CREATED, Json(body)))
}

async fn current_user(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    let db = state.db.read().await;
    let id = authenticate(&db, &headers)?;
    let user = db
        .users
        .get(&id)
        .ok_or_else(|| detail(StatusCode::NOT_FOUND, "Not found."))?;
    Ok(Json(user_json(user)))
}

async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(input): Json<UpdateUserInput>,
) -> ApiResult<Json<Value>> {
    let mut db = state.db.write().await;
    let caller = authenticate(&db, &headers)?;
    if caller != id {
        return Err(detail(
            StatusCode::FORBIDDEN,
            "You do not have permission to update other users.",
        ));
    }
    let user = db
        .users
        .get_mut(&id)
        .ok_or_else(|| detail(StatusCode::NOT_FOUND, "Not found."))?;
    if let Some(email) = input.email {
        user.email = email;
    }
    if let Some(first_name) = input.first_name {
        user.first_name = first_name;
    }
    if let Some(last_name) = input.last_name {
        user.last_name = last_name;
    }
    if let Some(password) = input.password {
        user.password = password;
    }
    Ok(Json(user_json(user)))
}

// --- books ---

async fn list_books(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<Value> {
    let db = state.db.read().await;
    let items = db.books.iter().map(|b| book_json(&db, b)).collect();
    Json(paginate(items, &params))
}

async fn search_books(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<Value> {
    let db = state.db.read().await;
    let query = params.q.clone().unwrap_or_default().to_lowercase();
    let items = db
        .books
        .iter()
        .filter(|b| {
            query.is_empty()
                || [&b.title, &b.author, &b.description, &b.isbn]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&query))
        })
        .map(|b| book_json(&db, b))
        .collect();
    Json(paginate(items, &params))
}

async fn get_book(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Json<Value>> {
    let db = state.db.read().await;
    let book = db
        .books
        .iter()
        .find(|b| b.id == id)
        .ok_or_else(|| detail(StatusCode::NOT_FOUND, "Not found."))?;
    let mut body = book_json(&db, book);
    body["comments"] = db
        .comments
        .iter()
        .filter(|c| c.book == id)
        .map(|c| comment_json(&db, c))
        .collect();
    Ok(Json(body))
}

async fn book_reviews(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Value>> {
    let db = state.db.read().await;
    if !db.books.iter().any(|b| b.id == id) {
        return Err(detail(StatusCode::NOT_FOUND, "Not found."));
    }
    Ok(Json(
        db.comments
            .iter()
            .filter(|c| c.book == id)
            .map(|c| comment_json(&db, c))
            .collect(),
    ))
}

// --- categories ---

async fn list_categories(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<Value> {
    let db = state.db.read().await;
    let items = db.categories.iter().map(category_json).collect();
    Json(paginate(items, &params))
}

async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Value>> {
    let db = state.db.read().await;
    db.categories
        .iter()
        .find(|c| c.id == id)
        .map(|c| Json(category_json(c)))
        .ok_or_else(|| detail(StatusCode::NOT_FOUND, "Not found."))
}

async fn category_books(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Value>> {
    let db = state.db.read().await;
    if !db.categories.iter().any(|c| c.id == id) {
        return Err(detail(StatusCode::NOT_FOUND, "Not found."));
    }
    Ok(Json(
        db.books
            .iter()
            .filter(|b| b.category_id == id)
            .map(|b| book_json(&db, b))
            .collect(),
    ))
}

// --- comments ---

fn validate_rating(rating: i64) -> ApiResult<()> {
    if rating < 1 {
        return Err(field_error(
            "rating",
            "Ensure this value is greater than or equal to 1.",
        ));
    }
    if rating > 5 {
        return Err(field_error(
            "rating",
            "Ensure this value is less than or equal to 5.",
        ));
    }
    Ok(())
}

async fn create_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CommentInput>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut db = state.db.write().await;
    let user = authenticate(&db, &headers)?;
    validate_rating(input.rating)?;
    if !db.books.iter().any(|b| b.id == input.book) {
        return Err(field_error(
            "book",
            &format!("Invalid pk \"{}\" - object does not exist.", input.book),
        ));
    }
    if db
        .comments
        .iter()
        .any(|c| c.book == input.book && c.user == user)
    {
        return Err(field_error(
            "non_field_errors",
            "The fields book, user must make a unique set.",
        ));
    }

    let id = db.next_comment_id;
    db.next_comment_id += 1;
    let now = now();
    let comment = Comment {
        id,
        book: input.book,
        user,
        content: input.content,
        rating: input.rating,
        created_at: now.clone(),
        updated_at: now,
    };
    let body = comment_json(&db, &comment);
    db.comments.push(comment);
    Ok((StatusCode::CREATED, Json(body)))
}

async fn update_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(input): Json<UpdateCommentInput>,
) -> ApiResult<Json<Value>> {
    let mut db = state.db.write().await;
    let user = authenticate(&db, &headers)?;
    if let Some(rating) = input.rating {
        validate_rating(rating)?;
    }
    let comment = db
        .comments
        .iter_mut()
        .find(|c| c.id == id)
        .ok_or_else(|| detail(StatusCode::NOT_FOUND, "Not found."))?;
    if comment.user != user {
        return Err(detail(
            StatusCode::FORBIDDEN,
            "You do not have permission to edit other users' reviews.",
        ));
    }
    if let Some(content) = input.content {
        comment.content = content;
    }
    if let Some(rating) = input.rating {
        comment.rating = rating;
    }
    comment.updated_at = now();
    let comment = comment.clone();
    Ok(Json(comment_json(&db, &comment)))
}

async fn delete_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> ApiResult<StatusCode> {
    let mut db = state.db.write().await;
    let user = authenticate(&db, &headers)?;
    let index = db
        .comments
        .iter()
        .position(|c| c.id == id)
        .ok_or_else(|| detail(StatusCode::NOT_FOUND, "Not found."))?;
    if db.comments[index].user != user {
        return Err(detail(
            StatusCode::FORBIDDEN,
            "You do not have permission to delete other users' reviews.",
        ));
    }
    db.comments.remove(index);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_is_rendered_as_decimal_string() {
        let db = Db {
            books: vec![book(1, "T", "A", 1, 1999)],
            ..Db::default()
        };
        let json = book_json(&db, &db.books[0]);
        assert_eq!(json["price"], "19.99");
        assert_eq!(json["category"], Value::Null);
        assert_eq!(json["average_rating"], 0.0);
    }

    #[test]
    fn paginate_wraps_unless_no_page() {
        let items: Vec<Value> = (0..12).map(|i| json!(i)).collect();

        let paged = paginate(items.clone(), &ListParams::default());
        assert_eq!(paged["count"], 12);
        assert_eq!(paged["results"].as_array().unwrap().len(), 10);
        assert_eq!(paged["next"], "?page=2");

        let flat = paginate(
            items,
            &ListParams {
                no_page: Some("true".into()),
                ..ListParams::default()
            },
        );
        assert_eq!(flat.as_array().unwrap().len(), 12);
    }

    #[test]
    fn seeded_state_has_demo_review() {
        let state = AppState::seeded();
        let db = state.db.try_read().unwrap();
        assert_eq!(db.books.len(), 5);
        assert_eq!(db.users.len(), 2);
        assert_eq!(db.comments[0].user, 1);
    }

    #[test]
    fn comment_input_requires_rating() {
        let result: Result<CommentInput, _> = serde_json::from_str(r#"{"book":1,"content":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn rating_bounds() {
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());
    }
}
