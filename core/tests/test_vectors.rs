//! Verify builders and parsers against JSON test vectors stored in `test-vectors/`.
//!
//! Each vector file describes inputs and the expected outcome. Request bodies
//! are compared as parsed JSON, not raw strings, so field order never matters.

use bookshelf_core::api::{books, categories, reviews, users};
use bookshelf_core::{
    ApiError, Credentials, HttpRequest, HttpResponse, LoginPayload, NewReview, UpdateReview,
    UpdateUser,
};
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
struct VectorFile<T> {
    cases: Vec<T>,
}

fn load<T: for<'de> Deserialize<'de>>(raw: &str) -> Vec<T> {
    serde_json::from_str::<VectorFile<T>>(raw).unwrap().cases
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RequestCase {
    name: String,
    expected_request: ExpectedRequest,
}

#[derive(Deserialize)]
struct ExpectedRequest {
    method: String,
    path: String,
    query: Vec<(String, String)>,
    body: Value,
    cached: bool,
}

const TIMESTAMP: i64 = 1_700_000_000_000;

fn build(name: &str) -> HttpRequest {
    match name {
        "list_books" => books::build_list_books(TIMESTAMP),
        "get_book" => books::build_get_book(42),
        "search_books" => books::build_search_books("rust lang"),
        "list_categories" => categories::build_list_categories(TIMESTAMP),
        "category_books" => categories::build_category_books(3),
        "list_reviews" => reviews::build_list_reviews(42),
        "add_review" => reviews::build_add_review(&NewReview {
            book: 42,
            content: "Great read".to_string(),
            rating: 5,
        })
        .unwrap(),
        "update_review" => reviews::build_update_review(
            9,
            &UpdateReview {
                book: Some(42),
                rating: Some(3),
                ..UpdateReview::default()
            },
        )
        .unwrap(),
        "delete_review" => reviews::build_delete_review(9),
        "login" => users::build_login(&Credentials {
            username: "demo".to_string(),
            password: "demo123".to_string(),
        })
        .unwrap(),
        "current_user" => users::build_current_user(),
        "update_user" => users::build_update_user(
            1,
            &UpdateUser {
                email: Some("new@example.com".to_string()),
                ..UpdateUser::default()
            },
        )
        .unwrap(),
        other => panic!("no builder for vector {other}"),
    }
}

#[test]
fn request_test_vectors() {
    let cases: Vec<RequestCase> = load(include_str!("../../test-vectors/requests.json"));
    assert!(!cases.is_empty());

    for case in cases {
        let name = case.name.as_str();
        let expected = case.expected_request;
        let req = build(name);

        assert_eq!(req.method.as_str(), expected.method, "{name}: method");
        assert_eq!(req.path, expected.path, "{name}: path");
        assert_eq!(req.query, expected.query, "{name}: query");

        let body: Value = req
            .body
            .as_deref()
            .map(|b| serde_json::from_str(b).unwrap())
            .unwrap_or(Value::Null);
        assert_eq!(body, expected.body, "{name}: body");

        let cacheable = !req.method.is_mutation() && !req.bypasses_cache();
        assert_eq!(cacheable, expected.cached, "{name}: cacheable");
    }
}

// ---------------------------------------------------------------------------
// List normalization
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct NormalizeCase {
    name: String,
    endpoint: String,
    body: String,
    expected_ids: Vec<u64>,
}

#[test]
fn normalize_test_vectors() {
    let cases: Vec<NormalizeCase> = load(include_str!("../../test-vectors/normalize.json"));

    for case in cases {
        let name = case.name.as_str();
        let response = HttpResponse::ok(case.body.clone());
        let ids: Vec<u64> = match case.endpoint.as_str() {
            "books" => books::parse_list_books(&response)
                .unwrap()
                .iter()
                .map(|b| b.id)
                .collect(),
            "categories" => categories::parse_list_categories(&response)
                .unwrap()
                .iter()
                .map(|c| c.id)
                .collect(),
            "reviews" => reviews::parse_list_reviews(&response, 1)
                .unwrap()
                .iter()
                .map(|r| r.id.server_id().unwrap())
                .collect(),
            other => panic!("{name}: unknown endpoint {other}"),
        };
        assert_eq!(ids, case.expected_ids, "{name}: decoded ids");
    }
}

// ---------------------------------------------------------------------------
// Login envelopes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct LoginCase {
    name: String,
    body: String,
    expected: ExpectedLogin,
}

#[derive(Deserialize)]
struct ExpectedLogin {
    kind: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

#[test]
fn login_test_vectors() {
    let cases: Vec<LoginCase> = load(include_str!("../../test-vectors/login.json"));

    for case in cases {
        let name = case.name.as_str();
        let result = users::parse_login(&HttpResponse::ok(case.body.clone()));

        let payload = match (case.expected.kind.as_str(), result) {
            ("unrecognized", Err(ApiError::UnrecognizedLogin(_))) => continue,
            ("unrecognized", other) => panic!("{name}: expected unrecognized, got {other:?}"),
            (_, Ok(payload)) => payload,
            (_, Err(e)) => panic!("{name}: unexpected error {e}"),
        };

        let kind = match payload {
            LoginPayload::TokenWithUser { .. } => "token_with_user",
            LoginPayload::TokenFlattened { .. } => "token_flattened",
            LoginPayload::SessionKey { .. } => "session_key",
        };
        assert_eq!(kind, case.expected.kind, "{name}: kind");
        assert_eq!(
            Some(payload.token()),
            case.expected.token.as_deref(),
            "{name}: token"
        );
        assert_eq!(
            payload.user().map(|u| u.username.as_str()),
            case.expected.username.as_deref(),
            "{name}: username"
        );
    }
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ClassifyCase {
    name: String,
    status: u16,
    body: String,
    expected_kind: String,
    expected_message: Option<String>,
}

#[test]
fn classify_test_vectors() {
    let cases: Vec<ClassifyCase> = load(include_str!("../../test-vectors/classify.json"));

    for case in cases {
        let name = case.name.as_str();
        let err = ApiError::Http {
            status: case.status,
            body: case.body.clone(),
            url: "/books/comments/".to_string(),
        };
        assert_eq!(format!("{:?}", err.kind()), case.expected_kind, "{name}: kind");
        assert_eq!(err.server_message(), case.expected_message, "{name}: message");
        assert_eq!(err.status(), Some(case.status), "{name}: status");
    }
}
