//! Client-side records for catalog resources.
//!
//! # Design
//! The backend is inconsistent about shapes: prices arrive as decimal
//! strings, category references as bare ids or embedded objects, review
//! timestamps under two spellings. Decoding is lenient so the stored model
//! always satisfies its invariants (numeric price and rating, a named
//! category, an identified review) whatever the server sent.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const UNNAMED_CATEGORY: &str = "Unnamed category";
pub const UNKNOWN_USER: &str = "Unknown user";
pub const INVALID_REVIEW_CONTENT: &str = "Invalid review data";

/// Coerce a JSON value to a finite number: numbers pass through, numeric
/// strings are parsed, everything else becomes 0.
pub fn coerce_number(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(coerce_number(&Value::deserialize(deserializer)?))
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(value_as_id(&Value::deserialize(deserializer)?).unwrap_or(0))
}

fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(value_as_id(&Value::deserialize(deserializer)?).unwrap_or(0))
}

fn lenient_category_ref<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<CategoryRef>, D::Error> {
    Ok(CategoryRef::from_value(&Value::deserialize(deserializer)?))
}

/// Positive integer id from a number or numeric string.
pub fn value_as_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// How a book refers to its category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryRef {
    Id(u64),
    Embedded { id: u64, name: String },
}

impl CategoryRef {
    /// `None` for nulls and shapes without a usable id.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(map) => {
                let id = map.get("id").and_then(value_as_id)?;
                let name = map
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Some(CategoryRef::Embedded { id, name })
            }
            other => value_as_id(other).map(CategoryRef::Id),
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            CategoryRef::Id(id) | CategoryRef::Embedded { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: u64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub author: String,
    #[serde(default, deserialize_with = "lenient_category_ref")]
    pub category: Option<CategoryRef>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub price: f64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub isbn: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub publisher: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub publish_date: String,
    #[serde(default, deserialize_with = "lenient_count")]
    pub pages: u64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub language: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub average_rating: f64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub comments_count: u64,
    #[serde(default)]
    pub cover: Option<String>,
}

impl Book {
    pub fn category_id(&self) -> Option<u64> {
        self.category.as_ref().map(CategoryRef::id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: u64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    /// Number of loaded books in this category; always recomputed locally.
    #[serde(default, alias = "book_count", deserialize_with = "lenient_count")]
    pub count: u64,
}

impl Category {
    pub(crate) fn with_placeholders(mut self) -> Self {
        if self.name.trim().is_empty() {
            self.name = UNNAMED_CATEGORY.to_string();
        }
        self
    }
}

/// Review identifier: the server's id, or one generated locally when the
/// payload lacks it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReviewId {
    Server(u64),
    Local(String),
}

impl ReviewId {
    fn generate() -> Self {
        ReviewId::Local(Uuid::new_v4().simple().to_string()[..8].to_string())
    }

    pub fn server_id(&self) -> Option<u64> {
        match self {
            ReviewId::Server(id) => Some(*id),
            ReviewId::Local(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub username: String,
}

impl UserSummary {
    pub fn unknown() -> Self {
        Self {
            id: None,
            username: UNKNOWN_USER.to_string(),
        }
    }

    fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self {
                id: map.get("id").and_then(value_as_id),
                username: map
                    .get("username")
                    .and_then(Value::as_str)
                    .unwrap_or(UNKNOWN_USER)
                    .to_string(),
            },
            other => Self {
                id: value_as_id(other),
                username: UNKNOWN_USER.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub book: u64,
    pub user: UserSummary,
    pub content: String,
    pub rating: f64,
    pub created_at: String,
    pub updated_at: String,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Review {
    /// Build a review from any JSON value, filling every missing field.
    /// `book_id` is used when the payload does not name its book.
    pub fn from_value(value: &Value, book_id: u64) -> Self {
        let Value::Object(map) = value else {
            let now = now_rfc3339();
            return Self {
                id: ReviewId::generate(),
                book: book_id,
                user: UserSummary::unknown(),
                content: INVALID_REVIEW_CONTENT.to_string(),
                rating: 0.0,
                created_at: now.clone(),
                updated_at: now,
            };
        };

        let text = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Self {
            id: match map.get("id") {
                Some(Value::Number(n)) => match n.as_u64() {
                    Some(id) if id > 0 => ReviewId::Server(id),
                    _ => ReviewId::generate(),
                },
                Some(Value::String(s)) if !s.is_empty() => match s.parse() {
                    Ok(id) => ReviewId::Server(id),
                    Err(_) => ReviewId::Local(s.clone()),
                },
                _ => ReviewId::generate(),
            },
            book: map
                .get("book")
                .and_then(value_as_id)
                .filter(|id| *id > 0)
                .unwrap_or(book_id),
            user: match map.get("user") {
                Some(Value::Null) | None => UserSummary::unknown(),
                Some(user) => UserSummary::from_value(user),
            },
            content: text(&["content"]).unwrap_or_default(),
            rating: map.get("rating").map(coerce_number).unwrap_or(0.0),
            created_at: text(&["created_at", "createdAt"]).unwrap_or_else(now_rfc3339),
            updated_at: text(&["updated_at", "updatedAt"]).unwrap_or_else(now_rfc3339),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: u64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub username: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub first_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
}

/// Partial user update. Omitted fields stay unchanged on the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReview {
    pub book: u64,
    pub content: String,
    pub rating: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateReview {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
}
