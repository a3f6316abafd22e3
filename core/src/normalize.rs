//! Total decoding of list payloads.
//!
//! # Design
//! List endpoints answer with a paginated envelope, a bare array, or an
//! object holding the array under some other key. Each endpoint declares an
//! ordered list of `Decoder`s; the first one that matches wins and an empty
//! sequence is the fallback. Decoding never fails.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

/// One way of finding a sequence inside a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    /// `{"count": .., "results": [..]}`
    Envelope,
    /// `[..]`
    Sequence,
    /// The first of these keys holding an array.
    Nested(&'static [&'static str]),
    /// Any array-valued field of an object.
    AnyArrayField,
    /// The object itself as a one-element sequence.
    SingleObject,
}

/// Which decoder produced a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Envelope,
    Sequence,
    Nested(String),
    ArrayField(String),
    SingleObject,
    Empty,
}

pub const BOOK_LIST: &[Decoder] = &[
    Decoder::Envelope,
    Decoder::Sequence,
    Decoder::Nested(&["books", "results"]),
];

pub const CATEGORY_LIST: &[Decoder] = &[
    Decoder::Envelope,
    Decoder::Sequence,
    Decoder::Nested(&["categories", "results"]),
];

pub const REVIEW_LIST: &[Decoder] = &[
    Decoder::Sequence,
    Decoder::Envelope,
    Decoder::Nested(&["reviews", "comments"]),
    Decoder::AnyArrayField,
    Decoder::SingleObject,
];

impl Decoder {
    fn apply(self, payload: &Value) -> Option<(Vec<Value>, Shape)> {
        match (self, payload) {
            (Decoder::Envelope, Value::Object(map)) => match map.get("results") {
                Some(Value::Array(items)) => Some((items.clone(), Shape::Envelope)),
                _ => None,
            },
            (Decoder::Sequence, Value::Array(items)) => Some((items.clone(), Shape::Sequence)),
            (Decoder::Nested(keys), Value::Object(map)) => keys.iter().find_map(|key| {
                match map.get(*key) {
                    Some(Value::Array(items)) => {
                        Some((items.clone(), Shape::Nested((*key).to_string())))
                    }
                    _ => None,
                }
            }),
            (Decoder::AnyArrayField, Value::Object(map)) => map.iter().find_map(|(key, v)| {
                v.as_array()
                    .map(|items| (items.clone(), Shape::ArrayField(key.clone())))
            }),
            (Decoder::SingleObject, Value::Object(_)) => {
                Some((vec![payload.clone()], Shape::SingleObject))
            }
            _ => None,
        }
    }
}

/// Run `decoders` in order over `payload`; an empty sequence if none match.
pub fn decode_list(payload: &Value, decoders: &[Decoder]) -> (Vec<Value>, Shape) {
    decoders
        .iter()
        .find_map(|decoder| decoder.apply(payload))
        .unwrap_or_else(|| {
            debug!(payload = %payload, "unrecognized list payload, using empty list");
            (Vec::new(), Shape::Empty)
        })
}

/// Same as `decode_list` but from raw text; unparsable text is an empty list.
pub fn decode_list_str(body: &str, decoders: &[Decoder]) -> (Vec<Value>, Shape) {
    match serde_json::from_str::<Value>(body) {
        Ok(payload) => decode_list(&payload, decoders),
        Err(e) => {
            warn!(error = %e, "list payload is not JSON, using empty list");
            (Vec::new(), Shape::Empty)
        }
    }
}

/// Decode each item into `T`, dropping items that do not fit.
pub fn decode_records<T: DeserializeOwned>(items: Vec<Value>) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<T>(item) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "skipping malformed record");
                None
            }
        })
        .collect()
}
