//! Authentication and user accounts.

use serde_json::{Map, Value};

use crate::client::{check_status, parse_json, to_body, ApiClient};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{Credentials, NewUser, UpdateUser, User};

pub const TOKEN_AUTH_PATH: &str = "/users/token-auth/";
pub const USERS_PATH: &str = "/users/users/";
pub const CURRENT_USER_PATH: &str = "/users/users/me/";

pub fn user_path(id: u64) -> String {
    format!("{USERS_PATH}{id}/")
}

/// The login envelopes the backend is known to produce.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginPayload {
    /// `{"token": "..", "user": {..}}`
    TokenWithUser { token: String, user: User },
    /// `{"token": "..", "id": .., "username": ..}`; `user` is `None` when
    /// nothing but the token was sent.
    TokenFlattened { token: String, user: Option<User> },
    /// `{"key": ".."}`; the user must be fetched separately.
    SessionKey { key: String },
}

impl LoginPayload {
    pub fn token(&self) -> &str {
        match self {
            LoginPayload::TokenWithUser { token, .. } | LoginPayload::TokenFlattened { token, .. } => {
                token
            }
            LoginPayload::SessionKey { key } => key,
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            LoginPayload::TokenWithUser { user, .. } => Some(user),
            LoginPayload::TokenFlattened { user, .. } => user.as_ref(),
            LoginPayload::SessionKey { .. } => None,
        }
    }

    /// Classify a decoded login body. Unknown shapes are an error.
    pub fn from_value(value: &Value) -> Result<Self, ApiError> {
        let unrecognized = || ApiError::UnrecognizedLogin(value.to_string());
        let Value::Object(map) = value else {
            return Err(unrecognized());
        };

        if let Some(token) = non_empty_str(map, "token") {
            if let Some(user) = map.get("user").filter(|u| u.is_object()) {
                let user = serde_json::from_value(user.clone())
                    .map_err(|e| ApiError::Deserialization(e.to_string()))?;
                return Ok(LoginPayload::TokenWithUser { token, user });
            }
            let rest: Map<String, Value> = map
                .iter()
                .filter(|(k, _)| k.as_str() != "token")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let user = if rest.is_empty() {
                None
            } else {
                Some(
                    serde_json::from_value(Value::Object(rest))
                        .map_err(|e| ApiError::Deserialization(e.to_string()))?,
                )
            };
            return Ok(LoginPayload::TokenFlattened { token, user });
        }

        if let Some(key) = non_empty_str(map, "key") {
            return Ok(LoginPayload::SessionKey { key });
        }

        Err(unrecognized())
    }
}

fn non_empty_str(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn build_login(credentials: &Credentials) -> Result<HttpRequest, ApiError> {
    Ok(HttpRequest::new(HttpMethod::Post, TOKEN_AUTH_PATH).with_json_body(to_body(credentials)?))
}

pub fn parse_login(response: &HttpResponse) -> Result<LoginPayload, ApiError> {
    check_status(response, TOKEN_AUTH_PATH)?;
    let value: Value = serde_json::from_str(&response.body)
        .map_err(|_| ApiError::UnrecognizedLogin(response.body.clone()))?;
    LoginPayload::from_value(&value)
}

pub fn build_register(input: &NewUser) -> Result<HttpRequest, ApiError> {
    Ok(HttpRequest::new(HttpMethod::Post, USERS_PATH).with_json_body(to_body(input)?))
}

pub fn parse_register(response: &HttpResponse) -> Result<User, ApiError> {
    parse_json(response, USERS_PATH)
}

pub fn build_current_user() -> HttpRequest {
    HttpRequest::get(CURRENT_USER_PATH)
}

pub fn parse_current_user(response: &HttpResponse) -> Result<User, ApiError> {
    parse_json(response, CURRENT_USER_PATH)
}

pub fn build_update_user(id: u64, input: &UpdateUser) -> Result<HttpRequest, ApiError> {
    Ok(HttpRequest::new(HttpMethod::Put, user_path(id)).with_json_body(to_body(input)?))
}

pub fn parse_update_user(response: &HttpResponse, id: u64) -> Result<User, ApiError> {
    parse_json(response, &user_path(id))
}

impl ApiClient {
    pub async fn login(&self, credentials: &Credentials) -> Result<LoginPayload, ApiError> {
        let response = self.send(build_login(credentials)?).await?;
        parse_login(&response)
    }

    pub async fn register(&self, input: &NewUser) -> Result<User, ApiError> {
        let response = self.send(build_register(input)?).await?;
        parse_register(&response)
    }

    pub async fn current_user(&self) -> Result<User, ApiError> {
        let response = self.send(build_current_user()).await?;
        parse_current_user(&response)
    }

    pub async fn update_user(&self, id: u64, input: &UpdateUser) -> Result<User, ApiError> {
        let response = self.send(build_update_user(id, input)?).await?;
        parse_update_user(&response, id)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn token_with_user_object() {
        let payload =
            LoginPayload::from_value(&json!({"token": "abc", "user": {"id": 1, "username": "a"}}))
                .unwrap();
        assert_eq!(payload.token(), "abc");
        assert_eq!(payload.user().map(|u| u.id), Some(1));
    }

    #[test]
    fn token_with_flattened_fields() {
        let payload =
            LoginPayload::from_value(&json!({"token": "abc", "id": 4, "username": "b"})).unwrap();
        assert!(matches!(payload, LoginPayload::TokenFlattened { user: Some(ref u), .. } if u.username == "b"));
    }

    #[test]
    fn bare_token_has_no_user() {
        let payload = LoginPayload::from_value(&json!({"token": "abc"})).unwrap();
        assert!(payload.user().is_none());
    }

    #[test]
    fn session_key() {
        let payload = LoginPayload::from_value(&json!({"key": "k1"})).unwrap();
        assert_eq!(payload, LoginPayload::SessionKey { key: "k1".into() });
    }

    #[test]
    fn unknown_shape_is_an_error() {
        for value in [json!({"session": "x"}), json!([]), json!({"token": ""})] {
            assert!(matches!(
                LoginPayload::from_value(&value),
                Err(ApiError::UnrecognizedLogin(_))
            ));
        }
    }

    #[test]
    fn parse_login_rejects_non_json() {
        let err = parse_login(&HttpResponse::ok("<html>")).unwrap_err();
        assert!(matches!(err, ApiError::UnrecognizedLogin(_)));
    }

    #[test]
    fn request_paths() {
        let creds = Credentials {
            username: "a".into(),
            password: "p".into(),
        };
        assert_eq!(build_login(&creds).unwrap().path, "/users/token-auth/");
        assert_eq!(build_current_user().path, "/users/users/me/");
        let update = build_update_user(3, &UpdateUser::default()).unwrap();
        assert_eq!(update.path, "/users/users/3/");
        assert_eq!(update.method, HttpMethod::Put);
        assert_eq!(update.body.as_deref(), Some("{}"));
    }
}
