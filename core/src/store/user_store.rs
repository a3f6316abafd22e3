//! Login state and the current user.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use crate::api::LoginPayload;
use crate::client::ApiClient;
use crate::error::{ApiError, ErrorKind};
use crate::notify::Notifier;
use crate::session::Session;
use crate::store::{describe, NO_RESPONSE};
use crate::types::{Credentials, NewUser, UpdateUser, User};

const LOGIN_FAILED: &str = "Login failed, please check your username and password";
const UNRECOGNIZED_LOGIN: &str = "The server returned login data in an unknown format";
const SESSION_EXPIRED: &str = "Your session has expired, please log in again";
const TOKEN_NOT_REMOVED: &str = "Logged out, but the saved login could not be removed from this device";

#[derive(Debug, Default)]
struct Status {
    loading: bool,
    error: Option<String>,
}

pub struct UserStore {
    api: Arc<ApiClient>,
    notifier: Arc<dyn Notifier>,
    status: Mutex<Status>,
}

impl UserStore {
    pub fn new(api: Arc<ApiClient>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            api,
            notifier,
            status: Mutex::new(Status::default()),
        }
    }

    fn session(&self) -> &Session {
        self.api.session()
    }

    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) {
        let mut status = self.status();
        status.loading = true;
        status.error = None;
    }

    fn finish(&self) {
        self.status().loading = false;
    }

    fn fail(&self, message: &str) {
        self.status().error = Some(message.to_string());
        self.notifier.error(message);
    }

    pub fn current_user(&self) -> Option<User> {
        self.session().snapshot().current_user
    }

    pub fn token(&self) -> Option<String> {
        self.session().snapshot().token
    }

    pub fn username(&self) -> String {
        self.current_user().map(|u| u.username).unwrap_or_default()
    }

    pub fn user_id(&self) -> Option<u64> {
        self.current_user().map(|u| u.id)
    }

    pub fn is_logged_in(&self) -> bool {
        self.session().snapshot().is_logged_in
    }

    /// A token is held and has been accepted by the server.
    pub fn is_authenticated(&self) -> bool {
        let state = self.session().snapshot();
        state.token.is_some() && state.is_logged_in
    }

    pub fn loading(&self) -> bool {
        self.status().loading
    }

    pub fn error(&self) -> Option<String> {
        self.status().error.clone()
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<User, ApiError> {
        self.begin();
        let result = self.login_inner(credentials).await;
        if let Err(e) = &result {
            error!(username = %credentials.username, error = %e, "login failed");
            let message = match e {
                ApiError::UnrecognizedLogin(_) => UNRECOGNIZED_LOGIN.to_string(),
                other => match other.kind() {
                    ErrorKind::Network | ErrorKind::Timeout => NO_RESPONSE.to_string(),
                    _ => other
                        .server_message()
                        .unwrap_or_else(|| LOGIN_FAILED.to_string()),
                },
            };
            self.fail(&message);
        }
        self.finish();
        result
    }

    async fn login_inner(&self, credentials: &Credentials) -> Result<User, ApiError> {
        let payload = self.api.login(credentials).await?;
        debug!(with_user = payload.user().is_some(), "login response accepted");

        // Cached responses may belong to a previous user.
        self.api.clear_cache();
        let user = payload.user().cloned();
        self.session().establish(payload.token(), user.clone())?;

        match (payload, user) {
            (LoginPayload::SessionKey { .. }, _) | (_, None) => {
                match self.load_current_user().await {
                    Ok(user) => Ok(user),
                    Err(e) => {
                        // A token without a user is not a session.
                        warn!(error = %e, "could not load user after login, discarding token");
                        self.logout();
                        Err(e)
                    }
                }
            }
            (_, Some(user)) => {
                info!(username = %user.username, "logged in");
                Ok(user)
            }
        }
    }

    async fn load_current_user(&self) -> Result<User, ApiError> {
        if self.session().token().is_none() {
            return Err(ApiError::NotAuthenticated);
        }
        match self.api.current_user().await {
            Ok(user) => {
                self.session().set_user(user.clone());
                Ok(user)
            }
            Err(e) => {
                if e.kind() == ErrorKind::Unauthorized {
                    warn!("token rejected while loading current user");
                    self.logout();
                }
                Err(e)
            }
        }
    }

    /// Refresh the current user. `None` without a token or on failure.
    pub async fn fetch_current_user(&self) -> Option<User> {
        if self.session().token().is_none() {
            debug!("no token, not fetching current user");
            return None;
        }

        self.begin();
        let result = self.load_current_user().await;
        let user = match result {
            Ok(user) => Some(user),
            Err(e) => {
                error!(error = %e, "failed to load current user");
                let message = match e.kind() {
                    ErrorKind::Unauthorized => SESSION_EXPIRED.to_string(),
                    _ => describe(&e, "Failed to load user"),
                };
                self.fail(&message);
                None
            }
        };
        self.finish();
        user
    }

    /// Create an account, then log in with the same credentials.
    pub async fn register(&self, input: &NewUser) -> Result<User, ApiError> {
        self.begin();
        let result = self.api.register(input).await;
        let registered = match result {
            Ok(user) => user,
            Err(e) => {
                error!(username = %input.username, error = %e, "registration failed");
                self.fail(&describe(&e, "Registration failed"));
                self.finish();
                return Err(e);
            }
        };
        info!(username = %registered.username, "registered");

        let credentials = Credentials {
            username: input.username.clone(),
            password: input.password.clone(),
        };
        if let Err(e) = self.login(&credentials).await {
            warn!(error = %e, "automatic login after registration failed");
        }
        Ok(registered)
    }

    pub async fn update_user(&self, input: &UpdateUser) -> Result<User, ApiError> {
        let Some(id) = self.user_id() else {
            self.fail(SESSION_EXPIRED);
            return Err(ApiError::NotAuthenticated);
        };

        self.begin();
        let result = self.api.update_user(id, input).await;
        let outcome = match result {
            Ok(user) => {
                self.session().set_user(user.clone());
                self.notifier.success("Profile updated");
                Ok(user)
            }
            Err(e) => {
                error!(user_id = id, error = %e, "failed to update user");
                if e.kind() == ErrorKind::Unauthorized {
                    self.logout();
                    self.fail(SESSION_EXPIRED);
                } else {
                    self.fail(&describe(&e, "Failed to update user"));
                }
                Err(e)
            }
        };
        self.finish();
        outcome
    }

    /// Clear the stored token, the in-memory session and cached responses.
    pub fn logout(&self) {
        let cleared = self.session().clear();
        self.api.clear_cache();
        self.status().error = None;
        if let Err(e) = cleared {
            error!(error = %e, "failed to remove stored token");
            self.fail(TOKEN_NOT_REMOVED);
        }
    }

    /// Restore the session from durable storage at startup.
    pub async fn initialize(&self) -> Option<User> {
        if self.session().token().is_some() {
            return self.fetch_current_user().await;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{ChannelNotifier, Notice, NoticeLevel};
    use crate::http::HttpRequest;
    use crate::storage::{MemoryTokenStorage, TokenStorage};
    use crate::test_support::{
        client_with_storage, scripted_client, ScriptedTransport, StickyTokenStorage,
    };
    use tokio::sync::mpsc::UnboundedReceiver;

    fn store(
        transport: Arc<ScriptedTransport>,
        token: Option<&str>,
    ) -> (UserStore, UnboundedReceiver<Notice>) {
        let (notifier, rx) = ChannelNotifier::new();
        (UserStore::new(scripted_client(transport, token), Arc::new(notifier)), rx)
    }

    fn creds() -> Credentials {
        Credentials {
            username: "a".into(),
            password: "secret".into(),
        }
    }

    #[tokio::test]
    async fn login_with_token_and_user() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(r#"{"token":"abc","user":{"id":1,"username":"a"}}"#);
        let (store, _rx) = store(transport.clone(), None);

        let user = store.login(&creds()).await.unwrap();

        assert_eq!(user.id, 1);
        assert_eq!(store.token().as_deref(), Some("abc"));
        assert_eq!(store.user_id(), Some(1));
        assert!(store.is_authenticated());
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn login_with_session_key_fetches_user() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(r#"{"key":"k1"}"#);
        transport.push_ok(r#"{"id":4,"username":"dee"}"#);
        let (store, _rx) = store(transport.clone(), None);

        let user = store.login(&creds()).await.unwrap();

        assert_eq!(user.username, "dee");
        let sent = transport.requests();
        assert_eq!(sent[1].path, "/users/users/me/");
        assert_eq!(sent[1].header("Authorization"), Some("Token k1"));
        assert!(store.is_authenticated());
    }

    #[tokio::test]
    async fn flattened_login_keeps_user_fields() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(r#"{"token":"t","id":8,"username":"flat"}"#);
        let (store, _rx) = store(transport, None);

        store.login(&creds()).await.unwrap();
        assert_eq!(store.username(), "flat");
    }

    #[tokio::test]
    async fn unrecognized_login_is_a_hard_failure() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(r#"{"session":"???"}"#);
        let (store, mut rx) = store(transport, None);

        let err = store.login(&creds()).await.unwrap_err();

        assert!(matches!(err, ApiError::UnrecognizedLogin(_)));
        assert!(!store.is_authenticated());
        assert!(store.token().is_none());
        assert_eq!(store.error().as_deref(), Some(UNRECOGNIZED_LOGIN));
        assert_eq!(rx.try_recv().unwrap().level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn login_error_uses_server_detail() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status(400, r#"{"non_field_errors":["Unable to log in with provided credentials."]}"#);
        let (store, _rx) = store(transport, None);

        assert!(store.login(&creds()).await.is_err());
        assert_eq!(
            store.error().as_deref(),
            Some("Unable to log in with provided credentials.")
        );
    }

    #[tokio::test]
    async fn logout_clears_storage_and_memory_together() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(r#"{"token":"abc","user":{"id":1,"username":"a"}}"#);
        let (store, _rx) = store(transport, None);
        store.login(&creds()).await.unwrap();

        store.logout();

        assert!(store.session().token().is_none());
        assert!(store.token().is_none());
        assert!(store.current_user().is_none());
        assert!(!store.is_logged_in());
    }

    #[tokio::test]
    async fn session_key_login_without_user_is_rolled_back() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(r#"{"key":"k1"}"#);
        transport.push_status(500, r#"{"detail":"boom"}"#);
        let storage = Arc::new(MemoryTokenStorage::new());
        let (notifier, _rx) = ChannelNotifier::new();
        let store = UserStore::new(
            client_with_storage(transport, storage.clone()),
            Arc::new(notifier),
        );

        let err = store.login(&creds()).await.unwrap_err();

        assert_eq!(err.status(), Some(500));
        assert!(!store.is_authenticated());
        assert!(!store.is_logged_in());
        assert!(store.token().is_none());
        assert!(store.current_user().is_none());
        assert!(storage.load().is_none());
        assert_eq!(store.error().as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn logout_reports_storage_that_keeps_the_token() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(r#"{"token":"abc","user":{"id":1,"username":"a"}}"#);
        transport.push_ok("{}");
        let storage = Arc::new(StickyTokenStorage::default());
        let (notifier, mut rx) = ChannelNotifier::new();
        let client = client_with_storage(transport.clone(), storage.clone());
        let store = UserStore::new(client.clone(), Arc::new(notifier));
        store.login(&creds()).await.unwrap();

        store.logout();

        assert!(store.token().is_none());
        assert!(!store.is_logged_in());
        assert_eq!(store.error().as_deref(), Some(TOKEN_NOT_REMOVED));
        let last = std::iter::from_fn(|| rx.try_recv().ok()).last().unwrap();
        assert_eq!(last.level, NoticeLevel::Error);

        // The leftover durable token is never sent again.
        client
            .send(HttpRequest::get("/books/books/").no_cache())
            .await
            .unwrap();
        assert!(transport.requests()[1].header("Authorization").is_none());
        assert_eq!(storage.load().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn unauthorized_fetch_forces_logout() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status(401, r#"{"detail":"Invalid token."}"#);
        let (store, _rx) = store(transport, Some("stale"));

        assert!(store.fetch_current_user().await.is_none());

        assert!(store.token().is_none());
        assert!(store.session().token().is_none());
        assert_eq!(store.error().as_deref(), Some(SESSION_EXPIRED));
    }

    #[tokio::test]
    async fn other_errors_keep_the_session() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status(500, r#"{"detail":"boom"}"#);
        let (store, _rx) = store(transport, Some("good"));

        assert!(store.fetch_current_user().await.is_none());

        assert_eq!(store.token().as_deref(), Some("good"));
        assert_eq!(store.error().as_deref(), Some("Failed to load user: boom"));
    }

    #[tokio::test]
    async fn initialize_without_token_does_nothing() {
        let transport = Arc::new(ScriptedTransport::new());
        let (store, _rx) = store(transport.clone(), None);

        assert!(store.initialize().await.is_none());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn initialize_restores_session() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(r#"{"id":2,"username":"back"}"#);
        let (store, _rx) = store(transport, Some("persisted"));

        let user = store.initialize().await.unwrap();

        assert_eq!(user.username, "back");
        assert!(store.is_authenticated());
    }

    #[tokio::test]
    async fn register_then_logs_in() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status(201, r#"{"id":5,"username":"new"}"#);
        transport.push_ok(r#"{"token":"fresh","user":{"id":5,"username":"new"}}"#);
        let (store, _rx) = store(transport.clone(), None);

        let user = store
            .register(&NewUser {
                username: "new".into(),
                password: "pw".into(),
                email: String::new(),
            })
            .await
            .unwrap();

        assert_eq!(user.id, 5);
        assert_eq!(store.token().as_deref(), Some("fresh"));
        assert_eq!(transport.paths(), vec!["/users/users/", "/users/token-auth/"]);
    }

    #[tokio::test]
    async fn update_user_requires_a_user() {
        let transport = Arc::new(ScriptedTransport::new());
        let (store, _rx) = store(transport, None);

        let err = store.update_user(&UpdateUser::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotAuthenticated));
    }
}
