//! Session state shared by `ApiClient` and `UserStore`.
//!
//! # Design
//! The token lives in two places: durable `TokenStorage` and the in-memory
//! `SessionState`. Every write goes through `Session`, which updates both
//! under one lock so they cannot diverge.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::info;

use crate::storage::TokenStorage;
use crate::types::User;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub token: Option<String>,
    pub current_user: Option<User>,
    pub is_logged_in: bool,
}

pub struct Session {
    storage: Arc<dyn TokenStorage>,
    state: Mutex<SessionState>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &*self.lock())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Session seeded with whatever token the storage already holds. The
    /// user is not considered logged in until the token is confirmed.
    pub fn restore(storage: Arc<dyn TokenStorage>) -> Self {
        let token = storage.load();
        Self {
            storage,
            state: Mutex::new(SessionState {
                token,
                ..SessionState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Token of the in-memory session. Storage is only read by `restore`,
    /// so a token that could not be removed from it never authenticates.
    pub fn token(&self) -> Option<String> {
        self.lock().token.clone()
    }

    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    /// Persist `token` and mark the session logged in.
    pub fn establish(&self, token: &str, user: Option<User>) -> io::Result<()> {
        let mut state = self.lock();
        self.storage.store(token)?;
        state.token = Some(token.to_string());
        state.is_logged_in = true;
        if user.is_some() {
            state.current_user = user;
        }
        Ok(())
    }

    pub fn set_user(&self, user: User) {
        let mut state = self.lock();
        state.current_user = Some(user);
        state.is_logged_in = true;
    }

    /// Drop the token from storage and memory together. The in-memory
    /// session is reset even when storage fails; the storage error is
    /// returned so the caller can report it.
    pub fn clear(&self) -> io::Result<()> {
        let mut state = self.lock();
        let removed = self.storage.remove();
        if state.token.is_some() {
            info!("session cleared");
        }
        *state = SessionState::default();
        removed
    }
}
