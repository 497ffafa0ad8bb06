//! Current-user state machine.
//!
//! One [`SessionManager`] is constructed at application start and shared by
//! reference. It is the only owner of "who is signed in"; the persisted store
//! mirrors it so a restart can restore the session.

use std::sync::{Arc, RwLock};

use crate::client::AuthClient;
use crate::error::Error;
use crate::navigation::routes;
use crate::store::{clear_auth_keys, keys};
use crate::types::{Role, Session, TokenPair, User, UserId};

const DEV_EMAIL: &str = "test@example.com";
const DEV_PASSWORD: &str = "password";

/// Authentication state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    /// Before the first [`SessionManager::restore`].
    #[default]
    Unknown,
    Checking,
    Authenticated(User),
    Anonymous,
}

impl AuthState {
    /// Whether the initial restore has finished.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Authenticated(_) | Self::Anonymous)
    }
}

/// Owns the signed-in user and the login/register/logout operations.
pub struct SessionManager {
    client: Arc<AuthClient>,
    state: RwLock<AuthState>,
}

impl SessionManager {
    #[must_use]
    pub fn new(client: Arc<AuthClient>) -> Self {
        Self {
            client,
            state: RwLock::new(AuthState::Unknown),
        }
    }

    #[must_use]
    pub fn client(&self) -> &Arc<AuthClient> {
        &self.client
    }

    /// Current state.
    ///
    /// An authenticated state whose access token has disappeared from the
    /// store (session expiry in the client) is demoted to `Anonymous` here.
    #[must_use]
    pub fn state(&self) -> AuthState {
        let state = self.read_state();
        if matches!(state, AuthState::Authenticated(_)) && !self.has_access_token() {
            tracing::info!("Access token gone from store, session ended");
            self.set_state(AuthState::Anonymous);
            return AuthState::Anonymous;
        }
        state
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self.state(), AuthState::Authenticated(_))
    }

    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        match self.state() {
            AuthState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    /// Rebuild the session from the persisted store. Never fails.
    pub fn restore(&self) -> AuthState {
        self.set_state(AuthState::Checking);

        let next = match self.persisted_user() {
            Ok(Some(user)) => {
                tracing::debug!(user_id = %user.id, "Session restored");
                AuthState::Authenticated(user)
            }
            Ok(None) => {
                self.clear_store();
                AuthState::Anonymous
            }
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unusable persisted session");
                self.clear_store();
                AuthState::Anonymous
            }
        };

        self.set_state(next.clone());
        next
    }

    /// Sign in and persist the session.
    ///
    /// # Errors
    ///
    /// Returns the client error unchanged ([`Error::Http`], [`Error::Network`],
    /// [`Error::ProtocolMismatch`]), or [`Error::Storage`] if the session
    /// cannot be persisted. State is left as it was on any error.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, Error> {
        let session = if self.client.config().dev_login_enabled()
            && email == DEV_EMAIL
            && password == DEV_PASSWORD
        {
            tracing::info!("Using development test account");
            dev_session()
        } else {
            self.client
                .login(email, password)
                .await
                .inspect_err(|e| tracing::warn!(error = %e, "Login failed"))?
        };

        self.persist(&session)?;
        self.set_state(AuthState::Authenticated(session.user.clone()));
        tracing::info!(user_id = %session.user.id, role = %session.user.role, "Login successful");
        Ok(session.user)
    }

    /// Create an account, then send the caller to the login view.
    ///
    /// Does not sign in and does not touch the store.
    ///
    /// # Errors
    ///
    /// Returns the client error unchanged.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: &Role,
    ) -> Result<User, Error> {
        let user = self
            .client
            .register(name, email, password, role)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Registration failed"))?;
        tracing::info!(user_id = %user.id, "Registration successful");
        self.client.navigator().navigate(routes::LOGIN);
        Ok(user)
    }

    /// Sign out locally and go to the login view. Idempotent.
    pub fn logout(&self) {
        self.clear_store();
        self.set_state(AuthState::Anonymous);
        self.client.navigator().navigate(routes::LOGIN);
    }

    /// Clear the persisted session and forget the restore result so
    /// [`restore`](Self::restore) can run again.
    pub fn reset(&self) {
        self.clear_store();
        self.set_state(AuthState::Unknown);
    }

    /// E-mail saved by "remember me", if any.
    #[must_use]
    pub fn remembered_email(&self) -> Option<String> {
        self.client
            .store()
            .get(keys::REMEMBERED_EMAIL)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to read remembered email");
                None
            })
    }

    /// Save (`Some`) or forget (`None`) the login e-mail.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the store rejects the write.
    pub fn remember_email(&self, email: Option<&str>) -> Result<(), Error> {
        let store = self.client.store();
        match email {
            Some(email) => store.set(keys::REMEMBERED_EMAIL, email),
            None => store.remove(keys::REMEMBERED_EMAIL),
        }
    }

    fn persisted_user(&self) -> Result<Option<User>, Error> {
        let store = self.client.store();
        if store.get(keys::ACCESS_TOKEN)?.filter(|t| !t.is_empty()).is_none() {
            return Ok(None);
        }
        let Some(raw) = store.get(keys::USER)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| Error::Storage(format!("corrupt persisted user: {e}")))
    }

    /// Write the session, leaving the previous one in place on failure.
    ///
    /// The user record is written last; if any write fails, the token keys
    /// are put back as they were so the store never pairs one user with
    /// another user's tokens.
    fn persist(&self, session: &Session) -> Result<(), Error> {
        let store = self.client.store();
        let user = serde_json::to_string(&session.user)
            .map_err(|e| Error::Storage(e.to_string()))?;
        let previous = [keys::ACCESS_TOKEN, keys::REFRESH_TOKEN]
            .into_iter()
            .map(|key| Ok((key, store.get(key)?)))
            .collect::<Result<Vec<_>, Error>>()?;

        let written = self
            .client
            .store_tokens(&session.tokens)
            .and_then(|()| store.set(keys::USER, &user));
        if let Err(e) = written {
            tracing::warn!(error = %e, "Failed to persist session, rolling back");
            let restored = previous.iter().try_for_each(|(key, value)| match value {
                Some(value) => store.set(key, value),
                None => store.remove(key),
            });
            if let Err(e) = restored {
                tracing::warn!(error = %e, "Rollback failed, clearing persisted session");
                self.clear_store();
            }
            return Err(e);
        }
        Ok(())
    }

    /// Only a confirmed absence counts; a failed read keeps the session.
    fn has_access_token(&self) -> bool {
        match self.client.store().get(keys::ACCESS_TOKEN) {
            Ok(token) => token.is_some_and(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read access token, keeping session");
                true
            }
        }
    }

    fn clear_store(&self) {
        if let Err(e) = clear_auth_keys(self.client.store().as_ref()) {
            tracing::warn!(error = %e, "Failed to clear persisted session");
        }
    }

    fn read_state(&self) -> AuthState {
        match self.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_state(&self, next: AuthState) {
        match self.state.write() {
            Ok(mut state) => *state = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

fn dev_session() -> Session {
    Session {
        tokens: TokenPair {
            access_token: "mock-access-token-12345".into(),
            refresh_token: "mock-refresh-token-12345".into(),
        },
        user: User {
            id: UserId::from("test-user-id"),
            name: "Test User".into(),
            email: DEV_EMAIL.into(),
            role: Role::Admin,
        },
    }
}
