//! Auth session: current-user identity derived from the credential store.
//!
//! State machine: Anonymous -> (login success) -> Authenticated ->
//! (logout | token invalidated) -> Anonymous. After a restart, Authenticated
//! is re-entered only when `initialize` resolves the stored credential.

use crate::api::{ApiClient, ApiError};
use crate::credentials::CredentialStore;
use crate::state::StateCell;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The signed-in user as the backend reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
}

/// Published auth state; absence of a user means anonymous mode.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub user: Option<User>,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A privileged operation was attempted without a credential.
    #[error("not authenticated")]
    NotAuthenticated,
    /// Rejected locally before any network call.
    #[error("{0}")]
    Validation(String),
    /// Rejected by the server or failed in transit; the message carries the
    /// server's reason when it sent one.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Owns the current-user identity and the login/register/logout/update
/// operations. All remote calls go through the shared `ApiClient`.
pub struct AuthController {
    api: ApiClient,
    credentials: Arc<CredentialStore>,
    state: StateCell<AuthState>,
}

impl AuthController {
    pub fn new(api: ApiClient, credentials: Arc<CredentialStore>) -> Self {
        Self {
            api,
            credentials,
            state: StateCell::default(),
        }
    }

    /// Observable auth state for front-ends.
    pub fn state(&self) -> &StateCell<AuthState> {
        &self.state
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.snapshot().user
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.snapshot().is_authenticated()
    }

    /// Resolve identity from a stored credential, if any. Runs once at
    /// startup, before the UI is considered ready, so an authenticated state
    /// is never shown and then revoked. A stale or rejected token is treated
    /// the same as no identity: the credential is discarded.
    pub async fn initialize(&self) {
        let Some(token) = self.credentials.get() else {
            return;
        };
        match self.api.me(&token).await {
            Ok(user) => {
                log::info!("restored session for {}", user.email);
                self.state.update(|s| s.user = Some(user));
            }
            Err(e) => {
                log::warn!("identity resolution failed, discarding stored credential: {}", e);
                self.credentials.clear();
            }
        }
    }

    /// Log in with email and password. On success the returned token and user
    /// are stored; on failure nothing is mutated.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::Validation(
                "email and password are required".to_string(),
            ));
        }
        let res = self.api.login(email, password).await?;
        if let Err(e) = self.credentials.set(&res.access_token) {
            // The session still works for this process; only persistence failed.
            log::warn!("failed to persist credential: {}", e);
        }
        log::info!("logged in as {}", res.user.email);
        self.state.update(|s| s.user = Some(res.user));
        Ok(())
    }

    /// Register a new account, then log in with the same credentials —
    /// registration alone does not establish a session.
    pub async fn register(
        &self,
        full_name: &str,
        email: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        let full_name = full_name.trim();
        let email = email.trim();
        if full_name.is_empty() || email.is_empty() || password.is_empty() {
            return Err(AuthError::Validation(
                "name, email and password are required".to_string(),
            ));
        }
        self.api.register(full_name, email, password).await?;
        self.login(email, password).await
    }

    /// Clear credential and user unconditionally. Pure local operation; always
    /// succeeds.
    pub fn logout(&self) {
        self.credentials.clear();
        self.state.update(|s| s.user = None);
        log::info!("logged out");
    }

    /// Update display name and email. The local user is mutated in place so
    /// dependent views reflect the change without a re-fetch.
    pub async fn update_profile(&self, full_name: &str, email: &str) -> Result<(), AuthError> {
        if self.credentials.get().is_none() {
            return Err(AuthError::NotAuthenticated);
        }
        let full_name = full_name.trim();
        let email = email.trim();
        if full_name.is_empty() || email.is_empty() {
            return Err(AuthError::Validation("name and email are required".to_string()));
        }
        self.api.update_profile(full_name, email).await?;
        self.state.update(|s| {
            if let Some(user) = s.user.as_mut() {
                user.full_name = full_name.to_string();
                user.email = email.to_string();
            }
        });
        Ok(())
    }

    /// Change password. The new password must differ from the current one;
    /// that check never reaches the network. Neither password is logged or
    /// stored.
    pub async fn update_password(&self, current: &str, new: &str) -> Result<(), AuthError> {
        if self.credentials.get().is_none() {
            return Err(AuthError::NotAuthenticated);
        }
        if current.is_empty() || new.is_empty() {
            return Err(AuthError::Validation("password must not be empty".to_string()));
        }
        if current == new {
            return Err(AuthError::Validation(
                "new password must differ from the current password".to_string(),
            ));
        }
        self.api.update_password(current, new).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> Arc<CredentialStore> {
        let path = std::env::temp_dir()
            .join(format!("pustaka-auth-test-{}", uuid::Uuid::new_v4()))
            .join("token");
        Arc::new(CredentialStore::open(path))
    }

    fn controller(credentials: Arc<CredentialStore>) -> AuthController {
        // Port 9 (discard) is never served; any accidental network call fails.
        let api = ApiClient::new("http://127.0.0.1:9", credentials.clone());
        AuthController::new(api, credentials)
    }

    #[tokio::test]
    async fn privileged_operations_require_a_credential() {
        let auth = controller(temp_store());
        assert!(matches!(
            auth.update_profile("Ani", "ani@example.com").await,
            Err(AuthError::NotAuthenticated)
        ));
        assert!(matches!(
            auth.update_password("a", "b").await,
            Err(AuthError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn unchanged_password_is_rejected_before_any_network_call() {
        let credentials = temp_store();
        credentials.set("tok-1").expect("set");
        let auth = controller(credentials);
        // The API base URL is unreachable, so reaching the network would fail
        // with an Api error; Validation proves the call never left.
        assert!(matches!(
            auth.update_password("sama", "sama").await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn empty_login_fields_are_rejected_locally() {
        let auth = controller(temp_store());
        assert!(matches!(
            auth.login("", "pw").await,
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            auth.login("a@b.c", "").await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn initialize_without_credential_stays_anonymous() {
        let auth = controller(temp_store());
        auth.initialize().await;
        assert!(!auth.is_authenticated());
    }

    #[tokio::test]
    async fn initialize_discards_credential_when_resolution_fails() {
        let credentials = temp_store();
        credentials.set("tok-stale").expect("set");
        let auth = controller(credentials.clone());
        // Unreachable backend: network failure must also discard the token.
        auth.initialize().await;
        assert!(!auth.is_authenticated());
        assert_eq!(credentials.get(), None);
    }

    #[test]
    fn logout_clears_everything() {
        let credentials = temp_store();
        credentials.set("tok-1").expect("set");
        let auth = controller(credentials.clone());
        auth.state.update(|s| {
            s.user = Some(User {
                id: "u1".to_string(),
                email: "ani@example.com".to_string(),
                full_name: "Ani".to_string(),
            })
        });
        auth.logout();
        assert!(!auth.is_authenticated());
        assert_eq!(credentials.get(), None);
    }
}
