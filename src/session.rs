// Session store: owns the authenticated-user snapshot and the auth flags.
// Everything reads it; only the store mutates it. Injected where needed,
// never looked up ambiently.
use std::sync::Arc;

use serde_json::json;
use tokio::sync::RwLock;

use crate::backend::{unique_id, AuthApi, Backend, DocumentApi, FileApi, Query};
use crate::domain::{Credentials, NewUser, User};
use crate::error::{AppError, AppResult};

/// `Unknown -> Checking -> {Authenticated, Anonymous}`. Sign-in routes
/// back through `Checking`; sign-out drops straight to `Anonymous`.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    Unknown,
    Checking,
    Authenticated(User),
    Anonymous,
}

pub struct SessionStore {
    backend: Arc<dyn Backend>,
    users_collection: String,
    state: RwLock<AuthState>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn Backend>, users_collection: impl Into<String>) -> Self {
        Self {
            backend,
            users_collection: users_collection.into(),
            state: RwLock::new(AuthState::Unknown),
        }
    }

    pub async fn state(&self) -> AuthState {
        self.state.read().await.clone()
    }

    /// The current session snapshot, if authenticated.
    pub async fn session(&self) -> Option<User> {
        match &*self.state.read().await {
            AuthState::Authenticated(user) => Some(user.clone()),
            _ => None,
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        matches!(&*self.state.read().await, AuthState::Authenticated(_))
    }

    pub async fn is_loading(&self) -> bool {
        matches!(&*self.state.read().await, AuthState::Checking)
    }

    /// Startup entry point. When no prior session token set is persisted
    /// locally the identity check cannot succeed, so skip the round trip
    /// and settle on `Anonymous` immediately.
    pub async fn bootstrap(&self) -> bool {
        if !self.backend.has_persisted_session() {
            *self.state.write().await = AuthState::Anonymous;
            return false;
        }
        self.check_identity().await
    }

    /// Ask the backend who is authenticated and settle the state machine.
    /// Fail-closed: every backend error is treated as "not authenticated"
    /// and never surfaced to the caller, who only ever sees a bool.
    pub async fn check_identity(&self) -> bool {
        *self.state.write().await = AuthState::Checking;

        let outcome = self.fetch_current_user().await;
        let mut state = self.state.write().await;
        match outcome {
            Ok(Some(user)) => {
                *state = AuthState::Authenticated(user);
                true
            }
            Ok(None) => {
                *state = AuthState::Anonymous;
                false
            }
            Err(e) => {
                tracing::debug!("Identity check failed, treating as anonymous: {}", e);
                *state = AuthState::Anonymous;
                false
            }
        }
    }

    async fn fetch_current_user(&self) -> AppResult<Option<User>> {
        let Some(account) = self.backend.current_account().await? else {
            return Ok(None);
        };

        let list = self
            .backend
            .list_documents(
                &self.users_collection,
                &[Query::equal("accountId", account.id)],
            )
            .await?;
        match list.documents.first() {
            Some(doc) => Ok(Some(User::from_document(doc)?)),
            None => Ok(None),
        }
    }

    /// Create the auth account and its profile document, then sign in.
    pub async fn sign_up(&self, new_user: &NewUser) -> AppResult<User> {
        let account = self
            .backend
            .create_account(&new_user.email, &new_user.password, &new_user.name)
            .await?;

        let avatar_url = self.backend.initials_avatar_url(&new_user.name);
        self.backend
            .create_document(
                &self.users_collection,
                &unique_id(),
                json!({
                    "accountId": account.id,
                    "email": account.email,
                    "name": account.name,
                    "username": new_user.username,
                    "imageUrl": avatar_url,
                    "bio": "",
                }),
            )
            .await?;

        self.sign_in(&Credentials {
            email: new_user.email.clone(),
            password: new_user.password.clone(),
        })
        .await
    }

    pub async fn sign_in(&self, credentials: &Credentials) -> AppResult<User> {
        self.backend
            .create_session(&credentials.email, &credentials.password)
            .await?;

        if self.check_identity().await {
            if let Some(user) = self.session().await {
                return Ok(user);
            }
        }
        Err(AppError::Unauthorized)
    }

    /// Local state clears first; the remote session-termination call is
    /// best-effort.
    pub async fn sign_out(&self) {
        *self.state.write().await = AuthState::Anonymous;
        if let Err(e) = self.backend.delete_session().await {
            tracing::warn!("Remote sign-out failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FailOp, MemoryBackend};

    fn store() -> (Arc<MemoryBackend>, SessionStore) {
        let backend = Arc::new(MemoryBackend::new());
        let store = SessionStore::new(backend.clone(), "users");
        (backend, store)
    }

    fn ada() -> NewUser {
        NewUser {
            name: "Ada Lovelace".into(),
            username: "ada".into(),
            email: "ada@example.com".into(),
            password: "hunter2".into(),
        }
    }

    #[tokio::test]
    async fn starts_unknown() {
        let (_, store) = store();
        assert_eq!(store.state().await, AuthState::Unknown);
        assert!(!store.is_authenticated().await);
    }

    #[tokio::test]
    async fn check_identity_settles_anonymous_without_session() {
        let (_, store) = store();
        assert!(!store.check_identity().await);
        assert_eq!(store.state().await, AuthState::Anonymous);
    }

    #[tokio::test]
    async fn sign_up_then_identity_check_authenticates() {
        let (_, store) = store();
        let user = store.sign_up(&ada()).await.unwrap();
        assert_eq!(user.username, "ada");
        assert!(user.image_url.contains("Ada"), "initials avatar assigned");

        assert!(store.check_identity().await);
        assert_eq!(store.session().await.unwrap().email, "ada@example.com");
    }

    #[tokio::test]
    async fn check_identity_swallows_backend_errors() {
        let (backend, store) = store();
        store.sign_up(&ada()).await.unwrap();

        backend.fail_next(FailOp::CurrentAccount);
        assert!(!store.check_identity().await);
        assert_eq!(store.state().await, AuthState::Anonymous);

        // next check succeeds again
        assert!(store.check_identity().await);
    }

    #[tokio::test]
    async fn bootstrap_short_circuits_without_persisted_tokens() {
        let (backend, store) = store();
        assert!(!store.bootstrap().await);
        assert_eq!(store.state().await, AuthState::Anonymous);
        assert_eq!(
            backend.current_account_calls(),
            0,
            "no identity round trip without a token set"
        );
    }

    #[tokio::test]
    async fn bootstrap_checks_identity_with_persisted_tokens() {
        let (backend, store) = store();
        store.sign_up(&ada()).await.unwrap();
        assert!(store.bootstrap().await);
        assert!(backend.current_account_calls() > 0);
    }

    #[tokio::test]
    async fn sign_in_with_bad_credentials_errors() {
        let (_, store) = store();
        store.sign_up(&ada()).await.unwrap();
        store.sign_out().await;

        let result = store
            .sign_in(&Credentials {
                email: "ada@example.com".into(),
                password: "wrong".into(),
            })
            .await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
        assert!(!store.is_authenticated().await);
    }

    #[tokio::test]
    async fn sign_out_clears_local_state_even_when_remote_fails() {
        let (backend, store) = store();
        store.sign_up(&ada()).await.unwrap();
        assert!(store.is_authenticated().await);

        backend.fail_next(FailOp::DeleteSession);
        store.sign_out().await;
        assert_eq!(store.state().await, AuthState::Anonymous);
        assert!(store.session().await.is_none());
    }
}
