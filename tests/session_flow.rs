use std::sync::Arc;

use snapgram::backend::{FailOp, MemoryBackend};
use snapgram::client::SnapgramClient;
use snapgram::config::Config;
use snapgram::domain::{Credentials, NewUser};
use snapgram::error::AppError;
use snapgram::session::AuthState;

fn new_client() -> (Arc<MemoryBackend>, SnapgramClient) {
    let backend = Arc::new(MemoryBackend::new());
    let client = SnapgramClient::new(backend.clone(), Config::default());
    (backend, client)
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
async fn sign_up_authenticates_and_writes_profile_document() {
    let (backend, client) = new_client();
    let user = client.sign_up(&ada()).await.unwrap();

    assert_eq!(user.username, "ada");
    assert!(client.session().is_authenticated().await);
    assert_eq!(backend.document_count("users"), 1);
}

#[tokio::test]
async fn current_user_is_served_from_cache_after_first_fetch() {
    let (backend, client) = new_client();
    client.sign_up(&ada()).await.unwrap();

    let first = client.current_user().await.unwrap();
    let calls_after_first = backend.current_account_calls();

    let second = client.current_user().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(
        backend.current_account_calls(),
        calls_after_first,
        "second read must not hit the backend"
    );
}

#[tokio::test]
async fn current_user_fails_closed_when_anonymous() {
    let (_, client) = new_client();
    assert!(matches!(
        client.current_user().await,
        Err(AppError::Unauthorized)
    ));
}

#[tokio::test]
async fn sign_out_clears_session_and_cached_identity() {
    let (_, client) = new_client();
    client.sign_up(&ada()).await.unwrap();
    client.current_user().await.unwrap();

    client.sign_out().await;

    assert_eq!(client.session().state().await, AuthState::Anonymous);
    assert!(
        matches!(client.current_user().await, Err(AppError::Unauthorized)),
        "stale identity must not outlive the session"
    );
}

#[tokio::test]
async fn identity_check_swallows_backend_failures() {
    let (backend, client) = new_client();
    client.sign_up(&ada()).await.unwrap();

    backend.fail_next(FailOp::CurrentAccount);
    assert!(!client.session().check_identity().await);
    assert_eq!(client.session().state().await, AuthState::Anonymous);

    // recovery on the next check
    assert!(client.session().check_identity().await);
}

#[tokio::test]
async fn sign_in_after_sign_out_round_trips() {
    let (_, client) = new_client();
    client.sign_up(&ada()).await.unwrap();
    client.sign_out().await;
    assert!(!client.session().is_authenticated().await);

    let user = client
        .sign_in(&Credentials {
            email: "ada@example.com".into(),
            password: "hunter2".into(),
        })
        .await
        .unwrap();
    assert_eq!(user.username, "ada");
    assert!(client.session().is_authenticated().await);
}

#[tokio::test]
async fn bootstrap_skips_the_round_trip_without_persisted_tokens() {
    let (backend, client) = new_client();
    assert!(!client.session().bootstrap().await);
    assert_eq!(backend.current_account_calls(), 0);
    assert_eq!(client.session().state().await, AuthState::Anonymous);
}
