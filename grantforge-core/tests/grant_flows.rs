//! Integration tests for the grant flows.
//!
//! These tests verify that the GrantEngine correctly:
//! - Runs the full authorization-code then refresh lifecycle
//! - Lets an authorization token be exchanged at most once
//! - Invalidates the old pair on refresh
//! - Gates the client-credentials grant on privilege and secret

use chrono::{Duration, Utc};
use grantforge_core::{
    Consumer, ConsumerCredentials, ConsumerPrivileges, GrantEngine, GrantOutcome,
    InvalidTokenReason, MemoryTokenStore, Permissions, Privilege, Rejection, Secret,
    TokenKind, TokenLifetimes, TokenState, TokenStore, UserId, cipher,
};

/// Helper to set up an engine with default lifetimes.
fn setup_engine() -> GrantEngine<MemoryTokenStore> {
    GrantEngine::new(MemoryTokenStore::new(TokenLifetimes::default()))
}

/// Helper to register a consumer.
fn register(privileges: ConsumerPrivileges) -> (Consumer, Secret) {
    ConsumerCredentials::generate()
        .unwrap()
        .into_consumer("client.example.com", privileges)
}

fn alice() -> (Permissions, UserId) {
    (Permissions::new("read,write"), UserId::new("alice"))
}

#[tokio::test]
async fn test_authorization_code_then_refresh_lifecycle() {
    let engine = setup_engine();
    let (consumer, secret) = register(ConsumerPrivileges::none());
    let (permissions, user) = alice();

    // Issue, then find it again through the lookup.
    let code = engine
        .issue_authorization_token(&consumer, &permissions, &user)
        .await
        .unwrap();
    let found = engine
        .get_valid_authorization_token(&consumer, &permissions, &user)
        .await
        .unwrap()
        .expect("authorization token should be found");
    assert_eq!(found.value, code.value);

    // Exchange once.
    let first = engine
        .exchange_authorization_token(&consumer, secret.expose(), &code)
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert!(first.is_valid());
    assert_eq!(first.access_token.details.permissions, permissions);
    assert_eq!(first.access_token.details.user_id, user);
    assert_eq!(
        engine.store().token_state(TokenKind::Authorization, &code.value),
        Some(TokenState::Exchanged)
    );

    // A second exchange of the same code fails and mints nothing.
    let again = engine
        .exchange_authorization_token(&consumer, secret.expose(), &code)
        .await
        .unwrap();
    assert_eq!(again, GrantOutcome::Rejected(Rejection::ConcurrentConflict));
    assert_eq!(engine.store().count(TokenKind::Access), 1);

    // The exchanged code no longer shows up as valid.
    assert!(
        engine
            .get_valid_authorization_token(&consumer, &permissions, &user)
            .await
            .unwrap()
            .is_none()
    );

    // Refresh: new pair, old pair gone.
    let second = engine
        .refresh_access_token(&consumer, secret.expose(), &first.refresh_token)
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_ne!(second.access_token.value, first.access_token.value);
    assert_eq!(second.access_token.details.permissions, permissions);
    assert_eq!(second.access_token.details.user_id, user);

    assert!(
        engine
            .resolve_access_token(&first.access_token.value)
            .await
            .unwrap()
            .is_none()
    );
    let resolved = engine
        .resolve_access_token(&second.access_token.value)
        .await
        .unwrap()
        .expect("new access token should resolve");
    assert_eq!(resolved.details.refresh_token, second.refresh_token.value);

    // The old refresh token is spent.
    let replay = engine
        .refresh_access_token(&consumer, secret.expose(), &first.refresh_token)
        .await
        .unwrap();
    assert!(!replay.is_issued());

    // The new one works.
    let third = engine
        .refresh_access_value(&consumer, secret.expose(), &second.refresh_token.value)
        .await
        .unwrap();
    assert!(third.is_issued());
}

#[tokio::test]
async fn test_stale_refresh_copy_is_rejected() {
    let engine = setup_engine();
    let (consumer, secret) = register(ConsumerPrivileges::none());
    let (permissions, user) = alice();

    let code = engine
        .issue_authorization_token(&consumer, &permissions, &user)
        .await
        .unwrap();
    let pair = engine
        .exchange_authorization_value(&consumer, secret.expose(), &code.value)
        .await
        .unwrap()
        .into_result()
        .unwrap();

    engine
        .refresh_access_token(&consumer, secret.expose(), &pair.refresh_token)
        .await
        .unwrap();

    // Reloading the old refresh token shows it invalidated.
    let reloaded = engine
        .store()
        .find_refresh_token(&pair.refresh_token.value)
        .await
        .unwrap()
        .unwrap();
    assert!(reloaded.is_invalidated());

    let outcome = engine
        .refresh_access_token(&consumer, secret.expose(), &reloaded)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        GrantOutcome::Rejected(Rejection::InvalidToken {
            reason: InvalidTokenReason::Expired
        })
    );
}

#[tokio::test]
async fn test_expired_authorization_token_not_returned() {
    let engine = setup_engine();
    let (consumer, secret) = register(ConsumerPrivileges::none());
    let (permissions, user) = alice();

    let value = cipher::encrypt("expired-seed", consumer.encryption_key()).unwrap();
    let expired = engine
        .store()
        .insert_authorization_token(
            &value,
            consumer.key(),
            &permissions,
            &user,
            Utc::now() - Duration::seconds(1),
        )
        .await
        .unwrap();

    assert!(
        engine
            .get_valid_authorization_token(&consumer, &permissions, &user)
            .await
            .unwrap()
            .is_none()
    );

    let outcome = engine
        .exchange_authorization_token(&consumer, secret.expose(), &expired)
        .await
        .unwrap();
    assert_eq!(
        outcome.rejection(),
        Some(&Rejection::InvalidToken {
            reason: InvalidTokenReason::Expired
        })
    );
}

#[tokio::test]
async fn test_short_lifetime_expires() {
    let engine = GrantEngine::new(MemoryTokenStore::new(TokenLifetimes::new(1, 60, 60)));
    let (consumer, _) = register(ConsumerPrivileges::none());
    let (permissions, user) = alice();

    let code = engine
        .issue_authorization_token(&consumer, &permissions, &user)
        .await
        .unwrap();
    assert!(code.expires_at <= Utc::now() + Duration::seconds(1));

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    assert!(!code.is_valid());
    assert_eq!(
        engine.store().token_state(TokenKind::Authorization, &code.value),
        Some(TokenState::Expired)
    );
    assert!(
        engine
            .get_valid_authorization_token(&consumer, &permissions, &user)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_client_credentials_grant() {
    let engine = setup_engine();
    let (server, server_secret) = register(ConsumerPrivileges::all());
    let (client, client_secret) = register(ConsumerPrivileges::none());
    let (permissions, user) = alice();

    let denied = engine
        .issue_client_credentials_token(&client, client_secret.expose(), &user, &permissions)
        .await
        .unwrap();
    assert_eq!(
        denied,
        GrantOutcome::Rejected(Rejection::InsufficientPrivilege {
            privilege: Privilege::ClientCredentialsFlow
        })
    );

    let bad_secret = engine
        .issue_client_credentials_token(&server, client_secret.expose(), &user, &permissions)
        .await
        .unwrap();
    assert_eq!(bad_secret, GrantOutcome::Rejected(Rejection::InvalidSecret));
    assert!(engine.store().is_empty());

    let pair = engine
        .issue_client_credentials_token(&server, server_secret.expose(), &user, &permissions)
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(&pair.access_token.details.consumer_key, server.key());
    assert_eq!(engine.store().count(TokenKind::Access), 1);
    assert_eq!(engine.store().count(TokenKind::Refresh), 1);

    // The pair can be refreshed like any other.
    let refreshed = engine
        .refresh_access_token(&server, server_secret.expose(), &pair.refresh_token)
        .await
        .unwrap();
    assert!(refreshed.is_issued());
}

#[tokio::test]
async fn test_refresh_rejects_other_consumer() {
    let engine = setup_engine();
    let (owner, owner_secret) = register(ConsumerPrivileges::none());
    let (other, other_secret) = register(ConsumerPrivileges::none());
    let (permissions, user) = alice();

    let code = engine
        .issue_authorization_token(&owner, &permissions, &user)
        .await
        .unwrap();
    let pair = engine
        .exchange_authorization_token(&owner, owner_secret.expose(), &code)
        .await
        .unwrap()
        .into_result()
        .unwrap();

    let outcome = engine
        .refresh_access_token(&other, other_secret.expose(), &pair.refresh_token)
        .await
        .unwrap();
    assert_eq!(
        outcome.rejection(),
        Some(&Rejection::InvalidToken {
            reason: InvalidTokenReason::ForeignConsumer
        })
    );

    // The owner's pair is untouched.
    assert!(
        engine
            .resolve_access_token(&pair.access_token.value)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_refresh_rejects_bad_secret() {
    let engine = setup_engine();
    let (consumer, secret) = register(ConsumerPrivileges::none());
    let (permissions, user) = alice();

    let code = engine
        .issue_authorization_token(&consumer, &permissions, &user)
        .await
        .unwrap();
    let pair = engine
        .exchange_authorization_token(&consumer, secret.expose(), &code)
        .await
        .unwrap()
        .into_result()
        .unwrap();

    let outcome = engine
        .refresh_access_token(&consumer, "not-the-secret", &pair.refresh_token)
        .await
        .unwrap();
    assert_eq!(outcome, GrantOutcome::Rejected(Rejection::InvalidSecret));
    assert_eq!(
        engine.store().token_state(TokenKind::Refresh, &pair.refresh_token.value),
        Some(TokenState::Active)
    );
}
