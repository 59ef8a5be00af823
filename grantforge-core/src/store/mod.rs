//! Token persistence contract.
//!
//! This module provides:
//! - [`TokenStore`] - Trait the grant engine persists tokens through
//! - [`Origin`] - The token an exchange consumes
//! - [`NewTokenPair`] - Everything needed to persist a freshly minted pair
//! - [`Association`] - Outcome of the atomic exchange step
//! - [`MemoryTokenStore`] - In-memory implementation
//!
//! # Atomicity
//!
//! [`TokenStore::associate_if_unused`] is the only operation that needs
//! cross-call coordination. For a given origin, at most one concurrent call
//! may return [`Association::Associated`]; every other call must return
//! [`Association::AlreadyUsed`] and persist nothing. A SQL implementation
//! typically does this with `UPDATE ... SET used = true WHERE value = $1
//! AND used = false` inside the transaction that inserts the pair; a
//! key-value store with compare-and-swap on the origin record.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::model::{ConsumerKey, Permissions, UserId};
use crate::token::{
    AccessToken, AccessTokenPair, AuthorizationToken, RefreshToken, TokenKind,
};

mod memory;

pub use memory::MemoryTokenStore;

/// Error type for token store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A token with the same value already exists.
    #[error("duplicate {kind} token value")]
    DuplicateValue { kind: TokenKind },

    /// The referenced token does not exist.
    #[error("{kind} token not found")]
    NotFound { kind: TokenKind },

    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },
}

/// The token consumed by an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin<'a> {
    /// An authorization-code grant consuming this authorization token.
    Authorization(&'a AuthorizationToken),

    /// A refresh grant consuming this refresh token.
    Refresh(&'a RefreshToken),
}

impl Origin<'_> {
    /// The kind of the origin token.
    pub fn kind(&self) -> TokenKind {
        match self {
            Self::Authorization(_) => TokenKind::Authorization,
            Self::Refresh(_) => TokenKind::Refresh,
        }
    }

    /// The origin token's value.
    pub fn value(&self) -> &str {
        match self {
            Self::Authorization(t) => &t.value,
            Self::Refresh(t) => &t.value,
        }
    }
}

/// A freshly minted access/refresh pair waiting to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTokenPair {
    /// Value of the new access token.
    pub access_value: String,

    /// Value of the new refresh token.
    pub refresh_value: String,

    /// Consumer the pair is issued to.
    pub consumer_key: ConsumerKey,

    /// Permissions the access token grants.
    pub permissions: Permissions,

    /// User the access token acts for.
    pub user_id: UserId,

    /// Expiration of the access token.
    pub access_expires_at: DateTime<Utc>,

    /// Expiration of the refresh token.
    pub refresh_expires_at: DateTime<Utc>,
}

impl NewTokenPair {
    /// Build the token entities this pair persists as.
    pub fn to_pair(&self) -> AccessTokenPair {
        use crate::token::{AccessGrant, RefreshLink, Token};

        let access = Token::new(
            self.access_value.clone(),
            self.access_expires_at,
            AccessGrant {
                consumer_key: self.consumer_key.clone(),
                permissions: self.permissions.clone(),
                user_id: self.user_id.clone(),
                refresh_token: self.refresh_value.clone(),
            },
        );
        let refresh = Token::new(
            self.refresh_value.clone(),
            self.refresh_expires_at,
            RefreshLink {
                access_token: self.access_value.clone(),
            },
        );
        AccessTokenPair::new(access, refresh)
    }
}

/// Outcome of [`TokenStore::associate_if_unused`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Association {
    /// This call won: the origin is now exchanged and the pair persisted.
    Associated(AccessTokenPair),

    /// The origin was already exchanged; nothing was persisted.
    AlreadyUsed,
}

/// Persistence contract for the grant engine.
///
/// Implementations are shared by every consumer, so lookups are scoped by
/// consumer key where a consumer is involved. All methods may block on I/O
/// and must be safe to call concurrently.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist a new authorization token.
    async fn insert_authorization_token(
        &self,
        value: &str,
        consumer_key: &ConsumerKey,
        permissions: &Permissions,
        user_id: &UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<AuthorizationToken, StoreError>;

    /// Persist a new access token paired with `refresh_value`.
    async fn insert_access_token(
        &self,
        value: &str,
        refresh_value: &str,
        consumer_key: &ConsumerKey,
        permissions: &Permissions,
        user_id: &UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<AccessToken, StoreError>;

    /// Persist a new refresh token paired with `access_value`.
    async fn insert_refresh_token(
        &self,
        value: &str,
        access_value: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken, StoreError>;

    /// Persist an access/refresh pair that has no origin token.
    ///
    /// The default implementation inserts the refresh token and then the
    /// access token; implementations with transactions should override it
    /// so that neither exists without the other.
    async fn insert_token_pair(&self, pair: &NewTokenPair) -> Result<AccessTokenPair, StoreError> {
        let refresh = self
            .insert_refresh_token(&pair.refresh_value, &pair.access_value, pair.refresh_expires_at)
            .await?;
        let access = self
            .insert_access_token(
                &pair.access_value,
                &pair.refresh_value,
                &pair.consumer_key,
                &pair.permissions,
                &pair.user_id,
                pair.access_expires_at,
            )
            .await?;
        Ok(AccessTokenPair::new(access, refresh))
    }

    /// Atomically mark `origin` as exchanged and persist `pair`.
    ///
    /// Exactly one concurrent caller per origin wins, and only while the
    /// stored origin is still active (not exchanged, expired or
    /// invalidated). For a refresh origin the access token it is paired
    /// with is invalidated in the same step.
    async fn associate_if_unused(
        &self,
        origin: Origin<'_>,
        pair: &NewTokenPair,
    ) -> Result<Association, StoreError>;

    /// Find an unexpired, unexchanged authorization token for the tuple.
    ///
    /// Several may exist; any one of them may be returned.
    async fn lookup_valid_authorization_token(
        &self,
        consumer_key: &ConsumerKey,
        permissions: &Permissions,
        user_id: &UserId,
    ) -> Result<Option<AuthorizationToken>, StoreError>;

    /// Get the access token currently paired with `refresh`.
    async fn get_associated_access_token(
        &self,
        refresh: &RefreshToken,
    ) -> Result<Option<AccessToken>, StoreError>;

    /// Find an authorization token by value.
    async fn find_authorization_token(
        &self,
        value: &str,
    ) -> Result<Option<AuthorizationToken>, StoreError>;

    /// Find an access token by value.
    async fn find_access_token(&self, value: &str) -> Result<Option<AccessToken>, StoreError>;

    /// Find a refresh token by value.
    async fn find_refresh_token(&self, value: &str) -> Result<Option<RefreshToken>, StoreError>;

    /// Set the token's expiration to [`INVALIDATED_AT`](crate::token::INVALIDATED_AT).
    ///
    /// Idempotent; invalidating an unknown value is not an error.
    async fn invalidate(&self, kind: TokenKind, value: &str) -> Result<(), StoreError>;

    /// How long newly issued tokens of `kind` stay valid.
    fn lifetime(&self, kind: TokenKind) -> Duration;
}
