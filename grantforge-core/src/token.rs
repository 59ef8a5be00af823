//! Token entities and their lifecycle.
//!
//! This module provides:
//! - [`Token`] - A token value with an expiration, generic over its details
//! - [`AuthorizationToken`], [`AccessToken`], [`RefreshToken`] - The three kinds
//! - [`TokenState`] - Lifecycle states and the legal transitions between them
//! - [`AccessTokenPair`] - The result of every successful grant
//! - [`StoredToken`] - Tagged form used by stores that keep all kinds together
//!
//! # Lifecycle
//!
//! ```text
//! Active ──exchange──▶ Exchanged ──▶ Expired / Invalidated
//!   │                                      ▲
//!   └──────────── expire / invalidate ─────┘
//! ```
//!
//! Only authorization and refresh tokens can be exchanged. Nothing returns
//! to `Active`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{ConsumerKey, Permissions, UserId};
use crate::store::{StoreError, TokenStore};

/// Expiration assigned to invalidated tokens.
pub const INVALIDATED_AT: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;

/// The three kinds of tokens issued by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// One-time grant from a user to a consumer.
    Authorization,

    /// Grants resource access.
    Access,

    /// Exchanged for a new access/refresh pair.
    Refresh,
}

impl TokenKind {
    /// Get the string representation of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorization => "authorization",
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }

    /// Whether tokens of this kind can be exchanged for a new pair.
    pub fn is_exchangeable(&self) -> bool {
        matches!(self, Self::Authorization | Self::Refresh)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    /// Unexpired and not yet exchanged.
    Active,

    /// Used as the origin of a successful exchange. The value still exists
    /// but can never be exchanged again.
    Exchanged,

    /// The expiration time has passed.
    Expired,

    /// Explicitly invalidated.
    Invalidated,
}

impl TokenState {
    /// Whether a token in this state may be presented for a grant.
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired | Self::Invalidated)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Staying in the same state is always allowed, so repeated
    /// invalidation is a no-op rather than an error.
    pub fn can_transition_to(&self, next: TokenState) -> bool {
        if *self == next {
            return true;
        }
        match (self, next) {
            (Self::Active, _) => true,
            (Self::Exchanged, Self::Expired | Self::Invalidated) => true,
            (Self::Expired, Self::Invalidated) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Exchanged => "exchanged",
            Self::Expired => "expired",
            Self::Invalidated => "invalidated",
        };
        write!(f, "{}", s)
    }
}

/// Kind-specific data carried by a [`Token`].
pub trait TokenDetails: fmt::Debug + Clone + Send + Sync + 'static {
    /// The kind of token these details belong to.
    const KIND: TokenKind;
}

/// A token value with its expiration and kind-specific details.
///
/// Tokens are created by the engine and the store only. The in-memory
/// expiration is a snapshot; the store holds the authoritative copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token<D> {
    /// The opaque token value (hex ciphertext).
    pub value: String,

    /// When this token stops being valid.
    pub expires_at: DateTime<Utc>,

    /// Kind-specific details.
    pub details: D,
}

impl<D: TokenDetails> Token<D> {
    /// Create a new token.
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>, details: D) -> Self {
        Self {
            value: value.into(),
            expires_at,
            details,
        }
    }

    /// The kind of this token.
    pub fn kind(&self) -> TokenKind {
        D::KIND
    }

    /// Check if this token is still valid.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Check if this token is valid at the given instant.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Whether this token has been explicitly invalidated.
    pub fn is_invalidated(&self) -> bool {
        self.expires_at == INVALIDATED_AT
    }

    /// The state of this token as far as its own expiration tells.
    ///
    /// `Exchanged` is only known to the store.
    pub fn state_at(&self, now: DateTime<Utc>) -> TokenState {
        if self.is_invalidated() {
            TokenState::Invalidated
        } else if self.is_valid_at(now) {
            TokenState::Active
        } else {
            TokenState::Expired
        }
    }

    /// The current state of this token.
    pub fn state(&self) -> TokenState {
        self.state_at(Utc::now())
    }

    /// Mark this copy as invalidated.
    ///
    /// This only changes the in-memory copy; callers persist the change
    /// with [`TokenStore::invalidate`].
    pub fn invalidate(&mut self) {
        self.expires_at = INVALIDATED_AT;
    }
}

/// Details of an authorization token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationGrant {
    /// The consumer the grant was issued to.
    pub consumer_key: ConsumerKey,

    /// Permissions granted by the user.
    pub permissions: Permissions,

    /// The user who granted the permissions.
    pub user_id: UserId,
}

impl TokenDetails for AuthorizationGrant {
    const KIND: TokenKind = TokenKind::Authorization;
}

/// Details of an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    /// The consumer the token was issued to.
    pub consumer_key: ConsumerKey,

    /// Permissions the token grants.
    pub permissions: Permissions,

    /// The user whose resources the token grants access to.
    pub user_id: UserId,

    /// Value of the refresh token minted together with this token.
    pub refresh_token: String,
}

impl TokenDetails for AccessGrant {
    const KIND: TokenKind = TokenKind::Access;
}

/// Details of a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshLink {
    /// Value of the access token minted together with this token.
    pub access_token: String,
}

impl TokenDetails for RefreshLink {
    const KIND: TokenKind = TokenKind::Refresh;
}

/// A user's one-time grant to a consumer.
pub type AuthorizationToken = Token<AuthorizationGrant>;

/// Credential authorizing resource access.
pub type AccessToken = Token<AccessGrant>;

/// Single-use credential exchanged for a new access/refresh pair.
pub type RefreshToken = Token<RefreshLink>;

impl RefreshToken {
    /// Look up the access token currently paired with this refresh token.
    pub async fn associated_access_token<S>(
        &self,
        store: &S,
    ) -> Result<Option<AccessToken>, StoreError>
    where
        S: TokenStore + ?Sized,
    {
        store.get_associated_access_token(self).await
    }
}

/// An access token and the refresh token minted with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenPair {
    /// The new access token.
    pub access_token: AccessToken,

    /// The new refresh token.
    pub refresh_token: RefreshToken,
}

impl AccessTokenPair {
    /// Create a pair, which must reference each other.
    pub fn new(access_token: AccessToken, refresh_token: RefreshToken) -> Self {
        debug_assert_eq!(access_token.details.refresh_token, refresh_token.value);
        debug_assert_eq!(refresh_token.details.access_token, access_token.value);
        Self {
            access_token,
            refresh_token,
        }
    }

    /// Check that both tokens are valid.
    pub fn is_valid(&self) -> bool {
        self.access_token.is_valid() && self.refresh_token.is_valid()
    }
}

/// Any token, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoredToken {
    /// An authorization token.
    Authorization(AuthorizationToken),

    /// An access token.
    Access(AccessToken),

    /// A refresh token.
    Refresh(RefreshToken),
}

impl StoredToken {
    /// The kind of the wrapped token.
    pub fn kind(&self) -> TokenKind {
        match self {
            Self::Authorization(_) => TokenKind::Authorization,
            Self::Access(_) => TokenKind::Access,
            Self::Refresh(_) => TokenKind::Refresh,
        }
    }

    /// The wrapped token's value.
    pub fn value(&self) -> &str {
        match self {
            Self::Authorization(t) => &t.value,
            Self::Access(t) => &t.value,
            Self::Refresh(t) => &t.value,
        }
    }

    /// The wrapped token's state at the given instant.
    pub fn state_at(&self, now: DateTime<Utc>) -> TokenState {
        match self {
            Self::Authorization(t) => t.state_at(now),
            Self::Access(t) => t.state_at(now),
            Self::Refresh(t) => t.state_at(now),
        }
    }

    /// Invalidate the wrapped token.
    pub fn invalidate(&mut self) {
        match self {
            Self::Authorization(t) => t.invalidate(),
            Self::Access(t) => t.invalidate(),
            Self::Refresh(t) => t.invalidate(),
        }
    }
}

impl From<AuthorizationToken> for StoredToken {
    fn from(token: AuthorizationToken) -> Self {
        Self::Authorization(token)
    }
}

impl From<AccessToken> for StoredToken {
    fn from(token: AccessToken) -> Self {
        Self::Access(token)
    }
}

impl From<RefreshToken> for StoredToken {
    fn from(token: RefreshToken) -> Self {
        Self::Refresh(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn authorization(expires_at: DateTime<Utc>) -> AuthorizationToken {
        Token::new(
            "auth-value",
            expires_at,
            AuthorizationGrant {
                consumer_key: ConsumerKey::new("consumer"),
                permissions: Permissions::new("read"),
                user_id: UserId::new("user"),
            },
        )
    }

    #[test]
    fn test_token_validity() {
        let valid = authorization(Utc::now() + Duration::hours(1));
        assert!(valid.is_valid());
        assert_eq!(valid.state(), TokenState::Active);

        let expired = authorization(Utc::now() - Duration::seconds(1));
        assert!(!expired.is_valid());
        assert_eq!(expired.state(), TokenState::Expired);
    }

    #[test]
    fn test_expiration_boundary_is_invalid() {
        let now = Utc::now();
        let token = authorization(now);
        assert!(!token.is_valid_at(now));
        assert!(token.is_valid_at(now - Duration::milliseconds(1)));
    }

    #[test]
    fn test_invalidate_is_terminal_and_idempotent() {
        let mut token = authorization(Utc::now() + Duration::hours(1));
        token.invalidate();
        assert!(!token.is_valid());
        assert!(token.is_invalidated());
        assert_eq!(token.state(), TokenState::Invalidated);

        token.invalidate();
        assert_eq!(token.expires_at, INVALIDATED_AT);
    }

    #[test]
    fn test_state_transitions() {
        use TokenState::*;

        assert!(Active.can_transition_to(Exchanged));
        assert!(Active.can_transition_to(Invalidated));
        assert!(Exchanged.can_transition_to(Invalidated));
        assert!(Expired.can_transition_to(Invalidated));
        assert!(Invalidated.can_transition_to(Invalidated));

        assert!(!Exchanged.can_transition_to(Active));
        assert!(!Expired.can_transition_to(Active));
        assert!(!Invalidated.can_transition_to(Active));
        assert!(!Invalidated.can_transition_to(Exchanged));
        assert!(!Expired.can_transition_to(Exchanged));
    }

    #[test]
    fn test_kind_properties() {
        assert!(TokenKind::Authorization.is_exchangeable());
        assert!(TokenKind::Refresh.is_exchangeable());
        assert!(!TokenKind::Access.is_exchangeable());
        assert_eq!(TokenKind::Refresh.to_string(), "refresh");
    }

    #[test]
    fn test_stored_token_tagging() {
        let stored = StoredToken::from(authorization(Utc::now() + Duration::hours(1)));
        assert_eq!(stored.kind(), TokenKind::Authorization);
        assert_eq!(stored.value(), "auth-value");

        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["kind"], "authorization");
        assert_eq!(json["details"]["user_id"], "user");
    }
}
