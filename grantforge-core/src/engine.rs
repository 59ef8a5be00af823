//! Grant flows.
//!
//! [`GrantEngine`] issues authorization tokens and runs the three grant
//! flows on behalf of a [`Consumer`]:
//!
//! | Flow               | Consumes            | Requires                        |
//! |--------------------|---------------------|---------------------------------|
//! | authorization code | authorization token | secret, owned unexpired token   |
//! | client credentials | nothing             | secret, client-credentials flag |
//! | refresh            | refresh token       | secret, owned unexpired token   |
//!
//! Every flow verifies, mints two values with the generator, persists them
//! through the [`TokenStore`] and returns the new pair. Expected failures
//! (bad secret, bad token, missing privilege, lost race) come back as
//! [`GrantOutcome::Rejected`]; only store and cipher failures are errors.
//! Nothing is retried.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use grantforge_core::{
//!     ConsumerCredentials, ConsumerPrivileges, GrantEngine, MemoryTokenStore,
//!     Permissions, TokenLifetimes, UserId,
//! };
//!
//! let engine = GrantEngine::new(MemoryTokenStore::new(TokenLifetimes::default()));
//! let (consumer, secret) = ConsumerCredentials::generate()?
//!     .into_consumer("example.com", ConsumerPrivileges::none());
//!
//! let permissions = Permissions::new("read,write");
//! let user = UserId::new("user-1");
//! let code = engine.issue_authorization_token(&consumer, &permissions, &user).await?;
//!
//! let pair = engine
//!     .exchange_authorization_token(&consumer, secret.expose(), &code)
//!     .await?
//!     .into_result()?;
//! println!("access token expires at {}", pair.access_token.expires_at);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

use crate::cipher::{self, CipherError};
use crate::consumer::{Consumer, Privilege};
use crate::generator;
use crate::lifetime::ConfigError;
use crate::model::{Permissions, UserId};
use crate::store::{Association, NewTokenPair, Origin, StoreError, TokenStore};
use crate::token::{
    AccessToken, AccessTokenPair, AuthorizationToken, RefreshToken, Token, TokenDetails, TokenKind,
};

/// Why a presented token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidTokenReason {
    /// The token has expired or was invalidated.
    Expired,

    /// The token belongs to a different consumer.
    ForeignConsumer,

    /// The token is not known to the store.
    NotFound,

    /// The refresh token has no paired access token.
    MissingAccessToken,

    /// The token value does not decrypt under the consumer's key.
    Undecryptable,
}

impl fmt::Display for InvalidTokenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Expired => "expired or invalidated",
            Self::ForeignConsumer => "issued to another consumer",
            Self::NotFound => "unknown token",
            Self::MissingAccessToken => "no paired access token",
            Self::Undecryptable => "value does not decrypt",
        };
        write!(f, "{}", s)
    }
}

/// An expected refusal of a grant request.
///
/// These are ordinary outcomes for the request layer to map onto its own
/// responses, not defects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The consumer secret does not verify.
    #[error("invalid consumer secret")]
    InvalidSecret,

    /// The presented token cannot be used.
    #[error("invalid token: {reason}")]
    InvalidToken { reason: InvalidTokenReason },

    /// The consumer lacks the privilege the flow requires.
    #[error("insufficient privilege: {privilege} required")]
    InsufficientPrivilege { privilege: Privilege },

    /// Another request exchanged the same token first.
    #[error("token was already exchanged by a concurrent request")]
    ConcurrentConflict,
}

/// Failure the engine cannot recover from.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The token store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The cipher failed while minting a value, which means the consumer's
    /// key material is unusable.
    #[error("cipher configuration error: {0}")]
    Cipher(#[from] CipherError),

    /// A configured lifetime cannot be applied to the current time.
    #[error("lifetime configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result of a grant flow that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    /// A new access/refresh pair was issued.
    Issued(AccessTokenPair),

    /// The request was refused.
    Rejected(Rejection),
}

impl GrantOutcome {
    /// Whether a pair was issued.
    pub fn is_issued(&self) -> bool {
        matches!(self, Self::Issued(_))
    }

    /// The issued pair, if any.
    pub fn pair(&self) -> Option<&AccessTokenPair> {
        match self {
            Self::Issued(pair) => Some(pair),
            Self::Rejected(_) => None,
        }
    }

    /// The rejection, if any.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Issued(_) => None,
            Self::Rejected(rejection) => Some(rejection),
        }
    }

    /// Convert into a `Result`, for callers that treat rejection as failure.
    pub fn into_result(self) -> Result<AccessTokenPair, Rejection> {
        match self {
            Self::Issued(pair) => Ok(pair),
            Self::Rejected(rejection) => Err(rejection),
        }
    }
}

/// The three grant flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrantFlow {
    /// Authorization token exchanged for a pair.
    AuthorizationCode,

    /// Pair issued directly to a privileged consumer.
    ClientCredentials,

    /// Refresh token exchanged for a new pair.
    Refresh,
}

impl fmt::Display for GrantFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::Refresh => "refresh_token",
        };
        write!(f, "{}", s)
    }
}

/// Token issuance and exchange engine.
///
/// The engine keeps no state of its own; everything lives in the store,
/// so one engine can serve any number of concurrent requests.
///
/// # Type Parameters
///
/// * `S` - The token store implementation to use
pub struct GrantEngine<S: TokenStore> {
    store: S,
}

impl<S: TokenStore> GrantEngine<S> {
    /// Create an engine backed by `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Issue a new authorization token for `user_id` granting `permissions`
    /// to `consumer`.
    ///
    /// Earlier unexpired authorization tokens for the same tuple stay valid.
    pub async fn issue_authorization_token(
        &self,
        consumer: &Consumer,
        permissions: &Permissions,
        user_id: &UserId,
    ) -> Result<AuthorizationToken, EngineError> {
        let seed = format!("{}{}", consumer.key(), permissions);
        let value = generator::generate(&seed, consumer.encryption_key())?;
        let expires_at = self.expiry(TokenKind::Authorization, Utc::now())?;

        let token = self
            .store
            .insert_authorization_token(&value, consumer.key(), permissions, user_id, expires_at)
            .await?;

        tracing::info!(
            "Issued authorization token for consumer {} user {}",
            consumer.key(),
            user_id
        );
        Ok(token)
    }

    /// Find a still-valid authorization token for the tuple.
    pub async fn get_valid_authorization_token(
        &self,
        consumer: &Consumer,
        permissions: &Permissions,
        user_id: &UserId,
    ) -> Result<Option<AuthorizationToken>, EngineError> {
        let token = self
            .store
            .lookup_valid_authorization_token(consumer.key(), permissions, user_id)
            .await?;
        tracing::debug!(
            "Authorization token lookup for consumer {} user {}: {}",
            consumer.key(),
            user_id,
            if token.is_some() { "found" } else { "none" }
        );
        Ok(token.filter(|t| t.is_valid()))
    }

    /// Authorization-code grant: exchange `authorization` for a new pair.
    ///
    /// Succeeds at most once per authorization token. A caller that loses
    /// the race gets [`Rejection::ConcurrentConflict`].
    pub async fn exchange_authorization_token(
        &self,
        consumer: &Consumer,
        consumer_secret: &str,
        authorization: &AuthorizationToken,
    ) -> Result<GrantOutcome, EngineError> {
        let flow = GrantFlow::AuthorizationCode;

        if !consumer.verify_secret(consumer_secret) {
            return Ok(reject(consumer, flow, Rejection::InvalidSecret));
        }
        if !authorization.is_valid() {
            return Ok(reject_token(consumer, flow, InvalidTokenReason::Expired));
        }
        if &authorization.details.consumer_key != consumer.key() {
            return Ok(reject_token(consumer, flow, InvalidTokenReason::ForeignConsumer));
        }

        // The plaintext carries the consumer key, permissions and randomness.
        let seed = match cipher::decrypt(&authorization.value, consumer.encryption_key()) {
            Ok(seed) => seed,
            Err(e) => {
                tracing::warn!(
                    "Authorization token for consumer {} did not decrypt: {}",
                    consumer.key(),
                    e
                );
                return Ok(reject_token(consumer, flow, InvalidTokenReason::Undecryptable));
            }
        };

        let pair = self.mint_pair(
            consumer,
            &seed,
            &authorization.details.permissions,
            &authorization.details.user_id,
        )?;

        self.associate(consumer, flow, Origin::Authorization(authorization), &pair)
            .await
    }

    /// Authorization-code grant for a token presented by value.
    pub async fn exchange_authorization_value(
        &self,
        consumer: &Consumer,
        consumer_secret: &str,
        value: &str,
    ) -> Result<GrantOutcome, EngineError> {
        match self.store.find_authorization_token(value).await? {
            Some(token) => {
                self.exchange_authorization_token(consumer, consumer_secret, &token)
                    .await
            }
            None => Ok(reject_token(
                consumer,
                GrantFlow::AuthorizationCode,
                InvalidTokenReason::NotFound,
            )),
        }
    }

    /// Client-credentials grant: issue a pair directly to a privileged
    /// consumer for `user_id`.
    pub async fn issue_client_credentials_token(
        &self,
        consumer: &Consumer,
        consumer_secret: &str,
        user_id: &UserId,
        permissions: &Permissions,
    ) -> Result<GrantOutcome, EngineError> {
        let flow = GrantFlow::ClientCredentials;

        if !consumer.verify_secret(consumer_secret) {
            return Ok(reject(consumer, flow, Rejection::InvalidSecret));
        }
        if !consumer.has_client_credentials_flow_privilege() {
            return Ok(reject(
                consumer,
                flow,
                Rejection::InsufficientPrivilege {
                    privilege: Privilege::ClientCredentialsFlow,
                },
            ));
        }

        let seed = format!("{}{}", consumer.key(), permissions);
        let pair = self.mint_pair(consumer, &seed, permissions, user_id)?;
        let issued = self.store.insert_token_pair(&pair).await?;

        tracing::info!(
            "Issued {} token pair for consumer {} user {}",
            flow,
            consumer.key(),
            user_id
        );
        Ok(GrantOutcome::Issued(issued))
    }

    /// Refresh grant: exchange `refresh` for a new pair, invalidating the
    /// old pair.
    ///
    /// Succeeds at most once per refresh token. Nothing is invalidated
    /// unless the exchange wins; the old pair is retired by the store in
    /// the same step that records the new one.
    pub async fn refresh_access_token(
        &self,
        consumer: &Consumer,
        consumer_secret: &str,
        refresh: &RefreshToken,
    ) -> Result<GrantOutcome, EngineError> {
        let flow = GrantFlow::Refresh;

        if !consumer.verify_secret(consumer_secret) {
            return Ok(reject(consumer, flow, Rejection::InvalidSecret));
        }
        if !refresh.is_valid() {
            return Ok(reject_token(consumer, flow, InvalidTokenReason::Expired));
        }

        // The caller's copy may be stale; the stored one decides.
        let Some(stored) = self.store.find_refresh_token(&refresh.value).await? else {
            return Ok(reject_token(consumer, flow, InvalidTokenReason::NotFound));
        };
        if !stored.is_valid() {
            return Ok(reject_token(consumer, flow, InvalidTokenReason::Expired));
        }

        let Some(old_access) = stored.associated_access_token(&self.store).await? else {
            return Ok(reject_token(consumer, flow, InvalidTokenReason::MissingAccessToken));
        };
        if old_access.details.refresh_token != stored.value {
            return Ok(reject_token(consumer, flow, InvalidTokenReason::MissingAccessToken));
        }
        if &old_access.details.consumer_key != consumer.key() {
            return Ok(reject_token(consumer, flow, InvalidTokenReason::ForeignConsumer));
        }

        let seed = format!("{}{}", consumer.key(), old_access.details.permissions);
        let pair = self.mint_pair(
            consumer,
            &seed,
            &old_access.details.permissions,
            &old_access.details.user_id,
        )?;

        self.associate(consumer, flow, Origin::Refresh(&stored), &pair)
            .await
    }

    /// Refresh grant for a token presented by value.
    pub async fn refresh_access_value(
        &self,
        consumer: &Consumer,
        consumer_secret: &str,
        value: &str,
    ) -> Result<GrantOutcome, EngineError> {
        match self.store.find_refresh_token(value).await? {
            Some(token) => {
                self.refresh_access_token(consumer, consumer_secret, &token)
                    .await
            }
            None => Ok(reject_token(
                consumer,
                GrantFlow::Refresh,
                InvalidTokenReason::NotFound,
            )),
        }
    }

    /// Look up an access token presented to a protected resource.
    ///
    /// Returns `None` unless the token exists and is still valid.
    pub async fn resolve_access_token(
        &self,
        value: &str,
    ) -> Result<Option<AccessToken>, EngineError> {
        let token = self.store.find_access_token(value).await?.filter(|t| t.is_valid());
        if let Some(t) = &token {
            tracing::debug!("Resolved access token for consumer {}", t.details.consumer_key);
        }
        Ok(token)
    }

    /// Invalidate a token and persist the change.
    ///
    /// Use this to retract tokens a caller no longer wants, for example a
    /// pair minted for a request that was abandoned.
    pub async fn invalidate<D: TokenDetails>(
        &self,
        token: &mut Token<D>,
    ) -> Result<(), EngineError> {
        token.invalidate();
        self.store.invalidate(D::KIND, &token.value).await?;
        tracing::debug!("Invalidated {} token", D::KIND);
        Ok(())
    }

    /// `now` plus the configured lifetime of `kind`.
    fn expiry(&self, kind: TokenKind, now: DateTime<Utc>) -> Result<DateTime<Utc>, ConfigError> {
        now.checked_add_signed(self.store.lifetime(kind))
            .ok_or_else(|| ConfigError::InvalidLifetime {
                kind,
                message: "expiration is out of range".to_string(),
            })
    }

    /// Mint access and refresh values from `seed`.
    fn mint_pair(
        &self,
        consumer: &Consumer,
        seed: &str,
        permissions: &Permissions,
        user_id: &UserId,
    ) -> Result<NewTokenPair, EngineError> {
        let access_value = generator::generate(seed, consumer.encryption_key())?;
        let refresh_value = generator::generate(seed, consumer.encryption_key())?;
        let now = Utc::now();
        tracing::debug!("Minted token pair for consumer {} user {}", consumer.key(), user_id);

        Ok(NewTokenPair {
            access_value,
            refresh_value,
            consumer_key: consumer.key().clone(),
            permissions: permissions.clone(),
            user_id: user_id.clone(),
            access_expires_at: self.expiry(TokenKind::Access, now)?,
            refresh_expires_at: self.expiry(TokenKind::Refresh, now)?,
        })
    }

    async fn associate(
        &self,
        consumer: &Consumer,
        flow: GrantFlow,
        origin: Origin<'_>,
        pair: &NewTokenPair,
    ) -> Result<GrantOutcome, EngineError> {
        match self.store.associate_if_unused(origin, pair).await {
            Ok(Association::Associated(issued)) => {
                tracing::info!(
                    "Issued {} token pair for consumer {} user {}",
                    flow,
                    consumer.key(),
                    pair.user_id
                );
                Ok(GrantOutcome::Issued(issued))
            }
            Ok(Association::AlreadyUsed) => {
                Ok(reject(consumer, flow, Rejection::ConcurrentConflict))
            }
            Err(StoreError::NotFound { .. }) => {
                Ok(reject_token(consumer, flow, InvalidTokenReason::NotFound))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl<S: TokenStore + fmt::Debug> fmt::Debug for GrantEngine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrantEngine")
            .field("store", &self.store)
            .finish()
    }
}

fn reject(consumer: &Consumer, flow: GrantFlow, rejection: Rejection) -> GrantOutcome {
    tracing::warn!(
        "Rejected {} grant for consumer {}: {}",
        flow,
        consumer.key(),
        rejection
    );
    GrantOutcome::Rejected(rejection)
}

fn reject_token(consumer: &Consumer, flow: GrantFlow, reason: InvalidTokenReason) -> GrantOutcome {
    reject(consumer, flow, Rejection::InvalidToken { reason })
}
