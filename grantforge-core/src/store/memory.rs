//! In-memory token store implementation.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{Association, NewTokenPair, Origin, StoreError, TokenStore};
use crate::lifetime::TokenLifetimes;
use crate::model::{ConsumerKey, Permissions, UserId};
use crate::token::{
    AccessGrant, AccessToken, AccessTokenPair, AuthorizationGrant, AuthorizationToken,
    RefreshLink, RefreshToken, StoredToken, Token, TokenKind, TokenState,
};

/// A stored token plus the exchanged flag.
///
/// Whether an origin has been exchanged is tracked separately from its
/// expiration, so an invalidated refresh token can still win exactly one
/// association.
#[derive(Debug, Clone)]
struct Record {
    token: StoredToken,
    exchanged: bool,
}

impl Record {
    fn state_at(&self, now: DateTime<Utc>) -> TokenState {
        if self.exchanged {
            TokenState::Exchanged
        } else {
            self.token.state_at(now)
        }
    }
}

/// In-memory token store for testing and development.
///
/// This store is not persistent; data is lost when the process exits.
/// Values are unique across all kinds.
///
/// # Thread Safety
///
/// All state sits behind one `RwLock`. Association and pair insertion take
/// the write lock for their whole check-then-write sequence, which gives
/// the at-most-one-winner guarantee.
pub struct MemoryTokenStore {
    lifetimes: TokenLifetimes,
    tokens: RwLock<HashMap<String, Record>>,
}

impl MemoryTokenStore {
    /// Create a new empty store with the given lifetimes.
    pub fn new(lifetimes: TokenLifetimes) -> Self {
        Self {
            lifetimes,
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// The lifecycle state of a stored token, if it exists.
    pub fn token_state(&self, kind: TokenKind, value: &str) -> Option<TokenState> {
        let tokens = self.tokens.read();
        tokens
            .get(value)
            .filter(|r| r.token.kind() == kind)
            .map(|r| r.state_at(Utc::now()))
    }

    /// Number of stored tokens of the given kind.
    pub fn count(&self, kind: TokenKind) -> usize {
        self.tokens
            .read()
            .values()
            .filter(|r| r.token.kind() == kind)
            .count()
    }

    /// Total number of stored tokens.
    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    /// Whether the store holds no tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }

    fn insert_record(
        tokens: &mut HashMap<String, Record>,
        token: StoredToken,
    ) -> Result<(), StoreError> {
        if tokens.contains_key(token.value()) {
            return Err(StoreError::DuplicateValue { kind: token.kind() });
        }
        tokens.insert(
            token.value().to_string(),
            Record {
                token,
                exchanged: false,
            },
        );
        Ok(())
    }

    fn insert_pair_locked(
        tokens: &mut HashMap<String, Record>,
        pair: &NewTokenPair,
    ) -> Result<AccessTokenPair, StoreError> {
        if tokens.contains_key(&pair.access_value) {
            return Err(StoreError::DuplicateValue {
                kind: TokenKind::Access,
            });
        }
        if tokens.contains_key(&pair.refresh_value) || pair.refresh_value == pair.access_value {
            return Err(StoreError::DuplicateValue {
                kind: TokenKind::Refresh,
            });
        }

        let built = pair.to_pair();
        Self::insert_record(tokens, built.access_token.clone().into())?;
        Self::insert_record(tokens, built.refresh_token.clone().into())?;
        Ok(built)
    }
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new(TokenLifetimes::default())
    }
}

impl std::fmt::Debug for MemoryTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTokenStore")
            .field("lifetimes", &self.lifetimes)
            .field("tokens_count", &self.len())
            .finish()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert_authorization_token(
        &self,
        value: &str,
        consumer_key: &ConsumerKey,
        permissions: &Permissions,
        user_id: &UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<AuthorizationToken, StoreError> {
        let token = Token::new(
            value,
            expires_at,
            AuthorizationGrant {
                consumer_key: consumer_key.clone(),
                permissions: permissions.clone(),
                user_id: user_id.clone(),
            },
        );
        Self::insert_record(&mut self.tokens.write(), token.clone().into())?;
        Ok(token)
    }

    async fn insert_access_token(
        &self,
        value: &str,
        refresh_value: &str,
        consumer_key: &ConsumerKey,
        permissions: &Permissions,
        user_id: &UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<AccessToken, StoreError> {
        let token = Token::new(
            value,
            expires_at,
            AccessGrant {
                consumer_key: consumer_key.clone(),
                permissions: permissions.clone(),
                user_id: user_id.clone(),
                refresh_token: refresh_value.to_string(),
            },
        );
        Self::insert_record(&mut self.tokens.write(), token.clone().into())?;
        Ok(token)
    }

    async fn insert_refresh_token(
        &self,
        value: &str,
        access_value: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken, StoreError> {
        let token = Token::new(
            value,
            expires_at,
            RefreshLink {
                access_token: access_value.to_string(),
            },
        );
        Self::insert_record(&mut self.tokens.write(), token.clone().into())?;
        Ok(token)
    }

    async fn insert_token_pair(
        &self,
        pair: &NewTokenPair,
    ) -> Result<AccessTokenPair, StoreError> {
        Self::insert_pair_locked(&mut self.tokens.write(), pair)
    }

    async fn associate_if_unused(
        &self,
        origin: Origin<'_>,
        pair: &NewTokenPair,
    ) -> Result<Association, StoreError> {
        let mut tokens = self.tokens.write();
        let now = Utc::now();

        let record = tokens
            .get(origin.value())
            .filter(|r| r.token.kind() == origin.kind())
            .ok_or(StoreError::NotFound {
                kind: origin.kind(),
            })?;

        if !record.state_at(now).is_usable() {
            return Ok(Association::AlreadyUsed);
        }
        let paired_access = match &record.token {
            StoredToken::Refresh(t) => Some(t.details.access_token.clone()),
            _ => None,
        };

        let built = Self::insert_pair_locked(&mut tokens, pair)?;

        if let Some(record) = tokens.get_mut(origin.value()) {
            record.exchanged = true;
            record.token.invalidate();
        }
        if let Some(access) = paired_access {
            if let Some(record) = tokens
                .get_mut(&access)
                .filter(|r| r.token.kind() == TokenKind::Access)
            {
                record.token.invalidate();
            }
        }

        Ok(Association::Associated(built))
    }

    async fn lookup_valid_authorization_token(
        &self,
        consumer_key: &ConsumerKey,
        permissions: &Permissions,
        user_id: &UserId,
    ) -> Result<Option<AuthorizationToken>, StoreError> {
        let now = Utc::now();
        let tokens = self.tokens.read();
        let found = tokens
            .values()
            .filter(|r| r.state_at(now).is_usable())
            .filter_map(|r| match &r.token {
                StoredToken::Authorization(t) => Some(t),
                _ => None,
            })
            .filter(|t| {
                &t.details.consumer_key == consumer_key
                    && &t.details.permissions == permissions
                    && &t.details.user_id == user_id
            })
            .max_by_key(|t| t.expires_at)
            .cloned();
        Ok(found)
    }

    async fn get_associated_access_token(
        &self,
        refresh: &RefreshToken,
    ) -> Result<Option<AccessToken>, StoreError> {
        self.find_access_token(&refresh.details.access_token).await
    }

    async fn find_authorization_token(
        &self,
        value: &str,
    ) -> Result<Option<AuthorizationToken>, StoreError> {
        let tokens = self.tokens.read();
        Ok(match tokens.get(value).map(|r| &r.token) {
            Some(StoredToken::Authorization(t)) => Some(t.clone()),
            _ => None,
        })
    }

    async fn find_access_token(&self, value: &str) -> Result<Option<AccessToken>, StoreError> {
        let tokens = self.tokens.read();
        Ok(match tokens.get(value).map(|r| &r.token) {
            Some(StoredToken::Access(t)) => Some(t.clone()),
            _ => None,
        })
    }

    async fn find_refresh_token(&self, value: &str) -> Result<Option<RefreshToken>, StoreError> {
        let tokens = self.tokens.read();
        Ok(match tokens.get(value).map(|r| &r.token) {
            Some(StoredToken::Refresh(t)) => Some(t.clone()),
            _ => None,
        })
    }

    async fn invalidate(&self, kind: TokenKind, value: &str) -> Result<(), StoreError> {
        let mut tokens = self.tokens.write();
        if let Some(record) = tokens.get_mut(value).filter(|r| r.token.kind() == kind) {
            record.token.invalidate();
        }
        Ok(())
    }

    fn lifetime(&self, kind: TokenKind) -> Duration {
        self.lifetimes.get(kind)
    }
}
