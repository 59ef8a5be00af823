//! # Grantforge Core
//!
//! Core library for issuing and exchanging OAuth 2 tokens on behalf of
//! registered consumers.
//!
//! This crate provides:
//! - Consumers, their secrets and capability flags
//! - Authorization, access and refresh tokens with their lifecycle
//! - The token generator and the cipher token values are built with
//! - A storage trait with at-most-once exchange, plus an in-memory store
//! - The grant engine running the authorization-code, client-credentials
//!   and refresh flows
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use grantforge_core::{GrantEngine, MemoryTokenStore, TokenLifetimes, GrantOutcome};
//!
//! let engine = GrantEngine::new(MemoryTokenStore::new(TokenLifetimes::default()));
//! let code = engine.issue_authorization_token(&consumer, &permissions, &user).await?;
//! match engine.exchange_authorization_token(&consumer, secret, &code).await? {
//!     GrantOutcome::Issued(pair) => println!("{}", pair.access_token.value),
//!     GrantOutcome::Rejected(why) => eprintln!("rejected: {}", why),
//! }
//! ```

pub mod cipher;
pub mod consumer;
pub mod engine;
pub mod error;
pub mod generator;
pub mod lifetime;
pub mod model;
pub mod store;
pub mod token;

// Re-export commonly used types at crate root
pub use model::{
    ConsumerKey,
    Permissions,
    Secret,
    UserId,
};

pub use cipher::{
    CipherError,
    EncryptionKey,
};

pub use consumer::{
    Consumer,
    ConsumerCredentials,
    ConsumerPrivileges,
    Privilege,
};

pub use token::{
    AccessGrant,
    AccessToken,
    AccessTokenPair,
    AuthorizationGrant,
    AuthorizationToken,
    RefreshLink,
    RefreshToken,
    StoredToken,
    Token,
    TokenDetails,
    TokenKind,
    TokenState,
};

pub use lifetime::{
    ConfigError,
    TokenLifetimes,
};

pub use store::{
    Association,
    MemoryTokenStore,
    NewTokenPair,
    Origin,
    StoreError,
    TokenStore,
};

pub use engine::{
    EngineError,
    GrantEngine,
    GrantFlow,
    GrantOutcome,
    InvalidTokenReason,
    Rejection,
};

pub use error::GrantforgeError;
