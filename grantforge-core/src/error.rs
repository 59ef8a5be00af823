//! Top-level error types for Grantforge.

use thiserror::Error;

use crate::cipher::CipherError;
use crate::engine::EngineError;
use crate::lifetime::ConfigError;
use crate::store::StoreError;

/// Top-level error type encompassing all Grantforge errors.
///
/// Grant rejections are not errors; see [`Rejection`](crate::Rejection).
#[derive(Debug, Error)]
pub enum GrantforgeError {
    /// Error from the token cipher.
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),

    /// Error from token storage operations.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error from a grant flow.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
