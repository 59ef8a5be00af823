//! Token lifetime configuration.
//!
//! Lifetimes are supplied by the deployment and injected into the token
//! store. In configuration files they are written in seconds:
//!
//! ```toml
//! [lifetimes]
//! authorization_secs = 600
//! access_secs = 3600
//! refresh_secs = 1209600
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::token::TokenKind;

/// Longest accepted lifetime: 100 years.
pub const MAX_LIFETIME_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Error type for invalid configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A lifetime is zero, too long, or cannot be added to the current time.
    #[error("invalid {kind} token lifetime: {message}")]
    InvalidLifetime { kind: TokenKind, message: String },
}

/// Lifetimes of the three token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLifetimes {
    /// Seconds an authorization token stays valid.
    #[serde(default = "default_authorization_secs")]
    pub authorization_secs: u64,

    /// Seconds an access token stays valid.
    #[serde(default = "default_access_secs")]
    pub access_secs: u64,

    /// Seconds a refresh token stays valid.
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
}

fn default_authorization_secs() -> u64 {
    10 * 60
}

fn default_access_secs() -> u64 {
    60 * 60
}

fn default_refresh_secs() -> u64 {
    14 * 24 * 60 * 60
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            authorization_secs: default_authorization_secs(),
            access_secs: default_access_secs(),
            refresh_secs: default_refresh_secs(),
        }
    }
}

impl TokenLifetimes {
    /// Create lifetimes from explicit second counts.
    pub fn new(authorization_secs: u64, access_secs: u64, refresh_secs: u64) -> Self {
        Self {
            authorization_secs,
            access_secs,
            refresh_secs,
        }
    }

    /// Check that every lifetime is positive and at most
    /// [`MAX_LIFETIME_SECS`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in [TokenKind::Authorization, TokenKind::Access, TokenKind::Refresh] {
            let secs = self.secs(kind);
            if secs == 0 {
                return Err(ConfigError::InvalidLifetime {
                    kind,
                    message: "must be greater than zero".to_string(),
                });
            }
            if secs > MAX_LIFETIME_SECS {
                return Err(ConfigError::InvalidLifetime {
                    kind,
                    message: format!(
                        "{} seconds exceeds the maximum of {}",
                        secs, MAX_LIFETIME_SECS
                    ),
                });
            }
        }
        Ok(())
    }

    /// The lifetime of the given kind in seconds.
    pub fn secs(&self, kind: TokenKind) -> u64 {
        match kind {
            TokenKind::Authorization => self.authorization_secs,
            TokenKind::Access => self.access_secs,
            TokenKind::Refresh => self.refresh_secs,
        }
    }

    /// The lifetime of the given kind.
    ///
    /// Out-of-range values saturate to the largest representable duration,
    /// which no expiration can be computed from; call
    /// [`validate`](Self::validate) at load time to reject them.
    pub fn get(&self, kind: TokenKind) -> Duration {
        i64::try_from(self.secs(kind))
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }
}
