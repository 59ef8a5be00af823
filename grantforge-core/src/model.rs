//! Domain model types for Grantforge.
//!
//! This module defines the identifiers passed through every grant flow:
//! - [`ConsumerKey`] - Public identifier of a registered consumer
//! - [`UserId`] - Identifier of the resource owner granting access
//! - [`Permissions`] - Opaque scope string attached to a grant
//! - [`Secret`] - Wrapper for sensitive values that prevents accidental logging

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Public identifier of a registered consumer.
///
/// Consumer keys are opaque; generated keys are 16 lowercase hex characters.
///
/// # Examples
///
/// ```
/// use grantforge_core::ConsumerKey;
///
/// let key = ConsumerKey::new("6e591afe5374410b");
/// assert_eq!(key.as_str(), "6e591afe5374410b");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsumerKey(String);

impl ConsumerKey {
    /// Create a new consumer key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the consumer key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConsumerKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ConsumerKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Identifier of the user on whose behalf a grant is made.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create a new user ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the user ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Permissions granted by a user to a consumer.
///
/// The engine never interprets this value; it is compared verbatim and
/// mixed into token seeds. Deployments typically use a comma-separated
/// list such as `"read,write"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permissions(String);

impl Permissions {
    /// Create a new permission string.
    pub fn new(permissions: impl Into<String>) -> Self {
        Self(permissions.into())
    }

    /// Get the permissions as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the comma-separated entries, skipping empty ones.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.0.split(',').map(str::trim).filter(|s| !s.is_empty())
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Permissions {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Permissions {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the buffer is zeroed when dropped.
#[derive(Clone, Serialize, Deserialize)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Consume the secret and return the inner value.
    pub fn into_inner(mut self) -> String {
        std::mem::take(&mut self.0)
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

impl From<&str> for Secret {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Secret {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
