//! Registered consumers and their credentials.
//!
//! A consumer is identified by a public key and proves its identity with a
//! secret: the key encrypted under the consumer's [`EncryptionKey`]. The
//! secret is handed to the consumer once and never stored; verification
//! decrypts the presented secret and compares it to the key.
//!
//! A consumer is either a third-party client or an internal privileged
//! consumer. The privileged one acting as the authorization server
//! authenticates users and issues authorization tokens on their behalf.

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use url::Url;
use uuid::Uuid;

use crate::cipher::{self, CipherError, EncryptionKey};
use crate::engine::Rejection;
use crate::model::{ConsumerKey, Secret};

/// Length of a generated consumer key.
pub const CONSUMER_KEY_LEN: usize = 16;

/// Capabilities granted to a consumer at registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerPrivileges {
    /// May issue authorization tokens on behalf of users.
    #[serde(default)]
    pub user_authorization: bool,

    /// May authenticate users with their credentials.
    #[serde(default)]
    pub user_authentication: bool,

    /// May obtain access tokens through the client-credentials grant.
    #[serde(default)]
    pub client_credentials_flow: bool,
}

impl ConsumerPrivileges {
    /// No privileges: a plain third-party consumer.
    pub fn none() -> Self {
        Self::default()
    }

    /// Every privilege: an internal consumer acting as authorization server.
    pub fn all() -> Self {
        Self {
            user_authorization: true,
            user_authentication: true,
            client_credentials_flow: true,
        }
    }
}

/// The privilege a grant flow requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    /// See [`ConsumerPrivileges::user_authorization`].
    UserAuthorization,

    /// See [`ConsumerPrivileges::user_authentication`].
    UserAuthentication,

    /// See [`ConsumerPrivileges::client_credentials_flow`].
    ClientCredentialsFlow,
}

impl std::fmt::Display for Privilege {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UserAuthorization => "user authorization",
            Self::UserAuthentication => "user authentication",
            Self::ClientCredentialsFlow => "client credentials flow",
        };
        write!(f, "{}", s)
    }
}

/// A registered consumer.
///
/// Immutable after construction.
#[derive(Debug, Clone)]
pub struct Consumer {
    key: ConsumerKey,
    domain: String,
    encryption_key: EncryptionKey,
    privileges: ConsumerPrivileges,
}

impl Consumer {
    /// Create a consumer from its registered identity.
    pub fn new(
        key: impl Into<ConsumerKey>,
        domain: impl Into<String>,
        encryption_key: EncryptionKey,
        privileges: ConsumerPrivileges,
    ) -> Self {
        Self {
            key: key.into(),
            domain: domain.into(),
            encryption_key,
            privileges,
        }
    }

    /// Create a consumer whose encryption key is given in hex form.
    pub fn from_hex_key(
        key: impl Into<ConsumerKey>,
        domain: impl Into<String>,
        encryption_key: &str,
        privileges: ConsumerPrivileges,
    ) -> Result<Self, CipherError> {
        Ok(Self::new(
            key,
            domain,
            EncryptionKey::from_hex(encryption_key)?,
            privileges,
        ))
    }

    /// The consumer's public key.
    pub fn key(&self) -> &ConsumerKey {
        &self.key
    }

    /// The registered redirect domain.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The key all of this consumer's tokens are encrypted under.
    pub fn encryption_key(&self) -> &EncryptionKey {
        &self.encryption_key
    }

    /// The consumer's capability flags.
    pub fn privileges(&self) -> ConsumerPrivileges {
        self.privileges
    }

    /// Check a presented consumer secret.
    ///
    /// Malformed or foreign ciphertext is simply invalid.
    pub fn verify_secret(&self, candidate: &str) -> bool {
        match cipher::decrypt(candidate, &self.encryption_key) {
            Ok(decrypted) => decrypted
                .as_bytes()
                .ct_eq(self.key.as_str().as_bytes())
                .into(),
            Err(e) => {
                tracing::debug!("Secret for consumer {} did not decrypt: {}", self.key, e);
                false
            }
        }
    }

    /// Check that `url` points at the registered domain.
    ///
    /// Fails for unparsable URLs and URLs without a host; the host is
    /// compared case-insensitively.
    pub fn verify_redirect_url(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => parsed
                .host_str()
                .is_some_and(|host| host.eq_ignore_ascii_case(&self.domain)),
            Err(_) => false,
        }
    }

    /// Whether this consumer may issue authorization tokens for users.
    pub fn has_user_authorization_privilege(&self) -> bool {
        self.privileges.user_authorization
    }

    /// Whether this consumer may authenticate users by their credentials.
    pub fn has_user_authentication_privilege(&self) -> bool {
        self.privileges.user_authentication
    }

    /// Whether this consumer may use the client-credentials grant.
    pub fn has_client_credentials_flow_privilege(&self) -> bool {
        self.privileges.client_credentials_flow
    }

    /// Whether this consumer holds `privilege`.
    pub fn has_privilege(&self, privilege: Privilege) -> bool {
        match privilege {
            Privilege::UserAuthorization => self.has_user_authorization_privilege(),
            Privilege::UserAuthentication => self.has_user_authentication_privilege(),
            Privilege::ClientCredentialsFlow => self.has_client_credentials_flow_privilege(),
        }
    }

    /// Check that this consumer may act as the authorization server.
    ///
    /// The authorization server must present its own secret and hold the
    /// user-authorization privilege before it issues authorization tokens.
    pub fn authenticate_authorization_server(&self, secret: &str) -> Result<(), Rejection> {
        if !self.verify_secret(secret) {
            return Err(Rejection::InvalidSecret);
        }
        if !self.has_user_authorization_privilege() {
            return Err(Rejection::InsufficientPrivilege {
                privilege: Privilege::UserAuthorization,
            });
        }
        Ok(())
    }
}

/// Freshly generated identity material for a new consumer.
#[derive(Debug, Clone)]
pub struct ConsumerCredentials {
    /// 16-character public key.
    pub key: ConsumerKey,

    /// Key derived for this consumer.
    pub encryption_key: EncryptionKey,

    /// The key encrypted under the encryption key; given to the consumer.
    pub secret: Secret,
}

impl ConsumerCredentials {
    /// Generate a new key, encryption key and secret.
    pub fn generate() -> Result<Self, CipherError> {
        let simple = Uuid::new_v4().simple().to_string();
        let key = ConsumerKey::new(&simple[..CONSUMER_KEY_LEN]);
        let encryption_key = EncryptionKey::derive(key.as_str());
        let secret = Secret::new(cipher::encrypt(key.as_str(), &encryption_key)?);

        Ok(Self {
            key,
            encryption_key,
            secret,
        })
    }

    /// Build a consumer from these credentials.
    pub fn into_consumer(
        self,
        domain: impl Into<String>,
        privileges: ConsumerPrivileges,
    ) -> (Consumer, Secret) {
        let consumer = Consumer::new(self.key, domain, self.encryption_key, privileges);
        (consumer, self.secret)
    }
}
