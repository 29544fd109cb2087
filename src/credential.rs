//! Credential methods and per-method credential instances.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A distinct way of authenticating a user.
///
/// The set of methods is closed at compile time; whether a method is carried
/// by the current schema is decided at runtime by the evolution engine, so
/// adding or removing a method is a data change, not a structural one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    UsernamePassword,
    EmailPassword,
    GithubOauth,
}

impl Method {
    /// Every method the crate knows about, in schema order.
    pub const ALL: [Method; 3] = [
        Method::UsernamePassword,
        Method::EmailPassword,
        Method::GithubOauth,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UsernamePassword => "username_password",
            Self::EmailPassword => "email_password",
            Self::GithubOauth => "github_oauth",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One concrete registration of a method for one user.
///
/// Secret material is opaque to this crate: hashing and verification belong
/// to external collaborators, the store only holds and swaps the blob.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialInstance {
    pub(crate) cid: Uuid,
    pub(crate) uid: Uuid,
    pub(crate) method: Method,
    pub(crate) identifier: String,
    #[serde(skip)]
    pub(crate) secret: SecretString,
    pub(crate) verified: bool,
    pub(crate) disabled: bool,
    pub(crate) created: DateTime<Utc>,
    pub(crate) last_update: DateTime<Utc>,
    pub(crate) last_authentication: DateTime<Utc>,
}

impl CredentialInstance {
    pub(crate) fn new(uid: Uuid, method: Method, identifier: String, secret: SecretString) -> Self {
        let now = Utc::now();
        Self {
            cid: Uuid::new_v4(),
            uid,
            method,
            identifier,
            secret,
            verified: false,
            disabled: false,
            created: now,
            last_update: now,
            last_authentication: now,
        }
    }

    #[must_use]
    pub fn cid(&self) -> Uuid {
        self.cid
    }

    /// The owning user.
    #[must_use]
    pub fn uid(&self) -> Uuid {
        self.uid
    }

    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// The method-natural key: username, email, or provider id.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    #[must_use]
    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    #[must_use]
    pub fn verified(&self) -> bool {
        self.verified
    }

    #[must_use]
    pub fn disabled(&self) -> bool {
        self.disabled
    }

    #[must_use]
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    #[must_use]
    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    #[must_use]
    pub fn last_authentication(&self) -> DateTime<Utc> {
        self.last_authentication
    }

    /// Overwrites the verification flag and bumps `last_update`.
    ///
    /// Normal operation only moves this flag forward through
    /// [`AuthStore::mark_verified`](crate::store::AuthStore::mark_verified);
    /// this setter exists for schema backfills.
    pub fn set_verified(&mut self, verified: bool) {
        self.verified = verified;
        self.last_update = Utc::now();
    }

    /// Overwrites the disabled flag and bumps `last_update`. Exposed for
    /// schema backfills; regular toggling goes through
    /// [`AuthStore::set_disabled`](crate::store::AuthStore::set_disabled).
    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
        self.last_update = Utc::now();
    }
}
