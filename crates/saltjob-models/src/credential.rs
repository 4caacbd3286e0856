//! Identity presented to the Salt API at login.
//!
//! A [`Credential`] pairs a username with an opaque secret and the
//! [`AuthMethod`] that secret is meant for. The only method the client
//! speaks is [`AuthMethod::Bearer`]: the secret is a service-account token
//! that the `kubernetes_rbac` eauth backend validates against the cluster.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Supported ways of presenting a secret at login.
///
/// The enum is closed on purpose: a credential can only be built from a
/// variant listed here, so an unsupported method fails at parse time
/// instead of being silently replaced by a default.
///
/// # Examples
///
/// ```
/// use saltjob_models::AuthMethod;
///
/// let method: AuthMethod = "bearer".parse().unwrap();
/// assert_eq!(method, AuthMethod::Bearer);
/// assert!("basic".parse::<AuthMethod>().is_err());
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AuthMethod {
    /// The secret is a bearer token.
    Bearer,
}

impl AuthMethod {
    /// Parse a method name, mapping unknown names to
    /// [`ModelError::UnsupportedAuthMethod`].
    pub fn parse(name: &str) -> Result<Self, ModelError> {
        Self::from_str(name).map_err(|_| ModelError::UnsupportedAuthMethod(name.to_string()))
    }
}

/// Login identity: username, opaque secret and method.
///
/// Immutable once constructed. The secret is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    username: String,
    secret: String,
    method: AuthMethod,
}

impl Credential {
    /// Build a credential, rejecting an empty username or secret.
    pub fn new(
        username: impl Into<String>,
        secret: impl Into<String>,
        method: AuthMethod,
    ) -> Result<Self, ModelError> {
        let username = username.into();
        let secret = secret.into();
        if username.is_empty() {
            return Err(ModelError::MissingField {
                field: "username".into(),
            });
        }
        if secret.is_empty() {
            return Err(ModelError::MissingField {
                field: "secret".into(),
            });
        }
        Ok(Self {
            username,
            secret,
            method,
        })
    }

    /// Shorthand for a [`AuthMethod::Bearer`] credential.
    pub fn bearer(
        username: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, ModelError> {
        Self::new(username, token, AuthMethod::Bearer)
    }

    /// Build a credential from an untyped method name, as read from
    /// configuration.
    pub fn from_parts(username: &str, secret: &str, method: &str) -> Result<Self, ModelError> {
        Self::new(username, secret, AuthMethod::parse(method)?)
    }

    /// The login username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The opaque secret.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// How the secret is presented.
    pub fn method(&self) -> AuthMethod {
        self.method
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("method", &self.method)
            .finish()
    }
}
