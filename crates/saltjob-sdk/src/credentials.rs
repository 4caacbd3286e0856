//! Where login credentials come from.
//!
//! The client does not care whether the identity was mounted from a
//! secret, passed on a command line or read from the environment; it asks
//! a [`CredentialSource`] once, at construction.

use saltjob_models::{AuthMethod, Credential};

use crate::error::SaltError;

/// Environment variable holding the login username.
pub const USERNAME_ENV: &str = "SALT_API_USERNAME";
/// Environment variable holding the login secret.
pub const TOKEN_ENV: &str = "SALT_API_TOKEN";
/// Environment variable overriding the authentication method.
pub const AUTH_METHOD_ENV: &str = "SALT_API_AUTH_METHOD";

/// Supplies the identity the client logs in with.
pub trait CredentialSource {
    /// Produce the credential, or explain why none is available.
    fn credential(&self) -> Result<Credential, SaltError>;
}

impl CredentialSource for Credential {
    fn credential(&self) -> Result<Credential, SaltError> {
        Ok(self.clone())
    }
}

/// A fixed username and bearer token.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    username: String,
    token: String,
}

impl StaticCredentials {
    /// Wrap a username and bearer token.
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }
}

impl CredentialSource for StaticCredentials {
    fn credential(&self) -> Result<Credential, SaltError> {
        Ok(Credential::new(
            self.username.as_str(),
            self.token.as_str(),
            AuthMethod::Bearer,
        )?)
    }
}

/// Reads `SALT_API_USERNAME`, `SALT_API_TOKEN` and, optionally,
/// `SALT_API_AUTH_METHOD` (default `bearer`).
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn credential(&self) -> Result<Credential, SaltError> {
        credential_from_vars(
            std::env::var(USERNAME_ENV).ok(),
            std::env::var(TOKEN_ENV).ok(),
            std::env::var(AUTH_METHOD_ENV).ok(),
        )
    }
}

fn credential_from_vars(
    username: Option<String>,
    token: Option<String>,
    method: Option<String>,
) -> Result<Credential, SaltError> {
    let username =
        username.ok_or_else(|| SaltError::Config(format!("{USERNAME_ENV} is not set")))?;
    let token = token.ok_or_else(|| SaltError::Config(format!("{TOKEN_ENV} is not set")))?;
    let method = method.as_deref().unwrap_or("bearer");
    Ok(Credential::from_parts(&username, &token, method)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use saltjob_models::ModelError;

    #[test]
    fn static_credentials_are_bearer() {
        let cred = StaticCredentials::new("admin", "tok").credential().unwrap();
        assert_eq!(cred.username(), "admin");
        assert_eq!(cred.secret(), "tok");
        assert_eq!(cred.method(), AuthMethod::Bearer);
    }

    #[test]
    fn credential_is_its_own_source() {
        let cred = Credential::bearer("admin", "tok").unwrap();
        assert_eq!(cred.credential().unwrap(), cred);
    }

    #[test]
    fn vars_default_to_bearer() {
        let cred = credential_from_vars(Some("u".into()), Some("t".into()), None).unwrap();
        assert_eq!(cred.method(), AuthMethod::Bearer);
    }

    #[test]
    fn missing_vars_are_config_errors() {
        assert!(matches!(
            credential_from_vars(None, Some("t".into()), None),
            Err(SaltError::Config(_))
        ));
        assert!(matches!(
            credential_from_vars(Some("u".into()), None, None),
            Err(SaltError::Config(_))
        ));
    }

    #[test]
    fn unsupported_method_is_model_error() {
        let err = credential_from_vars(Some("u".into()), Some("t".into()), Some("basic".into()))
            .unwrap_err();
        assert!(matches!(
            err,
            SaltError::Model(ModelError::UnsupportedAuthMethod(_))
        ));
    }
}
