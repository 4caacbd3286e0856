//! Client configuration.
//!
//! A [`ClientConfig`] carries the API address, the CA bundle the TLS
//! transport trusts, and request timeouts.
//!
//! | Variable       | Default                 | Description              |
//! |----------------|-------------------------|--------------------------|
//! | `SALT_API_URL` | `https://salt-api:8000` | Address of the Salt API  |

use std::path::Path;
use std::time::Duration;

use reqwest::{Certificate, Url};

use crate::error::SaltError;

/// Environment variable consulted when no address is given explicitly.
pub const SALT_API_URL_ENV: &str = "SALT_API_URL";

/// Address used when neither an explicit address nor the environment
/// provides one.
pub const DEFAULT_SALT_API_URL: &str = "https://salt-api:8000";

/// Execution function used by `get_device_name`.
pub const DEFAULT_DEVICE_NAME_FUNCTION: &str = "devices.get_name";

/// PEM-encoded certificate authorities trusted by the client.
///
/// The client trusts these and nothing else; there is no fallback to
/// system roots.
#[derive(Clone)]
pub struct CaBundle {
    pem: Vec<u8>,
}

impl CaBundle {
    /// Wrap raw PEM bytes. Validation happens in [`CaBundle::certificates`].
    pub fn from_pem(pem: impl Into<Vec<u8>>) -> Self {
        Self { pem: pem.into() }
    }

    /// Read a PEM bundle from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SaltError> {
        let path = path.as_ref();
        let pem = std::fs::read(path).map_err(|e| {
            SaltError::Config(format!("failed to read CA bundle {}: {e}", path.display()))
        })?;
        Ok(Self::from_pem(pem))
    }

    /// `true` if no CA material was supplied.
    pub fn is_empty(&self) -> bool {
        self.pem.iter().all(u8::is_ascii_whitespace)
    }

    /// Parse every certificate in the bundle.
    ///
    /// Fails when the bundle is empty or contains no certificate.
    pub fn certificates(&self) -> Result<Vec<Certificate>, SaltError> {
        if self.is_empty() {
            return Err(SaltError::Config("CA certificate bundle is empty".into()));
        }
        let certs = Certificate::from_pem_bundle(&self.pem)
            .map_err(|e| SaltError::Config(format!("invalid CA certificate bundle: {e}")))?;
        if certs.is_empty() {
            return Err(SaltError::Config(
                "CA certificate bundle contains no certificate".into(),
            ));
        }
        Ok(certs)
    }
}

impl std::fmt::Debug for CaBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaBundle")
            .field("bytes", &self.pem.len())
            .finish()
    }
}

/// Everything needed to build a [`SaltClient`](crate::SaltClient) apart
/// from the credential.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base address of the API; always ends with `/`.
    pub base_url: Url,
    /// Trust anchors for the TLS transport.
    pub ca: CaBundle,
    /// Timeout hint sent to the server as the `timeout` query parameter.
    pub server_timeout: Duration,
    /// Client-side limit for a single HTTP exchange.
    pub request_timeout: Duration,
    /// Function dispatched by `get_device_name`.
    pub device_name_function: String,
}

impl ClientConfig {
    /// Build a configuration, resolving the address with
    /// [`resolve_address`](Self::resolve_address).
    pub fn new(address: Option<&str>, ca: CaBundle) -> Result<Self, SaltError> {
        if ca.is_empty() {
            return Err(SaltError::Config("CA certificate bundle is empty".into()));
        }
        Ok(Self {
            base_url: Self::resolve_address(address)?,
            ca,
            server_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            device_name_function: DEFAULT_DEVICE_NAME_FUNCTION.to_string(),
        })
    }

    /// Explicit address, else `SALT_API_URL`, else [`DEFAULT_SALT_API_URL`].
    pub fn resolve_address(explicit: Option<&str>) -> Result<Url, SaltError> {
        resolve_address_from(explicit, std::env::var(SALT_API_URL_ENV).ok())
    }

    /// Override the server-side timeout hint.
    #[must_use]
    pub fn with_server_timeout(mut self, timeout: Duration) -> Self {
        self.server_timeout = timeout;
        self
    }

    /// Override the per-request transport timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override the function used to resolve device names.
    #[must_use]
    pub fn with_device_name_function(mut self, function: impl Into<String>) -> Self {
        self.device_name_function = function.into();
        self
    }
}

fn resolve_address_from(explicit: Option<&str>, env: Option<String>) -> Result<Url, SaltError> {
    let raw = explicit
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| env.filter(|s| !s.is_empty()))
        .unwrap_or_else(|| DEFAULT_SALT_API_URL.to_string());

    // A trailing slash keeps any path prefix when endpoints are joined.
    let normalised = if raw.ends_with('/') {
        raw
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalised)
        .map_err(|e| SaltError::Config(format!("invalid Salt API address \"{normalised}\": {e}")))
}
