//! Authenticated HTTP client for the Salt API.
//!
//! [`SaltClient`] handles login, session-token reuse and the single
//! re-authentication allowed after a `401`, and exposes job submission and
//! polling on top of it.
//!
//! # Typical usage
//!
//! ```rust,no_run
//! use saltjob_sdk::{CaBundle, ClientConfig, SaltClient, StaticCredentials};
//!
//! # async fn run() -> Result<(), saltjob_sdk::SaltError> {
//! let config = ClientConfig::new(
//!     Some("https://salt-api:8000"),
//!     CaBundle::from_file("/etc/salt-api/ca.pem")?,
//! )?;
//! let client = SaltClient::new(config, &StaticCredentials::new("operator", "sa-token"))?;
//!
//! let handle = client
//!     .submit_job("Ping", "node-1", "test.ping", serde_json::Map::new())
//!     .await?;
//! // Persist `handle.to_string()`; on a later pass:
//! match client.poll_job(&handle, "node-1").await? {
//!     None => println!("still running"),
//!     Some(result) => println!("done: {result}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Cancellation
//!
//! Every operation is an `async fn` whose only suspension points are HTTP
//! exchanges. Dropping the future (for instance when a surrounding
//! `tokio::time::timeout` elapses) aborts the exchange in flight.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode, Url};
use saltjob_models::{AuthToken, Credential, JobHandle, JobRequest, LoginRequest};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::credentials::CredentialSource;
use crate::decode;
use crate::error::SaltError;

/// Header carrying the session token.
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

const APPLICATION_JSON: &str = "application/json";

/// A Salt API session.
///
/// Clones share the same session token, so one login serves every clone.
/// The token is only read and replaced under a lock: concurrent callers
/// that find it missing or expired perform a single login between them.
#[derive(Clone)]
pub struct SaltClient {
    http: reqwest::Client,
    base_url: Url,
    credential: Credential,
    session: Arc<Mutex<Option<AuthToken>>>,
    server_timeout: Duration,
    device_name_function: String,
}

impl SaltClient {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Build a client trusting only the CA bundle in `config`.
    ///
    /// No connection is made until the first operation.
    pub fn new(config: ClientConfig, credentials: &impl CredentialSource) -> Result<Self, SaltError> {
        let credential = credentials.credential()?;

        let mut builder = reqwest::Client::builder()
            .tls_built_in_root_certs(false)
            .timeout(config.request_timeout);
        for cert in config.ca.certificates()? {
            builder = builder.add_root_certificate(cert);
        }
        let http = builder
            .build()
            .map_err(|e| SaltError::Config(format!("failed to build HTTP client: {e}")))?;

        debug!(base_url = %config.base_url, username = %credential.username(), "Salt API client created");

        Ok(Self {
            http,
            base_url: config.base_url,
            credential,
            session: Arc::new(Mutex::new(None)),
            server_timeout: config.server_timeout,
            device_name_function: config.device_name_function,
        })
    }

    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    /// Submit an asynchronous job and return its handle.
    ///
    /// `name` is the logical operation name recorded in the handle; the
    /// server only sees `target`, `function` and `kwargs`.
    pub async fn submit_job(
        &self,
        name: &str,
        target: &str,
        function: &str,
        kwargs: Map<String, Value>,
    ) -> Result<JobHandle, SaltError> {
        let body = JobRequest::local_async(target, function, kwargs);
        let tree = self
            .authenticated_request(Method::POST, "", Some(&body))
            .await?;
        let jid = decode::extract_jid(&tree)?;

        info!(job = name, node = target, function, jid = %jid, "job submitted");
        Ok(JobHandle::new(name, jid))
    }

    /// Look up a job's outcome on one node.
    ///
    /// Returns `Ok(None)` while the job is still running. Deciding when to
    /// poll again is up to the caller.
    pub async fn poll_job(
        &self,
        handle: &JobHandle,
        target: &str,
    ) -> Result<Option<Value>, SaltError> {
        let endpoint = format!("jobs/{}", handle.id());
        let tree = self
            .authenticated_request::<()>(Method::GET, &endpoint, None)
            .await?;

        let outcome = decode::parse_poll_answer(&tree, handle.id(), target);
        match &outcome {
            Ok(None) => debug!(jid = handle.id(), node = target, "job still running"),
            Ok(Some(_)) => info!(job = handle.name(), jid = handle.id(), node = target, "job finished"),
            Err(SaltError::JobNotFound { reason, .. }) => {
                warn!(jid = handle.id(), node = target, reason = %reason, "job unknown to server");
            }
            Err(e) => debug!(jid = handle.id(), node = target, error = %e, "job did not succeed"),
        }
        outcome
    }

    /// Resolve the kernel device name behind `device_path` on a node.
    ///
    /// Runs synchronously on the node (`client: local`), so no handle is
    /// involved.
    pub async fn get_device_name(&self, target: &str, device_path: &str) -> Result<String, SaltError> {
        let body = JobRequest::local(
            target,
            self.device_name_function.as_str(),
            vec![device_path.to_string()],
        );
        let tree = self
            .authenticated_request(Method::POST, "", Some(&body))
            .await?;
        decode::extract_device_name(&tree, target)
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Send a request with the session token, logging in first if needed.
    ///
    /// A `401` discards the token, triggers exactly one new login and one
    /// retry. A second `401` is reported as [`SaltError::Auth`].
    async fn authenticated_request<T: Serialize + ?Sized>(
        &self,
        verb: Method,
        endpoint: &str,
        payload: Option<&T>,
    ) -> Result<Value, SaltError> {
        let token = self.session_token().await?;
        let response = self.send(&verb, endpoint, payload, Some(token.as_str())).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return decode::decode_api_response(response, &verb, endpoint).await;
        }

        warn!(verb = %verb, endpoint, "session token rejected, re-authenticating");
        let token = self.reauthenticate(&token).await?;
        let response = self.send(&verb, endpoint, payload, Some(token.as_str())).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.discard_token(&token).await;
            let body = response.text().await.unwrap_or_default();
            return Err(self.auth_error(SaltError::Api {
                endpoint: format!("/{endpoint}"),
                status: StatusCode::UNAUTHORIZED,
                body,
            }));
        }
        decode::decode_api_response(response, &verb, endpoint).await
    }

    /// Current token value, logging in when none is held or it expired.
    async fn session_token(&self) -> Result<String, SaltError> {
        let mut session = self.session.lock().await;
        if let Some(token) = session.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.value().to_string());
        }
        *session = None;
        let token = self.authenticate().await?;
        let value = token.value().to_string();
        *session = Some(token);
        Ok(value)
    }

    /// Replace a token the server rejected.
    ///
    /// If another caller already replaced it, the newer token is reused
    /// instead of logging in again.
    async fn reauthenticate(&self, rejected: &str) -> Result<String, SaltError> {
        let mut session = self.session.lock().await;
        if let Some(token) = session
            .as_ref()
            .filter(|t| t.value() != rejected && !t.is_expired())
        {
            return Ok(token.value().to_string());
        }
        *session = None;
        let token = self.authenticate().await?;
        let value = token.value().to_string();
        *session = Some(token);
        Ok(value)
    }

    async fn discard_token(&self, rejected: &str) {
        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(|t| t.value() == rejected) {
            *session = None;
        }
    }

    /// `POST /login`. Never retried here; failures carry the username and
    /// method.
    async fn authenticate(&self) -> Result<AuthToken, SaltError> {
        let body = LoginRequest::new(self.credential.username(), self.credential.secret());
        let token = async {
            let response = self.send(&Method::POST, "login", Some(&body), None).await?;
            let tree = decode::decode_api_response(response, &Method::POST, "login").await?;
            decode::extract_token(&tree)
        }
        .await
        .map_err(|e| self.auth_error(e))?;

        info!(
            username = %self.credential.username(),
            expires_at = %token.expires_at(),
            "authenticated against Salt API"
        );
        Ok(token)
    }

    fn auth_error(&self, source: SaltError) -> SaltError {
        SaltError::Auth {
            username: self.credential.username().to_string(),
            method: self.credential.method(),
            source: Box::new(source),
        }
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Absolute URL of `endpoint`, with the server timeout hint.
    fn endpoint_url(&self, endpoint: &str) -> Result<Url, SaltError> {
        let mut url = self
            .base_url
            .join(endpoint)
            .map_err(|e| SaltError::Config(format!("invalid endpoint \"{endpoint}\": {e}")))?;
        url.query_pairs_mut()
            .append_pair("timeout", &self.server_timeout.as_secs().to_string());
        Ok(url)
    }

    async fn send<T: Serialize + ?Sized>(
        &self,
        verb: &Method,
        endpoint: &str,
        payload: Option<&T>,
        token: Option<&str>,
    ) -> Result<Response, SaltError> {
        let url = self.endpoint_url(endpoint)?;
        debug!(verb = %verb, endpoint, authenticated = token.is_some(), "Salt API request");

        let mut request = self
            .http
            .request(verb.clone(), url)
            .header(ACCEPT, APPLICATION_JSON)
            .header(CONTENT_TYPE, APPLICATION_JSON);
        if let Some(token) = token {
            request = request.header(AUTH_TOKEN_HEADER, token);
        }
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        request.send().await.map_err(|source| SaltError::Transport {
            verb: verb.to_string(),
            endpoint: format!("/{endpoint}"),
            source,
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Base address of the API.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The credential this client logs in with.
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// `true` if a non-expired session token is currently held.
    pub async fn has_session(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.is_expired())
    }
}

impl std::fmt::Debug for SaltClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaltClient")
            .field("base_url", &self.base_url.as_str())
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaBundle;
    use crate::credentials::StaticCredentials;

    const CA_PEM: &[u8] = include_bytes!("../tests/fixtures/ca.pem");

    fn client(address: &str) -> SaltClient {
        let config = ClientConfig::new(Some(address), CaBundle::from_pem(CA_PEM)).unwrap();
        SaltClient::new(config, &StaticCredentials::new("admin", "tok")).unwrap()
    }

    #[test]
    fn endpoint_url_keeps_prefix_and_adds_timeout() {
        let client = client("https://master:8000/api");
        assert_eq!(
            client.endpoint_url("jobs/123").unwrap().as_str(),
            "https://master:8000/api/jobs/123?timeout=10"
        );
        assert_eq!(
            client.endpoint_url("").unwrap().as_str(),
            "https://master:8000/api/?timeout=10"
        );
        assert_eq!(
            client.endpoint_url("login").unwrap().as_str(),
            "https://master:8000/api/login?timeout=10"
        );
    }

    #[test]
    fn invalid_ca_prevents_construction() {
        let config = ClientConfig::new(Some("https://m"), CaBundle::from_pem("junk")).unwrap();
        let err = SaltClient::new(config, &StaticCredentials::new("admin", "tok")).unwrap_err();
        assert!(matches!(err, SaltError::Config(_)));
    }

    #[test]
    fn bad_credentials_prevent_construction() {
        let config = ClientConfig::new(Some("https://m"), CaBundle::from_pem(CA_PEM)).unwrap();
        let err = SaltClient::new(config, &StaticCredentials::new("", "tok")).unwrap_err();
        assert!(matches!(err, SaltError::Model(_)));
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let printed = format!("{:?}", client("https://m"));
        assert!(printed.contains("admin"));
        assert!(!printed.contains("tok\""));
    }

    #[tokio::test]
    async fn new_client_holds_no_session() {
        assert!(!client("https://m").has_session().await);
    }
}
