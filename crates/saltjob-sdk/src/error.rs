//! SDK error types.
//!
//! [`SaltError`] is the single error type returned by every fallible
//! operation in the SDK. Each variant carries enough context (endpoint,
//! job id, node) to diagnose a failure without re-running it.

use reqwest::StatusCode;
use saltjob_models::{AuthMethod, ModelError};

/// Error type for all SDK operations.
#[derive(Debug, thiserror::Error)]
pub enum SaltError {
    /// Invalid or missing configuration (empty CA bundle, bad URL, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// Network or TLS failure while talking to the API.
    #[error("{verb} {endpoint} failed: {source}")]
    Transport {
        /// HTTP verb of the failed request.
        verb: String,
        /// Endpoint path of the failed request.
        endpoint: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a status other than 200.
    #[error("Salt API failed with code {} on {endpoint}, body: {body}", .status.as_u16())]
    Api {
        /// Endpoint path that answered.
        endpoint: String,
        /// HTTP status returned.
        status: StatusCode,
        /// Raw response body, verbatim.
        body: String,
    },

    /// The response did not have the expected shape.
    #[error("unexpected Salt API response at `{path}`: {detail}")]
    Decode {
        /// Path of the field that was expected.
        path: String,
        /// What was wrong, including the offending tree.
        detail: String,
    },

    /// Login failed, or a request was rejected again after re-authenticating.
    #[error("authentication failed for user {username} ({method}): {source}")]
    Auth {
        /// Username presented at login.
        username: String,
        /// Method of the credential used.
        method: AuthMethod,
        /// Why authentication failed.
        #[source]
        source: Box<SaltError>,
    },

    /// The server does not know the polled job id.
    #[error("job {jid} not found: {reason}")]
    JobNotFound {
        /// Job id that was polled.
        jid: String,
        /// Reason given by the server.
        reason: String,
    },

    /// A state job was blocked by a concurrent run and never executed.
    #[error("job {jid} failed to run on {node}: {reason}")]
    JobFailedToRun {
        /// Job id.
        jid: String,
        /// Node the job targeted.
        node: String,
        /// Output reported by the node.
        reason: String,
    },

    /// The job ran on the node and its outcome was a failure.
    #[error("job {jid} failed on {node}: {reason}")]
    JobFailed {
        /// Job id.
        jid: String,
        /// Node the job targeted.
        node: String,
        /// Root cause extracted from the state output.
        reason: String,
    },

    /// A synchronous command reported failure; the message is the node's.
    #[error("{message}")]
    CommandFailed {
        /// Node the command ran on.
        node: String,
        /// Error message returned by the node.
        message: String,
    },

    /// A model type rejected its input.
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl SaltError {
    pub(crate) fn decode(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// `true` when the remote job itself ended badly, whether it failed to
    /// run or ran and failed. Such errors are terminal for the job.
    pub fn is_job_failure(&self) -> bool {
        matches!(self, Self::JobFailed { .. } | Self::JobFailedToRun { .. })
    }

    /// `true` for errors about the wire protocol: non-200 status or an
    /// unexpected response shape.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Api { .. } | Self::Decode { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_embeds_status_and_body() {
        let err = SaltError::Api {
            endpoint: "/jobs/42".into(),
            status: StatusCode::UNAUTHORIZED,
            body: "error".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Salt API failed with code 401"));
        assert!(msg.contains("/jobs/42"));
        assert!(msg.contains("error"));
        assert!(err.is_protocol());
    }

    #[test]
    fn failed_to_run_is_distinct_from_failed() {
        let blocked = SaltError::JobFailedToRun {
            jid: "1".into(),
            node: "n".into(),
            reason: "busy".into(),
        };
        let failed = SaltError::JobFailed {
            jid: "1".into(),
            node: "n".into(),
            reason: "busy".into(),
        };
        assert!(blocked.to_string().contains("failed to run"));
        assert!(!failed.to_string().contains("failed to run"));
        assert!(blocked.is_job_failure() && failed.is_job_failure());
    }

    #[test]
    fn auth_error_names_user_and_method() {
        let err = SaltError::Auth {
            username: "admin".into(),
            method: AuthMethod::Bearer,
            source: Box::new(SaltError::Config("x".into())),
        };
        let msg = err.to_string();
        assert!(msg.contains("admin"));
        assert!(msg.contains("bearer"));
    }

    #[test]
    fn command_failure_message_is_verbatim() {
        let err = SaltError::CommandFailed {
            node: "n".into(),
            message: "no such device".into(),
        };
        assert_eq!(err.to_string(), "no such device");
    }
}
