//! Salt API request bodies and typed response entries.
//!
//! Responses arrive as loosely-typed JSON trees. The client first decodes
//! the body into a [`serde_json::Value`], then deserializes one entry at a
//! time into the structs below so that every missing or mistyped field is
//! reported against the path where it was expected.
//!
//! | Call | Entry type |
//! |------|------------|
//! | `POST /login` | `{"return":[LoginEntry]}` |
//! | `POST /` (`local_async`) | `{"return":[SubmitEntry]}` |
//! | `POST /` (`local`) | `{"return":[{<node>: CommandEntry}]}` |
//! | `GET /jobs/<jid>` | `{"info":[PollEntry]}`, `Result.<node>` is a `NodeOutcome` |

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// External authentication backend the API delegates logins to.
pub const EAUTH_BACKEND: &str = "kubernetes_rbac";

/// Dispatch function that runs a state file on a node.
pub const STATE_SLS: &str = "state.sls";

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Body of `POST /login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    /// Authentication backend, always [`EAUTH_BACKEND`].
    pub eauth: &'a str,
    /// Login username.
    pub username: &'a str,
    /// The credential secret.
    pub token: &'a str,
}

impl<'a> LoginRequest<'a> {
    /// Build a login body for the given username and secret.
    pub fn new(username: &'a str, secret: &'a str) -> Self {
        Self {
            eauth: EAUTH_BACKEND,
            username,
            token: secret,
        }
    }
}

/// How the API should dispatch a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClientMode {
    /// Return immediately with a jid; the outcome is polled later.
    #[serde(rename = "local_async")]
    LocalAsync,
    /// Block until the node answers and return its output inline.
    #[serde(rename = "local")]
    Local,
}

/// Body of `POST /` for both asynchronous and synchronous jobs.
#[derive(Debug, Clone, Serialize)]
pub struct JobRequest {
    /// Dispatch mode.
    pub client: ClientMode,
    /// Target node.
    pub tgt: String,
    /// Execution function, e.g. `state.sls`.
    pub fun: String,
    /// Keyword arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kwarg: Option<Map<String, Value>>,
    /// Positional arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arg: Option<Vec<String>>,
}

impl JobRequest {
    /// An asynchronous job with keyword arguments.
    pub fn local_async(
        target: impl Into<String>,
        function: impl Into<String>,
        kwargs: Map<String, Value>,
    ) -> Self {
        Self {
            client: ClientMode::LocalAsync,
            tgt: target.into(),
            fun: function.into(),
            kwarg: Some(kwargs),
            arg: None,
        }
    }

    /// A synchronous job with positional arguments.
    pub fn local(target: impl Into<String>, function: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            client: ClientMode::Local,
            tgt: target.into(),
            fun: function.into(),
            kwarg: None,
            arg: Some(args),
        }
    }
}

// ---------------------------------------------------------------------------
// Response entries
// ---------------------------------------------------------------------------

/// `return[0]` of a login answer.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginEntry {
    /// Session token.
    pub token: String,
    /// Expiry in seconds since the Unix epoch.
    pub expire: f64,
}

/// `return[0]` of an asynchronous submission.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitEntry {
    /// Server-assigned job id.
    pub jid: String,
}

/// `return[0].<node>` of a synchronous command.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandEntry {
    /// Whether the command succeeded on the node.
    pub success: bool,
    /// Command output on success, error message otherwise.
    pub result: String,
}

/// `info[0]` of a job lookup.
///
/// The server answers either with `Error` alone (unknown jid) or with
/// `Function` and `Result`; an empty `Result` means the job is still
/// running.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollEntry {
    /// Lookup error reported by the server.
    #[serde(rename = "Error", default)]
    pub error: Option<String>,
    /// Function the job ran.
    #[serde(rename = "Function", default)]
    pub function: Option<String>,
    /// Per-node results, keyed by node name.
    #[serde(rename = "Result", default)]
    pub result: Option<Map<String, Value>>,
}

/// `info[0].Result.<node>` of a finished job.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeOutcome {
    /// Process-style return code; `0` is success.
    pub retcode: i64,
    /// Job payload: a result map on success, state output on failure.
    #[serde(rename = "return")]
    pub output: Value,
}

/// One entry of a failed `state.sls` output map.
#[derive(Debug, Clone, Deserialize)]
pub struct StateOutcome {
    /// Whether this state succeeded.
    pub result: Option<bool>,
    /// Human-readable outcome. Nodes may report a list of lines, which
    /// are joined with `"; "`.
    #[serde(default, deserialize_with = "comment_text")]
    pub comment: String,
    /// Execution order assigned by the node.
    #[serde(rename = "__run_num__", default)]
    pub run_num: Option<u64>,
}

fn comment_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(text) => text,
        Value::Array(lines) => lines
            .iter()
            .map(|line| match line {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    })
}
