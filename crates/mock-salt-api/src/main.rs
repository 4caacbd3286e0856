//! Mock Salt API, an in-memory stand-in for local testing.
//!
//! Accepts any login, runs no jobs, and answers polls the way a real
//! master does: the first lookup of a job finds it still running (empty
//! `Result`), later lookups find it finished with `retcode: 0` and an echo
//! of the request as payload.
//!
//! Tokens expire after `MOCK_SALT_TOKEN_TTL` seconds (one hour by
//! default) and are then rejected with `401`, so short TTLs exercise a
//! client's re-login path.
//!
//! | Route | Behaviour |
//! |-------|-----------|
//! | `POST /login` | Issues a random token valid for the configured TTL |
//! | `POST /` | `local_async` records a job; `local` answers inline |
//! | `GET /jobs/{jid}` | Running, finished, or `job not found` |

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::{Json, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

type Rejection = (StatusCode, &'static str);

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// A job recorded by `POST /`.
struct MockJob {
    target: String,
    function: String,
    kwarg: Value,
    polls: u32,
}

struct MockState {
    token_ttl: Duration,
    /// Issued tokens and their expiry.
    tokens: Mutex<HashMap<String, DateTime<Utc>>>,
    jobs: Mutex<HashMap<String, MockJob>>,
    sequence: AtomicU64,
}

impl MockState {
    fn new(token_ttl: Duration) -> Self {
        Self {
            token_ttl,
            tokens: Mutex::default(),
            jobs: Mutex::default(),
            sequence: AtomicU64::new(0),
        }
    }

    fn issue_token(&self) -> (String, DateTime<Utc>) {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        let expires_at = now + self.token_ttl;

        let mut tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        tokens.retain(|_, expiry| *expiry >= now);
        tokens.insert(token.clone(), expires_at);
        (token, expires_at)
    }

    fn require_token(&self, headers: &HeaderMap) -> Result<(), Rejection> {
        let token = headers
            .get("x-auth-token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let mut tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        match tokens.get(token).copied() {
            Some(expiry) if Utc::now() <= expiry => Ok(()),
            Some(_) => {
                tokens.remove(token);
                Err((StatusCode::UNAUTHORIZED, "Token expired"))
            }
            None => Err((StatusCode::UNAUTHORIZED, "Authentication required")),
        }
    }

    fn next_jid(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) % 1_000_000;
        format!("{}{seq:06}", Utc::now().format("%Y%m%d%H%M%S"))
    }
}

// ---------------------------------------------------------------------------
// Request DTOs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct LoginBody {
    username: String,
    #[allow(dead_code)]
    eauth: Option<String>,
}

#[derive(Deserialize)]
struct JobBody {
    client: String,
    tgt: String,
    fun: String,
    #[serde(default)]
    kwarg: Value,
    #[serde(default)]
    arg: Vec<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /login`: every identity is accepted.
async fn login(State(state): State<Arc<MockState>>, Json(body): Json<LoginBody>) -> Json<Value> {
    let (token, expires_at) = state.issue_token();
    #[allow(clippy::cast_precision_loss)]
    let expire = expires_at.timestamp_millis() as f64 / 1000.0;
    info!(username = %body.username, "login");

    Json(json!({
        "return": [{
            "token": token,
            "expire": expire,
            "user": body.username,
            "eauth": "kubernetes_rbac",
        }]
    }))
}

/// `POST /`: record an async job or answer a sync one.
async fn run(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<JobBody>,
) -> Result<Json<Value>, Rejection> {
    state.require_token(&headers)?;

    match body.client.as_str() {
        "local_async" => {
            let jid = state.next_jid();
            info!(jid = %jid, target = %body.tgt, function = %body.fun, "job submitted");
            let minions = vec![body.tgt.clone()];
            state
                .jobs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(
                    jid.clone(),
                    MockJob {
                        target: body.tgt,
                        function: body.fun,
                        kwarg: body.kwarg,
                        polls: 0,
                    },
                );
            Ok(Json(json!({"return": [{"jid": jid, "minions": minions}]})))
        }
        "local" => {
            let answer = match body.arg.first() {
                Some(path) => json!({
                    "success": true,
                    "result": path.rsplit('/').next().unwrap_or(path),
                }),
                None => json!({"success": false, "result": "missing argument"}),
            };
            Ok(Json(json!({"return": [{ body.tgt: answer }]})))
        }
        _ => Err((StatusCode::BAD_REQUEST, "unsupported client")),
    }
}

/// `GET /jobs/{jid}`: running on the first lookup, finished afterwards.
async fn lookup_job(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(jid): Path<String>,
) -> Result<Json<Value>, Rejection> {
    state.require_token(&headers)?;

    let mut jobs = state.jobs.lock().unwrap_or_else(PoisonError::into_inner);
    let Some(job) = jobs.get_mut(&jid) else {
        return Ok(Json(json!({"info": [{"Error": "job not found"}]})));
    };

    job.polls += 1;
    let result = if job.polls == 1 {
        json!({})
    } else {
        json!({
            job.target.clone(): {
                "retcode": 0,
                "return": {"fun": job.function, "kwarg": job.kwarg},
            }
        })
    };

    Ok(Json(json!({
        "info": [{"jid": jid, "Function": job.function, "Result": result}]
    })))
}

fn app(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/", post(run))
        .route("/jobs/{jid}", get(lookup_job))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let port: u16 = std::env::var("MOCK_SALT_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);

    let token_ttl: i64 = std::env::var("MOCK_SALT_TOKEN_TTL")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3600);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, token_ttl, "mock Salt API listening");
    let state = MockState::new(Duration::seconds(token_ttl));
    axum::serve(listener, app(Arc::new(state))).await?;
    Ok(())
}
