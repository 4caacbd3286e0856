//! # Saltjob SDK
//!
//! Client for submitting asynchronous jobs to managed nodes through the
//! Salt API and polling them to completion.
//!
//! The SDK provides:
//!
//! * [`SaltClient`]: authenticated HTTP session (login, token expiry,
//!   one re-authentication on `401`) with job submission and polling.
//! * [`JobClient`]: the submit/poll capability a reconciler depends on.
//! * [`decode`]: pure functions turning response trees into typed values.
//! * [`ClientConfig`] / [`CaBundle`]: address resolution and TLS trust.
//! * [`CredentialSource`]: where the login identity comes from.
//! * [`SaltError`]: unified error type for all SDK operations.
//!
//! Model types from [`saltjob_models`] are re-exported for convenience.
//!
//! # Polling contract
//!
//! [`SaltClient::poll_job`] answers once per call: `Ok(None)` while the job
//! runs, `Ok(Some(result))` on success, an error otherwise. The caller owns
//! the cadence and persists the [`JobHandle`] string between calls.

pub mod client;
pub mod config;
pub mod credentials;
pub mod decode;
pub mod error;
pub mod jobs;

pub use client::SaltClient;
pub use config::{CaBundle, ClientConfig};
pub use credentials::{CredentialSource, EnvCredentials, StaticCredentials};
pub use error::SaltError;
pub use jobs::{JobClient, VolumeSpec};

// Re-export model types for ergonomic usage.
pub use saltjob_models::{AuthMethod, AuthToken, Credential, JobHandle, ModelError};
