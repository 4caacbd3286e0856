#![deny(missing_docs)]

//! # Saltjob Models
//!
//! Core data types shared by the Salt API job client and its tooling.
//!
//! ## Job lifecycle
//!
//! ```text
//! Credential ──login──▶ AuthToken
//!                           │ X-Auth-Token
//!                           ▼
//! JobRequest ──POST /──▶ jid ──▶ JobHandle ("name/id", persisted by caller)
//!                                   │
//!                                   ▼
//!                         GET /jobs/<jid> ──▶ PollEntry
//! ```
//!
//! ## Module layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`credential`] | `Credential` and the supported `AuthMethod`s |
//! | [`token`] | `AuthToken` session token with absolute expiry |
//! | [`job`] | `JobHandle` and its persisted string encoding |
//! | [`wire`] | Request bodies and typed response entries |

pub mod credential;
pub mod error;
pub mod job;
pub mod token;
pub mod wire;

// Re-export all public types at crate root for convenience.
pub use credential::*;
pub use error::*;
pub use job::*;
pub use token::*;
pub use wire::*;
