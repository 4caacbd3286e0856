//! Error types for the `saltjob-models` crate.
//!
//! All fallible constructors and `FromStr` implementations in this crate
//! return variants of [`ModelError`].

/// Errors produced when constructing or parsing model types.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// A persisted job handle did not have the `name/id` shape.
    #[error("invalid job handle \"{value}\": {reason}")]
    InvalidJobHandle {
        /// The value that failed to parse.
        value: String,
        /// Human-readable explanation.
        reason: String,
    },

    /// An authentication method name is not supported by the client.
    #[error("unsupported authentication method \"{0}\"")]
    UnsupportedAuthMethod(String),

    /// A required credential field was empty.
    #[error("missing required credential field: {field}")]
    MissingField {
        /// The name of the missing field.
        field: String,
    },

    /// A token expiry timestamp could not be represented.
    #[error("invalid token expiry {0}")]
    InvalidExpiry(f64),
}
