//! Correlation between a logical operation and a server-assigned job id.
//!
//! The caller persists a [`JobHandle`] as a string (for instance in a
//! custom resource status) between reconcile passes and parses it back on
//! the next pass.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ModelError;

const SEPARATOR: char = '/';

/// A submitted job: logical name plus the jid the server assigned.
///
/// The string encoding is `name/id`. An older encoding carried a third
/// `name/id/result` segment; it still parses, and the segment is written
/// back unchanged so such strings round trip. Freshly created handles
/// never carry it.
///
/// # Examples
///
/// ```
/// use saltjob_models::JobHandle;
///
/// let handle: JobHandle = "PrepareVolume/20240101123456789".parse().unwrap();
/// assert_eq!(handle.name(), "PrepareVolume");
/// assert_eq!(handle.id(), "20240101123456789");
/// assert_eq!(handle.to_string(), "PrepareVolume/20240101123456789");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct JobHandle {
    name: String,
    id: String,
    legacy_result: Option<String>,
    // false only for the "no job in flight" handle
    present: bool,
}

impl JobHandle {
    /// Create a handle for a freshly submitted job.
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            legacy_result: None,
            present: true,
        }
    }

    /// Parse a persisted handle.
    ///
    /// The empty string yields an empty handle, meaning no job is in flight.
    pub fn parse(value: &str) -> Result<Self, ModelError> {
        if value.is_empty() {
            return Ok(Self::default());
        }

        let segments: Vec<&str> = value.split(SEPARATOR).collect();
        match segments.as_slice() {
            [name, id] => Ok(Self::new(*name, *id)),
            [name, id, result] => Ok(Self {
                name: (*name).to_string(),
                id: (*id).to_string(),
                legacy_result: Some((*result).to_string()),
                present: true,
            }),
            _ => Err(ModelError::InvalidJobHandle {
                value: value.to_string(),
                reason: format!(
                    "expected \"name{SEPARATOR}id\", found {} segment(s)",
                    segments.len()
                ),
            }),
        }
    }

    /// Logical operation name, e.g. `PrepareVolume`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Server-assigned job id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Third segment of a legacy `name/id/result` string, if one was parsed.
    pub fn legacy_result(&self) -> Option<&str> {
        self.legacy_result.as_deref()
    }

    /// `true` for the handle parsed from an empty string.
    ///
    /// `"/"` parses to a handle with empty parts, which is not empty.
    pub fn is_empty(&self) -> bool {
        !self.present
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        write!(f, "{}{SEPARATOR}{}", self.name, self.id)?;
        if let Some(result) = &self.legacy_result {
            write!(f, "{SEPARATOR}{result}")?;
        }
        Ok(())
    }
}

impl FromStr for JobHandle {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for JobHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for JobHandle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
