//! Identifier types used throughout visitflow.
//!
//! Record ids are opaque strings: ids minted by the remote system are kept
//! verbatim, locally created records get a UUID v7 so they sort by creation.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier of a record within its kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Mints a fresh, time-ordered identifier for a locally created record.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wraps an existing identifier. Empty or whitespace-only ids are rejected.
    pub fn parse(s: &str) -> Result<Self, Error> {
        if s.trim().is_empty() || s.trim() != s {
            return Err(Error::InvalidRecordId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The two record variants the store keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A visit (stage event) captured against an enrollment.
    Visit,
    /// A tracked subject with its enrollment and attributes.
    Subject,
}

impl RecordKind {
    /// Stable lowercase name, used as the storage discriminator.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Visit => "visit",
            Self::Subject => "subject",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "visit" => Ok(Self::Visit),
            "subject" => Ok(Self::Subject),
            other => Err(Error::InvalidKind(other.to_string())),
        }
    }
}

/// Addresses one record: ids are only unique within a kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub kind: RecordKind,
    pub id: RecordId,
}

impl RecordKey {
    #[must_use]
    pub fn new(kind: RecordKind, id: RecordId) -> Self {
        Self { kind, id }
    }

    #[must_use]
    pub fn visit(id: RecordId) -> Self {
        Self::new(RecordKind::Visit, id)
    }

    #[must_use]
    pub fn subject(id: RecordId) -> Self {
        Self::new(RecordKind::Subject, id)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}
