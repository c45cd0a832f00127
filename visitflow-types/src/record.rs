//! Persisted records.
//!
//! A [`Record`] is either a visit (one stage event of an enrollment) or a
//! subject (a tracked person with an enrollment and attributes). Both carry an
//! open field map, a sync status, a version and a last-modified stamp. The
//! serialized form is the durable contract with the store and must
//! round-trip exactly.

use crate::{FieldMap, FieldValue, RecordId, RecordKey, RecordKind, SyncStatus, Timestamp};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Enrollment of a subject into a program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: RecordId,
    pub program_id: String,
    pub org_unit_id: String,
    pub enrolled_on: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_on: Option<NaiveDate>,
}

/// One visit captured against a program stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub id: RecordId,
    pub stage_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<RecordId>,
    pub enrollment_id: RecordId,
    #[serde(default)]
    pub data_values: FieldMap,
    #[serde(default)]
    pub sync_status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<String>,
    #[serde(default)]
    pub version: u64,
    pub last_modified: Timestamp,
}

/// A tracked subject and its enrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub id: RecordId,
    pub enrollment: Enrollment,
    #[serde(default)]
    pub attributes: FieldMap,
    #[serde(default)]
    pub sync_status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<String>,
    #[serde(default)]
    pub version: u64,
    pub last_modified: Timestamp,
}

impl VisitRecord {
    /// A new draft visit with no values.
    #[must_use]
    pub fn draft(
        id: RecordId,
        stage_id: impl Into<String>,
        enrollment_id: RecordId,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            stage_id: stage_id.into(),
            parent_id: None,
            enrollment_id,
            data_values: FieldMap::new(),
            sync_status: SyncStatus::Draft,
            sync_error: None,
            version: 0,
            last_modified: now,
        }
    }
}

impl SubjectRecord {
    /// A new draft subject with no attributes.
    #[must_use]
    pub fn draft(id: RecordId, enrollment: Enrollment, now: Timestamp) -> Self {
        Self {
            id,
            enrollment,
            attributes: FieldMap::new(),
            sync_status: SyncStatus::Draft,
            sync_error: None,
            version: 0,
            last_modified: now,
        }
    }
}

/// A persisted record of either kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Visit(VisitRecord),
    Subject(SubjectRecord),
}

impl Record {
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Visit(_) => RecordKind::Visit,
            Self::Subject(_) => RecordKind::Subject,
        }
    }

    #[must_use]
    pub fn id(&self) -> &RecordId {
        match self {
            Self::Visit(v) => &v.id,
            Self::Subject(s) => &s.id,
        }
    }

    #[must_use]
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.kind(), self.id().clone())
    }

    /// The data values of a visit or the attributes of a subject.
    #[must_use]
    pub fn values(&self) -> &FieldMap {
        match self {
            Self::Visit(v) => &v.data_values,
            Self::Subject(s) => &s.attributes,
        }
    }

    pub fn values_mut(&mut self) -> &mut FieldMap {
        match self {
            Self::Visit(v) => &mut v.data_values,
            Self::Subject(s) => &mut s.attributes,
        }
    }

    /// Looks up one field value.
    #[must_use]
    pub fn value(&self, field: &str) -> Option<&FieldValue> {
        self.values().get(field)
    }

    /// Shallow-merges `delta` into the field map; delta entries win.
    pub fn merge_values(&mut self, delta: FieldMap) {
        self.values_mut().extend(delta);
    }

    #[must_use]
    pub fn sync_status(&self) -> SyncStatus {
        match self {
            Self::Visit(v) => v.sync_status,
            Self::Subject(s) => s.sync_status,
        }
    }

    #[must_use]
    pub fn sync_error(&self) -> Option<&str> {
        match self {
            Self::Visit(v) => v.sync_error.as_deref(),
            Self::Subject(s) => s.sync_error.as_deref(),
        }
    }

    /// Sets the status and its associated error message together.
    pub fn set_sync_status(&mut self, status: SyncStatus, error: Option<String>) {
        let (slot, err) = match self {
            Self::Visit(v) => (&mut v.sync_status, &mut v.sync_error),
            Self::Subject(s) => (&mut s.sync_status, &mut s.sync_error),
        };
        *slot = status;
        *err = error;
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        match self {
            Self::Visit(v) => v.version,
            Self::Subject(s) => s.version,
        }
    }

    #[must_use]
    pub fn last_modified(&self) -> Timestamp {
        match self {
            Self::Visit(v) => v.last_modified,
            Self::Subject(s) => s.last_modified,
        }
    }

    /// Bumps the version and stamps the modification time. Called on every
    /// successful local write.
    pub fn touch(&mut self, now: Timestamp) {
        let (version, modified) = match self {
            Self::Visit(v) => (&mut v.version, &mut v.last_modified),
            Self::Subject(s) => (&mut s.version, &mut s.last_modified),
        };
        *version += 1;
        *modified = now;
    }

    /// The program stage for visits, the program for subjects. Rule
    /// evaluation is scoped by this id.
    #[must_use]
    pub fn scope_id(&self) -> &str {
        match self {
            Self::Visit(v) => &v.stage_id,
            Self::Subject(s) => &s.enrollment.program_id,
        }
    }

    /// The enrollment object, when the record carries one.
    #[must_use]
    pub fn enrollment(&self) -> Option<&Enrollment> {
        match self {
            Self::Visit(_) => None,
            Self::Subject(s) => Some(&s.enrollment),
        }
    }

    /// Checks that every value can be stored and read back.
    pub fn validate(&self) -> crate::Result<()> {
        match self.values().iter().find(|(_, value)| !value.is_finite()) {
            Some((field, _)) => Err(crate::Error::NonFiniteValue(field.clone())),
            None => Ok(()),
        }
    }

    /// Serializes to the JSON document stored on disk. Fails instead of
    /// writing a document that would not parse back.
    pub fn to_json(&self) -> crate::Result<String> {
        self.validate()?;
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a stored JSON document.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl From<VisitRecord> for Record {
    fn from(v: VisitRecord) -> Self {
        Self::Visit(v)
    }
}

impl From<SubjectRecord> for Record {
    fn from(s: SubjectRecord) -> Self {
        Self::Subject(s)
    }
}
