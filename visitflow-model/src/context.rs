use serde::{Deserialize, Serialize};
use visitflow_types::{Enrollment, FieldMap, FieldValue};

/// Everything one evaluation pass may read.
///
/// `form_values` are the in-progress values of the live form (possibly not
/// yet flushed); `entity_values` are the values of the persisted record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleContext {
    pub form_values: FieldMap,
    pub entity_values: FieldMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment: Option<Enrollment>,
    /// Program stage of a visit, or program of a subject.
    pub scope_id: String,
}

impl RuleContext {
    /// Current value of a field: the form's value when present, else the
    /// persisted one.
    #[must_use]
    pub fn value(&self, field: &str) -> Option<&FieldValue> {
        self.form_values
            .get(field)
            .or_else(|| self.entity_values.get(field))
    }
}
