use crate::{FieldOption, OptionSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use visitflow_types::{FieldId, FieldMap, FieldValue};

/// Severity of a rule message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Error,
    Warning,
    Info,
}

/// A message produced by a rule, keyed to the field it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMessage {
    /// Field id the message belongs to. Form-level messages use an id that
    /// matches no field.
    pub key: FieldId,
    pub message: String,
}

impl RuleMessage {
    pub fn new(key: impl Into<FieldId>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// The messages that belong to one field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMessages<'a> {
    pub errors: Vec<&'a RuleMessage>,
    pub warnings: Vec<&'a RuleMessage>,
    pub infos: Vec<&'a RuleMessage>,
}

impl FieldMessages<'_> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty() && self.infos.is_empty()
    }
}

/// Derived form state from one evaluation pass. Never persisted.
///
/// A field present in `assignments` is computed, not manual: the presenting
/// layer must not let the user edit it directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    #[serde(default)]
    pub hidden_fields: BTreeSet<FieldId>,
    #[serde(default)]
    pub hidden_sections: BTreeSet<String>,
    #[serde(default)]
    pub hidden_options: BTreeMap<FieldId, BTreeSet<String>>,
    /// Per field, the shown option groups in the order rules produced them.
    #[serde(default)]
    pub shown_option_groups: BTreeMap<FieldId, Vec<String>>,
    #[serde(default)]
    pub assignments: FieldMap,
    #[serde(default)]
    pub errors: Vec<RuleMessage>,
    #[serde(default)]
    pub warnings: Vec<RuleMessage>,
    #[serde(default)]
    pub infos: Vec<RuleMessage>,
}

impl RuleResult {
    // ── Builders (used by evaluators) ────────────────────────────

    pub fn hide_field(&mut self, field: impl Into<FieldId>) -> &mut Self {
        self.hidden_fields.insert(field.into());
        self
    }

    pub fn hide_section(&mut self, section: impl Into<String>) -> &mut Self {
        self.hidden_sections.insert(section.into());
        self
    }

    pub fn hide_option(&mut self, field: impl Into<FieldId>, option: impl Into<String>) -> &mut Self {
        self.hidden_options
            .entry(field.into())
            .or_default()
            .insert(option.into());
        self
    }

    /// Records a shown option group. Repeats keep their first position.
    pub fn show_option_group(
        &mut self,
        field: impl Into<FieldId>,
        group: impl Into<String>,
    ) -> &mut Self {
        let group = group.into();
        let groups = self.shown_option_groups.entry(field.into()).or_default();
        if !groups.contains(&group) {
            groups.push(group);
        }
        self
    }

    pub fn assign(&mut self, field: impl Into<FieldId>, value: impl Into<FieldValue>) -> &mut Self {
        self.assignments.insert(field.into(), value.into());
        self
    }

    pub fn error(&mut self, key: impl Into<FieldId>, message: impl Into<String>) -> &mut Self {
        self.errors.push(RuleMessage::new(key, message));
        self
    }

    pub fn warning(&mut self, key: impl Into<FieldId>, message: impl Into<String>) -> &mut Self {
        self.warnings.push(RuleMessage::new(key, message));
        self
    }

    pub fn info(&mut self, key: impl Into<FieldId>, message: impl Into<String>) -> &mut Self {
        self.infos.push(RuleMessage::new(key, message));
        self
    }

    // ── Queries (used by the presenting layer) ───────────────────

    #[must_use]
    pub fn is_field_hidden(&self, field: &str) -> bool {
        self.hidden_fields.contains(field)
    }

    #[must_use]
    pub fn is_section_hidden(&self, section: &str) -> bool {
        self.hidden_sections.contains(section)
    }

    /// True when the field's value is assigned by a rule.
    #[must_use]
    pub fn is_computed(&self, field: &str) -> bool {
        self.assignments.contains_key(field)
    }

    /// Any error message blocks submission of the form.
    #[must_use]
    pub fn blocks_submission(&self) -> bool {
        !self.errors.is_empty()
    }

    #[must_use]
    pub fn messages(&self, level: MessageLevel) -> &[RuleMessage] {
        match level {
            MessageLevel::Error => &self.errors,
            MessageLevel::Warning => &self.warnings,
            MessageLevel::Info => &self.infos,
        }
    }

    /// Messages whose key matches `field`.
    #[must_use]
    pub fn messages_for(&self, field: &str) -> FieldMessages<'_> {
        FieldMessages {
            errors: keyed(&self.errors, field),
            warnings: keyed(&self.warnings, field),
            infos: keyed(&self.infos, field),
        }
    }

    /// The options `field` should offer.
    ///
    /// When rules show option groups for the field, the list is exactly the
    /// options of the first shown group and hidden-option filtering does not
    /// apply. Otherwise it is the option set minus the hidden options.
    #[must_use]
    pub fn visible_options(&self, field: &str, option_set: &OptionSet) -> Vec<FieldOption> {
        if let Some(first) = self.shown_option_groups.get(field).and_then(|g| g.first()) {
            let Some(group) = option_set.group(first) else {
                return Vec::new();
            };
            return option_set
                .options
                .iter()
                .filter(|o| group.option_ids.contains(&o.id))
                .cloned()
                .collect();
        }

        match self.hidden_options.get(field) {
            Some(hidden) => option_set
                .options
                .iter()
                .filter(|o| !hidden.contains(&o.id))
                .cloned()
                .collect(),
            None => option_set.options.clone(),
        }
    }
}

fn keyed<'a>(messages: &'a [RuleMessage], field: &str) -> Vec<&'a RuleMessage> {
    messages.iter().filter(|m| m.key == field).collect()
}
