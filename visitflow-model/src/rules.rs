use serde::{Deserialize, Serialize};
use visitflow_types::FieldId;

/// The rules and variables of one program, as synchronized from the remote
/// system. The engine never inspects conditions or actions; it hands them to
/// the evaluator untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<ProgramRule>,
    #[serde(default)]
    pub variables: Vec<RuleVariable>,
}

impl RuleSet {
    #[must_use]
    pub fn new(rules: Vec<ProgramRule>, variables: Vec<RuleVariable>) -> Self {
        Self { rules, variables }
    }

    /// Parses a rule set from its JSON reference-data representation.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(json.clone())
    }
}

/// One program rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramRule {
    pub id: String,
    pub condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    /// Only set when the rule is limited to a single stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<String>,
    #[serde(default)]
    pub actions: Vec<serde_json::Value>,
}

/// A named variable the rule conditions refer to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleVariable {
    pub name: String,
    /// How the value is sourced (e.g. current visit, newest value in program).
    pub source_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_id: Option<FieldId>,
}
