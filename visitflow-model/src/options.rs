use serde::{Deserialize, Serialize};

/// A selectable option of a coded field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    pub id: String,
    pub code: String,
    pub name: String,
}

impl FieldOption {
    /// Shorthand where id, code and name coincide.
    pub fn simple(id: &str) -> Self {
        Self {
            id: id.into(),
            code: id.into(),
            name: id.into(),
        }
    }
}

/// A named subset of an option set that rules can switch on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionGroup {
    pub id: String,
    pub option_ids: Vec<String>,
}

/// The options a coded field offers, in display order, plus its groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSet {
    pub id: String,
    pub options: Vec<FieldOption>,
    #[serde(default)]
    pub groups: Vec<OptionGroup>,
}

impl OptionSet {
    pub fn group(&self, group_id: &str) -> Option<&OptionGroup> {
        self.groups.iter().find(|g| g.id == group_id)
    }
}
