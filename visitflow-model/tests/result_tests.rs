use pretty_assertions::assert_eq;
use visitflow_model::{FieldOption, MessageLevel, OptionGroup, OptionSet, RuleResult};
use visitflow_types::FieldValue;

fn delivery_options() -> OptionSet {
    OptionSet {
        id: "delivery-mode".into(),
        options: ["vaginal", "assisted", "caesarean", "unknown"]
            .into_iter()
            .map(FieldOption::simple)
            .collect(),
        groups: vec![
            OptionGroup {
                id: "surgical".into(),
                option_ids: vec!["caesarean".into()],
            },
            OptionGroup {
                id: "natural".into(),
                option_ids: vec!["vaginal".into(), "assisted".into()],
            },
        ],
    }
}

fn ids(options: &[FieldOption]) -> Vec<&str> {
    options.iter().map(|o| o.id.as_str()).collect()
}

// ── Option filtering ─────────────────────────────────────────────

#[test]
fn no_rules_means_all_options() {
    let result = RuleResult::default();
    let options = result.visible_options("mode", &delivery_options());
    assert_eq!(ids(&options), vec!["vaginal", "assisted", "caesarean", "unknown"]);
}

#[test]
fn hidden_options_are_removed_in_display_order() {
    let mut result = RuleResult::default();
    result.hide_option("mode", "assisted").hide_option("mode", "unknown");
    let options = result.visible_options("mode", &delivery_options());
    assert_eq!(ids(&options), vec!["vaginal", "caesarean"]);
}

#[test]
fn hidden_options_only_affect_their_field() {
    let mut result = RuleResult::default();
    result.hide_option("other", "vaginal");
    assert_eq!(result.visible_options("mode", &delivery_options()).len(), 4);
}

#[test]
fn first_shown_group_replaces_the_list() {
    let mut result = RuleResult::default();
    result
        .show_option_group("mode", "natural")
        .show_option_group("mode", "surgical");
    let options = result.visible_options("mode", &delivery_options());
    assert_eq!(ids(&options), vec!["vaginal", "assisted"]);
}

#[test]
fn group_override_skips_hidden_option_filtering() {
    let mut result = RuleResult::default();
    result
        .show_option_group("mode", "natural")
        .hide_option("mode", "vaginal");
    let options = result.visible_options("mode", &delivery_options());
    assert_eq!(ids(&options), vec!["vaginal", "assisted"]);
}

#[test]
fn repeated_group_keeps_first_position() {
    let mut result = RuleResult::default();
    result
        .show_option_group("mode", "surgical")
        .show_option_group("mode", "natural")
        .show_option_group("mode", "surgical");
    assert_eq!(result.shown_option_groups["mode"], vec!["surgical", "natural"]);
    assert_eq!(ids(&result.visible_options("mode", &delivery_options())), vec!["caesarean"]);
}

#[test]
fn unknown_first_group_offers_nothing() {
    let mut result = RuleResult::default();
    result.show_option_group("mode", "does-not-exist");
    assert!(result.visible_options("mode", &delivery_options()).is_empty());
}

// ── Messages ─────────────────────────────────────────────────────

#[test]
fn messages_partition_by_field_key() {
    let mut result = RuleResult::default();
    result
        .error("weight", "Weight is required")
        .error("height", "Height out of range")
        .warning("weight", "Weight looks low")
        .info("bmi", "BMI computed");

    let weight = result.messages_for("weight");
    assert_eq!(weight.errors.len(), 1);
    assert_eq!(weight.errors[0].message, "Weight is required");
    assert_eq!(weight.warnings.len(), 1);
    assert!(weight.infos.is_empty());

    assert!(result.messages_for("notes").is_empty());
    assert_eq!(result.messages(MessageLevel::Error).len(), 2);
    assert_eq!(result.messages(MessageLevel::Info)[0].key, "bmi");
}

#[test]
fn only_errors_block_submission() {
    let mut result = RuleResult::default();
    result.warning("weight", "low").info("bmi", "ok");
    assert!(!result.blocks_submission());

    result.error("weight", "missing");
    assert!(result.blocks_submission());
}

// ── Assignments and visibility ───────────────────────────────────

#[test]
fn assigned_fields_are_computed() {
    let mut result = RuleResult::default();
    result.assign("bmi", 22.5);
    assert!(result.is_computed("bmi"));
    assert!(!result.is_computed("weight"));
    assert_eq!(result.assignments["bmi"], FieldValue::Number(22.5));
}

#[test]
fn hidden_fields_and_sections() {
    let mut result = RuleResult::default();
    result.hide_field("pregnancy_week").hide_section("obstetric-history");
    assert!(result.is_field_hidden("pregnancy_week"));
    assert!(result.is_section_hidden("obstetric-history"));
    assert!(!result.is_field_hidden("weight"));
}

#[test]
fn result_deserializes_with_missing_collections() {
    let result: RuleResult = serde_json::from_str(r#"{"hidden_fields":["a"]}"#).unwrap();
    assert!(result.is_field_hidden("a"));
    assert!(result.assignments.is_empty());
}
