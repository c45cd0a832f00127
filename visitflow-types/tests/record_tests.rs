use chrono::{NaiveDate, TimeZone, Utc};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use visitflow_types::{
    Enrollment, FieldMap, FieldValue, Record, RecordId, RecordKind, Scalar, SubjectRecord,
    SyncStatus, Timestamp, VisitRecord,
};

fn ts(secs: i64) -> Timestamp {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn id(s: &str) -> RecordId {
    RecordId::parse(s).unwrap()
}

fn make_visit() -> Record {
    VisitRecord::draft(id("E1"), "stage-anc", id("EN1"), ts(1_000)).into()
}

fn make_subject() -> Record {
    let enrollment = Enrollment {
        id: id("EN1"),
        program_id: "prog-anc".into(),
        org_unit_id: "ou-1".into(),
        enrolled_on: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        incident_on: None,
    };
    SubjectRecord::draft(id("S1"), enrollment, ts(1_000)).into()
}

// ── Accessors ────────────────────────────────────────────────────

#[test]
fn new_records_are_drafts() {
    let visit = make_visit();
    assert_eq!(visit.kind(), RecordKind::Visit);
    assert_eq!(visit.sync_status(), SyncStatus::Draft);
    assert_eq!(visit.version(), 0);
    assert!(visit.values().is_empty());
}

#[test]
fn scope_id_is_stage_for_visits_and_program_for_subjects() {
    assert_eq!(make_visit().scope_id(), "stage-anc");
    assert_eq!(make_subject().scope_id(), "prog-anc");
}

#[test]
fn enrollment_only_on_subjects() {
    assert!(make_visit().enrollment().is_none());
    assert_eq!(make_subject().enrollment().unwrap().program_id, "prog-anc");
}

#[test]
fn merge_values_is_shallow_and_delta_wins() {
    let mut record = make_visit();
    record.values_mut().insert("weight".into(), 60.0.into());
    record.values_mut().insert("notes".into(), "first".into());

    let mut delta = FieldMap::new();
    delta.insert("weight".into(), 62.5.into());
    delta.insert("height".into(), 170.0.into());
    record.merge_values(delta);

    assert_eq!(record.value("weight"), Some(&FieldValue::Number(62.5)));
    assert_eq!(record.value("height"), Some(&FieldValue::Number(170.0)));
    assert_eq!(record.value("notes"), Some(&FieldValue::Text("first".into())));
}

#[test]
fn touch_bumps_version_and_stamp() {
    let mut record = make_subject();
    record.touch(ts(2_000));
    record.touch(ts(3_000));
    assert_eq!(record.version(), 2);
    assert_eq!(record.last_modified(), ts(3_000));
}

#[test]
fn set_sync_status_carries_error() {
    let mut record = make_visit();
    record.set_sync_status(SyncStatus::Failed, Some("409 conflict".into()));
    assert_eq!(record.sync_status(), SyncStatus::Failed);
    assert_eq!(record.sync_error(), Some("409 conflict"));

    record.set_sync_status(SyncStatus::Pending, None);
    assert_eq!(record.sync_error(), None);
}

// ── Field values ─────────────────────────────────────────────────

#[test]
fn emptiness() {
    assert!(FieldValue::Empty.is_empty());
    assert!(FieldValue::Text(String::new()).is_empty());
    assert!(FieldValue::List(vec![]).is_empty());
    assert!(!FieldValue::Number(0.0).is_empty());
    assert!(!FieldValue::Bool(false).is_empty());
}

#[test]
fn large_integers_round_to_nearest_double() {
    let exact = 1i64 << 53;
    assert_eq!(FieldValue::from(exact), FieldValue::Number(9_007_199_254_740_992.0));
    assert_eq!(FieldValue::from(exact + 1), FieldValue::from(exact));
    assert_eq!(FieldValue::from(-42i64), FieldValue::Number(-42.0));
}

#[test]
fn display_formats_dates_and_lists() {
    let date = FieldValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    assert_eq!(date.to_string(), "2024-01-01");
    let list = FieldValue::List(vec![Scalar::from("a"), Scalar::Number(2.0)]);
    assert_eq!(list.to_string(), "a,2");
}

// ── Durable shape ────────────────────────────────────────────────

#[test]
fn dates_stay_dates_through_json() {
    let mut record = make_visit();
    let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    record.values_mut().insert("visit_date".into(), date.into());
    record.values_mut().insert("free_text".into(), "2024-01-01".into());

    let parsed = Record::from_json(&record.to_json().unwrap()).unwrap();
    assert_eq!(parsed.value("visit_date").unwrap().as_date(), Some(date));
    assert_eq!(parsed.value("free_text").unwrap().as_text(), Some("2024-01-01"));
    assert_eq!(parsed, record);
}

#[test]
fn unknown_field_keys_survive() {
    let mut record = make_subject();
    record
        .values_mut()
        .insert("x-legacy-attribute".into(), FieldValue::Bool(true));
    let parsed = Record::from_json(&record.to_json().unwrap()).unwrap();
    assert_eq!(parsed.value("x-legacy-attribute"), Some(&FieldValue::Bool(true)));
}

#[test]
fn stored_document_is_kind_tagged() {
    let json: serde_json::Value = serde_json::from_str(&make_visit().to_json().unwrap()).unwrap();
    assert_eq!(json["kind"], "visit");
    assert_eq!(json["stage_id"], "stage-anc");
}

#[test]
fn non_finite_numbers_are_refused() {
    let mut record = make_visit();
    record.values_mut().insert("bmi".into(), FieldValue::Number(f64::NAN));
    let err = record.to_json().unwrap_err();
    assert!(matches!(err, visitflow_types::Error::NonFiniteValue(ref field) if field == "bmi"));

    let mut record = make_visit();
    record.values_mut().insert(
        "readings".into(),
        FieldValue::List(vec![Scalar::Number(1.0), Scalar::Number(f64::INFINITY)]),
    );
    assert!(record.validate().is_err());
    assert!(record.to_json().is_err());

    record.values_mut().insert("readings".into(), FieldValue::List(vec![Scalar::Number(1.0)]));
    let parsed = Record::from_json(&record.to_json().unwrap()).unwrap();
    assert_eq!(parsed, record);
}

fn scalar_strategy() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        "[a-z0-9 ]{0,12}".prop_map(Scalar::Text),
        (-4_000i32..4_000).prop_map(|n| Scalar::Number(f64::from(n) / 4.0)),
        any::<bool>().prop_map(Scalar::Bool),
    ]
}

fn value_strategy() -> impl Strategy<Value = FieldValue> {
    prop_oneof![
        Just(FieldValue::Empty),
        "[a-z0-9 ]{0,12}".prop_map(FieldValue::Text),
        (-4_000i32..4_000).prop_map(|n| FieldValue::Number(f64::from(n) / 4.0)),
        any::<bool>().prop_map(FieldValue::Bool),
        (0i64..20_000).prop_map(|d| {
            FieldValue::Date(NaiveDate::from_ymd_opt(1990, 1, 1).unwrap() + chrono::Duration::days(d))
        }),
        prop::collection::vec(scalar_strategy(), 0..4).prop_map(FieldValue::List),
    ]
}

proptest! {
    /// Whatever lands in the field map comes back identical.
    #[test]
    fn field_maps_round_trip(values in prop::collection::btree_map("[a-z_]{1,8}", value_strategy(), 0..8)) {
        let mut record = make_visit();
        record.merge_values(values);
        let parsed = Record::from_json(&record.to_json().unwrap()).unwrap();
        prop_assert_eq!(parsed, record);
    }
}
