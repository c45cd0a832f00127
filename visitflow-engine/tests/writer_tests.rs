mod common;

use common::{fields, harness, key, stored, visit, DEBOUNCE};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::time::Duration;
use visitflow_engine::EngineError;
use visitflow_types::{FieldValue, Record, SyncStatus};

// ── Debounce ─────────────────────────────────────────────────────

#[tokio::test]
async fn update_field_does_not_write_synchronously() {
    let h = harness().await;
    h.backend.seed(visit("E1")).await;
    let writer = h.engine.writer(key("E1"));

    writer.update_field("weight", 61.0);

    assert_eq!(h.backend.puts(), 0);
    assert!(writer.has_pending_edits());
    assert_eq!(h.scheduler.pending_timers(), 1);
}

#[tokio::test]
async fn flushes_once_after_quiet_period() {
    let h = harness().await;
    h.backend.seed(visit("E1")).await;
    let writer = h.engine.writer(key("E1"));

    writer.update_field("weight", 61.0);
    h.scheduler.advance(Duration::from_millis(299)).await;
    assert_eq!(h.backend.puts(), 0);

    h.scheduler.advance(Duration::from_millis(1)).await;
    assert_eq!(h.backend.puts(), 1);
    assert!(!writer.has_pending_edits());
    assert_eq!(
        stored(&h.store, "E1").await.value("weight"),
        Some(&FieldValue::Number(61.0))
    );
}

#[tokio::test]
async fn each_edit_restarts_the_window() {
    let h = harness().await;
    h.backend.seed(visit("E1")).await;
    let writer = h.engine.writer(key("E1"));

    for step in 0..5 {
        writer.update_field("notes", format!("draft {step}"));
        h.scheduler.advance(Duration::from_millis(250)).await;
    }
    assert_eq!(h.backend.puts(), 0);

    h.scheduler.advance(Duration::from_millis(50)).await;
    assert_eq!(h.backend.puts(), 1);
    assert_eq!(
        stored(&h.store, "E1").await.value("notes"),
        Some(&FieldValue::from("draft 4"))
    );
}

proptest! {
    #[test]
    fn rapid_edits_coalesce_into_one_write(
        edits in prop::collection::vec(
            (prop::sample::select(vec!["weight", "height", "notes", "bp"]), 0i64..100, 0u64..300),
            1..20,
        )
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let h = harness().await;
            h.backend.seed(visit("E1")).await;
            let writer = h.engine.writer(key("E1"));

            let mut expected: BTreeMap<String, FieldValue> = BTreeMap::new();
            for (field, value, gap_ms) in &edits {
                writer.update_field(*field, *value);
                expected.insert((*field).to_string(), FieldValue::from(*value));
                h.scheduler.advance(Duration::from_millis(*gap_ms)).await;
            }
            prop_assert_eq!(h.backend.puts(), 0);

            h.scheduler.advance(DEBOUNCE).await;
            prop_assert_eq!(h.backend.puts(), 1);
            let written: Vec<Record> = h.backend.written();
            prop_assert_eq!(written[0].values(), &expected);
            prop_assert_eq!(h.scheduler.pending_timers(), 0);
            Ok(())
        })?;
    }
}

// ── Immediate flush ──────────────────────────────────────────────

#[tokio::test]
async fn update_fields_flushes_now_with_queued_edits() {
    let h = harness().await;
    h.backend.seed(visit("E1")).await;
    let writer = h.engine.writer(key("E1"));

    writer.update_field("weight", 61.0);
    writer
        .update_fields(fields([("height", 160.0.into())]))
        .await
        .unwrap();

    assert_eq!(h.backend.puts(), 1);
    assert_eq!(h.scheduler.pending_timers(), 0);
    let record = stored(&h.store, "E1").await;
    assert_eq!(record.value("weight"), Some(&FieldValue::Number(61.0)));
    assert_eq!(record.value("height"), Some(&FieldValue::Number(160.0)));
}

#[tokio::test]
async fn flush_merges_into_persisted_values_and_stamps() {
    let h = harness().await;
    let mut seeded = visit("E1");
    seeded.values_mut().insert("custom_key".into(), "kept".into());
    h.backend.seed(seeded).await;
    let writer = h.engine.writer(key("E1"));

    writer
        .update_fields(fields([("weight", 60.0.into())]))
        .await
        .unwrap();

    let record = stored(&h.store, "E1").await;
    assert_eq!(record.value("custom_key"), Some(&FieldValue::from("kept")));
    assert_eq!(record.version(), 1);
    assert_eq!(record.last_modified(), common::ts(10_000));
}

#[tokio::test]
async fn empty_flush_is_a_no_op() {
    let h = harness().await;
    h.backend.seed(visit("E1")).await;
    h.engine.writer(key("E1")).flush().await.unwrap();
    assert_eq!(h.backend.puts(), 0);
}

// ── Failures ─────────────────────────────────────────────────────

#[tokio::test]
async fn missing_record_drops_batch_and_returns_it() {
    let h = harness().await;
    let writer = h.engine.writer(key("ghost"));

    let err = writer
        .update_fields(fields([("weight", 60.0.into())]))
        .await
        .unwrap_err();

    match err {
        EngineError::NotFound { key: missing, dropped } => {
            assert_eq!(missing, key("ghost"));
            assert_eq!(dropped, fields([("weight", 60.0.into())]));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!writer.has_pending_edits());
}

#[tokio::test]
async fn storage_failure_keeps_delta_queued() {
    let h = harness().await;
    h.backend.seed(visit("E1")).await;
    let writer = h.engine.writer(key("E1"));

    h.backend.fail_puts(true);
    let err = writer
        .update_fields(fields([("weight", 60.0.into())]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Storage(_)));
    assert_eq!(writer.pending_value("weight"), Some(FieldValue::Number(60.0)));

    h.backend.fail_puts(false);
    writer.flush().await.unwrap();
    assert_eq!(
        stored(&h.store, "E1").await.value("weight"),
        Some(&FieldValue::Number(60.0))
    );
}

#[tokio::test]
async fn unstorable_value_is_dropped_not_requeued() {
    let h = harness().await;
    h.backend.seed(visit("E1")).await;
    let writer = h.engine.writer(key("E1"));

    let err = writer
        .update_fields(fields([("bmi", f64::NAN.into()), ("weight", 60.0.into())]))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Storage(_)));
    assert!(!writer.has_pending_edits());
    assert_eq!(h.backend.puts(), 0);
    assert_eq!(stored(&h.store, "E1").await.value("bmi"), None);

    writer.update_fields(fields([("weight", 61.0.into())])).await.unwrap();
    assert_eq!(
        stored(&h.store, "E1").await.value("weight"),
        Some(&FieldValue::Number(61.0))
    );
}

#[tokio::test]
async fn requeue_does_not_overwrite_newer_edits() {
    let h = harness().await;
    h.backend.seed(visit("E1")).await;
    let writer = h.engine.writer(key("E1"));

    h.backend.fail_puts(true);
    h.backend.hold_next_get();
    let flushing = writer.clone();
    let task = tokio::spawn(async move {
        flushing
            .update_fields(fields([("weight", 60.0.into())]))
            .await
    });
    h.backend.get_entered.notified().await;
    writer.update_field("weight", 62.0);
    h.backend.release_get.notify_one();
    assert!(task.await.unwrap().is_err());

    assert_eq!(writer.pending_value("weight"), Some(FieldValue::Number(62.0)));
}

#[tokio::test]
async fn debounced_failure_is_recorded() {
    let h = harness().await;
    let writer = h.engine.writer(key("ghost"));

    writer.update_field("weight", 60.0);
    h.scheduler.advance(DEBOUNCE).await;

    let last_error = writer.last_error().unwrap();
    assert!(last_error.contains("not found"), "{last_error}");
}

// ── Serialization ────────────────────────────────────────────────

#[tokio::test]
async fn overlapping_flushes_of_one_record_serialize() {
    let h = harness().await;
    h.backend.seed(visit("E1")).await;
    let first_writer = h.engine.writer(key("E1"));
    let second_writer = h.engine.writer(key("E1"));

    h.backend.hold_next_get();
    let first = tokio::spawn(async move {
        first_writer
            .update_fields(fields([("weight", 60.0.into())]))
            .await
    });
    h.backend.get_entered.notified().await;

    let second = tokio::spawn(async move {
        second_writer
            .update_fields(fields([("height", 160.0.into())]))
            .await
    });
    tokio::task::yield_now().await;
    assert_eq!(h.backend.puts(), 0);

    h.backend.release_get.notify_one();
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let record = stored(&h.store, "E1").await;
    assert_eq!(record.value("weight"), Some(&FieldValue::Number(60.0)));
    assert_eq!(record.value("height"), Some(&FieldValue::Number(160.0)));
    assert_eq!(record.version(), 2);
}

#[tokio::test]
async fn different_records_flush_independently() {
    let h = harness().await;
    h.backend.seed(visit("E1")).await;
    h.backend.seed(visit("E2")).await;
    let held = h.engine.writer(key("E1"));
    let free = h.engine.writer(key("E2"));

    h.backend.hold_next_get();
    let blocked = tokio::spawn(async move {
        held.update_fields(fields([("weight", 60.0.into())])).await
    });
    h.backend.get_entered.notified().await;

    free.update_fields(fields([("weight", 70.0.into())]))
        .await
        .unwrap();
    assert_eq!(
        stored(&h.store, "E2").await.value("weight"),
        Some(&FieldValue::Number(70.0))
    );

    h.backend.release_get.notify_one();
    blocked.await.unwrap().unwrap();
}

// ── Status transitions ───────────────────────────────────────────

#[tokio::test]
async fn uploader_transitions_follow_lifecycle() {
    let h = harness().await;
    h.backend.seed(visit("E1")).await;
    let writer = h.engine.writer(key("E1"));

    writer.transition_status(SyncStatus::Pending, None).await.unwrap();
    writer.transition_status(SyncStatus::Syncing, None).await.unwrap();
    let failed = writer
        .transition_status(SyncStatus::Failed, Some("HTTP 409".into()))
        .await
        .unwrap();
    assert_eq!(failed.sync_error(), Some("HTTP 409"));

    let retried = writer.transition_status(SyncStatus::Pending, None).await.unwrap();
    assert_eq!(retried.sync_status(), SyncStatus::Pending);
    assert_eq!(retried.sync_error(), None);
}

#[tokio::test]
async fn invalid_transition_is_rejected_without_write() {
    let h = harness().await;
    h.backend.seed(visit("E1")).await;
    let writer = h.engine.writer(key("E1"));

    let err = writer
        .transition_status(SyncStatus::Synced, None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::InvalidTransition {
            from: SyncStatus::Draft,
            to: SyncStatus::Synced,
            ..
        }
    ));
    assert_eq!(h.backend.puts(), 0);
}

#[tokio::test]
async fn promote_only_ready_drafts() {
    let h = harness().await;
    h.backend.seed(visit("E1")).await;
    let writer = h.engine.writer(key("E1"));
    let has_weight = |record: &Record| record.value("weight").is_some();

    assert!(!writer.promote_if_ready(&has_weight).await.unwrap());

    writer
        .update_fields(fields([("weight", 60.0.into())]))
        .await
        .unwrap();
    assert!(writer.promote_if_ready(&has_weight).await.unwrap());
    assert_eq!(stored(&h.store, "E1").await.sync_status(), SyncStatus::Pending);

    // Already pending.
    assert!(!writer.promote_if_ready(&has_weight).await.unwrap());
}
