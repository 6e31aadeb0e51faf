//! Shard lifecycle and checkpoint behavior under partial failure.

mod common;

use common::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use watchman::config::{ActionSpec, EventHandlerTable};
use watchman::processor::{CheckpointOutcome, ShardRecordProcessor, ShardState, ShutdownReason};
use watchman::router::DispatchOutcome;

fn tick_table() -> EventHandlerTable {
    EventHandlerTable::new().with_event("tick", vec![ActionSpec::named("count")])
}

fn active_processor(table: EventHandlerTable) -> (ShardRecordProcessor, Arc<ActionLog>) {
    let (catalog, log) = recording_catalog(&[("count", Behavior::Succeed), ("bad", Behavior::Fail)]);
    let router = Arc::new(router(table, catalog, json!({})));
    let mut processor = ShardRecordProcessor::new(router);
    processor.initialize("shardId-000000000000").unwrap();
    (processor, log)
}

#[tokio::test]
async fn test_malformed_record_is_skipped_and_batch_checkpoints_at_last() {
    let (mut processor, log) = active_processor(tick_table());
    let checkpointer = RecordingCheckpointer::succeeding();

    let records = vec![
        json_record("1", &json!({ "type": "tick", "data": { "n": 1 } })),
        raw_record("2", b"{\"type\": \"tick\", "),
        json_record("3", &json!({ "type": "tick", "data": { "n": 3 } })),
    ];

    let summary = processor.process_batch(&records, &checkpointer).await.unwrap();

    assert_eq!(summary.records, 3);
    assert_eq!(summary.dispatched.len(), 2);
    assert_eq!(summary.decode_failures.len(), 1);
    assert_eq!(summary.decode_failures[0].sequence_number, "2");

    let dispatched: Vec<_> = log.calls_for("count").into_iter().map(|c| c.data).collect();
    assert_eq!(dispatched.len(), 2);
    assert!(dispatched.contains(&json!({ "n": 1 })));
    assert!(dispatched.contains(&json!({ "n": 3 })));

    assert_eq!(checkpointer.calls(), vec![Some("3".to_string())]);
    assert_eq!(
        summary.checkpoint,
        CheckpointOutcome::Confirmed {
            requested: Some("3".to_string()),
            confirmed: Some("3".to_string()),
        }
    );
}

#[tokio::test]
async fn test_batch_where_everything_fails_still_checkpoints() {
    let table = EventHandlerTable::new().with_event("tick", vec![ActionSpec::named("bad")]);
    let (mut processor, log) = active_processor(table);
    let checkpointer = RecordingCheckpointer::succeeding();

    let records = vec![
        raw_record("100", b"not json at all"),
        json_record("101", &json!({ "type": "tick" })),
        json_record("102", &json!({ "type": "tick" })),
    ];

    let summary = processor.process_batch(&records, &checkpointer).await.unwrap();

    assert_eq!(summary.decode_failures.len(), 1);
    assert_eq!(summary.failed_actions(), 2);
    assert_eq!(log.calls_for("bad").len(), 2);
    assert_eq!(checkpointer.calls(), vec![Some("102".to_string())]);
    assert_eq!(processor.state(), ShardState::Active);
}

#[tokio::test]
async fn test_checkpoint_uses_array_order_not_dispatch_outcome() {
    let (mut processor, _log) = active_processor(tick_table());
    let checkpointer = RecordingCheckpointer::succeeding();

    // The last record decodes but routes nowhere
    let records = vec![
        json_record("7", &json!({ "type": "tick" })),
        json_record("8", &json!({ "data": "no type" })),
    ];

    let summary = processor.process_batch(&records, &checkpointer).await.unwrap();

    assert_eq!(summary.dispatched[1], DispatchOutcome::NoEvent);
    assert_eq!(checkpointer.calls(), vec![Some("8".to_string())]);
}

#[tokio::test]
async fn test_empty_batch_does_not_checkpoint() {
    let (mut processor, log) = active_processor(tick_table());
    let checkpointer = RecordingCheckpointer::succeeding();

    let summary = processor.process_batch(&[], &checkpointer).await.unwrap();

    assert_eq!(summary.records, 0);
    assert_eq!(summary.checkpoint, CheckpointOutcome::NotAttempted);
    assert!(checkpointer.calls().is_empty());
    assert!(log.calls().is_empty());
}

#[tokio::test]
async fn test_rejected_checkpoint_does_not_fail_batch() {
    let (mut processor, _log) = active_processor(tick_table());
    let checkpointer = RecordingCheckpointer::rejecting("ShutdownException");

    let records = vec![json_record("5", &json!({ "type": "tick" }))];
    let summary = processor.process_batch(&records, &checkpointer).await.unwrap();

    assert!(matches!(summary.checkpoint, CheckpointOutcome::Failed { .. }));
    assert_eq!(summary.checkpoint.requested(), Some("5"));
}

#[tokio::test]
async fn test_terminate_checkpoints_at_shard_end() {
    let (mut processor, _log) = active_processor(tick_table());
    let checkpointer = RecordingCheckpointer::succeeding();

    let summary = processor
        .shutdown(ShutdownReason::Terminate, &checkpointer)
        .await
        .unwrap();

    assert_eq!(checkpointer.calls(), vec![None]);
    assert_eq!(
        summary.checkpoint,
        CheckpointOutcome::Confirmed {
            requested: None,
            confirmed: Some("SHARD_END".to_string()),
        }
    );
    assert_eq!(processor.state(), ShardState::Done);
}

#[tokio::test]
async fn test_terminate_completes_when_checkpoint_fails() {
    let (mut processor, _log) = active_processor(tick_table());
    let checkpointer = RecordingCheckpointer::rejecting("InvalidStateException");

    let summary = processor
        .shutdown(ShutdownReason::Terminate, &checkpointer)
        .await
        .unwrap();

    assert!(matches!(summary.checkpoint, CheckpointOutcome::Failed { .. }));
    assert_eq!(processor.state(), ShardState::Done);
}

#[tokio::test]
async fn test_zombie_shutdown_never_checkpoints() {
    let (mut processor, _log) = active_processor(tick_table());
    let checkpointer = RecordingCheckpointer::succeeding();

    let summary = processor
        .shutdown(ShutdownReason::Zombie, &checkpointer)
        .await
        .unwrap();

    assert_eq!(summary.checkpoint, CheckpointOutcome::NotAttempted);
    assert!(checkpointer.calls().is_empty());
    assert_eq!(processor.state(), ShardState::Done);
}

#[tokio::test]
async fn test_shutdown_request_checkpoints_and_stays_active() {
    let (mut processor, _log) = active_processor(tick_table());
    let checkpointer = RecordingCheckpointer::succeeding();

    let outcome = processor.shutdown_requested(&checkpointer).await.unwrap();

    assert!(outcome.is_attempted());
    assert_eq!(checkpointer.calls(), vec![None]);
    assert_eq!(processor.state(), ShardState::Active);
}

#[tokio::test]
async fn test_batches_after_shutdown_are_rejected() {
    let (mut processor, log) = active_processor(tick_table());
    let checkpointer = RecordingCheckpointer::succeeding();

    processor
        .shutdown(ShutdownReason::Zombie, &checkpointer)
        .await
        .unwrap();

    let records = vec![json_record("9", &json!({ "type": "tick" }))];
    assert!(processor.process_batch(&records, &checkpointer).await.is_err());
    assert!(log.calls().is_empty());
    assert!(checkpointer.calls().is_empty());
}

#[tokio::test]
async fn test_records_in_a_batch_dispatch_concurrently() {
    let table = EventHandlerTable::new().with_event("tick", vec![ActionSpec::named("meet")]);
    let router = Arc::new(router(table, rendezvous_catalog(&["meet"], 2), json!({})));
    let mut processor = ShardRecordProcessor::new(router);
    processor.initialize("shardId-000000000009").unwrap();
    let checkpointer = RecordingCheckpointer::succeeding();

    let records = vec![
        json_record("1", &json!({ "type": "tick" })),
        json_record("2", &json!({ "type": "tick" })),
    ];

    // The first record's action only returns once the second record's action has started
    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        processor.process_batch(&records, &checkpointer),
    )
    .await
    .expect("records should be in flight together")
    .unwrap();

    assert_eq!(summary.dispatched.len(), 2);
    assert_eq!(summary.failed_actions(), 0);
    assert_eq!(checkpointer.calls(), vec![Some("2".to_string())]);
}

#[tokio::test]
async fn test_wire_batch_isolates_entries_without_record_shape() {
    let (mut processor, log) = active_processor(tick_table());
    let checkpointer = RecordingCheckpointer::succeeding();

    let good = |sequence_number: &str| {
        serde_json::to_value(json_record(sequence_number, &json!({ "type": "tick" }))).unwrap()
    };
    let entries = vec![
        good("1"),
        json!({ "data": null, "partitionKey": "p", "sequenceNumber": "2" }),
        good("3"),
        json!({ "data": "e30=", "sequenceNumber": "4" }),
        json!({ "data": "e30=", "partitionKey": "p", "sequenceNumber": 5 }),
    ];

    let summary = processor
        .process_wire_batch(&entries, &checkpointer)
        .await
        .unwrap();

    assert_eq!(summary.records, 5);
    assert_eq!(summary.dispatched.len(), 2);
    let skipped: Vec<&str> = summary
        .decode_failures
        .iter()
        .map(|failure| failure.sequence_number.as_str())
        .collect();
    assert_eq!(skipped, vec!["2", "4", "5"]);
    assert_eq!(log.calls_for("count").len(), 2);
    // Checkpoint goes to the last well-formed record
    assert_eq!(checkpointer.calls(), vec![Some("3".to_string())]);
}

#[tokio::test]
async fn test_wire_batch_with_no_usable_records_is_not_checkpointed() {
    let (mut processor, log) = active_processor(tick_table());
    let checkpointer = RecordingCheckpointer::succeeding();

    let summary = processor
        .process_wire_batch(&[json!({ "sequenceNumber": "9" }), json!(42)], &checkpointer)
        .await
        .unwrap();

    assert_eq!(summary.records, 2);
    assert_eq!(summary.decode_failures.len(), 2);
    assert_eq!(summary.decode_failures[1].sequence_number, "");
    assert_eq!(summary.checkpoint, CheckpointOutcome::NotAttempted);
    assert!(checkpointer.calls().is_empty());
    assert!(log.calls().is_empty());
}
