//! Integration tests for the ingestion task.
//!
//! These tests run the real IngestionTask against in-memory broker and
//! search index doubles.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pipeline_kafka::{InboundRecord, SourceOffset};
use pipeline_worker::enricher::PIPELINE_ID_HEADER;
use pipeline_worker::{IngestError, IngestionTask, TaskSettings, TaskStatus};
use pipeline_worker_shared::{PipelineDefinition, PipelineStatus};
use tokio::time::timeout;

use common::*;

fn new_task(mq: &MockMq, search: &MockSearch, settings: TaskSettings) -> IngestionTask {
    IngestionTask::new(
        &pipeline(PipelineStatus::Running),
        index_base(),
        settings,
        Arc::new(mq.clone()),
        Arc::new(search.clone()),
    )
}

#[tokio::test]
async fn test_flush_on_byte_threshold() {
    // Each payload is 31 bytes, so the second record fills the batch
    let mq = MockMq::with_records(vec![record(0, "D1"), record(1, "D2"), record(2, "D3")]);
    let search = MockSearch::default();
    let settings = TaskSettings {
        flush_bytes: 40,
        ..task_settings()
    };
    let task = new_task(&mq, &search, settings);
    let control = task.control();
    let handle = tokio::spawn(task.run());

    assert!(wait_until(|| mq.transaction_count() == 1).await);
    assert!(wait_until(|| mq.state.records.lock().unwrap().is_empty()).await);

    control.request_stop();
    let result = timeout(Duration::from_secs(5), handle)
        .await
        .expect("task should stop")
        .expect("task should not panic");
    assert!(result.is_ok());

    // The third record never filled a batch
    let transactions = mq.transactions();
    assert_eq!(transactions.len(), 1);
    assert_eq!(search.flush_count(), 1);
    assert_eq!(search.indexed_ids(), vec!["D1", "D2"]);

    let tx = &transactions[0];
    assert_eq!(tx.records.len(), 2);
    assert!(tx.records.iter().all(|r| r.topic == OUTPUT_TOPIC));
    assert_eq!(
        tx.offsets,
        vec![SourceOffset {
            topic: INPUT_TOPIC.to_string(),
            partition: 0,
            offset: 2,
        }]
    );

    assert_eq!(control.status(), TaskStatus::Stopped);
    assert_eq!(mq.state.consumers_closed.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(mq.state.producers_closed.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_uses_pipeline_consumer_group_and_transactional_id() {
    let mq = MockMq::default();
    let search = MockSearch::default();
    let task = new_task(&mq, &search, task_settings());
    let control = task.control();
    let handle = tokio::spawn(task.run());

    assert!(wait_until(|| mq.poll_count() > 0).await);
    control.request_stop();
    handle.await.unwrap().unwrap();

    assert_eq!(*mq.state.group_ids.lock().unwrap(), vec!["default.sdp.p1"]);
    assert_eq!(
        *mq.state.transactional_ids.lock().unwrap(),
        vec![format!("p1_{}", INPUT_TOPIC)]
    );
    assert_eq!(
        *mq.state.subscriptions.lock().unwrap(),
        vec![vec![INPUT_TOPIC.to_string()]]
    );
}

#[tokio::test]
async fn test_rejected_documents_go_to_error_topic() {
    let mq = MockMq::with_records(vec![record(0, "D1"), record(1, "D2")]);
    let search = MockSearch::rejecting(&["D2"]);
    let settings = TaskSettings {
        flush_items: 2,
        ..task_settings()
    };
    let task = new_task(&mq, &search, settings);
    let control = task.control();
    let handle = tokio::spawn(task.run());

    assert!(wait_until(|| mq.transaction_count() == 1).await);
    control.request_stop();
    handle.await.unwrap().unwrap();

    let tx = &mq.transactions()[0];
    assert_eq!(tx.topics_of("D1"), vec![OUTPUT_TOPIC]);
    assert_eq!(tx.topics_of("D2"), vec![ERROR_TOPIC]);

    let failed = tx.records.iter().find(|r| r.topic == ERROR_TOPIC).unwrap();
    assert_eq!(failed.header(PIPELINE_ID_HEADER), Some(PIPELINE_ID.as_bytes()));
    assert_eq!(failed.payload, record(1, "D2").payload);

    // Every attempt was spent before giving up
    assert_eq!(search.flush_count(), 3);
    assert_eq!(search.reset_count(), 1);
    assert_eq!(tx.offsets[0].offset, 2);
}

/// A record that names its own index base.
fn record_for_base(offset: i64, id: &str, base_type: &str) -> InboundRecord {
    InboundRecord {
        payload: format!(r#"{{"__id":"{}","__index_base":"{}"}}"#, id, base_type).into_bytes(),
        ..record(offset, id)
    }
}

#[tokio::test]
async fn test_index_base_in_dataset_routes_per_record_topic() {
    let mq = MockMq::with_records(vec![
        record_for_base(0, "D1", "svc-a"),
        record_for_base(1, "D2", "svc-b"),
        record_for_base(2, "D3", "svc-b"),
    ]);
    let search = MockSearch::rejecting(&["D3"]);
    let settings = TaskSettings {
        flush_items: 3,
        ..task_settings()
    };
    let definition = PipelineDefinition {
        use_index_base_in_dataset: true,
        ..pipeline(PipelineStatus::Running)
    };
    let task = IngestionTask::new(
        &definition,
        index_base(),
        settings,
        Arc::new(mq.clone()),
        Arc::new(search.clone()),
    );
    let control = task.control();
    let handle = tokio::spawn(task.run());

    assert!(wait_until(|| mq.transaction_count() == 1).await);
    control.request_stop();
    handle.await.unwrap().unwrap();

    let transactions = mq.transactions();
    assert_eq!(transactions.len(), 1);
    let tx = &transactions[0];
    assert_eq!(tx.records.len(), 3);
    assert_eq!(tx.topics_of("D1"), vec!["default.mdl.process.svc-a"]);
    assert_eq!(tx.topics_of("D2"), vec!["default.mdl.process.svc-b"]);
    assert_eq!(tx.topics_of("D3"), vec![ERROR_TOPIC]);
    assert_eq!(tx.offsets[0].offset, 3);
}

#[tokio::test]
async fn test_failed_request_routes_whole_batch_to_error_topic() {
    let mq = MockMq::with_records(vec![record(0, "D1"), record(1, "D2")]);
    let search = MockSearch::unavailable();
    let settings = TaskSettings {
        flush_items: 2,
        ..task_settings()
    };
    let task = new_task(&mq, &search, settings);
    let control = task.control();
    let handle = tokio::spawn(task.run());

    assert!(wait_until(|| mq.transaction_count() == 1).await);
    control.request_stop();
    handle.await.unwrap().unwrap();

    let tx = &mq.transactions()[0];
    assert_eq!(tx.records.len(), 2);
    assert!(tx.records.iter().all(|r| r.topic == ERROR_TOPIC));
    assert_eq!(search.reset_count(), 1);
}

#[tokio::test]
async fn test_flush_on_interval() {
    let mq = MockMq::with_records(vec![record(0, "D1")]);
    let search = MockSearch::default();
    let settings = TaskSettings {
        flush_interval: Duration::from_millis(50),
        ..task_settings()
    };
    let task = new_task(&mq, &search, settings);
    let control = task.control();
    let handle = tokio::spawn(task.run());

    assert!(wait_until(|| mq.transaction_count() == 1).await);
    control.request_stop();
    handle.await.unwrap().unwrap();

    assert_eq!(mq.transaction_count(), 1);
    assert_eq!(search.indexed_ids(), vec!["D1"]);
}

#[tokio::test]
async fn test_poll_failures_end_task() {
    let mq = MockMq::failing_polls();
    let search = MockSearch::default();
    let task = new_task(&mq, &search, task_settings());
    let control = task.control();

    let result = timeout(Duration::from_secs(5), task.run())
        .await
        .expect("task should give up");

    match result {
        Err(IngestError::PollExhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected PollExhausted, got {:?}", other),
    }
    assert_eq!(mq.poll_count(), 3);
    assert_eq!(mq.transaction_count(), 0);
    assert_eq!(control.status(), TaskStatus::Error);
    assert!(!control.request_stop());
    assert_eq!(mq.state.consumers_closed.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_deleted_task_exits_after_flush() {
    let mq = MockMq::with_records(vec![record(0, "D1"), record(1, "D2")]);
    let search = MockSearch::default();
    let settings = TaskSettings {
        flush_items: 1,
        ..task_settings()
    };
    let task = new_task(&mq, &search, settings);
    let control = task.control();
    control.mark_deleted();

    let result = timeout(Duration::from_secs(5), task.run())
        .await
        .expect("deleted task should exit on its own");

    assert!(result.is_ok());
    assert_eq!(mq.transaction_count(), 1);
    assert_eq!(search.indexed_ids(), vec!["D1"]);
    assert_eq!(control.status(), TaskStatus::Stopped);
}

#[tokio::test]
async fn test_stop_before_first_poll() {
    let mq = MockMq::with_records(vec![record(0, "D1")]);
    let search = MockSearch::default();
    let task = new_task(&mq, &search, task_settings());
    let control = task.control();
    control.request_stop();

    task.run().await.unwrap();

    assert_eq!(mq.poll_count(), 0);
    assert_eq!(mq.transaction_count(), 0);
    assert_eq!(control.status(), TaskStatus::Stopped);
}
