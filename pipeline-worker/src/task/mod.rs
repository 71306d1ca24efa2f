//! Ingestion task of one pipeline.
//!
//! The task polls the pipeline's input topic, buffers records in a [`Batch`]
//! and flushes it when it is large or old enough. A flush enriches every record,
//! writes the documents to the search index and then produces each record to
//! the output topic, or to the error topic when its document was rejected,
//! committing the consumed offsets in the same transaction.

mod batch;

pub use batch::Batch;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::{stream, StreamExt, TryStreamExt};
use pipeline_kafka::{next_offsets, InboundRecord, MqAccess, RecordConsumer, TransactionalProducer};
use pipeline_worker_repository::{BulkIndexer, SearchIndexProvider};
use pipeline_worker_shared::naming::{consumer_group_id, transactional_id};
use pipeline_worker_shared::{IndexBaseInfo, PipelineDefinition};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::config::TaskSettings;
use crate::enricher::{DocumentEnricher, EnrichedRecord};
use crate::errors::IngestError;

/// Run-state of an ingestion task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Stopping,
    Stopped,
    Error,
}

/// Flags shared between a running task and its owner.
#[derive(Debug)]
pub struct TaskControl {
    status: Mutex<TaskStatus>,
    deleted: AtomicBool,
}

impl Default for TaskControl {
    fn default() -> Self {
        Self {
            status: Mutex::new(TaskStatus::Running),
            deleted: AtomicBool::new(false),
        }
    }
}

impl TaskControl {
    pub fn status(&self) -> TaskStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: TaskStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Ask the task to stop at its next iteration.
    ///
    /// Returns false when the task already finished.
    pub fn request_stop(&self) -> bool {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        match *status {
            TaskStatus::Running => {
                *status = TaskStatus::Stopping;
                true
            }
            TaskStatus::Stopping => true,
            TaskStatus::Stopped | TaskStatus::Error => false,
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.status() == TaskStatus::Stopping
    }

    /// Make the task exit after its next flush.
    pub fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::SeqCst);
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }
}

/// Consume / enrich / index / produce loop of one pipeline.
pub struct IngestionTask {
    pipeline_id: String,
    input_topic: String,
    error_topic: String,
    settings: TaskSettings,
    enricher: Arc<DocumentEnricher>,
    mq: Arc<dyn MqAccess>,
    search: Arc<dyn SearchIndexProvider>,
    control: Arc<TaskControl>,
}

impl IngestionTask {
    pub fn new(
        pipeline: &PipelineDefinition,
        index_base: IndexBaseInfo,
        settings: TaskSettings,
        mq: Arc<dyn MqAccess>,
        search: Arc<dyn SearchIndexProvider>,
    ) -> Self {
        let enricher = DocumentEnricher::new(pipeline, index_base, settings.tenant.clone());
        Self {
            pipeline_id: pipeline.pipeline_id.clone(),
            input_topic: pipeline.input_topic.clone(),
            error_topic: pipeline.error_topic.clone(),
            settings,
            enricher: Arc::new(enricher),
            mq,
            search,
            control: Arc::new(TaskControl::default()),
        }
    }

    pub fn control(&self) -> Arc<TaskControl> {
        Arc::clone(&self.control)
    }

    /// Run until stopped, deleted, or failed.
    pub async fn run(self) -> Result<(), IngestError> {
        info!(
            pipeline_id = %self.pipeline_id,
            input_topic = %self.input_topic,
            error_topic = %self.error_topic,
            "Starting ingestion task"
        );

        let result = self.execute().await;
        match &result {
            Ok(()) => {
                self.control.set_status(TaskStatus::Stopped);
                info!(pipeline_id = %self.pipeline_id, "Ingestion task stopped");
            }
            Err(e) => {
                self.control.set_status(TaskStatus::Error);
                error!(pipeline_id = %self.pipeline_id, error = %e, "Ingestion task failed");
            }
        }
        result
    }

    async fn execute(&self) -> Result<(), IngestError> {
        let group_id = consumer_group_id(&self.settings.tenant, &self.pipeline_id);
        let consumer = self.mq.new_consumer(&group_id)?;

        let txid = transactional_id(&self.pipeline_id, &self.input_topic);
        let producer = match self.mq.new_transactional_producer(&txid) {
            Ok(producer) => producer,
            Err(e) => {
                consumer.close();
                return Err(e.into());
            }
        };

        let result = self.consume(consumer.as_ref(), producer.as_ref()).await;

        producer.close().await;
        consumer.close();
        result
    }

    async fn consume(
        &self,
        consumer: &dyn RecordConsumer,
        producer: &dyn TransactionalProducer,
    ) -> Result<(), IngestError> {
        consumer.subscribe(&[self.input_topic.clone()])?;
        let indexer = self.search.new_bulk_indexer(self.settings.flush_bytes);
        producer.init_transactions().await?;

        let retry = self.settings.retry_policy();
        let mut batch = Batch::default();
        let mut last_flush = Instant::now();

        loop {
            if self.control.stop_requested() {
                info!(
                    pipeline_id = %self.pipeline_id,
                    pending_records = batch.len(),
                    "Stop requested, leaving consume loop"
                );
                return Ok(());
            }

            let polled = retry
                .run("poll", || consumer.poll(self.settings.poll_timeout))
                .await
                .map_err(|e| IngestError::poll_exhausted(retry.max_attempts, e.to_string()))?;

            let mut flushed = false;
            if let Some(record) = polled {
                batch.push(record);
                if batch.is_full(self.settings.flush_bytes, self.settings.flush_items) {
                    self.flush(&mut batch, consumer, producer, indexer.as_ref())
                        .await?;
                    flushed = true;
                }
            }

            if !flushed && last_flush.elapsed() > self.settings.flush_interval {
                if !batch.is_empty() {
                    self.flush(&mut batch, consumer, producer, indexer.as_ref())
                        .await?;
                }
                flushed = true;
            }

            if flushed {
                last_flush = Instant::now();
                if self.control.is_deleted() {
                    info!(pipeline_id = %self.pipeline_id, "Pipeline deleted, leaving consume loop");
                    return Ok(());
                }
            }
        }
    }

    /// Index the batch and forward its records in one transaction.
    #[instrument(skip_all, fields(pipeline_id = %self.pipeline_id, record_count = batch.len()))]
    async fn flush(
        &self,
        batch: &mut Batch,
        consumer: &dyn RecordConsumer,
        producer: &dyn TransactionalProducer,
        indexer: &dyn BulkIndexer,
    ) -> Result<(), IngestError> {
        let records = batch.take();
        let offsets = next_offsets(&records);
        let enriched = self.enrich_all(records).await?;

        let mut failed: HashSet<String> = HashSet::new();
        for record in &enriched {
            if let Err(e) = indexer.add(record.index_item.clone()) {
                warn!(document_id = %record.document_id, error = %e, "Failed to queue document");
                failed.insert(record.document_id.clone());
            }
        }

        let retry = self.settings.retry_policy();
        if let Err(e) = retry.run("bulk index", || indexer.flush()).await {
            let reported = e.failed_document_ids();
            error!(
                attempts = retry.max_attempts,
                failed_documents = reported.len(),
                error = %e,
                "Bulk index retries exhausted, routing to error topic"
            );
            if reported.is_empty() {
                failed.extend(enriched.iter().map(|r| r.document_id.clone()));
            } else {
                failed.extend(reported.iter().cloned());
            }
            indexer.reset();
        }

        let mut outbound = Vec::with_capacity(enriched.len());
        for record in enriched {
            if failed.contains(&record.document_id) {
                outbound.push(record.outbound.redirect(&self.error_topic));
            } else {
                outbound.push(record.outbound);
            }
        }

        producer
            .produce_and_commit(consumer, &outbound, &offsets)
            .await
            .map_err(|e| IngestError::output(e.to_string()))?;

        info!(
            produced = outbound.len(),
            failed = failed.len(),
            "Flushed batch"
        );
        Ok(())
    }

    /// Enrich records on a bounded pool, preserving their order.
    async fn enrich_all(&self, records: Vec<InboundRecord>) -> Result<Vec<EnrichedRecord>, IngestError> {
        let started = Instant::now();
        let enriched: Vec<EnrichedRecord> = stream::iter(records)
            .map(|record| {
                let enricher = Arc::clone(&self.enricher);
                tokio::task::spawn_blocking(move || enricher.enrich(&record))
            })
            .buffered(self.settings.package_pool_size)
            .map_err(|e| IngestError::enrich(e.to_string()))
            .try_collect()
            .await?;

        debug!(
            record_count = enriched.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Enriched batch"
        );
        Ok(enriched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_stop_transitions() {
        let control = TaskControl::default();
        assert_eq!(control.status(), TaskStatus::Running);
        assert!(!control.stop_requested());

        assert!(control.request_stop());
        assert!(control.stop_requested());
        assert_eq!(control.status(), TaskStatus::Stopping);

        control.set_status(TaskStatus::Stopped);
        assert!(!control.request_stop());
    }

    #[test]
    fn test_mark_deleted() {
        let control = TaskControl::default();
        assert!(!control.is_deleted());
        control.mark_deleted();
        assert!(control.is_deleted());
    }
}
