//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pipeline_kafka::{
    ConsumerGroupMetadata, InboundRecord, KafkaAccessError, MqAccess, OutboundRecord,
    RecordConsumer, SourceOffset, TransactionalProducer,
};
use pipeline_worker::{TaskSettings, WorkerSettings};
use pipeline_worker_repository::{
    AccessError, BulkIndexItem, BulkIndexer, IndexBaseService, PipelineMgmtAccess,
    SearchIndexError, SearchIndexProvider,
};
use pipeline_worker_shared::{IndexBaseInfo, PipelineDefinition, PipelineStatus, PipelineStatusInfo};

pub const PIPELINE_ID: &str = "p1";
pub const INPUT_TOPIC: &str = "default.sdp.p1.input";
pub const OUTPUT_TOPIC: &str = "default.mdl.process.svc-a";
pub const ERROR_TOPIC: &str = "default.sdp.p1.error";

pub fn pipeline(status: PipelineStatus) -> PipelineDefinition {
    PipelineDefinition {
        pipeline_id: PIPELINE_ID.to_string(),
        pipeline_name: "first".to_string(),
        index_base: "svc-a".to_string(),
        use_index_base_in_dataset: false,
        input_topic: INPUT_TOPIC.to_string(),
        output_topic: OUTPUT_TOPIC.to_string(),
        error_topic: ERROR_TOPIC.to_string(),
        status,
        status_details: String::new(),
    }
}

pub fn index_base() -> IndexBaseInfo {
    IndexBaseInfo {
        base_type: "svc-a".to_string(),
        name: "Service A".to_string(),
        data_type: "log".to_string(),
        category: "log".to_string(),
    }
}

/// A record whose payload carries `__id` so its document id is known.
pub fn record(offset: i64, id: &str) -> InboundRecord {
    InboundRecord {
        topic: INPUT_TOPIC.to_string(),
        partition: 0,
        offset,
        timestamp_ms: Some(1_700_000_000_000 + offset),
        key: None,
        payload: format!(r#"{{"__id":"{}","message":"hello"}}"#, id).into_bytes(),
    }
}

/// Task settings with short timers; flushes only happen on demand.
pub fn task_settings() -> TaskSettings {
    TaskSettings {
        flush_bytes: 1024 * 1024,
        flush_items: 1000,
        flush_interval: Duration::from_secs(3600),
        retry_interval: Duration::from_millis(10),
        failure_threshold: 3,
        package_pool_size: 4,
        poll_timeout: Duration::from_millis(10),
        ..TaskSettings::default()
    }
}

pub fn worker_settings(task: TaskSettings) -> WorkerSettings {
    WorkerSettings {
        pipeline_id: PIPELINE_ID.to_string(),
        pipeline_mgmt_url: "http://localhost:13011".to_string(),
        index_base_url: "http://localhost:13012".to_string(),
        task,
        watch_workers_interval: Duration::from_secs(3600),
        config_poll_interval: Duration::from_millis(20),
    }
}

/// Poll `condition` every 10ms for up to five seconds.
pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// One committed transaction.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub records: Vec<OutboundRecord>,
    pub offsets: Vec<SourceOffset>,
}

impl Transaction {
    pub fn topics_of(&self, id: &str) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| String::from_utf8_lossy(&r.payload).contains(&format!("\"{}\"", id)))
            .map(|r| r.topic.clone())
            .collect()
    }
}

#[derive(Default)]
pub struct MqState {
    pub records: Mutex<VecDeque<InboundRecord>>,
    pub fail_polls: AtomicBool,
    pub polls: AtomicUsize,
    pub subscriptions: Mutex<Vec<Vec<String>>>,
    pub group_ids: Mutex<Vec<String>>,
    pub transactional_ids: Mutex<Vec<String>>,
    pub transactions: Mutex<Vec<Transaction>>,
    pub consumers_closed: AtomicUsize,
    pub producers_closed: AtomicUsize,
}

/// Broker double: consumers pop scripted records, producers record transactions.
#[derive(Default, Clone)]
pub struct MockMq {
    pub state: Arc<MqState>,
}

impl MockMq {
    pub fn with_records(records: Vec<InboundRecord>) -> Self {
        let mq = Self::default();
        mq.push_records(records);
        mq
    }

    pub fn failing_polls() -> Self {
        let mq = Self::default();
        mq.state.fail_polls.store(true, Ordering::SeqCst);
        mq
    }

    pub fn push_records(&self, records: Vec<InboundRecord>) {
        self.state.records.lock().unwrap().extend(records);
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.state.transactions.lock().unwrap().clone()
    }

    pub fn transaction_count(&self) -> usize {
        self.state.transactions.lock().unwrap().len()
    }

    pub fn poll_count(&self) -> usize {
        self.state.polls.load(Ordering::SeqCst)
    }
}

impl MqAccess for MockMq {
    fn new_consumer(&self, group_id: &str) -> Result<Box<dyn RecordConsumer>, KafkaAccessError> {
        self.state.group_ids.lock().unwrap().push(group_id.to_string());
        Ok(Box::new(MockConsumer {
            state: Arc::clone(&self.state),
        }))
    }

    fn new_transactional_producer(
        &self,
        transactional_id: &str,
    ) -> Result<Box<dyn TransactionalProducer>, KafkaAccessError> {
        self.state
            .transactional_ids
            .lock()
            .unwrap()
            .push(transactional_id.to_string());
        Ok(Box::new(MockProducer {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockConsumer {
    state: Arc<MqState>,
}

#[async_trait]
impl RecordConsumer for MockConsumer {
    fn subscribe(&self, topics: &[String]) -> Result<(), KafkaAccessError> {
        self.state.subscriptions.lock().unwrap().push(topics.to_vec());
        Ok(())
    }

    async fn poll(&self, timeout: Duration) -> Result<Option<InboundRecord>, KafkaAccessError> {
        self.state.polls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_polls.load(Ordering::SeqCst) {
            return Err(KafkaAccessError::poll("broker unavailable"));
        }
        let next = self.state.records.lock().unwrap().pop_front();
        match next {
            Some(record) => Ok(Some(record)),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
        }
    }

    fn group_metadata(&self) -> Option<ConsumerGroupMetadata> {
        None
    }

    fn close(self: Box<Self>) {
        self.state.consumers_closed.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockProducer {
    state: Arc<MqState>,
}

#[async_trait]
impl TransactionalProducer for MockProducer {
    async fn init_transactions(&self) -> Result<(), KafkaAccessError> {
        Ok(())
    }

    async fn produce_and_commit(
        &self,
        _consumer: &dyn RecordConsumer,
        records: &[OutboundRecord],
        offsets: &[SourceOffset],
    ) -> Result<(), KafkaAccessError> {
        self.state.transactions.lock().unwrap().push(Transaction {
            records: records.to_vec(),
            offsets: offsets.to_vec(),
        });
        Ok(())
    }

    async fn close(self: Box<Self>) {
        self.state.producers_closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct SearchState {
    /// Documents the backend always rejects.
    pub reject_ids: Mutex<HashSet<String>>,
    /// Fail every bulk request without per-document detail.
    pub fail_requests: AtomicBool,
    pub flushes: AtomicUsize,
    pub resets: AtomicUsize,
    pub indexed: Mutex<Vec<BulkIndexItem>>,
}

/// Search index double.
#[derive(Default, Clone)]
pub struct MockSearch {
    pub state: Arc<SearchState>,
}

impl MockSearch {
    pub fn rejecting(ids: &[&str]) -> Self {
        let search = Self::default();
        search
            .state
            .reject_ids
            .lock()
            .unwrap()
            .extend(ids.iter().map(|id| id.to_string()));
        search
    }

    pub fn unavailable() -> Self {
        let search = Self::default();
        search.state.fail_requests.store(true, Ordering::SeqCst);
        search
    }

    pub fn flush_count(&self) -> usize {
        self.state.flushes.load(Ordering::SeqCst)
    }

    pub fn reset_count(&self) -> usize {
        self.state.resets.load(Ordering::SeqCst)
    }

    pub fn indexed_ids(&self) -> Vec<String> {
        self.state
            .indexed
            .lock()
            .unwrap()
            .iter()
            .map(|item| item.document_id.clone())
            .collect()
    }
}

impl SearchIndexProvider for MockSearch {
    fn new_bulk_indexer(&self, _max_bytes: usize) -> Box<dyn BulkIndexer> {
        Box::new(MockBulkIndexer {
            state: Arc::clone(&self.state),
            queue: Mutex::new(Vec::new()),
        })
    }
}

struct MockBulkIndexer {
    state: Arc<SearchState>,
    queue: Mutex<Vec<BulkIndexItem>>,
}

#[async_trait]
impl BulkIndexer for MockBulkIndexer {
    fn add(&self, item: BulkIndexItem) -> Result<(), SearchIndexError> {
        self.queue.lock().unwrap().push(item);
        Ok(())
    }

    async fn flush(&self) -> Result<(), SearchIndexError> {
        self.state.flushes.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_requests.load(Ordering::SeqCst) {
            return Err(SearchIndexError::bulk_index("cluster unavailable"));
        }

        let mut queue = self.queue.lock().unwrap();
        let reject_ids = self.state.reject_ids.lock().unwrap();
        let rejected: Vec<String> = queue
            .iter()
            .filter(|item| reject_ids.contains(&item.document_id))
            .map(|item| item.document_id.clone())
            .collect();
        if !rejected.is_empty() {
            return Err(SearchIndexError::items_failed(rejected));
        }

        self.state.indexed.lock().unwrap().extend(queue.drain(..));
        Ok(())
    }

    fn reset(&self) {
        self.state.resets.fetch_add(1, Ordering::SeqCst);
        self.queue.lock().unwrap().clear();
    }

    fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

/// Configuration store double. Status updates are applied to the stored
/// definition like the real store does.
#[derive(Default)]
pub struct MockPipelineMgmt {
    pub config: Mutex<Option<PipelineDefinition>>,
    pub updates: Mutex<Vec<PipelineStatusInfo>>,
    pub fail_updates: AtomicBool,
    /// `listen` flag of every fetch, in call order.
    pub fetches: Mutex<Vec<bool>>,
}

impl MockPipelineMgmt {
    pub fn with_pipeline(pipeline: PipelineDefinition) -> Self {
        Self {
            config: Mutex::new(Some(pipeline)),
            ..Self::default()
        }
    }

    pub fn set_config(&self, pipeline: Option<PipelineDefinition>) {
        *self.config.lock().unwrap() = pipeline;
    }

    pub fn updates(&self) -> Vec<PipelineStatusInfo> {
        self.updates.lock().unwrap().clone()
    }

    pub fn updates_with(&self, status: PipelineStatus) -> usize {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|info| info.status == status)
            .count()
    }

    pub fn fetches(&self) -> Vec<bool> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl PipelineMgmtAccess for MockPipelineMgmt {
    async fn get_config(
        &self,
        pipeline_id: &str,
        listen: bool,
    ) -> Result<Option<PipelineDefinition>, AccessError> {
        self.fetches.lock().unwrap().push(listen);
        let config = self.config.lock().unwrap().clone();
        Ok(config.filter(|p| p.pipeline_id == pipeline_id))
    }

    async fn update_status(
        &self,
        pipeline_id: &str,
        status: &PipelineStatusInfo,
    ) -> Result<(), AccessError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(AccessError::status(503, "store unavailable"));
        }
        self.updates.lock().unwrap().push(status.clone());
        if let Some(pipeline) = self.config.lock().unwrap().as_mut() {
            if pipeline.pipeline_id == pipeline_id {
                pipeline.status = status.status;
                pipeline.status_details = status.details.clone();
            }
        }
        Ok(())
    }
}

/// Index base lookup double.
#[derive(Default)]
pub struct MockIndexBases {
    pub known: HashMap<String, IndexBaseInfo>,
}

impl MockIndexBases {
    pub fn with(info: IndexBaseInfo) -> Self {
        let mut known = HashMap::new();
        known.insert(info.base_type.clone(), info);
        Self { known }
    }
}

#[async_trait]
impl IndexBaseService for MockIndexBases {
    async fn get_by_base_type(&self, base_type: &str) -> Result<IndexBaseInfo, AccessError> {
        self.known
            .get(base_type)
            .cloned()
            .ok_or_else(|| AccessError::status(404, format!("index base {} not found", base_type)))
    }
}
