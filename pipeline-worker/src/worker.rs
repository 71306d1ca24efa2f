//! Binding of a pipeline definition to its running ingestion tasks.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use pipeline_kafka::MqAccess;
use pipeline_worker_repository::SearchIndexProvider;
use pipeline_worker_shared::{IndexBaseInfo, PipelineDefinition};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::TaskSettings;
use crate::errors::IngestError;
use crate::task::{IngestionTask, TaskControl};

/// Failure of a task, reported to the lifecycle controller.
#[derive(Debug)]
pub struct WorkerError {
    pub pipeline_id: String,
    /// Generation of the worker that owned the failed task.
    pub worker_generation: u64,
    pub error: IngestError,
}

/// Collaborators handed to every task a worker starts.
#[derive(Clone)]
pub struct TaskDependencies {
    pub mq: Arc<dyn MqAccess>,
    pub search: Arc<dyn SearchIndexProvider>,
}

struct TaskHandle {
    control: Arc<TaskControl>,
    join: JoinHandle<()>,
}

/// A pipeline definition and the tasks currently running for it.
pub struct Worker {
    pipeline: PipelineDefinition,
    generation: u64,
    tasks: Vec<TaskHandle>,
}

impl Worker {
    pub fn new(pipeline: PipelineDefinition, generation: u64) -> Self {
        Self {
            pipeline,
            generation,
            tasks: Vec::new(),
        }
    }

    pub fn pipeline(&self) -> &PipelineDefinition {
        &self.pipeline
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Spawn one task consuming the pipeline's input topic.
    ///
    /// A failing task reports itself on `errors`; the report is dropped with
    /// an error log when the channel is full.
    pub fn start_tasks(
        &mut self,
        index_base: IndexBaseInfo,
        settings: &TaskSettings,
        deps: &TaskDependencies,
        errors: mpsc::Sender<WorkerError>,
    ) {
        let task = IngestionTask::new(
            &self.pipeline,
            index_base,
            settings.clone(),
            Arc::clone(&deps.mq),
            Arc::clone(&deps.search),
        );
        let control = task.control();
        let pipeline_id = self.pipeline.pipeline_id.clone();
        let generation = self.generation;

        let join = tokio::spawn(async move {
            if let Err(error) = task.run().await {
                let report = WorkerError {
                    pipeline_id: pipeline_id.clone(),
                    worker_generation: generation,
                    error,
                };
                if let Err(e) = errors.try_send(report) {
                    error!(pipeline_id = %pipeline_id, error = %e, "Failed to report task failure");
                } else {
                    info!(pipeline_id = %pipeline_id, "Task failure reported");
                }
            }
        });

        self.tasks.push(TaskHandle { control, join });
        info!(worker = %self, "Started worker tasks");
    }

    /// Stop every task and wait until all of them exited.
    pub async fn stop_tasks(&mut self) {
        if self.tasks.is_empty() {
            return;
        }

        let handles: Vec<TaskHandle> = self.tasks.drain(..).collect();
        for handle in &handles {
            handle.control.request_stop();
        }

        let results = join_all(handles.into_iter().map(|handle| handle.join)).await;
        for result in results {
            if let Err(e) = result {
                warn!(pipeline_id = %self.pipeline.pipeline_id, error = %e, "Task ended abnormally");
            }
        }

        info!(worker = %self, "Stopped worker tasks");
    }

    /// Let every task exit after its next flush.
    pub fn mark_deleted(&self) {
        for handle in &self.tasks {
            handle.control.mark_deleted();
        }
    }
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{pipeline = {}, generation = {}, tasks = {}}}",
            self.pipeline,
            self.generation,
            self.tasks.len()
        )
    }
}
