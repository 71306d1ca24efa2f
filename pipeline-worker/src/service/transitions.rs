//! State transitions applied under the service lock.

use pipeline_worker_shared::{IndexBaseInfo, PipelineDefinition, PipelineStatus, PipelineStatusInfo};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, instrument, warn};

use super::{ServiceInner, ServiceState};
use crate::errors::ControllerError;
use crate::worker::{Worker, WorkerError};

/// Move `pipeline` to `expected`. Returns false when no transition is needed.
///
/// A pause is only legal from `running`; pausing a closed pipeline is a no-op.
fn check_and_set_status(
    pipeline: &mut PipelineDefinition,
    expected: PipelineStatus,
) -> Result<bool, ControllerError> {
    let current = pipeline.status;
    if current == expected {
        return Ok(false);
    }
    if expected == PipelineStatus::Closing {
        match current {
            PipelineStatus::Running => {}
            PipelineStatus::Close => return Ok(false),
            other => {
                return Err(ControllerError::pause_not_running(
                    &pipeline.pipeline_id,
                    other,
                ))
            }
        }
    }
    pipeline.status = expected;
    Ok(true)
}

impl ServiceInner {
    pub(super) async fn poll_config(&self) -> Result<bool, ControllerError> {
        let fetched = self.pipeline_mgmt.get_config(&self.pipeline_id, true).await?;

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.stopped {
            return Ok(false);
        }

        let Some(pipeline) = fetched else {
            if state.pipeline.is_some() {
                info!(pipeline_id = %self.pipeline_id, "Pipeline no longer exists, pausing");
                if let Some(worker) = state.worker.as_ref() {
                    worker.mark_deleted();
                }
                if let Err(e) = self.pause_locked(state).await {
                    warn!(pipeline_id = %self.pipeline_id, error = %e, "Failed to pause removed pipeline");
                }
            }
            state.polled = None;
            return Ok(false);
        };

        if state.pipeline.as_ref() == Some(&pipeline) {
            // The store caught up with memory; later edits compare against this copy
            state.polled = Some(pipeline);
            return Ok(false);
        }
        if state.polled.as_ref() == Some(&pipeline) {
            return Ok(false);
        }

        info!(pipeline = %pipeline, "Pipeline configuration changed");
        state.polled = Some(pipeline);
        drop(guard);

        match self.reload_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => Ok(true),
            Err(TrySendError::Closed(())) => {
                warn!(pipeline_id = %self.pipeline_id, "Reload channel closed");
                Ok(false)
            }
        }
    }

    #[instrument(skip(self), fields(pipeline_id = %self.pipeline_id))]
    pub(super) async fn reload(&self) -> Result<(), ControllerError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.stopped {
            return Ok(());
        }
        let Some(new) = state.polled.clone() else {
            return Ok(());
        };

        let Some(current) = state.pipeline.as_ref() else {
            info!(pipeline = %new, "Loading pipeline for the first time");
            return self.update_worker_locked(state, new).await;
        };
        if *current == new {
            debug!("Pipeline unchanged");
            return Ok(());
        }

        if new.status == current.status {
            info!(pipeline = %new, "Updating pipeline definition");
            return self.update_worker_locked(state, new).await;
        }

        match new.status {
            PipelineStatus::Running => {
                info!(pipeline = %new, "Resuming pipeline");
                self.resume_locked(state, new).await
            }
            PipelineStatus::Close => {
                info!(pipeline = %new, "Pausing pipeline");
                let paused = self.pause_locked(state).await;
                state.pipeline = Some(new);
                paused.map(|_| ())
            }
            other => {
                info!(status = %other, "No transition for requested status");
                Ok(())
            }
        }
    }

    pub(super) async fn pause_locked(
        &self,
        state: &mut ServiceState,
    ) -> Result<bool, ControllerError> {
        let Some(pipeline) = state.pipeline.as_mut() else {
            debug!(pipeline_id = %self.pipeline_id, "No pipeline loaded, nothing to pause");
            return Ok(false);
        };
        if !check_and_set_status(pipeline, PipelineStatus::Closing)? {
            info!(pipeline_id = %self.pipeline_id, "Pipeline already paused");
            return Ok(false);
        }

        if let Some(mut worker) = state.worker.take() {
            worker.stop_tasks().await;
        }
        pipeline.status = PipelineStatus::Close;
        pipeline.status_details.clear();
        info!(pipeline_id = %self.pipeline_id, "Pipeline paused");
        Ok(true)
    }

    async fn resume_locked(
        &self,
        state: &mut ServiceState,
        new: PipelineDefinition,
    ) -> Result<(), ControllerError> {
        let Some(current) = state.pipeline.as_mut() else {
            return self.update_worker_locked(state, new).await;
        };
        if !check_and_set_status(current, new.status)? {
            info!(pipeline_id = %self.pipeline_id, "Pipeline already running");
            return Ok(());
        }
        state.pipeline = Some(new);
        self.restart_worker_locked(state).await
    }

    /// Adopt `pipeline`; restart the worker unless it is closed.
    async fn update_worker_locked(
        &self,
        state: &mut ServiceState,
        pipeline: PipelineDefinition,
    ) -> Result<(), ControllerError> {
        let closed = pipeline.status == PipelineStatus::Close;
        state.pipeline = Some(pipeline);
        if closed {
            info!(pipeline_id = %self.pipeline_id, "Pipeline is closed, definition cached only");
            return Ok(());
        }
        self.restart_worker_locked(state).await
    }

    /// Stop the current worker and start a new generation for the loaded pipeline.
    async fn restart_worker_locked(&self, state: &mut ServiceState) -> Result<(), ControllerError> {
        if let Some(mut worker) = state.worker.take() {
            worker.stop_tasks().await;
        }
        let Some(pipeline) = state.pipeline.as_mut() else {
            return Ok(());
        };

        let index_base = match self.resolve_index_base(pipeline).await {
            Ok(index_base) => index_base,
            Err(e) => {
                error!(pipeline_id = %self.pipeline_id, error = %e, "Failed to resolve index base");
                self.update_pipeline_status(pipeline, PipelineStatus::Error, e.to_string())
                    .await?;
                return Err(e);
            }
        };
        if pipeline.status != PipelineStatus::Running {
            self.update_pipeline_status(pipeline, PipelineStatus::Running, "")
                .await?;
        }

        let definition = pipeline.clone();
        let generation = state.next_generation;
        state.next_generation += 1;

        let mut worker = Worker::new(definition, generation);
        worker.start_tasks(
            index_base,
            &self.settings.task,
            &self.task_deps,
            self.error_tx.clone(),
        );
        info!(worker = %worker, "Worker started");
        state.worker = Some(worker);
        Ok(())
    }

    async fn resolve_index_base(
        &self,
        pipeline: &PipelineDefinition,
    ) -> Result<IndexBaseInfo, ControllerError> {
        if pipeline.index_base.is_empty() {
            return Ok(IndexBaseInfo::default());
        }
        self.index_bases
            .get_by_base_type(&pipeline.index_base)
            .await
            .map_err(|e| ControllerError::index_base_unresolved(&pipeline.index_base, e.to_string()))
    }

    /// Persist the status first; memory follows the store.
    ///
    /// When the store rejects the write the in-memory status becomes `error`.
    async fn update_pipeline_status(
        &self,
        pipeline: &mut PipelineDefinition,
        status: PipelineStatus,
        details: impl Into<String>,
    ) -> Result<(), ControllerError> {
        let info = PipelineStatusInfo::new(status, details);
        if let Err(e) = self
            .pipeline_mgmt
            .update_status(&pipeline.pipeline_id, &info)
            .await
        {
            error!(
                pipeline_id = %pipeline.pipeline_id,
                status = %status,
                error = %e,
                "Failed to persist pipeline status"
            );
            pipeline.status = PipelineStatus::Error;
            pipeline.status_details = if info.details.is_empty() {
                e.to_string()
            } else {
                info.details
            };
            return Err(ControllerError::status_persist(
                &pipeline.pipeline_id,
                e.to_string(),
            ));
        }

        info!(pipeline_id = %pipeline.pipeline_id, status = %status, "Pipeline status updated");
        pipeline.status = info.status;
        pipeline.status_details = info.details;
        Ok(())
    }

    pub(super) async fn recover(&self) -> Result<(), ControllerError> {
        let fetched = self.pipeline_mgmt.get_config(&self.pipeline_id, false).await?;

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.stopped {
            return Ok(());
        }

        let current_status = state.pipeline.as_ref().map(|p| p.status);
        match (fetched, current_status) {
            (Some(_), Some(PipelineStatus::Error)) => {
                info!(pipeline_id = %self.pipeline_id, "Recovering failed pipeline");
            }
            (Some(_), Some(_)) | (None, None) => return Ok(()),
            (Some(stored), None) => {
                let closed = stored.status == PipelineStatus::Close;
                info!(pipeline = %stored, "Adopting pipeline from the store");
                state.pipeline = Some(stored);
                if closed {
                    return Ok(());
                }
            }
            (None, Some(_)) => {
                info!(pipeline_id = %self.pipeline_id, "Pipeline removed from the store, evicting");
                if let Some(mut worker) = state.worker.take() {
                    worker.mark_deleted();
                    worker.stop_tasks().await;
                }
                state.pipeline = None;
                state.polled = None;
                return Ok(());
            }
        }

        if let Some(pipeline) = state.pipeline.as_mut() {
            self.update_pipeline_status(pipeline, PipelineStatus::Running, "")
                .await?;
        }
        self.restart_worker_locked(state).await
    }

    pub(super) async fn handle_failure(&self, failure: WorkerError) {
        error!(
            pipeline_id = %failure.pipeline_id,
            generation = failure.worker_generation,
            error = %failure.error,
            "Task failure received"
        );

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.stopped {
            return;
        }

        let current_generation = state.worker.as_ref().map(Worker::generation);
        if current_generation != Some(failure.worker_generation) {
            info!(
                failed_generation = failure.worker_generation,
                current_generation = ?current_generation,
                "Ignoring failure from a replaced worker"
            );
            return;
        }

        if let Some(mut worker) = state.worker.take() {
            worker.stop_tasks().await;
        }
        if let Some(pipeline) = state.pipeline.as_mut() {
            if let Err(e) = self
                .update_pipeline_status(pipeline, PipelineStatus::Error, failure.error.to_string())
                .await
            {
                error!(error = %e, "Failed to record pipeline failure");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(status: PipelineStatus) -> PipelineDefinition {
        PipelineDefinition {
            pipeline_id: "p1".to_string(),
            pipeline_name: "p1".to_string(),
            index_base: String::new(),
            use_index_base_in_dataset: false,
            input_topic: "in".to_string(),
            output_topic: "out".to_string(),
            error_topic: "err".to_string(),
            status,
            status_details: String::new(),
        }
    }

    #[test]
    fn test_check_and_set_same_status_is_noop() {
        let mut p = pipeline(PipelineStatus::Running);
        assert!(!check_and_set_status(&mut p, PipelineStatus::Running).unwrap());
    }

    #[test]
    fn test_pause_running_pipeline() {
        let mut p = pipeline(PipelineStatus::Running);
        assert!(check_and_set_status(&mut p, PipelineStatus::Closing).unwrap());
        assert_eq!(p.status, PipelineStatus::Closing);
    }

    #[test]
    fn test_pause_closed_pipeline_is_noop() {
        let mut p = pipeline(PipelineStatus::Close);
        assert!(!check_and_set_status(&mut p, PipelineStatus::Closing).unwrap());
        assert_eq!(p.status, PipelineStatus::Close);
    }

    #[test]
    fn test_pause_failed_pipeline_is_rejected() {
        let mut p = pipeline(PipelineStatus::Error);
        let err = check_and_set_status(&mut p, PipelineStatus::Closing).unwrap_err();
        assert!(matches!(err, ControllerError::PauseNotRunning { .. }));
        assert_eq!(p.status, PipelineStatus::Error);
    }

    #[test]
    fn test_resume_from_close() {
        let mut p = pipeline(PipelineStatus::Close);
        assert!(check_and_set_status(&mut p, PipelineStatus::Running).unwrap());
        assert_eq!(p.status, PipelineStatus::Running);
    }
}
