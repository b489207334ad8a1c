use crate::{coordinator::JobCoordinator, error::CoordinatorError};
use engine_core::{retry::RetryDisposition, state::JobStore};
use model::{
    job::{Job, JobSpec, JobStatus},
    phase::{PhaseKind, PhaseStatus, Pipeline, PipelinePlan},
};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Runs hub, leaf and city-hub jobs one after another so every parent page
/// exists before its children are generated.
pub struct PhaseSequencer {
    coordinator: Arc<JobCoordinator>,
    store: Arc<dyn JobStore>,
}

impl PhaseSequencer {
    pub fn new(coordinator: Arc<JobCoordinator>) -> Self {
        let store = coordinator.store().clone();
        Self { coordinator, store }
    }

    pub async fn start(&self, plan: PipelinePlan) -> Result<Pipeline, CoordinatorError> {
        let mut pipeline = Pipeline::new(Uuid::new_v4().to_string(), plan);
        self.store.save_pipeline(&pipeline).await?;
        info!(pipeline_id = %pipeline.id, name = %pipeline.plan.name, "Pipeline started");

        self.launch_from(&mut pipeline, PhaseKind::HubPages).await?;
        self.store.save_pipeline(&pipeline).await?;
        Ok(pipeline)
    }

    /// Polls the running phase once and moves on when its job has drained.
    pub async fn advance(&self, pipeline_id: &str) -> Result<Pipeline, CoordinatorError> {
        let mut pipeline = self.store.load_pipeline(pipeline_id).await?;
        if pipeline.status.is_terminal() {
            return Ok(pipeline);
        }

        let Some(kind) = pipeline.current_phase() else {
            pipeline.finish();
            self.store.save_pipeline(&pipeline).await?;
            return Ok(pipeline);
        };

        let Some(job_id) = pipeline.phase(kind).job_id.clone() else {
            // Interrupted between two phases.
            self.launch_from(&mut pipeline, kind).await?;
            self.store.save_pipeline(&pipeline).await?;
            return Ok(pipeline);
        };

        match self.coordinator.poll(&job_id).await {
            Ok(_) => {}
            Err(e) if halts_pipeline(&e) => {
                warn!(pipeline_id, phase = %kind, job_id = %job_id, error = %e, "Phase poll failed, aborting pipeline");
                pipeline.abort(kind, e.to_string());
                self.store.save_pipeline(&pipeline).await?;
                return Ok(pipeline);
            }
            Err(e) => return Err(e),
        }
        let job = self.coordinator.status(&job_id).await?;

        match job.status {
            JobStatus::Complete if job.is_drained() => {
                complete_phase(&mut pipeline, kind, &job);
                match kind.next() {
                    Some(next) => self.launch_from(&mut pipeline, next).await?,
                    None => self.finish(&mut pipeline),
                }
            }
            JobStatus::Canceled => {
                warn!(pipeline_id, job_id = %job_id, "Phase job was canceled");
                pipeline.cancel();
            }
            JobStatus::Failed => {
                let message = job
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "phase job failed".to_string());
                pipeline.abort(kind, message);
            }
            _ => {}
        }

        self.store.save_pipeline(&pipeline).await?;
        Ok(pipeline)
    }

    pub async fn cancel(&self, pipeline_id: &str) -> Result<Pipeline, CoordinatorError> {
        let mut pipeline = self.store.load_pipeline(pipeline_id).await?;
        if pipeline.status.is_terminal() {
            return Ok(pipeline);
        }

        if let Some(kind) = pipeline.current_phase()
            && let Some(job_id) = pipeline.phase(kind).job_id.clone()
        {
            self.coordinator.cancel(&job_id).await?;
        }

        pipeline.cancel();
        self.store.save_pipeline(&pipeline).await?;
        info!(pipeline_id, "Pipeline canceled");
        Ok(pipeline)
    }

    pub async fn status(&self, pipeline_id: &str) -> Result<Pipeline, CoordinatorError> {
        Ok(self.store.load_pipeline(pipeline_id).await?)
    }

    pub async fn recent(&self, n: usize) -> Result<Vec<String>, CoordinatorError> {
        Ok(self.store.recent_pipelines(n).await?)
    }

    /// Submits the job for `first`, skipping over phases with nothing to generate.
    async fn launch_from(
        &self,
        pipeline: &mut Pipeline,
        first: PhaseKind,
    ) -> Result<(), CoordinatorError> {
        let mut next = Some(first);

        while let Some(kind) = next {
            let targets = pipeline.plan.targets_for(kind);
            if targets.is_empty() {
                let phase = pipeline.phase_mut(kind);
                phase.status = PhaseStatus::Completed;
                phase.message = Some("nothing to generate".into());
                next = kind.next();
                continue;
            }

            let spec = JobSpec::new(format!("{} / {}", pipeline.plan.name, kind), targets)
                .with_update_existing(pipeline.plan.update_existing)
                .with_auto_publish(pipeline.plan.auto_publish);
            let job_id = self.coordinator.create(spec).await?;

            let phase = pipeline.phase_mut(kind);
            phase.job_id = Some(job_id.clone());
            phase.status = PhaseStatus::Running;

            match self.coordinator.submit(&job_id).await {
                Ok(remote_job_id) => {
                    info!(pipeline_id = %pipeline.id, phase = %kind, job_id = %job_id, remote_job_id = %remote_job_id, "Phase submitted");
                }
                Err(CoordinatorError::Store(e)) => return Err(e.into()),
                Err(e) => {
                    warn!(pipeline_id = %pipeline.id, phase = %kind, error = %e, "Phase submission failed, aborting pipeline");
                    pipeline.abort(kind, e.to_string());
                }
            }
            return Ok(());
        }

        self.finish(pipeline);
        Ok(())
    }

    fn finish(&self, pipeline: &mut Pipeline) {
        pipeline.finish();
        info!(pipeline_id = %pipeline.id, total_success = pipeline.total_success, "Pipeline completed");
    }
}

/// Poll errors that will not clear up by polling again. Transient fetch
/// failures never get here, the coordinator reports them as a followup.
fn halts_pipeline(err: &CoordinatorError) -> bool {
    match err {
        CoordinatorError::Store(_) => false,
        CoordinatorError::Generation(e) => e.disposition() == RetryDisposition::Stop,
        CoordinatorError::Content(e) => e.disposition() == RetryDisposition::Stop,
        CoordinatorError::Configuration(_)
        | CoordinatorError::InvalidState { .. }
        | CoordinatorError::EmptyJob(_)
        | CoordinatorError::NotSubmitted(_) => true,
    }
}

fn complete_phase(pipeline: &mut Pipeline, kind: PhaseKind, job: &Job) {
    let phase = pipeline.phase_mut(kind);
    phase.status = PhaseStatus::Completed;
    phase.success = job.counters.success;
    phase.message = Some(format!(
        "{} succeeded, {} skipped, {} failed",
        job.counters.success, job.counters.skipped, job.counters.failed
    ));
    info!(pipeline_id = %pipeline.id, phase = %kind, job_id = %job.id, "Phase completed");
}
