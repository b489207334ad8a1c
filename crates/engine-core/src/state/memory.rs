use crate::{
    error::StoreError,
    state::{DEFAULT_RECENT_CAPACITY, JobStore, newest_first, push_recent},
};
use async_trait::async_trait;
use model::{
    job::{Job, JobSpec},
    phase::Pipeline,
};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, Job>,
    pipelines: HashMap<String, Pipeline>,
    recent_jobs: Vec<String>,
    recent_pipelines: Vec<String>,
}

/// Non-durable store for tests and single-process runs.
pub struct MemoryJobStore {
    inner: RwLock<Inner>,
    capacity: usize,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            capacity: DEFAULT_RECENT_CAPACITY,
        }
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, spec: JobSpec) -> Result<String, StoreError> {
        let job_id = uuid::Uuid::new_v4().to_string();
        let job = Job::new(job_id.clone(), spec);

        let mut inner = self.inner.write().await;
        inner.jobs.insert(job_id.clone(), job);
        push_recent(&mut inner.recent_jobs, &job_id, self.capacity);
        Ok(job_id)
    }

    async fn load(&self, job_id: &str) -> Result<Job, StoreError> {
        self.inner
            .read()
            .await
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))
    }

    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .jobs
            .insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn recent(&self, n: usize) -> Result<Vec<String>, StoreError> {
        Ok(newest_first(&self.inner.read().await.recent_jobs, n))
    }

    async fn save_pipeline(&self, pipeline: &Pipeline) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .pipelines
            .insert(pipeline.id.clone(), pipeline.clone());
        push_recent(&mut inner.recent_pipelines, &pipeline.id, self.capacity);
        Ok(())
    }

    async fn load_pipeline(&self, pipeline_id: &str) -> Result<Pipeline, StoreError> {
        self.inner
            .read()
            .await
            .pipelines
            .get(pipeline_id)
            .cloned()
            .ok_or_else(|| StoreError::PipelineNotFound(pipeline_id.to_string()))
    }

    async fn recent_pipelines(&self, n: usize) -> Result<Vec<String>, StoreError> {
        Ok(newest_first(&self.inner.read().await.recent_pipelines, n))
    }
}
