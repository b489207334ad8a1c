use crate::{
    error::StoreError,
    state::{DEFAULT_RECENT_CAPACITY, JobStore, newest_first, push_recent},
};
use async_trait::async_trait;
use model::{
    job::{Job, JobSpec},
    phase::Pipeline,
};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;
use tracing::debug;

const RECENT_JOBS_KEY: &str = "recent:jobs";
const RECENT_PIPELINES_KEY: &str = "recent:pipelines";

pub struct SledJobStore {
    db: sled::Db,
    capacity: usize,
}

impl SledJobStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self::from_db(db))
    }

    /// Shares an already opened database (e.g. with the lock table).
    pub fn from_db(db: sled::Db) -> Self {
        Self {
            db,
            capacity: DEFAULT_RECENT_CAPACITY,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    #[inline]
    fn job_key(job_id: &str) -> String {
        format!("job:{}", job_id)
    }

    #[inline]
    fn pipeline_key(pipeline_id: &str) -> String {
        format!("pipeline:{}", pipeline_id)
    }

    /// Writes a snapshot and, in the same transaction, records its id in a recency index.
    fn put_indexed(
        &self,
        key: &str,
        bytes: &[u8],
        index_key: &str,
        id: &str,
    ) -> Result<(), StoreError> {
        let capacity = self.capacity;
        let result = self.db.transaction::<_, _, StoreError>(|tx| {
            let mut index: Vec<String> = match tx.get(index_key)? {
                Some(raw) => bincode::deserialize(&raw)
                    .map_err(|e| ConflictableTransactionError::Abort(e.into()))?,
                None => Vec::new(),
            };
            push_recent(&mut index, id, capacity);
            let encoded = bincode::serialize(&index).map_err(|e| {
                ConflictableTransactionError::Abort(StoreError::Encode(e.to_string()))
            })?;

            tx.insert(key, bytes)?;
            tx.insert(index_key, encoded)?;
            Ok(())
        });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(StoreError::Sled(e)),
        }
    }

    fn read_index(&self, index_key: &str) -> Result<Vec<String>, StoreError> {
        match self.db.get(index_key)? {
            Some(raw) => Ok(bincode::deserialize(&raw)?),
            None => Ok(Vec::new()),
        }
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Encode(e.to_string()))
}

#[async_trait]
impl JobStore for SledJobStore {
    async fn create(&self, spec: JobSpec) -> Result<String, StoreError> {
        let job_id = uuid::Uuid::new_v4().to_string();
        let job = Job::new(job_id.clone(), spec);
        let bytes = encode(&job)?;

        self.put_indexed(&Self::job_key(&job_id), &bytes, RECENT_JOBS_KEY, &job_id)?;
        debug!(job_id = %job_id, rows = job.total_rows, "Created job snapshot");
        Ok(job_id)
    }

    async fn load(&self, job_id: &str) -> Result<Job, StoreError> {
        match self.db.get(Self::job_key(job_id))? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Err(StoreError::JobNotFound(job_id.to_string())),
        }
    }

    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        let bytes = encode(job)?;
        self.db.insert(Self::job_key(&job.id), bytes)?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn recent(&self, n: usize) -> Result<Vec<String>, StoreError> {
        let index = self.read_index(RECENT_JOBS_KEY)?;
        Ok(newest_first(&index, n))
    }

    async fn save_pipeline(&self, pipeline: &Pipeline) -> Result<(), StoreError> {
        let bytes = encode(pipeline)?;
        self.put_indexed(
            &Self::pipeline_key(&pipeline.id),
            &bytes,
            RECENT_PIPELINES_KEY,
            &pipeline.id,
        )?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn load_pipeline(&self, pipeline_id: &str) -> Result<Pipeline, StoreError> {
        match self.db.get(Self::pipeline_key(pipeline_id))? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Err(StoreError::PipelineNotFound(pipeline_id.to_string())),
        }
    }

    async fn recent_pipelines(&self, n: usize) -> Result<Vec<String>, StoreError> {
        let index = self.read_index(RECENT_PIPELINES_KEY)?;
        Ok(newest_first(&index, n))
    }
}
