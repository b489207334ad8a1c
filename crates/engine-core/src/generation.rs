use crate::error::GenerationError;
use async_trait::async_trait;
use model::{
    item::{GeneratedContent, RawResultsPage, RemoteJobStatus, WorkItem},
    pagination::cursor::Cursor,
};

/// Remote batch generation API. Implementations hold their own credential.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Submits every item in one batch and returns the remote job id.
    async fn create_job(&self, name: &str, items: &[WorkItem]) -> Result<String, GenerationError>;

    async fn get_job_status(&self, job_id: &str) -> Result<RemoteJobStatus, GenerationError>;

    /// Unacknowledged results from `cursor` on. Delivery is at-least-once.
    async fn get_job_results(
        &self,
        job_id: &str,
        cursor: &Cursor,
        limit: usize,
    ) -> Result<RawResultsPage, GenerationError>;

    /// Acknowledged items are never returned again.
    async fn ack_job_items(&self, job_id: &str, item_ids: &[String])
    -> Result<(), GenerationError>;

    async fn cancel_job(&self, job_id: &str) -> Result<(), GenerationError>;

    /// Synchronous generation of a single item.
    async fn generate_item(&self, item: &WorkItem) -> Result<GeneratedContent, GenerationError>;
}
