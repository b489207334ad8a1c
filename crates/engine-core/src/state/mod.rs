use crate::error::StoreError;
use async_trait::async_trait;
use model::{
    job::{Job, JobSpec},
    phase::Pipeline,
};

pub mod memory;
pub mod sled_store;

/// Default size of the recency indexes.
pub const DEFAULT_RECENT_CAPACITY: usize = 50;

/// Durable snapshot storage for jobs and pipelines.
///
/// Snapshots are written wholesale and the last write wins.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Allocates an id, stores a fresh snapshot with every row pending and
    /// records the id in the recency index.
    async fn create(&self, spec: JobSpec) -> Result<String, StoreError>;

    async fn load(&self, job_id: &str) -> Result<Job, StoreError>;

    async fn save(&self, job: &Job) -> Result<(), StoreError>;

    /// Most recently created job ids, newest first.
    async fn recent(&self, n: usize) -> Result<Vec<String>, StoreError>;

    /// Stores a pipeline snapshot, indexing it the first time it is seen.
    async fn save_pipeline(&self, pipeline: &Pipeline) -> Result<(), StoreError>;

    async fn load_pipeline(&self, pipeline_id: &str) -> Result<Pipeline, StoreError>;

    async fn recent_pipelines(&self, n: usize) -> Result<Vec<String>, StoreError>;
}

/// Pushes `id` onto a bounded FIFO kept newest-last.
pub(crate) fn push_recent(index: &mut Vec<String>, id: &str, capacity: usize) {
    if index.iter().any(|existing| existing == id) {
        return;
    }
    index.push(id.to_string());
    if index.len() > capacity {
        let overflow = index.len() - capacity;
        index.drain(..overflow);
    }
}

pub(crate) fn newest_first(index: &[String], n: usize) -> Vec<String> {
    index.iter().rev().take(n).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_index_is_bounded_fifo() {
        let mut index = Vec::new();
        for id in ["a", "b", "c", "d"] {
            push_recent(&mut index, id, 3);
        }
        assert_eq!(index, vec!["b", "c", "d"]);
        assert_eq!(newest_first(&index, 2), vec!["d", "c"]);
    }

    #[test]
    fn recent_index_ignores_duplicates() {
        let mut index = Vec::new();
        push_recent(&mut index, "a", 3);
        push_recent(&mut index, "a", 3);
        assert_eq!(index.len(), 1);
    }
}
