use super::{harness, leaf_spec};
use crate::{
    coordinator::{CoordinatorConfig, JobCoordinator, SingleOptions},
    error::CoordinatorError,
};
use async_trait::async_trait;
use connectors::{content::MemoryContentStore, generation::InMemoryGenerationService};
use engine_core::{
    error::StoreError,
    lock::memory::MemoryLockManager,
    metrics::Metrics,
    state::{JobStore, memory::MemoryJobStore},
};
use engine_processing::import_gate::ImportOutcome;
use model::{
    artifact::{ArtifactSpec, ArtifactTag, PublishState, Provenance},
    job::{Job, JobSpec, JobStatus, RowStatus},
    phase::Pipeline,
    pagination::cursor::Cursor,
    target::{Location, PageTarget},
};
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn submit_sends_every_row_and_marks_running() {
    let h = harness(InMemoryGenerationService::new());
    let job_id = h.coordinator.create(leaf_spec(&["Dallas", "Austin", "Waco"])).await.unwrap();

    let remote_id = h.coordinator.submit(&job_id).await.unwrap();

    let job = h.store.load(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(job.remote_job_id.as_deref(), Some(remote_id.as_str()));
    assert_eq!(h.service.job_items(&remote_id).len(), 3);

    // Submitting a running job hands back the same remote job.
    assert_eq!(h.coordinator.submit(&job_id).await.unwrap(), remote_id);
    assert_eq!(h.service.created_jobs().len(), 1);
}

#[tokio::test]
async fn rejected_submission_marks_job_failed() {
    let h = harness(InMemoryGenerationService::new());
    h.service.reject_creates(Some("unknown service"));
    let job_id = h.coordinator.create(leaf_spec(&["Dallas"])).await.unwrap();

    let err = h.coordinator.submit(&job_id).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::Generation(_)));

    let job = h.store.load(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.remote_job_id.is_none());
    assert!(job.last_error.unwrap().contains("unknown service"));
}

#[tokio::test]
async fn transient_create_failures_are_retried() {
    let h = harness(InMemoryGenerationService::new());
    h.service.fail_next_creates(2);
    let job_id = h.coordinator.create(leaf_spec(&["Dallas"])).await.unwrap();

    h.coordinator.submit(&job_id).await.unwrap();
    assert_eq!(h.store.load(&job_id).await.unwrap().status, JobStatus::Running);
}

#[tokio::test]
async fn empty_job_is_not_submitted() {
    let h = harness(InMemoryGenerationService::new());
    let job_id = h.coordinator.create(JobSpec::new("empty", vec![])).await.unwrap();

    let err = h.coordinator.submit(&job_id).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::EmptyJob(_)));
    assert!(h.service.created_jobs().is_empty());
}

#[tokio::test]
async fn poll_imports_acks_and_completes() {
    let h = harness(InMemoryGenerationService::new().with_auto_complete());
    let (job_id, remote_id) = h
        .coordinator
        .create_and_submit(leaf_spec(&["Dallas", "Austin", "Waco"]))
        .await
        .unwrap();

    let report = h.coordinator.poll(&job_id).await.unwrap();
    assert_eq!(report.status, JobStatus::Complete);
    assert_eq!(report.fetched, 3);
    assert_eq!(report.acknowledged, 3);
    assert_eq!(report.tally.imported, 3);
    assert_eq!(report.batch_size, 50);
    assert!(!report.needs_followup);

    let job = h.store.load(&job_id).await.unwrap();
    assert!(job.is_drained());
    assert_eq!(job.counters.success, 3);
    assert_eq!(h.content.artifact_count(), 3);
    assert_eq!(h.service.acked_ids(&remote_id).len(), 3);
}

#[tokio::test]
async fn poll_is_inert_for_jobs_that_are_not_running() {
    let h = harness(InMemoryGenerationService::new());
    let job_id = h.coordinator.create(leaf_spec(&["Dallas"])).await.unwrap();

    let report = h.coordinator.poll(&job_id).await.unwrap();
    assert_eq!(report.status, JobStatus::Pending);
    assert_eq!(report.fetched, 0);
    assert!(!report.needs_followup);
    assert!(h.service.result_calls().is_empty());
}

#[tokio::test]
async fn transient_fetch_error_keeps_job_running_on_same_cursor() {
    let h = harness(InMemoryGenerationService::new());
    let (job_id, _) = h
        .coordinator
        .create_and_submit(leaf_spec(&["Dallas", "Austin"]))
        .await
        .unwrap();
    h.service.set_unavailable(true);

    let report = h.coordinator.poll(&job_id).await.unwrap();
    assert!(report.error.is_some());
    assert!(report.needs_followup);
    assert!(report.remote.is_none());

    let job = h.store.load(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(job.cursor, Cursor::None);
    assert_eq!(job.counters.processed, 0);
}

#[tokio::test]
async fn failed_item_retries_then_becomes_terminal() {
    let h = harness(InMemoryGenerationService::new());
    let (job_id, remote_id) = h
        .coordinator
        .create_and_submit(leaf_spec(&["Dallas"]))
        .await
        .unwrap();

    h.service.fail_item(&remote_id, 0, "model refused");
    let first = h.coordinator.poll(&job_id).await.unwrap();
    assert_eq!(first.tally.retry_pending, 1);
    assert_eq!(first.acknowledged, 0);
    assert_eq!(first.status, JobStatus::Running);

    h.service.fail_item(&remote_id, 0, "model refused");
    let second = h.coordinator.poll(&job_id).await.unwrap();
    assert_eq!(second.tally.failed, 1);
    assert_eq!(second.acknowledged, 1);
    assert_eq!(second.status, JobStatus::Complete);

    let job = h.store.load(&job_id).await.unwrap();
    assert_eq!(job.rows[0].status, RowStatus::Failed);
    assert_eq!(job.rows[0].attempts, 2);
}

#[tokio::test]
async fn malformed_payload_fails_only_its_row() {
    let h = harness(InMemoryGenerationService::new());
    let (job_id, remote_id) = h
        .coordinator
        .create_and_submit(leaf_spec(&["Dallas", "Austin"]))
        .await
        .unwrap();

    h.service.malformed_item(&remote_id, 0);
    h.service.complete_item(&remote_id, 1);
    h.coordinator.poll(&job_id).await.unwrap();

    let job = h.store.load(&job_id).await.unwrap();
    assert_eq!(job.rows[0].status, RowStatus::Failed);
    assert_eq!(job.rows[1].status, RowStatus::Success);
    assert_eq!(h.content.artifact_count(), 1);
}

#[tokio::test]
async fn cancel_is_idempotent_and_stops_polling() {
    let h = harness(InMemoryGenerationService::new());
    let (job_id, remote_id) = h
        .coordinator
        .create_and_submit(leaf_spec(&["Dallas"]))
        .await
        .unwrap();

    let first = h.coordinator.cancel(&job_id).await.unwrap();
    let second = h.coordinator.cancel(&job_id).await.unwrap();
    assert_eq!(first.status, JobStatus::Canceled);
    assert_eq!(second.status, JobStatus::Canceled);
    assert_eq!(h.service.cancel_calls(), 1);
    assert!(h.service.is_canceled(&remote_id));

    h.service.complete_item(&remote_id, 0);
    let report = h.coordinator.poll(&job_id).await.unwrap();
    assert_eq!(report.fetched, 0);
    assert_eq!(h.content.artifact_count(), 0);
}

#[tokio::test]
async fn cancel_succeeds_locally_when_service_is_down() {
    let h = harness(InMemoryGenerationService::new());
    let (job_id, _) = h
        .coordinator
        .create_and_submit(leaf_spec(&["Dallas"]))
        .await
        .unwrap();
    h.service.set_unavailable(true);

    let job = h.coordinator.cancel(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Canceled);
}

#[tokio::test]
async fn status_reconciles_rows_against_content_store() {
    let h = harness(InMemoryGenerationService::new());
    let (job_id, _) = h
        .coordinator
        .create_and_submit(leaf_spec(&["Dallas", "Austin"]))
        .await
        .unwrap();

    let job = h.store.load(&job_id).await.unwrap();
    insert_bulk_artifact(&h.content, &job.rows[1].target, &job_id, 1);

    let job = h.coordinator.status(&job_id).await.unwrap();
    assert_eq!(job.rows[1].status, RowStatus::Success);
    assert_eq!(job.counters.success, 1);
    assert_eq!(h.store.load(&job_id).await.unwrap().counters.success, 1);

    let rows = h.coordinator.export(&job_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].city.as_deref(), Some("Austin"));
}

fn insert_bulk_artifact(content: &MemoryContentStore, target: &PageTarget, job_id: &str, row: usize) {
    content.insert_tagged(
        &ArtifactSpec {
            canonical_key: target.canonical_key(),
            kind: target.kind(),
            title: target.label(),
            slug: target.label().to_lowercase().replace(' ', "-"),
            body: format!("<p>{}</p>", target.label()),
            excerpt: None,
            meta_description: None,
            state: PublishState::Draft,
            replaces: None,
        },
        ArtifactTag {
            canonical_key: target.canonical_key(),
            job_id: Some(job_id.to_string()),
            row_index: Some(row),
            provenance: Provenance::BulkJob,
        },
    );
}

/// Saves `newer` right after the next load, like a poll finishing while
/// another caller is still working from the snapshot it read.
struct InterleavingStore {
    inner: MemoryJobStore,
    newer: Mutex<Option<Job>>,
}

#[async_trait]
impl JobStore for InterleavingStore {
    async fn create(&self, spec: JobSpec) -> Result<String, StoreError> {
        self.inner.create(spec).await
    }

    async fn load(&self, job_id: &str) -> Result<Job, StoreError> {
        let job = self.inner.load(job_id).await?;
        let newer = self.newer.lock().unwrap().take();
        if let Some(newer) = newer {
            self.inner.save(&newer).await?;
        }
        Ok(job)
    }

    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        self.inner.save(job).await
    }

    async fn recent(&self, n: usize) -> Result<Vec<String>, StoreError> {
        self.inner.recent(n).await
    }

    async fn save_pipeline(&self, pipeline: &Pipeline) -> Result<(), StoreError> {
        self.inner.save_pipeline(pipeline).await
    }

    async fn load_pipeline(&self, pipeline_id: &str) -> Result<Pipeline, StoreError> {
        self.inner.load_pipeline(pipeline_id).await
    }

    async fn recent_pipelines(&self, n: usize) -> Result<Vec<String>, StoreError> {
        self.inner.recent_pipelines(n).await
    }
}

#[tokio::test]
async fn status_repair_keeps_a_concurrent_cursor_advance() {
    let store = Arc::new(InterleavingStore {
        inner: MemoryJobStore::new(),
        newer: Mutex::new(None),
    });
    let content = Arc::new(MemoryContentStore::new());
    let coordinator = JobCoordinator::with_config(
        store.clone(),
        Arc::new(InMemoryGenerationService::new()),
        content.clone(),
        Arc::new(MemoryLockManager::new()),
        Metrics::new(),
        CoordinatorConfig::default(),
    );

    let (job_id, _) = coordinator
        .create_and_submit(leaf_spec(&["Dallas", "Austin"]))
        .await
        .unwrap();
    let job = store.load(&job_id).await.unwrap();
    insert_bulk_artifact(&content, &job.rows[1].target, &job_id, 1);

    let mut advanced = job.clone();
    advanced.cursor = Cursor::Token("c-9".into());
    *store.newer.lock().unwrap() = Some(advanced);

    let job = coordinator.status(&job_id).await.unwrap();
    assert_eq!(job.rows[1].status, RowStatus::Success);
    assert_eq!(job.cursor, Cursor::Token("c-9".into()));

    let stored = store.inner.load(&job_id).await.unwrap();
    assert_eq!(stored.cursor, Cursor::Token("c-9".into()));
    assert_eq!(stored.counters.success, 1);
}

#[tokio::test]
async fn generate_single_goes_through_the_gate() {
    let h = harness(InMemoryGenerationService::new());
    let target = PageTarget::hub("Water Heater Repair");

    let first = h
        .coordinator
        .generate_single(target.clone(), SingleOptions::default())
        .await
        .unwrap();
    assert_eq!(first.outcome, ImportOutcome::Success);

    let second = h
        .coordinator
        .generate_single(target, SingleOptions::default())
        .await
        .unwrap();
    assert_eq!(second.outcome, ImportOutcome::AlreadyExisted);
    assert_eq!(second.artifact_ref, first.artifact_ref);
    assert_eq!(h.service.generate_calls(), 1);
    assert_eq!(h.content.artifact_count(), 1);
}

#[tokio::test]
async fn generate_single_update_existing_overwrites_in_place() {
    let h = harness(InMemoryGenerationService::new());
    let target = PageTarget::leaf("Water Heater Repair", &Location::new("Dallas", "TX"));

    let first = h
        .coordinator
        .generate_single(target.clone(), SingleOptions::default())
        .await
        .unwrap();
    let second = h
        .coordinator
        .generate_single(
            target,
            SingleOptions {
                update_existing: true,
                auto_publish: true,
            },
        )
        .await
        .unwrap();

    assert_eq!(second.outcome, ImportOutcome::Success);
    assert_eq!(second.artifact_ref, first.artifact_ref);
    assert_eq!(h.content.artifact_count(), 1);
    let stored = h.content.get(first.artifact_ref.as_ref().unwrap()).unwrap();
    assert_eq!(stored.revision, 2);
}

#[tokio::test]
async fn recent_lists_newest_first() {
    let h = harness(InMemoryGenerationService::new());
    let a = h.coordinator.create(leaf_spec(&["Dallas"])).await.unwrap();
    let b = h.coordinator.create(leaf_spec(&["Austin"])).await.unwrap();

    assert_eq!(h.coordinator.recent(10).await.unwrap(), vec![b, a]);
}
