use crate::{error::ImportError, mapping::artifact_spec};
use engine_core::{
    content::ContentStore,
    lock::{LockGuard, LockManager},
    metrics::Metrics,
};
use model::{
    artifact::{ArtifactRecord, ArtifactRef, ArtifactTag, Provenance, PublishState},
    item::{GeneratedContent, ItemOutcome, ResultItem},
    job::Job,
    target::{CanonicalKey, PageTarget},
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);

/// Who is importing, and with which options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportContext {
    pub job_id: Option<String>,
    pub row_index: Option<usize>,
    pub update_existing: bool,
    pub auto_publish: bool,
    pub provenance: Provenance,
}

impl ImportContext {
    pub fn for_row(job: &Job, row_index: usize) -> Self {
        Self {
            job_id: Some(job.id.clone()),
            row_index: Some(row_index),
            update_existing: job.update_existing,
            auto_publish: job.auto_publish,
            provenance: Provenance::BulkJob,
        }
    }

    pub fn single(update_existing: bool, auto_publish: bool) -> Self {
        Self {
            job_id: None,
            row_index: None,
            update_existing,
            auto_publish,
            provenance: Provenance::SingleItem,
        }
    }

    /// The artifact was written by an earlier delivery for this same row,
    /// e.g. one whose snapshot was lost before it could be saved.
    fn produced(&self, record: &ArtifactRecord) -> bool {
        match (self.job_id.as_deref(), self.row_index) {
            (Some(job_id), Some(row_index)) => record.created_for_row(job_id, row_index),
            _ => false,
        }
    }

    /// An existing artifact may be overwritten only when it was not produced by this same job.
    fn may_overwrite(&self, created_by_this_job: bool) -> bool {
        self.update_existing && !created_by_this_job
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Success,
    AlreadyExisted,
    Failed,
    /// Another caller holds the key. Try again later.
    LockContended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportResult {
    pub outcome: ImportOutcome,
    pub artifact_ref: Option<ArtifactRef>,
    pub error: Option<String>,
}

impl ImportResult {
    fn success(artifact_ref: ArtifactRef) -> Self {
        Self {
            outcome: ImportOutcome::Success,
            artifact_ref: Some(artifact_ref),
            error: None,
        }
    }

    fn already_existed(artifact_ref: ArtifactRef) -> Self {
        Self {
            outcome: ImportOutcome::AlreadyExisted,
            artifact_ref: Some(artifact_ref),
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            outcome: ImportOutcome::Failed,
            artifact_ref: None,
            error: Some(error.into()),
        }
    }

    fn contended() -> Self {
        Self {
            outcome: ImportOutcome::LockContended,
            artifact_ref: None,
            error: None,
        }
    }
}

/// The one place artifacts get created.
///
/// Every caller (bulk polling, single-item generation, reconciliation) goes
/// through [`ImportGate::import`], which looks up the canonical key only after
/// taking the per-key lock. That ordering is what keeps concurrent or repeated
/// deliveries from producing a second artifact.
pub struct ImportGate {
    content: Arc<dyn ContentStore>,
    locks: Arc<dyn LockManager>,
    lock_ttl: Duration,
    metrics: Metrics,
}

impl ImportGate {
    pub fn new(
        content: Arc<dyn ContentStore>,
        locks: Arc<dyn LockManager>,
        metrics: Metrics,
    ) -> Self {
        Self {
            content,
            locks,
            lock_ttl: DEFAULT_LOCK_TTL,
            metrics,
        }
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    pub fn content(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    /// Imports one fetched result item.
    pub async fn import(&self, item: &ResultItem, ctx: &ImportContext) -> ImportResult {
        match &item.outcome {
            ItemOutcome::Completed { target, content } => {
                self.import_content(&item.canonical_key, target, content, ctx)
                    .await
            }
            ItemOutcome::Failed { message, .. } => {
                self.metrics.increment_failures(1);
                ImportResult::failed(message.clone())
            }
        }
    }

    /// Imports content produced outside the bulk stream (e.g. single-item generation).
    pub async fn import_content(
        &self,
        key: &CanonicalKey,
        target: &PageTarget,
        content: &GeneratedContent,
        ctx: &ImportContext,
    ) -> ImportResult {
        let guard = match LockGuard::try_acquire(&self.locks, key.lock_key(), self.lock_ttl) {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                debug!(canonical_key = %key, "Import lock held elsewhere");
                self.metrics.increment_lock_contended(1);
                return ImportResult::contended();
            }
            Err(err) => {
                // Nothing was written; redelivery will try again.
                warn!(canonical_key = %key, error = %err, "Import lock unavailable");
                self.metrics.increment_lock_contended(1);
                return ImportResult::contended();
            }
        };

        let result = match self.import_locked(key, target, content, ctx).await {
            Ok(result) => result,
            Err(err) => {
                warn!(canonical_key = %key, error = %err, "Import failed");
                self.metrics.increment_failures(1);
                ImportResult::failed(err.to_string())
            }
        };

        drop(guard);
        result
    }

    async fn import_locked(
        &self,
        key: &CanonicalKey,
        target: &PageTarget,
        content: &GeneratedContent,
        ctx: &ImportContext,
    ) -> Result<ImportResult, ImportError> {
        let mut replaces = None;
        if let Some(existing) = self.content.find_by_canonical_key(key).await? {
            if ctx.produced(&existing) {
                debug!(canonical_key = %key, artifact = %existing.artifact_ref, "Artifact already imported for this row");
                return Ok(ImportResult::success(existing.artifact_ref));
            }

            let same_job = ctx
                .job_id
                .as_deref()
                .is_some_and(|job_id| existing.created_by_job(job_id));

            if !ctx.may_overwrite(same_job) {
                debug!(canonical_key = %key, artifact = %existing.artifact_ref, "Artifact already exists");
                self.metrics.increment_already_existed(1);
                return Ok(ImportResult::already_existed(existing.artifact_ref));
            }
            replaces = Some(existing.artifact_ref);
        }

        let parent = self.resolve_parent(target).await?;
        let spec = artifact_spec(
            target,
            content,
            PublishState::from_auto_publish(ctx.auto_publish),
            replaces.clone(),
        );

        let artifact_ref = self.content.upsert(&spec, parent.as_ref()).await?;
        self.content
            .tag(
                &artifact_ref,
                &ArtifactTag {
                    canonical_key: key.clone(),
                    job_id: ctx.job_id.clone(),
                    row_index: ctx.row_index,
                    provenance: ctx.provenance,
                },
            )
            .await?;

        self.metrics.increment_imported(1);
        info!(
            canonical_key = %key,
            artifact = %artifact_ref,
            replaced = replaces.is_some(),
            provenance = ctx.provenance.as_str(),
            "Imported artifact"
        );
        Ok(ImportResult::success(artifact_ref))
    }

    /// Leaf pages hang under their service hub when it exists.
    async fn resolve_parent(
        &self,
        target: &PageTarget,
    ) -> Result<Option<ArtifactRef>, ImportError> {
        let Some(parent_key) = target.parent_key() else {
            return Ok(None);
        };

        let parent = self
            .content
            .find_by_canonical_key(&parent_key)
            .await?
            .map(|record| record.artifact_ref);
        if parent.is_none() {
            debug!(parent_key = %parent_key, "Parent artifact not found, importing without parent");
        }
        Ok(parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::content::MemoryContentStore;
    use engine_core::lock::memory::MemoryLockManager;
    use model::{item::FailureKind, target::Location};

    fn content() -> GeneratedContent {
        GeneratedContent {
            title: "Repair".into(),
            body: "<p>Repair</p>".into(),
            excerpt: None,
            meta_description: None,
        }
    }

    fn item(item_id: &str, target: PageTarget) -> ResultItem {
        ResultItem {
            item_id: item_id.into(),
            row_index: 0,
            canonical_key: target.canonical_key(),
            attempts: 1,
            outcome: ItemOutcome::Completed {
                target,
                content: content(),
            },
        }
    }

    fn bulk(job_id: &str) -> ImportContext {
        ImportContext {
            job_id: Some(job_id.into()),
            row_index: Some(0),
            update_existing: false,
            auto_publish: false,
            provenance: Provenance::BulkJob,
        }
    }

    struct Fixture {
        store: Arc<MemoryContentStore>,
        locks: Arc<MemoryLockManager>,
        gate: ImportGate,
    }

    fn fixture(store: MemoryContentStore) -> Fixture {
        let store = Arc::new(store);
        let locks = Arc::new(MemoryLockManager::new());
        let gate = ImportGate::new(store.clone(), locks.clone(), Metrics::new());
        Fixture { store, locks, gate }
    }

    #[tokio::test]
    async fn second_import_reports_already_existed() {
        let f = fixture(MemoryContentStore::new());
        let target = PageTarget::hub("Repair");

        let first = f.gate.import(&item("i-1", target.clone()), &bulk("job-1")).await;
        let second = f.gate.import(&item("i-9", target), &bulk("job-2")).await;

        assert_eq!(first.outcome, ImportOutcome::Success);
        assert_eq!(second.outcome, ImportOutcome::AlreadyExisted);
        assert_eq!(first.artifact_ref, second.artifact_ref);
        assert_eq!(f.store.upsert_count(), 1);
    }

    #[tokio::test]
    async fn redelivery_for_the_same_row_is_a_success() {
        let f = fixture(MemoryContentStore::new());
        let target = PageTarget::hub("Repair");

        let first = f.gate.import(&item("i-1", target.clone()), &bulk("job-1")).await;
        let redelivered = f.gate.import(&item("i-1", target.clone()), &bulk("job-1")).await;
        assert_eq!(redelivered.outcome, ImportOutcome::Success);
        assert_eq!(redelivered.artifact_ref, first.artifact_ref);
        assert_eq!(f.store.upsert_count(), 1);

        let mut other_row = bulk("job-1");
        other_row.row_index = Some(3);
        let sibling = f.gate.import(&item("i-2", target), &other_row).await;
        assert_eq!(sibling.outcome, ImportOutcome::AlreadyExisted);
    }

    #[tokio::test]
    async fn held_lock_reports_contention_without_side_effects() {
        let f = fixture(MemoryContentStore::new());
        let target = PageTarget::hub("Repair");
        let locks: Arc<dyn LockManager> = f.locks.clone();
        let _held =
            LockGuard::try_acquire(&locks, target.canonical_key().lock_key(), DEFAULT_LOCK_TTL)
                .unwrap()
                .unwrap();

        let result = f.gate.import(&item("i-1", target), &bulk("job-1")).await;
        assert_eq!(result.outcome, ImportOutcome::LockContended);
        assert_eq!(f.store.upsert_count(), 0);
    }

    #[tokio::test]
    async fn lock_is_released_after_failed_upsert() {
        let store = MemoryContentStore::new();
        store.fail_next_upserts(1);
        let f = fixture(store);
        let target = PageTarget::hub("Repair");

        let result = f.gate.import(&item("i-1", target.clone()), &bulk("job-1")).await;
        assert_eq!(result.outcome, ImportOutcome::Failed);
        assert!(result.error.is_some());
        assert!(!f.locks.is_held(&target.canonical_key().lock_key()));

        let retry = f.gate.import(&item("i-1", target), &bulk("job-1")).await;
        assert_eq!(retry.outcome, ImportOutcome::Success);
    }

    #[tokio::test]
    async fn concurrent_imports_create_one_artifact() {
        let f = fixture(MemoryContentStore::new().with_upsert_delay(Duration::from_millis(50)));
        let target = PageTarget::leaf("Repair", &Location::new("Dallas", "TX"));

        let a = item("i-1", target.clone());
        let b = item("i-2", target);
        let ctx = bulk("job-1");
        let (ra, rb) = tokio::join!(f.gate.import(&a, &ctx), f.gate.import(&b, &ctx));

        let outcomes = [ra.outcome, rb.outcome];
        assert!(outcomes.contains(&ImportOutcome::Success));
        assert!(outcomes.contains(&ImportOutcome::LockContended));
        assert_eq!(f.store.upsert_count(), 1);

        // The loser's retry finds the artifact its own row already got.
        let again = f.gate.import(&b, &ctx).await;
        assert_eq!(again.outcome, ImportOutcome::Success);
        assert_eq!(f.store.upsert_count(), 1);
    }

    #[tokio::test]
    async fn update_existing_overwrites_foreign_artifact_in_place() {
        let f = fixture(MemoryContentStore::new());
        let target = PageTarget::hub("Repair");
        let original = f.gate.import(&item("i-1", target.clone()), &bulk("job-1")).await;

        let mut ctx = bulk("job-2");
        ctx.update_existing = true;
        let updated = f.gate.import(&item("i-2", target.clone()), &ctx).await;
        assert_eq!(updated.outcome, ImportOutcome::Success);
        assert_eq!(updated.artifact_ref, original.artifact_ref);
        assert_eq!(f.store.artifact_count(), 1);

        // Redelivery inside the same job does not rewrite again.
        let redelivered = f.gate.import(&item("i-2", target), &ctx).await;
        assert_eq!(redelivered.outcome, ImportOutcome::Success);
        assert_eq!(redelivered.artifact_ref, original.artifact_ref);
        assert_eq!(f.store.upsert_count(), 2);
    }

    #[tokio::test]
    async fn leaf_is_parented_under_its_hub() {
        let f = fixture(MemoryContentStore::new());
        let hub = f
            .gate
            .import(&item("i-1", PageTarget::hub("Repair")), &bulk("job-1"))
            .await;

        let leaf_target = PageTarget::leaf("Repair", &Location::new("Dallas", "TX"));
        let leaf = f.gate.import(&item("i-2", leaf_target), &bulk("job-2")).await;

        let stored = f.store.get(leaf.artifact_ref.as_ref().unwrap()).unwrap();
        assert_eq!(stored.parent, hub.artifact_ref);
    }

    #[tokio::test]
    async fn failed_items_are_not_imported() {
        let f = fixture(MemoryContentStore::new());
        let failed = ResultItem {
            item_id: "i-1".into(),
            row_index: 0,
            canonical_key: PageTarget::hub("Repair").canonical_key(),
            attempts: 1,
            outcome: ItemOutcome::Failed {
                kind: FailureKind::Malformed,
                message: "bad payload".into(),
            },
        };

        let result = f.gate.import(&failed, &bulk("job-1")).await;
        assert_eq!(result.outcome, ImportOutcome::Failed);
        assert_eq!(result.error.as_deref(), Some("bad payload"));
        assert_eq!(f.store.upsert_count(), 0);
    }

    #[tokio::test]
    async fn auto_publish_sets_published_state() {
        let f = fixture(MemoryContentStore::new());
        let ctx = ImportContext::single(false, true);

        let result = f.gate.import(&item("i-1", PageTarget::hub("Repair")), &ctx).await;
        let stored = f.store.get(result.artifact_ref.as_ref().unwrap()).unwrap();
        assert_eq!(stored.spec.state, PublishState::Published);
        assert_eq!(stored.tag.unwrap().provenance, Provenance::SingleItem);
    }
}
