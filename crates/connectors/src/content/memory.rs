use crate::content::StoredArtifact;
use async_trait::async_trait;
use engine_core::{content::ContentStore, error::ContentError};
use model::{
    artifact::{ArtifactRecord, ArtifactRef, ArtifactSpec, ArtifactTag},
    target::CanonicalKey,
};
use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
    time::Duration,
};

#[derive(Default)]
struct Inner {
    artifacts: HashMap<ArtifactRef, StoredArtifact>,
    by_key: HashMap<CanonicalKey, ArtifactRef>,
}

/// Content store kept in process memory.
///
/// Exposes a few knobs (`with_upsert_delay`, `fail_next_upserts`) so callers
/// can widen race windows and inject write failures.
pub struct MemoryContentStore {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
    upserts: AtomicU64,
    pending_failures: AtomicU32,
    upsert_delay: Option<Duration>,
}

impl Default for MemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            next_id: AtomicU64::new(1),
            upserts: AtomicU64::new(0),
            pending_failures: AtomicU32::new(0),
            upsert_delay: None,
        }
    }

    /// Sleeps inside every upsert before writing.
    pub fn with_upsert_delay(mut self, delay: Duration) -> Self {
        self.upsert_delay = Some(delay);
        self
    }

    /// The next `n` upserts fail with `ContentError::Unavailable`.
    pub fn fail_next_upserts(&self, n: u32) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Number of upserts that actually wrote something.
    pub fn upsert_count(&self) -> u64 {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn artifact_count(&self) -> usize {
        self.lock().artifacts.len()
    }

    pub fn get(&self, artifact: &ArtifactRef) -> Option<StoredArtifact> {
        self.lock().artifacts.get(artifact).cloned()
    }

    pub fn find_by_key(&self, key: &CanonicalKey) -> Option<StoredArtifact> {
        let inner = self.lock();
        inner
            .by_key
            .get(key)
            .and_then(|artifact| inner.artifacts.get(artifact))
            .cloned()
    }

    /// Seeds an already tagged artifact, as if a previous run had imported it.
    pub fn insert_tagged(&self, spec: &ArtifactSpec, tag: ArtifactTag) -> ArtifactRef {
        let artifact_ref = self.allocate_ref();
        let mut stored = StoredArtifact::new(artifact_ref.clone(), spec, None);
        stored.tag = Some(tag.clone());

        let mut inner = self.lock();
        inner.by_key.insert(tag.canonical_key, artifact_ref.clone());
        inner.artifacts.insert(artifact_ref.clone(), stored);
        artifact_ref
    }

    fn allocate_ref(&self) -> ArtifactRef {
        ArtifactRef::new(format!(
            "mem-{}",
            self.next_id.fetch_add(1, Ordering::SeqCst)
        ))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn find_by_canonical_key(
        &self,
        key: &CanonicalKey,
    ) -> Result<Option<ArtifactRecord>, ContentError> {
        let inner = self.lock();
        let record = inner
            .by_key
            .get(key)
            .and_then(|artifact| inner.artifacts.get(artifact))
            .and_then(|stored| {
                stored.tag.clone().map(|tag| ArtifactRecord {
                    artifact_ref: stored.artifact_ref.clone(),
                    tag,
                })
            });
        Ok(record)
    }

    async fn upsert(
        &self,
        spec: &ArtifactSpec,
        parent: Option<&ArtifactRef>,
    ) -> Result<ArtifactRef, ContentError> {
        if let Some(delay) = self.upsert_delay {
            tokio::time::sleep(delay).await;
        }
        if self.take_failure() {
            return Err(ContentError::Unavailable("injected upsert failure".into()));
        }

        let artifact_ref = match &spec.replaces {
            Some(existing) => {
                let mut inner = self.lock();
                let stored = inner
                    .artifacts
                    .get_mut(existing)
                    .ok_or_else(|| ContentError::ArtifactNotFound(existing.to_string()))?;
                stored.overwrite(spec, parent);
                existing.clone()
            }
            None => {
                let artifact_ref = self.allocate_ref();
                let stored = StoredArtifact::new(artifact_ref.clone(), spec, parent);
                self.lock().artifacts.insert(artifact_ref.clone(), stored);
                artifact_ref
            }
        };

        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(artifact_ref)
    }

    async fn tag(&self, artifact: &ArtifactRef, tag: &ArtifactTag) -> Result<(), ContentError> {
        let mut inner = self.lock();
        let stored = inner
            .artifacts
            .get_mut(artifact)
            .ok_or_else(|| ContentError::ArtifactNotFound(artifact.to_string()))?;
        stored.tag = Some(tag.clone());
        inner
            .by_key
            .insert(tag.canonical_key.clone(), artifact.clone());
        Ok(())
    }
}
