use crate::error::ContentError;
use async_trait::async_trait;
use model::{
    artifact::{ArtifactRecord, ArtifactRef, ArtifactSpec, ArtifactTag},
    target::CanonicalKey,
};

/// Persistent store of generated pages.
///
/// Lookups go through the tag written by [`ContentStore::tag`], so an artifact
/// only becomes discoverable by canonical key once it has been tagged.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn find_by_canonical_key(
        &self,
        key: &CanonicalKey,
    ) -> Result<Option<ArtifactRecord>, ContentError>;

    /// Creates the artifact, or overwrites `spec.replaces` in place when set.
    async fn upsert(
        &self,
        spec: &ArtifactSpec,
        parent: Option<&ArtifactRef>,
    ) -> Result<ArtifactRef, ContentError>;

    async fn tag(&self, artifact: &ArtifactRef, tag: &ArtifactTag) -> Result<(), ContentError>;
}
