pub mod memory;
pub mod sled_store;

pub use memory::MemoryContentStore;
pub use sled_store::SledContentStore;

use chrono::{DateTime, Utc};
use model::artifact::{ArtifactRef, ArtifactSpec, ArtifactTag};
use serde::{Deserialize, Serialize};

/// Everything a content store keeps about one artifact.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StoredArtifact {
    pub artifact_ref: ArtifactRef,
    pub spec: ArtifactSpec,
    pub parent: Option<ArtifactRef>,
    pub tag: Option<ArtifactTag>,
    pub revision: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredArtifact {
    pub(crate) fn new(
        artifact_ref: ArtifactRef,
        spec: &ArtifactSpec,
        parent: Option<&ArtifactRef>,
    ) -> Self {
        let now = Utc::now();
        Self {
            artifact_ref,
            spec: stored_spec(spec),
            parent: parent.cloned(),
            tag: None,
            revision: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites content in place; identity and tag survive.
    pub(crate) fn overwrite(&mut self, spec: &ArtifactSpec, parent: Option<&ArtifactRef>) {
        self.spec = stored_spec(spec);
        self.parent = parent.cloned();
        self.revision += 1;
        self.updated_at = Utc::now();
    }
}

fn stored_spec(spec: &ArtifactSpec) -> ArtifactSpec {
    ArtifactSpec {
        replaces: None,
        ..spec.clone()
    }
}
