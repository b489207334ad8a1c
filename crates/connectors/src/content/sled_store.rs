use crate::content::StoredArtifact;
use async_trait::async_trait;
use engine_core::{content::ContentStore, error::ContentError};
use model::{
    artifact::{ArtifactRecord, ArtifactRef, ArtifactSpec, ArtifactTag},
    target::CanonicalKey,
};
use sled::{
    Transactional,
    transaction::{
        ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    },
};
use tracing::debug;

const ARTIFACTS_TREE: &str = "artifacts";
const KEYS_TREE: &str = "artifact_keys";

/// Content store persisted in two sled trees: artifacts by ref, and refs by canonical key.
pub struct SledContentStore {
    db: sled::Db,
    artifacts: sled::Tree,
    keys: sled::Tree,
}

impl SledContentStore {
    pub fn new(db: &sled::Db) -> Result<Self, ContentError> {
        Ok(Self {
            db: db.clone(),
            artifacts: db.open_tree(ARTIFACTS_TREE)?,
            keys: db.open_tree(KEYS_TREE)?,
        })
    }

    pub fn get(&self, artifact: &ArtifactRef) -> Result<Option<StoredArtifact>, ContentError> {
        match self.artifacts.get(artifact.as_str())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Number of stored artifacts, tagged or not.
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    fn put(&self, stored: &StoredArtifact) -> Result<(), ContentError> {
        self.artifacts
            .insert(stored.artifact_ref.as_str(), encode(stored)?)?;
        Ok(())
    }
}

fn encode(stored: &StoredArtifact) -> Result<Vec<u8>, ContentError> {
    bincode::serialize(stored).map_err(|e| ContentError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<StoredArtifact, ContentError> {
    bincode::deserialize(bytes).map_err(|e| ContentError::Serialization(e.to_string()))
}

#[async_trait]
impl ContentStore for SledContentStore {
    async fn find_by_canonical_key(
        &self,
        key: &CanonicalKey,
    ) -> Result<Option<ArtifactRecord>, ContentError> {
        let Some(raw_ref) = self.keys.get(key.as_str())? else {
            return Ok(None);
        };
        let artifact_ref = ArtifactRef::new(String::from_utf8_lossy(&raw_ref).into_owned());

        let record = self.get(&artifact_ref)?.and_then(|stored| {
            stored.tag.map(|tag| ArtifactRecord {
                artifact_ref: stored.artifact_ref,
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
        let stored = match &spec.replaces {
            Some(existing) => {
                let mut stored = self
                    .get(existing)?
                    .ok_or_else(|| ContentError::ArtifactNotFound(existing.to_string()))?;
                stored.overwrite(spec, parent);
                stored
            }
            None => {
                let artifact_ref = ArtifactRef::new(format!("art-{}", self.db.generate_id()?));
                StoredArtifact::new(artifact_ref, spec, parent)
            }
        };

        self.put(&stored)?;
        self.artifacts.flush_async().await?;
        debug!(
            artifact = %stored.artifact_ref,
            canonical_key = %spec.canonical_key,
            revision = stored.revision,
            "Artifact written"
        );
        Ok(stored.artifact_ref)
    }

    async fn tag(&self, artifact: &ArtifactRef, tag: &ArtifactTag) -> Result<(), ContentError> {
        let result: Result<(), TransactionError<ContentError>> = (&self.artifacts, &self.keys)
            .transaction(|(artifacts, keys)| -> ConflictableTransactionResult<(), ContentError> {
                let Some(bytes) = artifacts.get(artifact.as_str())? else {
                    return Err(ConflictableTransactionError::Abort(
                        ContentError::ArtifactNotFound(artifact.to_string()),
                    ));
                };
                let mut stored = decode(&bytes).map_err(ConflictableTransactionError::Abort)?;
                stored.tag = Some(tag.clone());
                let encoded = encode(&stored).map_err(ConflictableTransactionError::Abort)?;

                artifacts.insert(artifact.as_str(), encoded)?;
                keys.insert(tag.canonical_key.as_str(), artifact.as_str())?;
                Ok(())
            });

        match result {
            Ok(()) => {}
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => return Err(ContentError::Sled(e)),
        }
        self.db.flush_async().await?;
        Ok(())
    }
}
