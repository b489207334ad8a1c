use crate::target::{CanonicalKey, PageKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a persisted artifact inside the content store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(id: impl Into<String>) -> Self {
        ArtifactRef(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PublishState {
    Draft,
    Published,
}

impl PublishState {
    pub fn from_auto_publish(auto_publish: bool) -> Self {
        if auto_publish {
            PublishState::Published
        } else {
            PublishState::Draft
        }
    }
}

/// What the content store is asked to persist.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ArtifactSpec {
    pub canonical_key: CanonicalKey,
    pub kind: PageKind,
    pub title: String,
    pub slug: String,
    pub body: String,
    pub excerpt: Option<String>,
    pub meta_description: Option<String>,
    pub state: PublishState,
    /// Existing artifact to overwrite in place.
    pub replaces: Option<ArtifactRef>,
}

/// Which call path created an artifact.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    BulkJob,
    SingleItem,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::BulkJob => "bulk_job",
            Provenance::SingleItem => "single_item",
        }
    }
}

/// Metadata stamped onto an artifact so later lookups can find it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ArtifactTag {
    pub canonical_key: CanonicalKey,
    pub job_id: Option<String>,
    pub row_index: Option<usize>,
    pub provenance: Provenance,
}

/// Result of a canonical key lookup.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRecord {
    pub artifact_ref: ArtifactRef,
    pub tag: ArtifactTag,
}

impl ArtifactRecord {
    /// True when the record was tagged for `key` by one of the generation paths.
    pub fn matches(&self, key: &CanonicalKey) -> bool {
        &self.tag.canonical_key == key
    }

    pub fn created_by_job(&self, job_id: &str) -> bool {
        self.tag.job_id.as_deref() == Some(job_id)
    }

    pub fn created_for_row(&self, job_id: &str, row_index: usize) -> bool {
        self.created_by_job(job_id) && self.tag.row_index == Some(row_index)
    }
}
