use crate::{
    pagination::cursor::Cursor,
    target::{CanonicalKey, PageTarget},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One unit of work sent to the generation service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub row_index: usize,
    pub canonical_key: CanonicalKey,
    pub target: PageTarget,
}

impl WorkItem {
    pub fn new(row_index: usize, target: PageTarget) -> Self {
        Self {
            row_index,
            canonical_key: target.canonical_key(),
            target,
        }
    }
}

/// Remote job lifecycle as reported by the status endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemoteState {
    Queued,
    Running,
    Completed,
    Failed,
    Canceled,
}

/// Aggregate counters for a remote job. Display only, never row-level truth.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RemoteJobStatus {
    pub status: RemoteState,
    pub total_items: u64,
    pub completed: u64,
    pub failed: u64,
}

impl RemoteJobStatus {
    /// No further completions will be produced.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            RemoteState::Completed | RemoteState::Failed | RemoteState::Canceled
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RawItemStatus {
    Completed,
    Failed,
}

/// A result item exactly as the service returns it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RawResultItem {
    pub item_id: String,
    pub row_index: usize,
    pub canonical_key: String,
    pub status: RawItemStatus,
    #[serde(default)]
    pub target: Option<PageTarget>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

fn default_attempts() -> u32 {
    1
}

/// A result item whose envelope did not decode. Identifiers that survived
/// are kept so the item can still be routed to its row or acknowledged.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct RejectedItem {
    pub item_id: Option<String>,
    pub row_index: Option<usize>,
    pub canonical_key: Option<String>,
    pub attempts: Option<u32>,
    pub reason: String,
}

impl RejectedItem {
    fn salvage(value: &Value, reason: String) -> Self {
        let text = |field: &str| {
            value
                .get(field)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let number = |field: &str| value.get(field).and_then(Value::as_u64);

        Self {
            item_id: text("item_id"),
            row_index: number("row_index").and_then(|n| usize::try_from(n).ok()),
            canonical_key: text("canonical_key"),
            attempts: number("attempts").and_then(|n| u32::try_from(n).ok()),
            reason,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct RawResultsPage {
    pub items: Vec<RawResultItem>,
    #[serde(default)]
    pub rejected: Vec<RejectedItem>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl RawResultsPage {
    /// Decodes each item on its own; envelopes that fail land in `rejected`.
    pub fn from_values(values: Vec<Value>, next_cursor: Option<String>) -> Self {
        let mut page = RawResultsPage {
            next_cursor,
            ..Default::default()
        };

        for value in values {
            match RawResultItem::deserialize(&value) {
                Ok(item) => page.items.push(item),
                Err(err) => page.rejected.push(RejectedItem::salvage(&value, err.to_string())),
            }
        }

        page
    }
}

/// Generated copy for a single page.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GeneratedContent {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The service reported the item as failed.
    Remote,
    /// The service reported success but the payload could not be decoded.
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Completed {
        target: PageTarget,
        content: GeneratedContent,
    },
    Failed {
        kind: FailureKind,
        message: String,
    },
}

/// A decoded result item, ready for import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultItem {
    pub item_id: String,
    pub row_index: usize,
    pub canonical_key: CanonicalKey,
    pub attempts: u32,
    pub outcome: ItemOutcome,
}

impl ResultItem {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Completed { .. })
    }

    /// Whether this item may update the row keyed by `key`. A malformed item
    /// that lost its key is routed by row index alone.
    pub fn addresses(&self, key: &CanonicalKey) -> bool {
        if &self.canonical_key == key {
            return true;
        }
        self.canonical_key.as_str().is_empty()
            && matches!(
                self.outcome,
                ItemOutcome::Failed {
                    kind: FailureKind::Malformed,
                    ..
                }
            )
    }
}

/// One page of decoded results plus the cursor to continue from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultPage {
    pub items: Vec<ResultItem>,
    pub next_cursor: Cursor,
    /// Ids of malformed items with no row to charge; acknowledged and dropped.
    pub unroutable: Vec<String>,
    /// False when the service returned no `next_cursor`.
    pub has_more: bool,
}

impl ResultPage {
    pub fn is_exhausted(&self) -> bool {
        !self.has_more
    }
}
