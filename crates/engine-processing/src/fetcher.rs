use crate::{error::ResultError, mapping::decode_payload};
use engine_core::{error::GenerationError, generation::GenerationService, metrics::Metrics};
use model::{
    item::{
        FailureKind, ItemOutcome, RawItemStatus, RawResultItem, RejectedItem, ResultItem,
        ResultPage,
    },
    pagination::cursor::Cursor,
    target::CanonicalKey,
};
use std::{collections::HashSet, sync::Arc};
use tracing::{debug, warn};

/// Pulls result pages from the generation service and decodes them.
///
/// Delivery is at-least-once: an item id may show up again on a later page
/// until it is acknowledged. Within one page the first occurrence wins.
pub struct ResultFetcher {
    service: Arc<dyn GenerationService>,
    metrics: Metrics,
}

impl ResultFetcher {
    pub fn new(service: Arc<dyn GenerationService>, metrics: Metrics) -> Self {
        Self { service, metrics }
    }

    pub async fn fetch(
        &self,
        remote_job_id: &str,
        cursor: &Cursor,
        limit: usize,
    ) -> Result<ResultPage, GenerationError> {
        let raw = self
            .service
            .get_job_results(remote_job_id, cursor, limit)
            .await?;

        let mut seen = HashSet::with_capacity(raw.items.len());
        let mut items = Vec::with_capacity(raw.items.len());
        for item in raw.items {
            if !seen.insert(item.item_id.clone()) {
                debug!(remote_job_id, item_id = %item.item_id, "Dropping duplicate item in page");
                continue;
            }
            items.push(decode_item(item));
        }

        let mut unroutable = Vec::new();
        for rejected in raw.rejected {
            let Some(item_id) = rejected.item_id.clone() else {
                warn!(remote_job_id, reason = %rejected.reason, "Dropping result item without an id");
                continue;
            };
            if !seen.insert(item_id.clone()) {
                continue;
            }
            match rejected_item(item_id, rejected) {
                Ok(item) => items.push(item),
                Err(item_id) => unroutable.push(item_id),
            }
        }

        self.metrics.increment_fetched((items.len() + unroutable.len()) as u64);

        let has_more = raw.next_cursor.as_deref().is_some_and(|c| !c.is_empty());
        debug!(
            remote_job_id,
            cursor = %cursor,
            items = items.len(),
            has_more,
            "Fetched result page"
        );

        Ok(ResultPage {
            items,
            next_cursor: Cursor::after_page(raw.next_cursor),
            unroutable,
            has_more,
        })
    }
}

/// Turns a raw item into a decoded one. Decoding problems fail only this item.
pub fn decode_item(raw: RawResultItem) -> ResultItem {
    let canonical_key = CanonicalKey::from_raw(raw.canonical_key.clone());

    let outcome = match raw.status {
        RawItemStatus::Failed => ItemOutcome::Failed {
            kind: FailureKind::Remote,
            message: raw
                .error
                .clone()
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| "generation failed".to_string()),
        },
        RawItemStatus::Completed => match decode_completed(&raw, &canonical_key) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(item_id = %raw.item_id, row_index = raw.row_index, error = %err, "Malformed result item");
                ItemOutcome::Failed {
                    kind: FailureKind::Malformed,
                    message: err.to_string(),
                }
            }
        },
    };

    ResultItem {
        item_id: raw.item_id,
        row_index: raw.row_index,
        canonical_key,
        attempts: raw.attempts,
        outcome,
    }
}

/// A rejected envelope that still names its row fails that row as malformed.
/// Without a row index only the id is left, to be acknowledged.
fn rejected_item(item_id: String, rejected: RejectedItem) -> Result<ResultItem, String> {
    let Some(row_index) = rejected.row_index else {
        warn!(item_id = %item_id, reason = %rejected.reason, "Malformed result item has no row");
        return Err(item_id);
    };
    warn!(item_id = %item_id, row_index, reason = %rejected.reason, "Malformed result envelope");

    Ok(ResultItem {
        item_id,
        row_index,
        canonical_key: CanonicalKey::from_raw(rejected.canonical_key.unwrap_or_default()),
        attempts: rejected.attempts.unwrap_or(1),
        outcome: ItemOutcome::Failed {
            kind: FailureKind::Malformed,
            message: format!("malformed result item: {}", rejected.reason),
        },
    })
}

fn decode_completed(
    raw: &RawResultItem,
    claimed: &CanonicalKey,
) -> Result<ItemOutcome, ResultError> {
    let target = raw.target.clone().ok_or(ResultError::MissingTarget)?;

    let derived = target.canonical_key();
    if &derived != claimed {
        return Err(ResultError::KeyMismatch {
            claimed: claimed.clone(),
            derived,
        });
    }

    let payload = raw.payload.as_ref().ok_or(ResultError::MissingPayload)?;
    let content = decode_payload(&target, payload)?;
    Ok(ItemOutcome::Completed { target, content })
}
