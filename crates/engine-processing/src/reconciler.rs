use engine_core::{content::ContentStore, metrics::Metrics};
use model::{
    artifact::Provenance,
    job::{Job, RowStatus},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Repairs rows whose artifact exists in the content store but whose own
/// bookkeeping never caught up (crashed poll, abandoned client, ...).
pub struct Reconciler {
    content: Arc<dyn ContentStore>,
    metrics: Metrics,
}

impl Reconciler {
    pub fn new(content: Arc<dyn ContentStore>, metrics: Metrics) -> Self {
        Self { content, metrics }
    }

    /// Runs one pass over `job` and returns how many rows were repaired.
    ///
    /// Only pending and skipped rows are examined. Keys are derived again from
    /// each row's target rather than trusted from the stored snapshot.
    pub async fn reconcile(&self, job: &mut Job) -> usize {
        let mut repaired = 0;

        for row in job.rows.iter_mut() {
            if !matches!(row.status, RowStatus::Pending | RowStatus::Skipped) {
                continue;
            }

            let key = row.target.canonical_key();
            let record = match self.content.find_by_canonical_key(&key).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(err) => {
                    warn!(job_id = %job.id, canonical_key = %key, error = %err, "Reconcile lookup failed, stopping pass");
                    break;
                }
            };

            if !record.matches(&key) || record.tag.provenance != Provenance::BulkJob {
                debug!(job_id = %job.id, canonical_key = %key, "Artifact not produced by bulk generation, leaving row");
                continue;
            }

            row.canonical_key = key;
            row.mark_success(record.artifact_ref, "reconciled from content store");
            repaired += 1;
        }

        if repaired > 0 {
            job.recount();
            self.metrics.increment_reconciled(repaired as u64);
            info!(job_id = %job.id, repaired, "Reconciled rows against content store");
        }
        repaired
    }
}
