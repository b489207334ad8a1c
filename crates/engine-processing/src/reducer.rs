//! Pure decision logic of one poll step.
//!
//! The coordinator does the I/O (fetch, import, ack, save); everything that
//! decides what a fetched page means for the job lives here, so a foreground
//! poll and a background poll reach the same snapshot from the same inputs.

use crate::import_gate::{ImportOutcome, ImportResult};
use model::{
    item::{ItemOutcome, ResultItem, ResultPage},
    job::{Job, JobStatus, RowStatus},
};
use std::collections::HashMap;

pub const DEFAULT_MAX_ITEM_ATTEMPTS: u32 = 2;

/// What to do with one fetched item before any import happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemAction {
    /// Route through the import gate.
    Import,
    /// The row is already terminal; acknowledge without importing.
    AlreadySettled,
    /// No row matches the item; acknowledge so it stops coming back.
    UnknownRow,
}

pub fn triage(job: &Job, item: &ResultItem, max_attempts: u32) -> ItemAction {
    match job.row(item.row_index) {
        None => ItemAction::UnknownRow,
        Some(row) if !item.addresses(&row.canonical_key) => ItemAction::UnknownRow,
        Some(row) if row.is_settled(max_attempts) => ItemAction::AlreadySettled,
        Some(_) => ItemAction::Import,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepTally {
    pub imported: u64,
    pub already_existed: u64,
    pub failed: u64,
    pub retry_pending: u64,
    pub lock_contended: u64,
    pub already_settled: u64,
    pub unknown: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollStep {
    pub job: Job,
    /// Item ids to acknowledge, in fetch order.
    pub acks: Vec<String>,
    pub tally: StepTally,
    pub completed: bool,
}

/// Folds one fetched page and the import results for it into a new job snapshot.
///
/// `imports` is keyed by item id and holds a result for every item triaged as
/// [`ItemAction::Import`]; items without a result are left for redelivery.
pub fn reduce(
    mut job: Job,
    page: &ResultPage,
    imports: &HashMap<String, ImportResult>,
    remote_finished: bool,
    max_attempts: u32,
) -> PollStep {
    let mut acks = Vec::new();
    let mut tally = StepTally::default();

    if job.status != JobStatus::Running {
        return PollStep {
            job,
            acks,
            tally,
            completed: false,
        };
    }

    for item in &page.items {
        match triage(&job, item, max_attempts) {
            ItemAction::UnknownRow => {
                tally.unknown += 1;
                acks.push(item.item_id.clone());
            }
            ItemAction::AlreadySettled => {
                tally.already_settled += 1;
                acks.push(item.item_id.clone());
            }
            ItemAction::Import => {
                let Some(result) = imports.get(&item.item_id) else {
                    tally.lock_contended += 1;
                    continue;
                };
                if apply_import(&mut job, item, result, remote_finished, max_attempts, &mut tally) {
                    acks.push(item.item_id.clone());
                }
            }
        }
    }

    for item_id in &page.unroutable {
        tally.unknown += 1;
        acks.push(item_id.clone());
    }

    job.cursor = page.next_cursor.clone();
    job.recount();

    let completed = page.is_exhausted()
        && tally.lock_contended == 0
        && tally.retry_pending == 0
        && (job.all_rows_settled(max_attempts) || remote_finished);
    if completed {
        job.mark_complete();
    }

    PollStep {
        job,
        acks,
        tally,
        completed,
    }
}

/// Applies one import result to its row. Returns whether the item should be acknowledged.
///
/// A remotely failed item is final once the remote job has finished, whatever
/// its attempt count; a failed local import is always left for redelivery
/// until the threshold.
fn apply_import(
    job: &mut Job,
    item: &ResultItem,
    result: &ImportResult,
    remote_finished: bool,
    max_attempts: u32,
    tally: &mut StepTally,
) -> bool {
    let Some(row) = job.row_mut(item.row_index) else {
        return true;
    };
    row.last_item_id = Some(item.item_id.clone());

    match (result.outcome, &result.artifact_ref) {
        (ImportOutcome::Success, Some(artifact_ref)) => {
            row.mark_success(artifact_ref.clone(), "imported");
            tally.imported += 1;
            true
        }
        (ImportOutcome::AlreadyExisted, Some(artifact_ref)) => {
            row.mark_skipped("artifact already existed");
            row.artifact_ref = Some(artifact_ref.clone());
            tally.already_existed += 1;
            true
        }
        (ImportOutcome::LockContended, _) => {
            tally.lock_contended += 1;
            false
        }
        (ImportOutcome::Failed, _)
        | (ImportOutcome::Success, None)
        | (ImportOutcome::AlreadyExisted, None) => {
            let message = result
                .error
                .clone()
                .unwrap_or_else(|| "import returned no artifact".to_string());
            row.mark_failed(message, item.attempts);

            let remote_gave_up =
                remote_finished && matches!(item.outcome, ItemOutcome::Failed { .. });
            if row.status == RowStatus::Failed && (row.attempts >= max_attempts || remote_gave_up) {
                tally.failed += 1;
                true
            } else {
                tally.retry_pending += 1;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{
        artifact::ArtifactRef,
        item::{FailureKind, GeneratedContent, ItemOutcome},
        job::JobSpec,
        pagination::cursor::Cursor,
        target::{CanonicalKey, Location, PageTarget},
    };

    fn running_job() -> Job {
        let mut job = Job::new(
            "job-1",
            JobSpec::new(
                "repair",
                vec![
                    PageTarget::leaf("Repair", &Location::new("Dallas", "TX")),
                    PageTarget::leaf("Repair", &Location::new("Austin", "TX")),
                ],
            ),
        );
        job.mark_running("remote-1".into());
        job
    }

    fn completed(job: &Job, row: usize, item_id: &str) -> ResultItem {
        let target = job.rows[row].target.clone();
        ResultItem {
            item_id: item_id.into(),
            row_index: row,
            canonical_key: target.canonical_key(),
            attempts: 1,
            outcome: ItemOutcome::Completed {
                target,
                content: GeneratedContent {
                    title: "t".into(),
                    body: "b".into(),
                    excerpt: None,
                    meta_description: None,
                },
            },
        }
    }

    fn failed(job: &Job, row: usize, item_id: &str, attempts: u32) -> ResultItem {
        ResultItem {
            item_id: item_id.into(),
            row_index: row,
            canonical_key: job.rows[row].canonical_key.clone(),
            attempts,
            outcome: ItemOutcome::Failed {
                kind: FailureKind::Remote,
                message: "model error".into(),
            },
        }
    }

    fn success(artifact: &str) -> ImportResult {
        ImportResult {
            outcome: ImportOutcome::Success,
            artifact_ref: Some(ArtifactRef::new(artifact)),
            error: None,
        }
    }

    fn failure() -> ImportResult {
        ImportResult {
            outcome: ImportOutcome::Failed,
            artifact_ref: None,
            error: Some("model error".into()),
        }
    }

    fn page(items: Vec<ResultItem>, next: Option<&str>) -> ResultPage {
        ResultPage {
            items,
            next_cursor: Cursor::after_page(next.map(str::to_string)),
            unroutable: Vec::new(),
            has_more: next.is_some(),
        }
    }

    #[test]
    fn both_rows_imported_completes_job() {
        let job = running_job();
        let items = vec![completed(&job, 0, "a"), completed(&job, 1, "b")];
        let imports = HashMap::from([("a".to_string(), success("x-1")), ("b".to_string(), success("x-2"))]);

        let step = reduce(job, &page(items, None), &imports, false, 2);
        assert_eq!(step.acks, vec!["a", "b"]);
        assert!(step.completed);
        assert_eq!(step.job.status, JobStatus::Complete);
        assert_eq!(step.job.counters.processed, 2);
        assert_eq!(step.job.counters.success, 2);
        assert!(step.job.cursor.is_none());
    }

    #[test]
    fn failed_item_is_acked_only_at_threshold() {
        let job = running_job();
        let item = failed(&job, 0, "a", 1);
        let imports = HashMap::from([("a".to_string(), failure())]);

        let first = reduce(job, &page(vec![item], None), &imports, false, 2);
        assert!(first.acks.is_empty());
        assert_eq!(first.job.rows[0].status, RowStatus::Failed);
        assert_eq!(first.job.rows[0].attempts, 1);
        assert!(!first.completed);

        let item = failed(&first.job, 0, "a", 2);
        let second = reduce(first.job, &page(vec![item], None), &imports, false, 2);
        assert_eq!(second.acks, vec!["a"]);
        assert_eq!(second.job.rows[0].attempts, 2);
        assert_eq!(second.tally.failed, 1);
    }

    #[test]
    fn settled_row_is_acked_without_import() {
        let mut job = running_job();
        job.rows[0].mark_success(ArtifactRef::new("x-1"), "imported");
        let item = completed(&job, 0, "dup");

        assert_eq!(triage(&job, &item, 2), ItemAction::AlreadySettled);
        let step = reduce(job, &page(vec![item], Some("c-1")), &HashMap::new(), false, 2);
        assert_eq!(step.acks, vec!["dup"]);
        assert_eq!(step.job.rows[0].artifact_ref, Some(ArtifactRef::new("x-1")));
        assert_eq!(step.job.cursor, Cursor::Token("c-1".into()));
    }

    #[test]
    fn contended_item_is_neither_acked_nor_applied() {
        let job = running_job();
        let item = completed(&job, 0, "a");
        let imports = HashMap::from([(
            "a".to_string(),
            ImportResult {
                outcome: ImportOutcome::LockContended,
                artifact_ref: None,
                error: None,
            },
        )]);

        let step = reduce(job, &page(vec![item], None), &imports, true, 2);
        assert!(step.acks.is_empty());
        assert_eq!(step.job.rows[0].status, RowStatus::Pending);
        assert!(!step.completed);
    }

    #[test]
    fn unknown_row_is_acked() {
        let job = running_job();
        let mut item = completed(&job, 0, "stray");
        item.row_index = 42;

        let step = reduce(job, &page(vec![item], None), &HashMap::new(), false, 2);
        assert_eq!(step.acks, vec!["stray"]);
        assert_eq!(step.tally.unknown, 1);
    }

    #[test]
    fn malformed_envelope_fails_only_its_row() {
        let job = running_job();
        let good = completed(&job, 0, "a");
        let malformed = ResultItem {
            item_id: "b".into(),
            row_index: 1,
            canonical_key: CanonicalKey::from_raw(""),
            attempts: 1,
            outcome: ItemOutcome::Failed {
                kind: FailureKind::Malformed,
                message: "malformed result item: unknown variant".into(),
            },
        };
        assert_eq!(triage(&job, &malformed, 2), ItemAction::Import);

        let mut page = page(vec![good, malformed], Some("c-1"));
        page.unroutable.push("lost".into());
        let imports = HashMap::from([
            ("a".to_string(), success("x-1")),
            ("b".to_string(), failure()),
        ]);

        let step = reduce(job, &page, &imports, true, 2);
        assert_eq!(step.acks, vec!["a", "b", "lost"]);
        assert_eq!(step.tally.unknown, 1);
        assert_eq!(step.job.rows[0].status, RowStatus::Success);
        assert_eq!(step.job.rows[1].status, RowStatus::Failed);
        assert_eq!(step.job.cursor, Cursor::Token("c-1".into()));
        assert_eq!(step.job.status, JobStatus::Running);
    }

    #[test]
    fn failed_import_holds_completion_even_when_remote_finished() {
        let job = running_job();
        let item = completed(&job, 0, "a");
        let imports = HashMap::from([("a".to_string(), failure())]);

        let step = reduce(job, &page(vec![item], None), &imports, true, 2);
        assert!(step.acks.is_empty());
        assert_eq!(step.tally.retry_pending, 1);
        assert!(!step.completed);
        assert_eq!(step.job.status, JobStatus::Running);
    }

    #[test]
    fn remote_failure_is_final_once_remote_finished() {
        let job = running_job();
        let item = failed(&job, 0, "a", 1);
        let imports = HashMap::from([("a".to_string(), failure())]);

        let step = reduce(job, &page(vec![item], None), &imports, true, 2);
        assert_eq!(step.acks, vec!["a"]);
        assert_eq!(step.tally.failed, 1);
        assert!(step.completed);
    }

    #[test]
    fn finished_remote_completes_with_open_rows() {
        let job = running_job();
        let step = reduce(job, &page(vec![], None), &HashMap::new(), true, 2);
        assert!(step.completed);
        assert_eq!(step.job.counters.processed, 0);
    }

    #[test]
    fn inert_when_not_running() {
        let mut job = running_job();
        job.mark_canceled();
        let item = completed(&job, 0, "a");
        let imports = HashMap::from([("a".to_string(), success("x-1"))]);

        let step = reduce(job, &page(vec![item], None), &imports, true, 2);
        assert!(step.acks.is_empty());
        assert_eq!(step.job.status, JobStatus::Canceled);
    }

    #[test]
    fn already_existed_marks_row_skipped_with_ref() {
        let job = running_job();
        let item = completed(&job, 1, "b");
        let imports = HashMap::from([(
            "b".to_string(),
            ImportResult {
                outcome: ImportOutcome::AlreadyExisted,
                artifact_ref: Some(ArtifactRef::new("x-9")),
                error: None,
            },
        )]);

        let step = reduce(job, &page(vec![item], Some("c-2")), &imports, false, 2);
        assert_eq!(step.job.rows[1].status, RowStatus::Skipped);
        assert_eq!(step.job.rows[1].artifact_ref, Some(ArtifactRef::new("x-9")));
        assert_eq!(step.job.counters.skipped, 1);
        assert_eq!(step.acks, vec!["b"]);
    }
}
