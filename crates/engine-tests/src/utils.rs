use crate::Stack;
use engine_core::state::JobStore;
use model::job::{Job, JobStatus, RowStatus};
use std::time::Duration;
use tokio::time::{sleep, timeout};

pub async fn load(stack: &Stack, job_id: &str) -> Job {
    stack.store.load(job_id).await.expect("load job")
}

/// Counters always agree with the row statuses they summarize.
pub fn assert_counters_consistent(job: &Job) {
    let count = |status: RowStatus| job.rows.iter().filter(|r| r.status == status).count() as u64;
    assert_eq!(job.counters.success, count(RowStatus::Success));
    assert_eq!(job.counters.failed, count(RowStatus::Failed));
    assert_eq!(job.counters.skipped, count(RowStatus::Skipped));
    assert_eq!(
        job.counters.processed,
        job.counters.success + job.counters.failed + job.counters.skipped
    );
}

pub fn assert_rows(job: &Job, expected: RowStatus) {
    for row in &job.rows {
        assert_eq!(row.status, expected, "row {} of job {}", row.index, job.id);
    }
}

/// Polls until the job stops asking for follow-up or `max_polls` is reached.
pub async fn poll_until_settled(stack: &Stack, job_id: &str, max_polls: usize) -> Job {
    for _ in 0..max_polls {
        let report = stack.coordinator.poll(job_id).await.expect("poll");
        assert_counters_consistent(&load(stack, job_id).await);
        if !report.needs_followup {
            break;
        }
    }
    load(stack, job_id).await
}

pub async fn wait_for_status(stack: &Stack, job_id: &str, status: JobStatus) -> bool {
    timeout(Duration::from_secs(5), async {
        loop {
            if load(stack, job_id).await.status == status {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}
