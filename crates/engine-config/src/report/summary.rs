use chrono::{DateTime, Utc};
use model::{
    job::{Job, JobStatus},
    phase::{PhaseKind, PhaseStatus, Pipeline, PipelineStatus},
};
use serde::Serialize;

/// Job snapshot without per-row detail, for display.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct JobSummary {
    pub id: String,
    pub name: String,
    pub status: JobStatus,
    pub total_rows: u64,
    pub processed: u64,
    pub success: u64,
    pub failed: u64,
    pub skipped: u64,
    pub remote_job_id: Option<String>,
    pub cursor: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            name: job.name.clone(),
            status: job.status,
            total_rows: job.total_rows,
            processed: job.counters.processed,
            success: job.counters.success,
            failed: job.counters.failed,
            skipped: job.counters.skipped,
            remote_job_id: job.remote_job_id.clone(),
            cursor: job.cursor.token().map(str::to_string),
            last_error: job.last_error.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
        }
    }
}

impl JobSummary {
    pub fn percent_done(&self) -> f64 {
        if self.total_rows == 0 {
            return 100.0;
        }
        self.processed as f64 * 100.0 / self.total_rows as f64
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PhaseSummary {
    pub kind: PhaseKind,
    pub status: PhaseStatus,
    pub job_id: Option<String>,
    pub success: u64,
    pub message: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PipelineSummary {
    pub id: String,
    pub name: String,
    pub status: PipelineStatus,
    pub current_phase: Option<PhaseKind>,
    pub phases: Vec<PhaseSummary>,
    pub total_success: u64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Pipeline> for PipelineSummary {
    fn from(pipeline: &Pipeline) -> Self {
        Self {
            id: pipeline.id.clone(),
            name: pipeline.plan.name.clone(),
            status: pipeline.status,
            current_phase: pipeline.current_phase(),
            phases: pipeline
                .phases
                .iter()
                .map(|phase| PhaseSummary {
                    kind: phase.kind,
                    status: phase.status,
                    job_id: phase.job_id.clone(),
                    success: phase.success,
                    message: phase.message.clone(),
                })
                .collect(),
            total_success: pipeline.total_success,
            last_error: pipeline.last_error.clone(),
            created_at: pipeline.created_at,
            completed_at: pipeline.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{
        job::JobSpec,
        target::{Location, PageTarget},
    };

    #[test]
    fn job_summary_reports_progress() {
        let mut job = Job::new(
            "job-1",
            JobSpec::new(
                "roofing",
                vec![
                    PageTarget::hub("Roof Repair"),
                    PageTarget::city_hub(&Location::new("Dallas", "TX")),
                ],
            ),
        );
        job.rows[0].mark_skipped("artifact already existed");
        job.recount();

        let summary = JobSummary::from(&job);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.percent_done(), 50.0);
        assert!(summary.cursor.is_none());

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["status"], "pending");
    }
}
