use crate::{
    artifact::ArtifactRef,
    item::WorkItem,
    pagination::cursor::Cursor,
    target::{CanonicalKey, PageTarget},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Complete,
    Canceled,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Complete => "complete",
            JobStatus::Canceled => "canceled",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::Canceled | JobStatus::Failed
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a job's rows are being produced.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    #[default]
    None,
    Remote,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Pending,
    Success,
    Failed,
    Skipped,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Pending => "pending",
            RowStatus::Success => "success",
            RowStatus::Failed => "failed",
            RowStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counters {
    pub processed: u64,
    pub success: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Per-item bookkeeping inside a job.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Row {
    pub index: usize,
    pub target: PageTarget,
    pub canonical_key: CanonicalKey,
    pub status: RowStatus,
    pub message: Option<String>,
    pub artifact_ref: Option<ArtifactRef>,
    pub attempts: u32,
    pub last_item_id: Option<String>,
}

impl Row {
    pub fn new(index: usize, target: PageTarget) -> Self {
        Self {
            index,
            canonical_key: target.canonical_key(),
            target,
            status: RowStatus::Pending,
            message: None,
            artifact_ref: None,
            attempts: 0,
            last_item_id: None,
        }
    }

    /// Whether the row can no longer change through normal import.
    ///
    /// Failed rows stay open until they have used up `max_attempts`.
    pub fn is_settled(&self, max_attempts: u32) -> bool {
        match self.status {
            RowStatus::Success | RowStatus::Skipped => true,
            RowStatus::Failed => self.attempts >= max_attempts,
            RowStatus::Pending => false,
        }
    }

    pub fn mark_success(&mut self, artifact_ref: ArtifactRef, message: impl Into<String>) {
        self.status = RowStatus::Success;
        self.artifact_ref = Some(artifact_ref);
        self.message = Some(message.into());
    }

    /// Records a failed attempt. `remote_attempts` is the service's own count.
    pub fn mark_failed(&mut self, message: impl Into<String>, remote_attempts: u32) {
        self.attempts = (self.attempts + 1).max(remote_attempts);
        self.status = RowStatus::Failed;
        self.message = Some(message.into());
    }

    pub fn mark_skipped(&mut self, message: impl Into<String>) {
        self.status = RowStatus::Skipped;
        self.message = Some(message.into());
    }
}

/// What a caller asks for when creating a job.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub name: String,
    pub targets: Vec<PageTarget>,
    pub update_existing: bool,
    pub auto_publish: bool,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, targets: Vec<PageTarget>) -> Self {
        Self {
            name: name.into(),
            targets,
            update_existing: false,
            auto_publish: false,
        }
    }

    pub fn with_update_existing(mut self, update_existing: bool) -> Self {
        self.update_existing = update_existing;
        self
    }

    pub fn with_auto_publish(mut self, auto_publish: bool) -> Self {
        self.auto_publish = auto_publish;
        self
    }
}

/// Snapshot of one bulk generation job. Persisted wholesale.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub status: JobStatus,
    pub total_rows: u64,
    pub counters: Counters,
    pub mode: JobMode,
    pub remote_job_id: Option<String>,
    pub cursor: Cursor,
    pub update_existing: bool,
    pub auto_publish: bool,
    pub rows: Vec<Row>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: impl Into<String>, spec: JobSpec) -> Self {
        let now = Utc::now();
        let rows: Vec<Row> = spec
            .targets
            .into_iter()
            .enumerate()
            .map(|(index, target)| Row::new(index, target))
            .collect();

        Self {
            id: id.into(),
            name: spec.name,
            status: JobStatus::Pending,
            total_rows: rows.len() as u64,
            counters: Counters::default(),
            mode: JobMode::None,
            remote_job_id: None,
            cursor: Cursor::None,
            update_existing: spec.update_existing,
            auto_publish: spec.auto_publish,
            rows,
            last_error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn work_items(&self) -> Vec<WorkItem> {
        self.rows
            .iter()
            .map(|row| WorkItem::new(row.index, row.target.clone()))
            .collect()
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index).filter(|row| row.index == index)
    }

    pub fn row_mut(&mut self, index: usize) -> Option<&mut Row> {
        self.rows.get_mut(index).filter(|row| row.index == index)
    }

    /// Recomputes counters from row state so `processed = success + failed + skipped`.
    pub fn recount(&mut self) {
        let mut counters = Counters::default();
        for row in &self.rows {
            match row.status {
                RowStatus::Success => counters.success += 1,
                RowStatus::Failed => counters.failed += 1,
                RowStatus::Skipped => counters.skipped += 1,
                RowStatus::Pending => {}
            }
        }
        counters.processed = counters.success + counters.failed + counters.skipped;
        self.counters = counters;
        self.updated_at = Utc::now();
    }

    pub fn all_rows_settled(&self, max_attempts: u32) -> bool {
        self.rows.iter().all(|row| row.is_settled(max_attempts))
    }

    pub fn mark_running(&mut self, remote_job_id: String) {
        self.mode = JobMode::Remote;
        self.remote_job_id = Some(remote_job_id);
        self.status = JobStatus::Running;
        self.last_error = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_complete(&mut self) {
        self.status = JobStatus::Complete;
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    pub fn mark_canceled(&mut self) {
        self.status = JobStatus::Canceled;
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.last_error = Some(message.into());
        self.updated_at = Utc::now();
    }

    /// Complete and with no more result pages to fetch.
    pub fn is_drained(&self) -> bool {
        self.status == JobStatus::Complete && self.cursor.is_none()
    }
}

/// One exported row: what was asked for and how it ended.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RowOutcome {
    pub index: usize,
    pub kind: String,
    pub service: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub canonical_key: String,
    pub status: RowStatus,
    pub message: Option<String>,
    pub artifact_ref: Option<String>,
    pub attempts: u32,
}

impl From<&Row> for RowOutcome {
    fn from(row: &Row) -> Self {
        let location = row.target.location();
        Self {
            index: row.index,
            kind: row.target.kind().as_str().to_string(),
            service: row.target.service().map(str::to_string),
            city: location.as_ref().map(|l| l.city.clone()),
            state: location.map(|l| l.state),
            canonical_key: row.canonical_key.as_str().to_string(),
            status: row.status,
            message: row.message.clone(),
            artifact_ref: row.artifact_ref.as_ref().map(|a| a.as_str().to_string()),
            attempts: row.attempts,
        }
    }
}

impl Job {
    /// Outcomes of every row that is no longer pending.
    pub fn export_rows(&self) -> Vec<RowOutcome> {
        self.rows
            .iter()
            .filter(|row| row.status != RowStatus::Pending)
            .map(RowOutcome::from)
            .collect()
    }
}
