use crate::error::CoordinatorError;
use engine_core::{
    content::ContentStore,
    error::GenerationError,
    generation::GenerationService,
    lock::LockManager,
    metrics::Metrics,
    retry::{RetryDisposition, RetryPolicy},
    state::JobStore,
};
use engine_processing::{
    batch::BatchSizePolicy,
    fetcher::ResultFetcher,
    import_gate::{ImportContext, ImportGate, ImportOutcome, ImportResult},
    reconciler::Reconciler,
    reducer::{self, DEFAULT_MAX_ITEM_ATTEMPTS, ItemAction, StepTally},
};
use model::{
    item::{RemoteJobStatus, WorkItem},
    job::{Counters, Job, JobSpec, JobStatus, RowOutcome, RowStatus},
    target::PageTarget,
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

/// Tunables for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub batch_policy: BatchSizePolicy,
    /// A failed row is acknowledged (and becomes permanent) after this many attempts.
    pub max_item_attempts: u32,
    pub remote_retry: RetryPolicy,
    pub lock_ttl: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            batch_policy: BatchSizePolicy::default(),
            max_item_attempts: DEFAULT_MAX_ITEM_ATTEMPTS,
            remote_retry: RetryPolicy::for_remote(),
            lock_ttl: engine_processing::import_gate::DEFAULT_LOCK_TTL,
        }
    }
}

/// Options for generating one page outside of a bulk job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SingleOptions {
    pub update_existing: bool,
    pub auto_publish: bool,
}

/// What one `poll` call did.
#[derive(Debug, Clone, PartialEq)]
pub struct PollReport {
    pub job_id: String,
    pub status: JobStatus,
    pub counters: Counters,
    pub total_rows: u64,
    pub remote: Option<RemoteJobStatus>,
    pub batch_size: usize,
    pub fetched: usize,
    pub acknowledged: usize,
    pub tally: StepTally,
    /// Set when the step hit a transient error; the cursor did not move.
    pub error: Option<String>,
    /// True while the job still expects results. Someone should poll again.
    pub needs_followup: bool,
}

impl PollReport {
    fn idle(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            counters: job.counters,
            total_rows: job.total_rows,
            remote: None,
            batch_size: 0,
            fetched: 0,
            acknowledged: 0,
            tally: StepTally::default(),
            error: None,
            needs_followup: false,
        }
    }
}

/// Drives jobs through their lifecycle: submission, polling, cancellation and status.
///
/// Every mutation is persisted through the [`JobStore`] before the call returns.
pub struct JobCoordinator {
    store: Arc<dyn JobStore>,
    service: Arc<dyn GenerationService>,
    gate: Arc<ImportGate>,
    fetcher: ResultFetcher,
    reconciler: Reconciler,
    config: CoordinatorConfig,
    metrics: Metrics,
}

impl JobCoordinator {
    pub fn new(
        store: Arc<dyn JobStore>,
        service: Arc<dyn GenerationService>,
        content: Arc<dyn ContentStore>,
        locks: Arc<dyn LockManager>,
        metrics: Metrics,
    ) -> Self {
        Self::with_config(
            store,
            service,
            content,
            locks,
            metrics,
            CoordinatorConfig::default(),
        )
    }

    pub fn with_config(
        store: Arc<dyn JobStore>,
        service: Arc<dyn GenerationService>,
        content: Arc<dyn ContentStore>,
        locks: Arc<dyn LockManager>,
        metrics: Metrics,
        config: CoordinatorConfig,
    ) -> Self {
        let gate = ImportGate::new(content.clone(), locks, metrics.clone())
            .with_lock_ttl(config.lock_ttl);

        Self {
            fetcher: ResultFetcher::new(service.clone(), metrics.clone()),
            reconciler: Reconciler::new(content, metrics.clone()),
            gate: Arc::new(gate),
            store,
            service,
            config,
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub async fn create(&self, spec: JobSpec) -> Result<String, CoordinatorError> {
        Ok(self.store.create(spec).await?)
    }

    /// Sends every row to the generation service as one remote job.
    ///
    /// On failure the job is marked failed with the error and never becomes running.
    pub async fn submit(&self, job_id: &str) -> Result<String, CoordinatorError> {
        let mut job = self.store.load(job_id).await?;

        if job.status == JobStatus::Running
            && let Some(remote_id) = &job.remote_job_id
        {
            return Ok(remote_id.clone());
        }
        if !matches!(job.status, JobStatus::Pending | JobStatus::Failed) {
            return Err(CoordinatorError::InvalidState {
                job_id: job.id,
                status: job.status,
                action: "submit",
            });
        }

        let items = job.work_items();
        if items.is_empty() {
            return Err(CoordinatorError::EmptyJob(job.id));
        }

        let created = self
            .config
            .remote_retry
            .run(
                || self.service.create_job(&job.name, &items),
                |e: &GenerationError| e.disposition(),
            )
            .await;

        match created {
            Ok(remote_id) => {
                job.mark_running(remote_id.clone());
                self.store.save(&job).await?;
                info!(job_id = %job.id, remote_job_id = %remote_id, rows = items.len(), "Job submitted");
                Ok(remote_id)
            }
            Err(err) => {
                let err = err.into_inner();
                error!(job_id = %job.id, error = %err, "Job submission failed");
                job.mark_failed(err.to_string());
                self.store.save(&job).await?;
                Err(CoordinatorError::from_submission(err))
            }
        }
    }

    /// Creates a job from `spec` and submits it. Returns `(job_id, remote_job_id)`.
    pub async fn create_and_submit(
        &self,
        spec: JobSpec,
    ) -> Result<(String, String), CoordinatorError> {
        let job_id = self.create(spec).await?;
        let remote_id = self.submit(&job_id).await?;
        Ok((job_id, remote_id))
    }

    /// Runs one fetch/import/acknowledge step.
    ///
    /// Safe to call at any frequency and from any caller. Jobs that are not
    /// running are left untouched.
    pub async fn poll(&self, job_id: &str) -> Result<PollReport, CoordinatorError> {
        let job = self.store.load(job_id).await?;
        if job.status != JobStatus::Running {
            debug!(job_id, status = %job.status, "Poll skipped, job not running");
            return Ok(PollReport::idle(&job));
        }
        let remote_id = job
            .remote_job_id
            .clone()
            .ok_or_else(|| CoordinatorError::NotSubmitted(job.id.clone()))?;

        let remote = match self.service.get_job_status(&remote_id).await {
            Ok(status) => Some(status),
            Err(err) => {
                warn!(job_id, error = %err, "Remote status unavailable");
                None
            }
        };
        let remote_finished = remote.as_ref().is_some_and(RemoteJobStatus::is_finished);
        let batch_size = self
            .config
            .batch_policy
            .size_for(remote.as_ref(), job.counters.processed);

        let page = match self.fetcher.fetch(&remote_id, &job.cursor, batch_size).await {
            Ok(page) => page,
            Err(err) if err.disposition() == RetryDisposition::Retry => {
                warn!(job_id, cursor = %job.cursor, error = %err, "Fetch failed, will retry from same cursor");
                let mut report = PollReport::idle(&job);
                report.remote = remote;
                report.batch_size = batch_size;
                report.error = Some(err.to_string());
                report.needs_followup = true;
                return Ok(report);
            }
            Err(err) => return Err(err.into()),
        };

        let max_attempts = self.config.max_item_attempts;
        let mut imports: HashMap<String, ImportResult> = HashMap::new();
        for item in &page.items {
            if reducer::triage(&job, item, max_attempts) != ItemAction::Import {
                continue;
            }
            let ctx = ImportContext::for_row(&job, item.row_index);
            let result = self.gate.import(item, &ctx).await;
            imports.insert(item.item_id.clone(), result);
        }

        let fetched = page.items.len();
        let mut step = reducer::reduce(job, &page, &imports, remote_finished, max_attempts);

        if step.tally.unknown > 0 {
            warn!(job_id, unknown = step.tally.unknown, "Acknowledged items with no matching row");
        }

        let mut acknowledged = 0;
        if !step.acks.is_empty() {
            match self.service.ack_job_items(&remote_id, &step.acks).await {
                Ok(()) => {
                    acknowledged = step.acks.len();
                    self.metrics.increment_acknowledged(acknowledged as u64);
                }
                // Unacked items come back and are acknowledged as settled next time.
                Err(err) => warn!(job_id, error = %err, "Acknowledge failed"),
            }
        }

        self.keep_cancellation(&mut step.job).await?;
        self.store.save(&step.job).await?;

        let job = step.job;
        info!(
            job_id = %job.id,
            status = %job.status,
            fetched,
            acknowledged,
            imported = step.tally.imported,
            already_existed = step.tally.already_existed,
            failed = step.tally.failed,
            retry_pending = step.tally.retry_pending,
            lock_contended = step.tally.lock_contended,
            processed = job.counters.processed,
            total = job.total_rows,
            "Poll step finished"
        );

        Ok(PollReport {
            job_id: job.id.clone(),
            status: job.status,
            counters: job.counters,
            total_rows: job.total_rows,
            remote,
            batch_size,
            fetched,
            acknowledged,
            tally: step.tally,
            error: None,
            needs_followup: job.status == JobStatus::Running,
        })
    }

    /// A cancel that landed while this step was importing wins over the step's status.
    async fn keep_cancellation(&self, job: &mut Job) -> Result<(), CoordinatorError> {
        let stored = self.store.load(&job.id).await?;
        if stored.status == JobStatus::Canceled && job.status != JobStatus::Canceled {
            info!(job_id = %job.id, "Job canceled during poll step");
            job.mark_canceled();
        }
        Ok(())
    }

    /// Stops the job. Repeated calls are no-ops.
    pub async fn cancel(&self, job_id: &str) -> Result<Job, CoordinatorError> {
        let mut job = self.store.load(job_id).await?;
        if job.status.is_terminal() {
            debug!(job_id, status = %job.status, "Cancel ignored, job already terminal");
            return Ok(job);
        }

        if let Some(remote_id) = &job.remote_job_id
            && let Err(err) = self.service.cancel_job(remote_id).await
        {
            warn!(job_id, remote_job_id = %remote_id, error = %err, "Remote cancel failed, canceling locally");
        }

        job.mark_canceled();
        self.store.save(&job).await?;
        info!(job_id, "Job canceled");
        Ok(job)
    }

    /// Current snapshot, after a reconcile pass against the content store.
    pub async fn status(&self, job_id: &str) -> Result<Job, CoordinatorError> {
        let mut job = self.store.load(job_id).await?;
        if self.reconciler.reconcile(&mut job).await == 0 {
            return Ok(job);
        }

        // A poll may have saved while the content store was being read.
        let mut latest = self.store.load(job_id).await?;
        if carry_repairs(&mut latest, &job) > 0 {
            self.store.save(&latest).await?;
        }
        Ok(latest)
    }

    /// Terminal row outcomes for audit.
    pub async fn export(&self, job_id: &str) -> Result<Vec<RowOutcome>, CoordinatorError> {
        Ok(self.status(job_id).await?.export_rows())
    }

    pub async fn recent(&self, n: usize) -> Result<Vec<String>, CoordinatorError> {
        Ok(self.store.recent(n).await?)
    }

    /// Generates one page synchronously and imports it through the same gate as bulk jobs.
    pub async fn generate_single(
        &self,
        target: PageTarget,
        options: SingleOptions,
    ) -> Result<ImportResult, CoordinatorError> {
        let item = WorkItem::new(0, target);

        if !options.update_existing
            && let Some(existing) = self
                .gate
                .content()
                .find_by_canonical_key(&item.canonical_key)
                .await?
        {
            debug!(canonical_key = %item.canonical_key, "Skipping generation, artifact exists");
            return Ok(ImportResult {
                outcome: ImportOutcome::AlreadyExisted,
                artifact_ref: Some(existing.artifact_ref),
                error: None,
            });
        }

        let content = self
            .config
            .remote_retry
            .run(
                || self.service.generate_item(&item),
                |e: &GenerationError| e.disposition(),
            )
            .await
            .map_err(|e| CoordinatorError::from_submission(e.into_inner()))?;

        let ctx = ImportContext::single(options.update_existing, options.auto_publish);
        let result = self
            .gate
            .import_content(&item.canonical_key, &item.target, &content, &ctx)
            .await;
        info!(canonical_key = %item.canonical_key, outcome = ?result.outcome, "Single item generated");
        Ok(result)
    }
}

/// Copies reconciled rows onto a newer snapshot, leaving rows the newer
/// snapshot already settled alone.
fn carry_repairs(latest: &mut Job, repaired: &Job) -> usize {
    let mut carried = 0;
    for (row, fixed) in latest.rows.iter_mut().zip(&repaired.rows) {
        if matches!(row.status, RowStatus::Pending | RowStatus::Skipped)
            && fixed.status == RowStatus::Success
        {
            *row = fixed.clone();
            carried += 1;
        }
    }
    if carried > 0 {
        latest.recount();
    }
    carried
}
