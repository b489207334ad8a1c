use async_trait::async_trait;
use engine_core::{error::GenerationError, generation::GenerationService};
use model::{
    item::{
        GeneratedContent, RawItemStatus, RawResultItem, RawResultsPage, RemoteJobStatus,
        RemoteState, WorkItem,
    },
    pagination::cursor::Cursor,
};
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

/// How many times the simulated service retries an item before giving up on it.
pub const DEFAULT_REMOTE_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone)]
struct RemoteItem {
    item_id: String,
    work: WorkItem,
    status: Option<RawItemStatus>,
    payload: Option<Value>,
    error: Option<String>,
    attempts: u32,
    /// Delivery order; bumped every time a fresh result is produced.
    seq: u64,
    acked: bool,
}

impl RemoteItem {
    fn is_done(&self, max_attempts: u32) -> bool {
        match self.status {
            Some(RawItemStatus::Completed) => true,
            Some(RawItemStatus::Failed) => self.attempts >= max_attempts,
            None => false,
        }
    }

    fn to_raw(&self) -> RawResultItem {
        RawResultItem {
            item_id: self.item_id.clone(),
            row_index: self.work.row_index,
            canonical_key: self.work.canonical_key.as_str().to_string(),
            status: self.status.unwrap_or(RawItemStatus::Failed),
            target: Some(self.work.target.clone()),
            payload: self.payload.clone(),
            error: self.error.clone(),
            attempts: self.attempts,
        }
    }
}

#[derive(Debug)]
struct RemoteJob {
    name: String,
    items: Vec<RemoteItem>,
    canceled: bool,
    next_seq: u64,
}

impl RemoteJob {
    fn item_mut(&mut self, row_index: usize) -> Option<&mut RemoteItem> {
        self.items.iter_mut().find(|i| i.work.row_index == row_index)
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

#[derive(Default)]
struct State {
    jobs: HashMap<String, RemoteJob>,
    order: Vec<String>,
    ack_calls: Vec<(String, Vec<String>)>,
    cancel_calls: Vec<String>,
    generate_calls: Vec<WorkItem>,
    result_calls: Vec<(String, Cursor, usize)>,
    unavailable: bool,
    transient_create_failures: u32,
    reject_create: Option<String>,
    auto_complete: bool,
}

/// In-process stand-in for the remote generation service.
///
/// Results are produced only when scripted (`complete_item`, `fail_item`, ...)
/// or immediately on creation when auto-complete is on. Unacknowledged results
/// are redelivered whenever a fetch starts from an empty cursor.
pub struct InMemoryGenerationService {
    state: Mutex<State>,
    max_attempts: u32,
}

impl Default for InMemoryGenerationService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGenerationService {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            max_attempts: DEFAULT_REMOTE_ATTEMPTS,
        }
    }

    /// Completes every item as soon as its job is created.
    pub fn with_auto_complete(self) -> Self {
        self.lock().auto_complete = true;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not wedge every other caller.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(state: &State) -> Result<(), GenerationError> {
        if state.unavailable {
            return Err(GenerationError::Unavailable {
                status: 503,
                message: "service unavailable".into(),
            });
        }
        Ok(())
    }

    /// Default copy the simulated service writes for a target.
    pub fn default_content(item: &WorkItem) -> GeneratedContent {
        let label = item.target.label();
        GeneratedContent {
            title: label.clone(),
            body: format!("<p>{label}</p>"),
            excerpt: Some(format!("All about {label}.")),
            meta_description: None,
        }
    }

    fn produce(&self, job_id: &str, row_index: usize, outcome: Produced) -> bool {
        let mut state = self.lock();
        let Some(job) = state.jobs.get_mut(job_id) else {
            return false;
        };
        let seq = job.bump_seq();
        let Some(item) = job.item_mut(row_index) else {
            return false;
        };

        item.seq = seq;
        item.acked = false;
        match outcome {
            Produced::Completed(payload) => {
                item.status = Some(RawItemStatus::Completed);
                item.payload = Some(payload);
                item.error = None;
                item.attempts = item.attempts.max(1);
            }
            Produced::Failed(error) => {
                item.status = Some(RawItemStatus::Failed);
                item.payload = None;
                item.error = Some(error);
                item.attempts += 1;
            }
        }
        true
    }

    /// Completes one item with the default content. Returns false for unknown jobs or rows.
    pub fn complete_item(&self, job_id: &str, row_index: usize) -> bool {
        let payload = {
            let state = self.lock();
            state
                .jobs
                .get(job_id)
                .and_then(|job| job.items.iter().find(|i| i.work.row_index == row_index))
                .map(|item| content_payload(&Self::default_content(&item.work)))
        };
        match payload {
            Some(payload) => self.produce(job_id, row_index, Produced::Completed(payload)),
            None => false,
        }
    }

    /// Completes one item with an arbitrary payload.
    pub fn complete_item_with(&self, job_id: &str, row_index: usize, payload: Value) -> bool {
        self.produce(job_id, row_index, Produced::Completed(payload))
    }

    /// Completes one item with a payload that cannot be decoded into page content.
    pub fn malformed_item(&self, job_id: &str, row_index: usize) -> bool {
        self.produce(
            job_id,
            row_index,
            Produced::Completed(serde_json::json!({ "unexpected": true })),
        )
    }

    /// Fails one item. Repeated calls model the service's own retries.
    pub fn fail_item(&self, job_id: &str, row_index: usize, error: &str) -> bool {
        self.produce(job_id, row_index, Produced::Failed(error.to_string()))
    }

    pub fn complete_all(&self, job_id: &str) {
        let rows: Vec<usize> = {
            let state = self.lock();
            state
                .jobs
                .get(job_id)
                .map(|job| {
                    job.items
                        .iter()
                        .filter(|i| i.status != Some(RawItemStatus::Completed))
                        .map(|i| i.work.row_index)
                        .collect()
                })
                .unwrap_or_default()
        };
        for row in rows {
            self.complete_item(job_id, row);
        }
    }

    /// Every call fails with a 503 while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// The next `n` job creations fail with a transient error.
    pub fn fail_next_creates(&self, n: u32) {
        self.lock().transient_create_failures = n;
    }

    /// Job creation is rejected with a validation error until cleared.
    pub fn reject_creates(&self, message: Option<&str>) {
        self.lock().reject_create = message.map(str::to_string);
    }

    /// Remote job ids in creation order.
    pub fn created_jobs(&self) -> Vec<String> {
        self.lock().order.clone()
    }

    pub fn job_name(&self, job_id: &str) -> Option<String> {
        self.lock().jobs.get(job_id).map(|j| j.name.clone())
    }

    pub fn job_items(&self, job_id: &str) -> Vec<WorkItem> {
        self.lock()
            .jobs
            .get(job_id)
            .map(|j| j.items.iter().map(|i| i.work.clone()).collect())
            .unwrap_or_default()
    }

    pub fn acked_ids(&self, job_id: &str) -> Vec<String> {
        self.lock()
            .ack_calls
            .iter()
            .filter(|(id, _)| id == job_id)
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }

    pub fn ack_calls(&self) -> usize {
        self.lock().ack_calls.len()
    }

    pub fn is_canceled(&self, job_id: &str) -> bool {
        self.lock().jobs.get(job_id).is_some_and(|j| j.canceled)
    }

    pub fn cancel_calls(&self) -> usize {
        self.lock().cancel_calls.len()
    }

    pub fn generate_calls(&self) -> usize {
        self.lock().generate_calls.len()
    }

    /// `(job_id, cursor, limit)` of every results request, in call order.
    pub fn result_calls(&self) -> Vec<(String, Cursor, usize)> {
        self.lock().result_calls.clone()
    }

    /// Id the simulated service assigns to the item for `row_index`.
    pub fn item_id(job_id: &str, row_index: usize) -> String {
        format!("{job_id}:item-{row_index}")
    }
}

enum Produced {
    Completed(Value),
    Failed(String),
}

fn content_payload(content: &GeneratedContent) -> Value {
    serde_json::to_value(content).unwrap_or(Value::Null)
}

fn parse_cursor(cursor: &Cursor) -> Result<u64, GenerationError> {
    match cursor.token() {
        None => Ok(0),
        Some(token) => token.parse().map_err(|_| GenerationError::Validation {
            status: 400,
            message: format!("invalid cursor '{token}'"),
        }),
    }
}

#[async_trait]
impl GenerationService for InMemoryGenerationService {
    async fn create_job(&self, name: &str, items: &[WorkItem]) -> Result<String, GenerationError> {
        let job_id = {
            let mut state = self.lock();
            Self::check_available(&state)?;

            if state.transient_create_failures > 0 {
                state.transient_create_failures -= 1;
                return Err(GenerationError::Transport("connection reset".into()));
            }
            if let Some(message) = &state.reject_create {
                return Err(GenerationError::Validation {
                    status: 422,
                    message: message.clone(),
                });
            }
            if items.is_empty() {
                return Err(GenerationError::Validation {
                    status: 422,
                    message: "a job needs at least one item".into(),
                });
            }

            let job_id = format!("remote-{}", state.order.len() + 1);
            let remote_items = items
                .iter()
                .map(|work| RemoteItem {
                    item_id: Self::item_id(&job_id, work.row_index),
                    work: work.clone(),
                    status: None,
                    payload: None,
                    error: None,
                    attempts: 0,
                    seq: 0,
                    acked: false,
                })
                .collect();

            state.jobs.insert(
                job_id.clone(),
                RemoteJob {
                    name: name.to_string(),
                    items: remote_items,
                    canceled: false,
                    next_seq: 0,
                },
            );
            state.order.push(job_id.clone());
            job_id
        };

        let auto_complete = self.lock().auto_complete;
        if auto_complete {
            self.complete_all(&job_id);
        }
        Ok(job_id)
    }

    async fn get_job_status(&self, job_id: &str) -> Result<RemoteJobStatus, GenerationError> {
        let state = self.lock();
        Self::check_available(&state)?;
        let job = state
            .jobs
            .get(job_id)
            .ok_or_else(|| GenerationError::JobNotFound(job_id.to_string()))?;

        let completed = job
            .items
            .iter()
            .filter(|i| i.status == Some(RawItemStatus::Completed))
            .count() as u64;
        let failed = job
            .items
            .iter()
            .filter(|i| i.status == Some(RawItemStatus::Failed) && i.is_done(self.max_attempts))
            .count() as u64;

        let status = if job.canceled {
            RemoteState::Canceled
        } else if job.items.iter().all(|i| i.is_done(self.max_attempts)) {
            RemoteState::Completed
        } else if job.items.iter().any(|i| i.status.is_some()) {
            RemoteState::Running
        } else {
            RemoteState::Queued
        };

        Ok(RemoteJobStatus {
            status,
            total_items: job.items.len() as u64,
            completed,
            failed,
        })
    }

    async fn get_job_results(
        &self,
        job_id: &str,
        cursor: &Cursor,
        limit: usize,
    ) -> Result<RawResultsPage, GenerationError> {
        let mut state = self.lock();
        state
            .result_calls
            .push((job_id.to_string(), cursor.clone(), limit));
        Self::check_available(&state)?;

        let after = parse_cursor(cursor)?;
        let job = state
            .jobs
            .get(job_id)
            .ok_or_else(|| GenerationError::JobNotFound(job_id.to_string()))?;

        let mut pending: Vec<&RemoteItem> = job
            .items
            .iter()
            .filter(|i| i.status.is_some() && !i.acked && i.seq > after)
            .collect();
        pending.sort_by_key(|i| i.seq);

        let limit = limit.max(1);
        let has_more = pending.len() > limit;
        let page: Vec<&RemoteItem> = pending.into_iter().take(limit).collect();
        let next_cursor = if has_more {
            page.last().map(|i| i.seq.to_string())
        } else {
            None
        };

        Ok(RawResultsPage {
            items: page.into_iter().map(RemoteItem::to_raw).collect(),
            rejected: Vec::new(),
            next_cursor,
        })
    }

    async fn ack_job_items(
        &self,
        job_id: &str,
        item_ids: &[String],
    ) -> Result<(), GenerationError> {
        let mut state = self.lock();
        Self::check_available(&state)?;
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| GenerationError::JobNotFound(job_id.to_string()))?;

        for item in job.items.iter_mut() {
            if item_ids.contains(&item.item_id) {
                item.acked = true;
            }
        }
        state
            .ack_calls
            .push((job_id.to_string(), item_ids.to_vec()));
        Ok(())
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), GenerationError> {
        let mut state = self.lock();
        state.cancel_calls.push(job_id.to_string());
        Self::check_available(&state)?;
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| GenerationError::JobNotFound(job_id.to_string()))?;
        job.canceled = true;
        Ok(())
    }

    async fn generate_item(&self, item: &WorkItem) -> Result<GeneratedContent, GenerationError> {
        let mut state = self.lock();
        Self::check_available(&state)?;
        state.generate_calls.push(item.clone());
        Ok(Self::default_content(item))
    }
}
