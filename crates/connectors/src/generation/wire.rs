//! Request and response bodies of the generation service REST API.

use model::item::{GeneratedContent, WorkItem};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct CreateJobRequest<'a> {
    pub name: &'a str,
    pub items: &'a [WorkItem],
}

#[derive(Debug, Deserialize)]
pub struct CreateJobResponse {
    pub job_id: String,
}

/// Items stay untyped here so one bad envelope fails only that item.
#[derive(Debug, Deserialize)]
pub struct ResultsPageBody {
    pub items: Vec<serde_json::Value>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AckRequest<'a> {
    pub item_ids: &'a [String],
}

#[derive(Debug, Serialize)]
pub struct GenerateRequest<'a> {
    pub item: &'a WorkItem,
}

#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    pub content: GeneratedContent,
}
