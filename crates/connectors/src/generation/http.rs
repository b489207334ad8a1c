use crate::generation::wire::{
    AckRequest, CreateJobRequest, CreateJobResponse, GenerateRequest, GenerateResponse,
    ResultsPageBody,
};
use async_trait::async_trait;
use engine_core::{error::GenerationError, generation::GenerationService};
use model::{
    item::{GeneratedContent, RawResultsPage, RemoteJobStatus, WorkItem},
    pagination::cursor::Cursor,
};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// REST client for the remote generation service.
pub struct HttpGenerationClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpGenerationClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(GenerationError::Configuration("missing API key".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, GenerationError> {
        let resp = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::from_status(status.as_u16(), body));
        }

        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, GenerationError> {
        let resp = self.send(request).await?;
        resp.json::<T>()
            .await
            .map_err(|e| GenerationError::Decode(e.to_string()))
    }
}

fn transport_error(err: reqwest::Error) -> GenerationError {
    if err.is_builder() {
        GenerationError::Configuration(err.to_string())
    } else {
        GenerationError::Transport(err.to_string())
    }
}

#[async_trait]
impl GenerationService for HttpGenerationClient {
    async fn create_job(&self, name: &str, items: &[WorkItem]) -> Result<String, GenerationError> {
        let request = self
            .client
            .post(self.url("/jobs"))
            .json(&CreateJobRequest { name, items });

        let created: CreateJobResponse = self.send_json(request).await?;
        debug!(remote_job_id = %created.job_id, items = items.len(), "Remote job created");
        Ok(created.job_id)
    }

    async fn get_job_status(&self, job_id: &str) -> Result<RemoteJobStatus, GenerationError> {
        let request = self.client.get(self.url(&format!("/jobs/{job_id}")));
        self.send_json(request).await
    }

    async fn get_job_results(
        &self,
        job_id: &str,
        cursor: &Cursor,
        limit: usize,
    ) -> Result<RawResultsPage, GenerationError> {
        let mut query: Vec<(&str, String)> = vec![("limit", limit.to_string())];
        if let Some(token) = cursor.token() {
            query.push(("cursor", token.to_string()));
        }

        let request = self
            .client
            .get(self.url(&format!("/jobs/{job_id}/results")))
            .query(&query);
        let body: ResultsPageBody = self.send_json(request).await?;

        let page = RawResultsPage::from_values(body.items, body.next_cursor);
        if !page.rejected.is_empty() {
            debug!(remote_job_id = job_id, rejected = page.rejected.len(), "Result page had malformed items");
        }
        Ok(page)
    }

    async fn ack_job_items(
        &self,
        job_id: &str,
        item_ids: &[String],
    ) -> Result<(), GenerationError> {
        if item_ids.is_empty() {
            return Ok(());
        }

        let request = self
            .client
            .post(self.url(&format!("/jobs/{job_id}/ack")))
            .json(&AckRequest { item_ids });
        self.send(request).await?;
        Ok(())
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), GenerationError> {
        let request = self
            .client
            .post(self.url(&format!("/jobs/{job_id}/cancel")));
        self.send(request).await?;
        Ok(())
    }

    async fn generate_item(&self, item: &WorkItem) -> Result<GeneratedContent, GenerationError> {
        let request = self
            .client
            .post(self.url("/generate"))
            .json(&GenerateRequest { item });
        let generated: GenerateResponse = self.send_json(request).await?;
        Ok(generated.content)
    }
}
