// src/problems.rs

use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::errors::{Result, WorkspaceError};
use crate::models::{Envelope, ProblemDetail, ProblemSummary};

/// Read-only access to the problem service.
#[derive(Clone)]
pub struct ProblemDataStore {
    client: Client,
    api_base: String,
}

impl ProblemDataStore {
    pub fn new(client: Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
        }
    }

    pub async fn list_problems(&self) -> Result<Vec<ProblemSummary>> {
        let url = format!("{}/problems", self.api_base.trim_end_matches('/'));
        self.fetch(&url).await
    }

    pub async fn get_problem(&self, id: &str) -> Result<ProblemDetail> {
        let mut url = reqwest::Url::parse(self.api_base.trim_end_matches('/'))
            .map_err(|e| WorkspaceError::Config(format!("Invalid problems API base: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| WorkspaceError::Config("Problems API base cannot be a base URL".to_string()))?
            .pop_if_empty()
            .push("problems")
            .push(id);
        self.fetch(url.as_str()).await
    }

    async fn fetch<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        log::debug!("problems: GET {}", url);
        let resp = self.client.get(url).send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error body".to_string());
            return Err(WorkspaceError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope<T> = resp.json().await?;
        Ok(envelope.data)
    }
}
