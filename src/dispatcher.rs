// src/dispatcher.rs

use reqwest::Client;
use std::time::Instant;
use uuid::Uuid;

use crate::errors::{Result, WorkspaceError};
use crate::models::{DispatchOutcome, Submission};

/// Sends submissions to the judge service. Only reports whether the request
/// was accepted; the verdict arrives later on the push channel.
#[derive(Clone)]
pub struct SubmissionDispatcher {
    client: Client,
    api_base: String,
}

impl SubmissionDispatcher {
    pub fn new(client: Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/submissions", self.api_base.trim_end_matches('/'))
    }

    /// One POST, no retry. Any transport error or non-2xx status becomes
    /// `WorkspaceError::Dispatch`.
    pub async fn dispatch(&self, submission: &Submission) -> Result<DispatchOutcome> {
        // local only, the service never sees it
        let trace_id = Uuid::new_v4();
        let url = self.endpoint();

        log::info!(
            "dispatcher: submitting | trace = {} | problem = {} | language = {} | user = {}",
            trace_id,
            submission.problem_id,
            submission.language,
            submission.user_id
        );

        let start = Instant::now();
        let resp = self
            .client
            .post(&url)
            .json(submission)
            .send()
            .await
            .map_err(|e| {
                log::error!("dispatcher: transport failure | trace = {} | error = {}", trace_id, e);
                WorkspaceError::Dispatch(e.to_string())
            })?;

        let status = resp.status();
        let latency_ms = start.elapsed().as_millis() as u64;

        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error body".to_string());
            log::error!(
                "dispatcher: rejected | trace = {} | status = {} | body = {}",
                trace_id,
                status,
                body
            );
            return Err(WorkspaceError::Dispatch(format!("status {}: {}", status.as_u16(), body)));
        }

        log::info!(
            "dispatcher: accepted | trace = {} | status = {} | {}ms",
            trace_id,
            status,
            latency_ms
        );

        Ok(DispatchOutcome::Accepted {
            status: status.as_u16(),
            acknowledged_at: chrono::Utc::now(),
        })
    }
}
