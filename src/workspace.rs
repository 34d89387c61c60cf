// src/workspace.rs
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::channel::{Connection, RealtimeChannel, SUBMISSION_PAYLOAD_RESPONSE, Subscription};
use crate::config::AppConfig;
use crate::correlator::ResultCorrelator;
use crate::dispatcher::SubmissionDispatcher;
use crate::errors::{Result, WorkspaceError};
use crate::models::{DispatchOutcome, Language, NormalizedResult, Submission, UserId};
use crate::state::{LogProjector, SubmissionStateProjector, WorkspaceState};

/// One open problem view: a push connection for the user, a single result
/// subscription on it, and the submission state it feeds.
pub struct Workspace {
    user_id: UserId,
    problem_id: String,
    connection: Connection,
    dispatcher: SubmissionDispatcher,
    correlator: ResultCorrelator,
    results: Option<Subscription>,
}

impl Workspace {
    /// Connects the push channel, announces the configured user and binds
    /// the result handler.
    pub async fn open(
        config: &AppConfig,
        problem_id: impl Into<String>,
        projector: Option<Arc<dyn SubmissionStateProjector>>,
    ) -> Result<Self> {
        config.validate()?;

        let client = Client::builder().timeout(config.request_timeout).build()?;
        let user_id = UserId::new(config.user_id.clone());
        let connection = RealtimeChannel::from_config(config).connect(&user_id).await?;
        let dispatcher = SubmissionDispatcher::new(client, config.submissions_api_base.clone());
        let correlator = match projector {
            Some(projector) => ResultCorrelator::with_projector(projector),
            None => ResultCorrelator::with_projector(Arc::new(LogProjector)),
        };

        Ok(Self::from_parts(problem_id, connection, dispatcher, correlator))
    }

    pub fn from_parts(
        problem_id: impl Into<String>,
        connection: Connection,
        dispatcher: SubmissionDispatcher,
        correlator: ResultCorrelator,
    ) -> Self {
        let mut workspace = Self {
            user_id: connection.identity().clone(),
            problem_id: problem_id.into(),
            connection,
            dispatcher,
            correlator,
            results: None,
        };
        workspace.bind_results();
        workspace
    }

    /// Installs the result handler, replacing any earlier one. Calling this
    /// again never leaves two handlers bound.
    pub fn bind_results(&mut self) {
        self.results = None;
        let correlator = self.correlator.clone();
        self.results = Some(
            self.connection
                .subscribe(SUBMISSION_PAYLOAD_RESPONSE, move |data| correlator.on_result(data)),
        );
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn problem_id(&self) -> &str {
        &self.problem_id
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Fire-and-forget: returns once the service acknowledges the request.
    /// On failure the result slot shows the fixed fallback message.
    pub async fn submit(&self, code: impl Into<String>, language: Language) -> Result<DispatchOutcome> {
        let submission = Submission {
            code: code.into(),
            language,
            user_id: self.user_id.clone(),
            problem_id: self.problem_id.clone(),
        };

        let ticket = self.correlator.begin_dispatch();
        match self.dispatcher.dispatch(&submission).await {
            Ok(outcome) => {
                self.correlator.dispatch_accepted(ticket);
                Ok(outcome)
            }
            Err(e) => {
                self.correlator.dispatch_failed(ticket);
                Err(e)
            }
        }
    }

    pub fn state(&self) -> WorkspaceState {
        self.correlator.snapshot()
    }

    pub fn latest_result(&self) -> NormalizedResult {
        self.correlator.latest()
    }

    pub fn watch(&self) -> watch::Receiver<WorkspaceState> {
        self.correlator.watch()
    }

    pub async fn wait_for_result(&self, timeout: Duration) -> Result<NormalizedResult> {
        let revision = self.state().revision;
        self.wait_for_result_since(revision, timeout).await
    }

    /// Waits until the slot has been written after `revision`. A timeout
    /// leaves the phase untouched.
    pub async fn wait_for_result_since(&self, revision: u64, timeout: Duration) -> Result<NormalizedResult> {
        let mut rx = self.correlator.watch();
        let waited = tokio::time::timeout(timeout, rx.wait_for(|state| state.revision > revision)).await;

        match waited {
            Ok(Ok(state)) => Ok(state.result.clone()),
            Ok(Err(_)) => Err(WorkspaceError::ChannelClosed),
            Err(_) => Err(WorkspaceError::Timeout(timeout.as_millis() as u64)),
        }
    }

    /// Releases the result handler, then closes the connection.
    pub async fn close(self) {
        let Workspace {
            results, connection, ..
        } = self;
        drop(results);
        connection.close().await;
    }
}
