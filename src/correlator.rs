// src/correlator.rs
//
// Routes pushed results to "the current submission".
//
// The push protocol only carries the user identity, never a submission id,
// so every result for this identity overwrites the single slot. With more
// than one submission outstanding the last event to arrive wins, whichever
// submission it actually answers. Fixing that needs the service to echo a
// submission id; until then the slot is last-write-wins.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

use crate::errors::WorkspaceError;
use crate::models::{NormalizedResult, ResultPayload};
use crate::state::{DispatchTicket, SubmissionStateProjector, WorkspaceState};

/// Decide the shape of a raw `submissionPayloadResponse` payload.
///
/// Anything that is neither a string nor `{ response: { status, output } }`
/// is logged and shown as its compact JSON text.
pub fn normalize(raw: &Value) -> NormalizedResult {
    match parse_payload(raw) {
        Ok(payload) => payload.into(),
        Err(e) => {
            log::warn!("correlator: {}", e);
            NormalizedResult::Plain {
                message: raw.to_string(),
            }
        }
    }
}

pub fn parse_payload(raw: &Value) -> Result<ResultPayload, WorkspaceError> {
    ResultPayload::deserialize(raw).map_err(|_| WorkspaceError::MalformedResult(raw.to_string()))
}

#[derive(Clone)]
pub struct ResultCorrelator {
    state: Arc<watch::Sender<WorkspaceState>>,
    projector: Option<Arc<dyn SubmissionStateProjector>>,
}

impl Default for ResultCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultCorrelator {
    pub fn new() -> Self {
        let (state, _) = watch::channel(WorkspaceState::default());
        Self {
            state: Arc::new(state),
            projector: None,
        }
    }

    pub fn with_projector(projector: Arc<dyn SubmissionStateProjector>) -> Self {
        Self {
            projector: Some(projector),
            ..Self::new()
        }
    }

    /// Overwrite the latest-result slot with `raw`, unconditionally.
    pub fn on_result(&self, raw: &Value) {
        let result = normalize(raw);
        log::info!("correlator: result received | result = {:?}", result);
        self.update(|state| state.record_result(result));
    }

    pub fn begin_dispatch(&self) -> DispatchTicket {
        let mut ticket = DispatchTicket::default();
        self.update(|state| ticket = state.begin_dispatch());
        ticket
    }

    pub fn dispatch_accepted(&self, ticket: DispatchTicket) {
        self.update(|state| state.dispatch_accepted(ticket));
    }

    pub fn dispatch_failed(&self, ticket: DispatchTicket) {
        self.update(|state| state.dispatch_failed(ticket));
    }

    pub fn latest(&self) -> NormalizedResult {
        self.state.borrow().result.clone()
    }

    pub fn snapshot(&self) -> WorkspaceState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<WorkspaceState> {
        self.state.subscribe()
    }

    /// Applies a change and projects it while still holding the watch
    /// lock, so projections land in the same order as the changes.
    fn update(&self, apply: impl FnOnce(&mut WorkspaceState)) {
        self.state.send_modify(|state| {
            apply(state);
            if let Some(projector) = &self.projector {
                projector.project(state);
            }
        });
    }
}
