// src/state.rs
use serde::Serialize;

use crate::models::NormalizedResult;

/// Shown in place of a result when the submission request itself fails.
pub const DISPATCH_FAILURE_MESSAGE: &str = "An error occurred while submitting the code.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionPhase {
    #[default]
    Idle,
    Dispatching,
    /// Accepted by the service, waiting for a pushed result. Nothing moves
    /// the phase out of here except a result event or another dispatch.
    Pending,
    DispatchFailed,
}

/// Everything a projector needs to draw the submission panel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct WorkspaceState {
    pub phase: SubmissionPhase,
    pub result: NormalizedResult,
    /// Bumped on every write to `result`.
    pub revision: u64,
    /// Bumped only by pushed results, never by the fallback message.
    pub result_events: u64,
    pub in_flight: usize,
}

/// Handed out when a dispatch begins, returned when it completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchTicket {
    result_events: u64,
}

impl WorkspaceState {
    pub fn is_pending(&self) -> bool {
        matches!(self.phase, SubmissionPhase::Dispatching | SubmissionPhase::Pending)
    }

    pub(crate) fn begin_dispatch(&mut self) -> DispatchTicket {
        self.in_flight += 1;
        self.phase = SubmissionPhase::Dispatching;
        DispatchTicket {
            result_events: self.result_events,
        }
    }

    pub(crate) fn dispatch_accepted(&mut self, ticket: DispatchTicket) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.phase = if self.in_flight > 0 {
            SubmissionPhase::Dispatching
        } else if self.result_events > ticket.result_events {
            // the pushed result beat the acknowledgement
            SubmissionPhase::Idle
        } else {
            SubmissionPhase::Pending
        };
    }

    pub(crate) fn dispatch_failed(&mut self, _ticket: DispatchTicket) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.write_result(NormalizedResult::Plain {
            message: DISPATCH_FAILURE_MESSAGE.to_string(),
        });
        self.phase = if self.in_flight > 0 {
            SubmissionPhase::Dispatching
        } else {
            SubmissionPhase::DispatchFailed
        };
    }

    pub(crate) fn record_result(&mut self, result: NormalizedResult) {
        self.write_result(result);
        self.result_events += 1;
        self.phase = if self.in_flight > 0 {
            SubmissionPhase::Dispatching
        } else {
            SubmissionPhase::Idle
        };
    }

    fn write_result(&mut self, result: NormalizedResult) {
        self.result = result;
        self.revision += 1;
    }
}

/// Renders workspace state. Called synchronously after every change, from
/// whichever task made it, while the state is locked: calls are serialized
/// in change order. Implementations should return quickly and must not call
/// back into the workspace.
pub trait SubmissionStateProjector: Send + Sync {
    fn project(&self, state: &WorkspaceState);
}

/// Writes each state change to the log.
pub struct LogProjector;

impl SubmissionStateProjector for LogProjector {
    fn project(&self, state: &WorkspaceState) {
        log::info!(
            "workspace: phase={:?} revision={} result={:?}",
            state.phase,
            state.revision,
            state.result
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structured(status: &str) -> NormalizedResult {
        NormalizedResult::Structured {
            status: status.to_string(),
            output: String::new(),
        }
    }

    #[test]
    fn test_accepted_dispatch_waits_for_result() {
        let mut state = WorkspaceState::default();
        let ticket = state.begin_dispatch();
        assert_eq!(state.phase, SubmissionPhase::Dispatching);

        state.dispatch_accepted(ticket);
        assert_eq!(state.phase, SubmissionPhase::Pending);
        assert_eq!(state.result, NormalizedResult::Empty);

        state.record_result(structured("AC"));
        assert_eq!(state.phase, SubmissionPhase::Idle);
        assert_eq!(state.revision, 1);
    }

    #[test]
    fn test_result_before_acknowledgement_does_not_leave_pending() {
        let mut state = WorkspaceState::default();
        let ticket = state.begin_dispatch();
        state.record_result(structured("WA"));
        state.dispatch_accepted(ticket);

        assert_eq!(state.phase, SubmissionPhase::Idle);
        assert_eq!(state.result, structured("WA"));
    }

    #[test]
    fn test_failed_dispatch_writes_fallback() {
        let mut state = WorkspaceState::default();
        state.record_result(structured("AC"));

        let ticket = state.begin_dispatch();
        state.dispatch_failed(ticket);

        assert_eq!(state.phase, SubmissionPhase::DispatchFailed);
        assert_eq!(
            state.result,
            NormalizedResult::Plain { message: DISPATCH_FAILURE_MESSAGE.to_string() }
        );
        assert_eq!(state.in_flight, 0);
    }

    #[test]
    fn test_overlapping_dispatches_stay_dispatching_until_both_finish() {
        let mut state = WorkspaceState::default();
        let first = state.begin_dispatch();
        let second = state.begin_dispatch();
        assert_eq!(state.in_flight, 2);

        state.dispatch_accepted(first);
        assert_eq!(state.phase, SubmissionPhase::Dispatching);

        state.dispatch_accepted(second);
        assert_eq!(state.phase, SubmissionPhase::Pending);
        assert!(state.is_pending());
    }

    #[test]
    fn test_failed_sibling_does_not_settle_accepted_dispatch() {
        let mut state = WorkspaceState::default();
        let failing = state.begin_dispatch();
        let accepted = state.begin_dispatch();

        state.dispatch_failed(failing);
        state.dispatch_accepted(accepted);

        // only a pushed result may move an accepted dispatch out of Pending
        assert_eq!(state.phase, SubmissionPhase::Pending);
        assert_eq!(state.result_events, 0);
        assert_eq!(state.revision, 1);
        assert_eq!(
            state.result,
            NormalizedResult::Plain { message: DISPATCH_FAILURE_MESSAGE.to_string() }
        );

        state.record_result(structured("AC"));
        assert_eq!(state.phase, SubmissionPhase::Idle);
    }
}
