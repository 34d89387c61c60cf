// src/channel/frame.rs
use serde_json::Value;

use crate::errors::{Result, WorkspaceError};

/// Client → service: announces which user this connection belongs to.
pub const SET_USER_ID: &str = "setUserId";
/// Service → client: a judged result (or an error banner) for this user.
pub const SUBMISSION_PAYLOAD_RESPONSE: &str = "submissionPayloadResponse";

/// One named event on the push channel.
///
/// On the wire each frame is a JSON text message `["<event>", <data>]`.
/// A frame with no data element decodes with `data = null`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFrame {
    pub event: String,
    pub data: Value,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn set_user_id(user_id: &str) -> Self {
        Self::new(SET_USER_ID, Value::String(user_id.to_string()))
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(&(&self.event, &self.data))?)
    }

    pub fn decode(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Array(mut parts) = value else {
            return Err(WorkspaceError::Frame(format!("expected a JSON array, got {text}")));
        };
        if parts.is_empty() || parts.len() > 2 {
            return Err(WorkspaceError::Frame(format!(
                "expected [event, data], got {} elements",
                parts.len()
            )));
        }

        let data = if parts.len() == 2 {
            parts.pop().unwrap_or(Value::Null)
        } else {
            Value::Null
        };
        match parts.pop() {
            Some(Value::String(event)) => Ok(Self { event, data }),
            other => Err(WorkspaceError::Frame(format!(
                "event name must be a string, got {:?}",
                other
            ))),
        }
    }
}
