// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::WorkspaceError;

/// Opaque user identifier announced on the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Javascript,
    Typescript,
    Python,
    Java,
    Cpp,
    C,
    Golang,
    Rust,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Javascript => "javascript",
            Language::Typescript => "typescript",
            Language::Python => "python",
            Language::Java => "java",
            Language::Cpp => "cpp",
            Language::C => "c",
            Language::Golang => "golang",
            Language::Rust => "rust",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = WorkspaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "javascript" | "js" => Ok(Language::Javascript),
            "typescript" | "ts" => Ok(Language::Typescript),
            "python" | "py" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            "cpp" | "c++" => Ok(Language::Cpp),
            "c" => Ok(Language::C),
            "golang" | "go" => Ok(Language::Golang),
            "rust" | "rs" => Ok(Language::Rust),
            other => Err(WorkspaceError::Config(format!("Unsupported language '{other}'"))),
        }
    }
}

/// Body of `POST /submissions`. Carries no submission id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub code: String,
    pub language: Language,
    pub user_id: UserId,
    pub problem_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The service acknowledged receipt. Says nothing about the verdict.
    Accepted {
        status: u16,
        acknowledged_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProblemSummary {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub title: String,
    pub difficulty: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TestCases {
    Markdown(String),
    Cases(Vec<TestCase>),
}

impl Default for TestCases {
    fn default() -> Self {
        TestCases::Markdown(String::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetail {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default_code: Option<String>,
    #[serde(default)]
    pub test_cases: TestCases,
}

impl ProblemDetail {
    pub fn starter_code(&self) -> &str {
        self.default_code.as_deref().unwrap_or("")
    }
}

/// Every problem-service response is wrapped as `{ "data": ... }`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeResponse {
    pub status: String,
    pub output: String,
}

/// What the push service sends for `submissionPayloadResponse`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultPayload {
    Message(String),
    Report { response: JudgeResponse },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NormalizedResult {
    #[default]
    Empty,
    Plain {
        message: String,
    },
    Structured {
        status: String,
        output: String,
    },
}

impl From<ResultPayload> for NormalizedResult {
    fn from(payload: ResultPayload) -> Self {
        match payload {
            ResultPayload::Message(message) => NormalizedResult::Plain { message },
            ResultPayload::Report { response } => NormalizedResult::Structured {
                status: response.status,
                output: response.output,
            },
        }
    }
}
