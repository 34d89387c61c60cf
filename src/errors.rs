// src/errors.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("API request failed with status {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Could not connect to push channel at {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("Submission request failed: {0}")]
    Dispatch(String),

    #[error("Unrecognized result payload: {0}")]
    MalformedResult(String),

    #[error("Invalid channel frame: {0}")]
    Frame(String),

    #[error("Push channel is closed")]
    ChannelClosed,

    #[error("No result arrived within {0}ms")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, WorkspaceError>;
