// src/lib.rs
pub mod banner;
pub mod channel;
pub mod config;
pub mod correlator;
pub mod dispatcher;
pub mod errors;
pub mod models;
pub mod problems;
pub mod state;
pub mod workspace;

pub use errors::{Result, WorkspaceError};
pub use workspace::Workspace;
