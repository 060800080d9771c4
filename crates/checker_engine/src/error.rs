use std::io;
use std::path::PathBuf;

use checker_core::{ChannelId, CheckEpoch};
use thiserror::Error;

/// Misconfiguration and submission errors. Stream failures are never reported
/// through this type.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("concurrency must be at least 1, got {0}")]
    InvalidConcurrency(usize),
    #[error("{0} timeout must be greater than zero")]
    InvalidTimeout(&'static str),
    #[error("malformed url: channel {channel_id} has no candidate urls")]
    EmptyCandidates { channel_id: ChannelId },
    #[error("channel {channel_id} submitted more than once")]
    DuplicateChannel { channel_id: ChannelId },
    #[error("batch {epoch} is still running")]
    BatchInProgress { epoch: CheckEpoch },
    #[error("engine has stopped")]
    EngineStopped,
    #[error("failed to start engine: {0}")]
    Runtime(io::Error),
    #[error("failed to build http client: {0}")]
    HttpClient(String),
    #[error("failed to read settings from {path:?}: {source}")]
    SettingsRead { path: PathBuf, source: io::Error },
    #[error("failed to parse settings: {0}")]
    SettingsParse(String),
}
