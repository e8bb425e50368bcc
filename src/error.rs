use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that reject a whole batch before any job is created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("invalid batch: {0}")]
    Validation(String),
}

/// Per-job failures. These never escape the orchestrator; each one is turned
/// into a terminal job state plus message.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("network error: {0}")]
    Network(String),

    #[error("media unavailable: {0}")]
    UnavailableMedia(String),

    #[error("transcoding failed: {0}")]
    Transcode(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("filesystem error: {0}")]
    Io(#[from] io::Error),

    #[error("canceled")]
    Cancelled,
}

impl JobError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, JobError::Cancelled)
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config value: {0}")]
    Invalid(String),
}
