//! Error taxonomy for the analysis pipeline.

use std::path::PathBuf;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that end a pipeline run (or refuse to start one).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The input container could not be probed or decoded. Fatal to the job.
    #[error("Cannot read media {}: {reason}", path.display())]
    MediaRead { path: PathBuf, reason: String },

    /// Writing job state failed. Fatal to the current run.
    #[error("Failed to persist job state: {0:#}")]
    Persistence(anyhow::Error),

    /// A required local resource is missing (e.g. ffmpeg not on PATH).
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Job {0} is already running")]
    AlreadyRunning(String),

    /// Completed jobs are immutable; re-run them with reprocess.
    #[error("Job {0} has already completed")]
    AlreadyCompleted(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn media_read(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MediaRead {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

/// Failures of a remote signal/report provider. These never fail a job:
/// each provider absorbs them into its local fallback.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} timed out after {secs}s")]
    Timeout { provider: &'static str, secs: u64 },

    #[error("{provider} request failed: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} returned a malformed response: {message}")]
    Malformed {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} endpoint is not configured")]
    NotConfigured { provider: &'static str },
}

impl ProviderError {
    /// Classify a reqwest failure, keeping timeouts distinct from other transport errors.
    pub fn from_reqwest(provider: &'static str, timeout_secs: u64, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                provider,
                secs: timeout_secs,
            }
        } else if err.is_decode() {
            Self::Malformed {
                provider,
                message: err.to_string(),
            }
        } else {
            Self::Transport {
                provider,
                message: err.to_string(),
            }
        }
    }
}
