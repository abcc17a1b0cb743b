//! Error taxonomy for the radio subsystem.
//!
//! Nothing in here is ever allowed to stop music playback: callers map every
//! variant to "skip the announcement" at the orchestrator boundary.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RadioError>;

#[derive(Error, Debug)]
pub enum RadioError {
    /// Missing credentials or an unusable backend configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network failure, non-2xx response, or a job id that never arrived.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("synthesis job {job_id} still running after {attempts} polls")]
    Timeout { job_id: String, attempts: u32 },

    #[error("synthesis job failed: {0}")]
    JobFailed(String),

    #[error("synthesis job was canceled")]
    JobCanceled,

    /// Malformed model output or backend payload.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("playback error: {0}")]
    Playback(String),

    #[error("settings error: {0}")]
    Settings(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RadioError {
    /// Only request-level failures are worth another attempt. A job that
    /// reached a terminal state (or ran out of polls) will not do better.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RadioError::Transport(_))
    }
}

impl From<reqwest::Error> for RadioError {
    fn from(err: reqwest::Error) -> Self {
        RadioError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for RadioError {
    fn from(err: serde_json::Error) -> Self {
        RadioError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(RadioError::Transport("reset".into()).is_retryable());
        assert!(!RadioError::JobFailed("bad voice".into()).is_retryable());
        assert!(!RadioError::JobCanceled.is_retryable());
        assert!(
            !RadioError::Timeout {
                job_id: "abc".into(),
                attempts: 30
            }
            .is_retryable()
        );
        assert!(!RadioError::Configuration("no key".into()).is_retryable());
    }

    #[test]
    fn json_errors_become_parse_errors() {
        let err: RadioError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, RadioError::Parse(_)));
    }
}
