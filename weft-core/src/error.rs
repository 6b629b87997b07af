//! Error types.
//!
//! Most failure modes in the runtime are structural no-ops (triggering an
//! untracked key, deleting an absent key) or usage warnings that are logged
//! and absorbed. The variants here cover the cases a caller can act on.

use std::fmt;

/// A single job that failed while the scheduler was flushing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    /// Ordering id of the failed job, if it had one.
    pub job_id: Option<u64>,
    /// Panic payload or reason the job was skipped.
    pub message: String,
}

impl JobFailure {
    pub(crate) fn new(job_id: Option<u64>, message: impl Into<String>) -> Self {
        Self {
            job_id,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.job_id {
            Some(id) => write!(f, "job #{id}: {}", self.message),
            None => write!(f, "job: {}", self.message),
        }
    }
}

/// Errors surfaced by the runtime.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// One or more jobs failed during a flush pass. The remaining jobs of
    /// the pass still ran and the queue was reset.
    #[error("{} job(s) failed during flush", .0.len())]
    Flush(Vec<JobFailure>),

    /// `App::mount` was called on an application that is already mounted.
    #[error("application is already mounted")]
    AlreadyMounted,

    /// `App::unmount` was called on an application that was never mounted.
    #[error("application is not mounted")]
    NotMounted,

    /// The runtime configuration could not be parsed.
    #[error("failed to parse runtime configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// The runtime configuration parsed but holds an unusable value.
    #[error("invalid runtime configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_error_reports_count() {
        let err = Error::Flush(vec![
            JobFailure::new(Some(3), "boom"),
            JobFailure::new(None, "second"),
        ]);
        assert_eq!(err.to_string(), "2 job(s) failed during flush");
    }

    #[test]
    fn job_failure_with_id() {
        assert_eq!(JobFailure::new(Some(3), "boom").to_string(), "job #3: boom");
    }

    #[test]
    fn job_failure_without_id() {
        assert_eq!(JobFailure::new(None, "oops").to_string(), "job: oops");
    }
}
