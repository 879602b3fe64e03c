use serde::{Deserialize, Serialize};

/// Final status of an executed collection job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Every batch was accepted by the ingest endpoint.
    #[serde(rename = "COMPLETE")]
    Completed,
    /// The job ran to an end but at least one batch was not ingested.
    #[serde(rename = "PARTIALLYCOMPLETE")]
    CompletedWithErrors,
}

impl JobStatus {
    /// Wire representation used by the control plane.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Completed => "COMPLETE",
            JobStatus::CompletedWithErrors => "PARTIALLYCOMPLETE",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome reported through `POST /api/v2/jobs/end`.
///
/// Serializes directly as the request body: `{"status": ..., "message": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub message: String,
}

impl JobOutcome {
    pub const COMPLETED_MESSAGE: &'static str = "Collection completed successfully";
    pub const INGEST_ERRORS_MESSAGE: &'static str =
        "Collection completed with errors during ingest";
    pub const INTERRUPTED_MESSAGE: &'static str = "Collection interrupted by agent shutdown";
    pub const FAILED_MESSAGE: &'static str = "Collection failed due to an internal agent error";

    pub fn completed() -> Self {
        Self {
            status: JobStatus::Completed,
            message: Self::COMPLETED_MESSAGE.to_string(),
        }
    }

    pub fn with_errors(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::CompletedWithErrors,
            message: message.into(),
        }
    }

    /// Derive the outcome from the job-level ingest error flag.
    pub fn from_ingest(had_errors: bool) -> Self {
        if had_errors {
            Self::with_errors(Self::INGEST_ERRORS_MESSAGE)
        } else {
            Self::completed()
        }
    }

    #[inline]
    pub fn is_clean(&self) -> bool {
        self.status == JobStatus::Completed
    }
}
