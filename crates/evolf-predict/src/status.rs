//! Job status wire format and the mapping onto [`JobState`].

use serde::Deserialize;

use evolf_common::EvolfError;

use crate::models::{JobState, PredictionRow};

/// Body of `GET /predict/job/{job_id}/`. Every field is optional so that
/// backend additions never break polling.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JobStatusResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub output_files: Vec<String>,
    #[serde(default)]
    pub predictions: Vec<PredictionRow>,
    #[serde(default, rename = "expiresAt", alias = "expires_at")]
    pub expires_at: Option<String>,
}

impl JobStatusResponse {
    pub fn state(&self) -> JobState {
        map_backend_status(self.status.as_deref())
    }
}

/// Known backend status strings. Anything not listed is still running.
const STATUS_TABLE: &[(&str, JobState)] = &[
    ("processing", JobState::Running),
    ("running", JobState::Running),
    ("queued", JobState::Running),
    ("finished", JobState::Completed),
    ("completed", JobState::Completed),
    ("expired", JobState::Expired),
];

pub fn map_backend_status(status: Option<&str>) -> JobState {
    let Some(raw) = status else {
        return JobState::Running;
    };
    let needle = raw.trim().to_ascii_lowercase();
    STATUS_TABLE
        .iter()
        .find(|(name, _)| *name == needle)
        .map(|(_, state)| *state)
        .unwrap_or(JobState::Running)
}

/// What a single status fetch produced, as the poller sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Status(JobStatusResponse),
    /// 404: the job is gone. Never retried.
    NotFound(String),
    /// Anything else that went wrong; polling carries on.
    Transient(String),
}

impl PollOutcome {
    pub fn from_result(result: Result<JobStatusResponse, EvolfError>) -> Self {
        match result {
            Ok(resp) => PollOutcome::Status(resp),
            Err(e) if e.is_not_found() => PollOutcome::NotFound(match e {
                EvolfError::NotFound { message } => message,
                other => other.to_string(),
            }),
            Err(e) => PollOutcome::Transient(e.to_string()),
        }
    }
}
