//! Prediction domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on ligands per request.
pub const MAX_LIGANDS: usize = 10;
/// Lower bound on ligand fields kept by the builder.
pub const MIN_LIGANDS: usize = 1;

/// One ligand to score against the receptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ligand {
    pub smiles: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Ligand {
    pub fn new(smiles: &str, name: Option<&str>) -> Self {
        Self {
            smiles: smiles.trim().to_string(),
            name: name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
        }
    }
}

/// A validated prediction request. Only [`crate::builder::RequestBuilder`]
/// creates one, and it cannot be changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredictionRequest {
    receptor_sequence: String,
    ligands: Vec<Ligand>,
    mutation: Option<String>,
}

impl PredictionRequest {
    pub(crate) fn new(receptor_sequence: String, ligands: Vec<Ligand>, mutation: Option<String>) -> Self {
        Self { receptor_sequence, ligands, mutation }
    }

    pub fn receptor_sequence(&self) -> &str {
        &self.receptor_sequence
    }

    /// Ligands in the order the user entered them.
    pub fn ligands(&self) -> &[Ligand] {
        &self.ligands
    }

    pub fn mutation(&self) -> Option<&str> {
        self.mutation.as_deref()
    }
}

/// Client-side view of a job's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Running,
    Completed,
    Expired,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Expired)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Running => "Processing",
            JobState::Completed => "Ready",
            JobState::Expired => "Expired",
        };
        f.write_str(s)
    }
}

/// Transient shadow of a server-side job, updated on every poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionJob {
    pub job_id: String,
    pub state: JobState,
    pub message: Option<String>,
    pub predictions: Vec<PredictionRow>,
    pub output_files: Vec<String>,
    /// Advisory only; never drives state.
    pub expires_at: Option<DateTime<Utc>>,
}

impl PredictionJob {
    pub fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            state: JobState::Running,
            message: None,
            predictions: Vec::new(),
            output_files: Vec::new(),
            expires_at: None,
        }
    }

    /// Local archive name for this job's results.
    pub fn archive_file_name(&self) -> String {
        archive_file_name(&self.job_id)
    }
}

pub fn archive_file_name(job_id: &str) -> String {
    format!("prediction_{}.zip", job_id)
}

/// One scored receptor/ligand pair as returned by the job status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PredictionRow {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub temp_ligand_id: String,
    #[serde(default)]
    pub smiles: String,
    #[serde(default)]
    pub mutated_sequence: String,
    #[serde(default)]
    pub temp_rec_id: String,
    #[serde(default)]
    pub predicted_label: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub p1: String,
}

impl PredictionRow {
    pub fn label(&self) -> PredictedLabel {
        PredictedLabel::parse(&self.predicted_label)
    }

    /// `p1` to four decimals, or "N/A" when it is not a finite number.
    pub fn score_display(&self) -> String {
        format_score(&self.p1)
    }

    pub fn score(&self) -> Option<f64> {
        parse_score(&self.p1)
    }
}

/// Model verdict for a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictedLabel {
    Agonist,
    NonAgonist,
    Other(String),
}

impl PredictedLabel {
    /// Accepts both the backend's display strings and the raw 1/0 labels.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "agonist (1)" | "agonist" | "1" => PredictedLabel::Agonist,
            "non-agonist (0)" | "non-agonist" | "0" => PredictedLabel::NonAgonist,
            _ => PredictedLabel::Other(trimmed.to_string()),
        }
    }
}

impl fmt::Display for PredictedLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictedLabel::Agonist => f.write_str("Agonist"),
            PredictedLabel::NonAgonist => f.write_str("Non-Agonist"),
            PredictedLabel::Other(s) => f.write_str(s),
        }
    }
}

pub fn parse_score(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn format_score(raw: &str) -> String {
    match parse_score(raw) {
        Some(v) => format!("{:.4}", v),
        None => "N/A".to_string(),
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}
