//! Job submission.
//!
//! The backend scores one receptor/ligand pair per call, so a request with
//! several ligands becomes several jobs, submitted in order.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use evolf_common::{EvolfError, Result};

use crate::client::PredictionBackend;
use crate::models::PredictionRequest;

/// Body of `POST /predict/smiles/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitBody {
    pub smiles: String,
    pub sequence: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_ligand_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_rec_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SubmitResponse {
    #[serde(default, alias = "jobId")]
    pub job_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// One accepted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub job_id: String,
    pub message: String,
    /// Position of the ligand in the request, from zero.
    pub ligand_index: usize,
}

pub struct JobSubmitter<B: PredictionBackend + ?Sized> {
    backend: Arc<B>,
}

impl<B: PredictionBackend + ?Sized> JobSubmitter<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Submits every ligand of `request`. Stops at the first failure and
    /// returns the backend error unchanged; there is no retry.
    pub async fn submit(&self, request: &PredictionRequest) -> Result<Vec<SubmissionReceipt>> {
        let bodies = submit_bodies(request);
        let mut receipts = Vec::with_capacity(bodies.len());

        for (index, body) in bodies.iter().enumerate() {
            let resp = match self.backend.submit_pair(body).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(
                        "Submission failed for ligand {} of {} ({} already accepted): {}",
                        index + 1,
                        bodies.len(),
                        receipts.len(),
                        e
                    );
                    return Err(e);
                }
            };

            let job_id = resp
                .job_id
                .filter(|id| !id.trim().is_empty())
                .ok_or_else(|| EvolfError::Other(anyhow::anyhow!("No job id returned from server.")))?;
            info!("Ligand {} submitted as job {}", index + 1, job_id);

            receipts.push(SubmissionReceipt {
                job_id,
                message: resp.message.unwrap_or_default(),
                ligand_index: index,
            });
        }

        Ok(receipts)
    }
}

/// One body per ligand, in request order.
pub fn submit_bodies(request: &PredictionRequest) -> Vec<SubmitBody> {
    let temp_rec_id = request
        .mutation()
        .map(sanitize_identifier)
        .filter(|s| !s.is_empty());

    request
        .ligands()
        .iter()
        .enumerate()
        .map(|(i, ligand)| {
            let ligand_id = ligand
                .name
                .as_deref()
                .map(sanitize_identifier)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| format!("lig_{}", i + 1));
            SubmitBody {
                smiles: ligand.smiles.clone(),
                sequence: request.receptor_sequence().to_string(),
                temp_ligand_id: Some(ligand_id),
                temp_rec_id: temp_rec_id.clone(),
                id: Some((i + 1).to_string()),
            }
        })
        .collect()
}

/// Lowercase, whitespace runs to `_`, keep only `[a-z0-9_-]`.
pub fn sanitize_identifier(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut in_space = false;
    for c in lowered.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' {
            out.push(c);
        }
    }
    out
}
