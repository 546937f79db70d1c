//! Result retrieval: archive download and prediction table rendering.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

use evolf_common::{table, EvolfError, Result};

use crate::client::{DownloadRoute, PredictionBackend};
use crate::models::{archive_file_name, JobState, PredictionRow};
use crate::poller::PollHandle;

/// Downloads the archive of a job watched by `handle`.
///
/// Only allowed once the job is `Completed`. A 404 moves the session to
/// `Expired` and returns [`EvolfError::ResultsExpired`].
pub async fn download_results<B>(
    handle: &PollHandle<B>,
    dest_dir: &Path,
    route: DownloadRoute,
) -> Result<PathBuf>
where
    B: PredictionBackend + ?Sized,
{
    match handle.state() {
        JobState::Completed => {}
        JobState::Expired => return Err(EvolfError::ResultsExpired),
        JobState::Running => return Err(EvolfError::ResultsNotReady),
    }

    match handle.backend().download_archive(handle.job_id(), route).await {
        Ok(bytes) => save_archive(dest_dir, handle.job_id(), &bytes).await,
        Err(e) if e.is_not_found() => {
            warn!("Results for job {} not found: {}", handle.job_id(), e);
            handle.mark_expired("Results not found or have expired");
            Err(EvolfError::ResultsExpired)
        }
        Err(e) => Err(e),
    }
}

/// Stand-alone retriever for callers that have a job id but no watch
/// session: checks the status once, then downloads.
pub struct ResultRetriever<B: PredictionBackend + ?Sized> {
    backend: Arc<B>,
}

impl<B: PredictionBackend + ?Sized> ResultRetriever<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub async fn retrieve(&self, job_id: &str, dest_dir: &Path, route: DownloadRoute) -> Result<PathBuf> {
        let status = match self.backend.fetch_status(job_id).await {
            Ok(s) => s,
            Err(e) if e.is_not_found() => return Err(EvolfError::ResultsExpired),
            Err(e) => return Err(e),
        };
        match status.state() {
            JobState::Completed => {}
            JobState::Expired => return Err(EvolfError::ResultsExpired),
            JobState::Running => return Err(EvolfError::ResultsNotReady),
        }

        match self.backend.download_archive(job_id, route).await {
            Ok(bytes) => save_archive(dest_dir, job_id, &bytes).await,
            Err(e) if e.is_not_found() => Err(EvolfError::ResultsExpired),
            Err(e) => Err(e),
        }
    }
}

/// Writes `prediction_<job_id>.zip` into `dest_dir`.
pub async fn save_archive(dest_dir: &Path, job_id: &str, bytes: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dest_dir).await?;
    let path = dest_dir.join(archive_file_name(job_id));
    fs::write(&path, bytes).await?;
    info!("Saved results for job {} to {:?}", job_id, path);
    Ok(path)
}

/// Plain-text table of prediction rows.
pub fn render_table(rows: &[PredictionRow]) -> String {
    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                r.id.clone(),
                r.temp_ligand_id.clone(),
                r.smiles.clone(),
                r.temp_rec_id.clone(),
                r.label().to_string(),
                r.score_display(),
            ]
        })
        .collect();
    table::render(&["ID", "Ligand", "SMILES", "Receptor", "Prediction", "P1"], &body)
}
