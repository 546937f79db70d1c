//! HTTP access to the prediction endpoints.

use async_trait::async_trait;
use tracing::{debug, info};

use evolf_common::http::{check_response, read_json};
use evolf_common::{ApiClient, ApiConfig, Result};

use crate::status::JobStatusResponse;
use crate::submit::{SubmitBody, SubmitResponse};

/// Which backend route serves the result archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadRoute {
    /// `GET /predict/job/{id}/?download=output`
    #[default]
    JobQuery,
    /// `GET /predict/download/{id}/`
    DownloadEndpoint,
}

/// Everything the submitter, poller and retriever need from the backend.
#[async_trait]
pub trait PredictionBackend: Send + Sync {
    /// One receptor/ligand pair per call.
    async fn submit_pair(&self, body: &SubmitBody) -> Result<SubmitResponse>;

    async fn fetch_status(&self, job_id: &str) -> Result<JobStatusResponse>;

    /// Raw zip bytes of the job's output directory.
    async fn download_archive(&self, job_id: &str, route: DownloadRoute) -> Result<Vec<u8>>;
}

/// reqwest-backed [`PredictionBackend`].
#[derive(Debug, Clone)]
pub struct PredictionClient {
    api: ApiClient,
}

impl PredictionClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        Ok(Self { api: ApiClient::new(config)? })
    }

    pub fn from_api(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }
}

#[async_trait]
impl PredictionBackend for PredictionClient {
    async fn submit_pair(&self, body: &SubmitBody) -> Result<SubmitResponse> {
        let url = self.api.url(&["predict", "smiles"], true);
        let resp = self.api.post(url).json(body).send().await?;
        let parsed: SubmitResponse = read_json(resp).await?;
        debug!("Submission accepted: {:?}", parsed.job_id);
        Ok(parsed)
    }

    async fn fetch_status(&self, job_id: &str) -> Result<JobStatusResponse> {
        let url = self.api.url(&["predict", "job", job_id], true);
        let resp = self
            .api
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        read_json(resp).await
    }

    async fn download_archive(&self, job_id: &str, route: DownloadRoute) -> Result<Vec<u8>> {
        let url = match route {
            DownloadRoute::JobQuery => {
                let mut url = self.api.url(&["predict", "job", job_id], true);
                url.query_pairs_mut().append_pair("download", "output");
                url
            }
            DownloadRoute::DownloadEndpoint => self.api.url(&["predict", "download", job_id], true),
        };
        let resp = check_response(self.api.get(url).send().await?).await?;
        let bytes = resp.bytes().await?;
        info!("Downloaded {} bytes of results for job {}", bytes.len(), job_id);
        Ok(bytes.to_vec())
    }
}
