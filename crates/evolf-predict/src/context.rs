//! Navigation context: where a watch session gets its job id from.

use url::{form_urlencoded, Url};

use evolf_common::{EvolfError, Result};

/// Query keys carrying the job id, in lookup order.
pub const JOB_ID_KEYS: [&str; 2] = ["job-id", "jobId"];

/// Path of the result page on the public site.
pub const RESULT_PAGE: &str = "prediction-result";

/// Explicit context handed to a watch session when it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    job_id: String,
}

impl JobContext {
    pub fn new(job_id: &str) -> Result<Self> {
        let trimmed = job_id.trim();
        if trimmed.is_empty() {
            return Err(EvolfError::MissingJobId);
        }
        Ok(Self { job_id: trimmed.to_string() })
    }

    /// Reads the job id once from a result-page URL, a bare query string
    /// (`?job-id=...`) or a raw id.
    pub fn from_navigation(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(EvolfError::MissingJobId);
        }

        if let Ok(url) = Url::parse(input) {
            if url.has_host() {
                return Self::from_query_pairs(url.query_pairs());
            }
        }

        if let Some(query) = input.strip_prefix('?') {
            return Self::from_query_pairs(form_urlencoded::parse(query.as_bytes()));
        }
        if input.contains('=') {
            return Self::from_query_pairs(form_urlencoded::parse(input.as_bytes()));
        }

        Self::new(input)
    }

    fn from_query_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: Iterator<Item = (std::borrow::Cow<'a, str>, std::borrow::Cow<'a, str>)>,
    {
        let pairs: Vec<_> = pairs.collect();
        for key in JOB_ID_KEYS {
            if let Some((_, value)) = pairs.iter().find(|(k, v)| k == key && !v.trim().is_empty()) {
                return Self::new(value);
            }
        }
        Err(EvolfError::MissingJobId)
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

/// Shareable link to the result page for `job_id`.
pub fn result_url(site_base: &str, job_id: &str) -> Result<Url> {
    let mut url = Url::parse(site_base)
        .map_err(|e| EvolfError::Config(format!("Invalid site URL {}: {}", site_base, e)))?;
    url.path_segments_mut()
        .map_err(|_| EvolfError::Config(format!("Site URL {} cannot be a base", site_base)))?
        .pop_if_empty()
        .push(RESULT_PAGE);
    url.query_pairs_mut().append_pair(JOB_ID_KEYS[0], job_id);
    Ok(url)
}
