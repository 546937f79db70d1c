//! Thin reqwest wrapper shared by the prediction and dataset clients.

use reqwest::{Client, ClientBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;
use crate::error::{EvolfError, Result};

/// HTTP client bound to one EvOlf API base URL.
///
/// Every request goes through the same fixed timeout so a hung call can
/// never hold up the caller past `timeout`.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| EvolfError::Config(format!("Invalid API base URL {}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(EvolfError::Config(format!("API base URL {} cannot be a base", config.base_url)));
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| EvolfError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url, timeout })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Joins path segments onto the base URL. Segments are percent-encoded,
    /// so opaque ids like job ids are safe to pass straight through.
    pub fn url(&self, segments: &[&str], trailing_slash: bool) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments);
            if trailing_slash {
                path.push("");
            }
        }
        url
    }

    pub fn get(&self, url: Url) -> reqwest::RequestBuilder {
        debug!("GET {}", url);
        self.client.get(url)
    }

    pub fn post(&self, url: Url) -> reqwest::RequestBuilder {
        debug!("POST {}", url);
        self.client.post(url)
    }
}

/// Passes 2xx responses through; turns everything else into a typed error
/// carrying the backend's message verbatim.
pub async fn check_response(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let code = status.as_u16();
    let text = resp.text().await.unwrap_or_default();
    let message = error_message(code, &text);

    if code == 404 {
        Err(EvolfError::NotFound { message })
    } else {
        Err(EvolfError::Api { status: code, message })
    }
}

/// Checks the status, then decodes the body as JSON.
pub async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let resp = check_response(resp).await?;
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Backend error bodies look like `{error, message?, status?}`.
/// Prefer `message`, then `error`, then the raw text.
pub fn error_message(status: u16, body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let picked = json["message"]
            .as_str()
            .or_else(|| json["error"].as_str())
            .or_else(|| json["detail"].as_str());
        if let Some(msg) = picked {
            if !msg.trim().is_empty() {
                return msg.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status)
    } else {
        trimmed.to_string()
    }
}
