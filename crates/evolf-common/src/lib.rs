//! evolf-common: shared errors, configuration and HTTP plumbing used by the EvOlf client crates.

pub mod config;
pub mod error;
pub mod http;
pub mod table;

// Re-export commonly used types
pub use config::{ApiConfig, ClientConfig, DownloadConfig, PollingConfig, SiteConfig};
pub use error::{EvolfError, Result, ValidationError};
pub use http::ApiClient;
