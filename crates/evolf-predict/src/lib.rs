//! EvOlf prediction client.
//!
//! Covers the asynchronous prediction workflow against the EvOlf backend:
//! 1. Building a validated request from text, files or CSV rows
//! 2. Submitting it, one receptor/ligand pair per job
//! 3. Polling job status with exponential backoff until a terminal state
//! 4. Retrieving prediction rows and the result archive

pub mod backoff;
pub mod builder;
pub mod client;
pub mod context;
pub mod models;
pub mod poller;
pub mod results;
pub mod status;
pub mod submit;

pub use backoff::BackoffPolicy;
pub use builder::{CsvImport, LigandField, RequestBuilder};
pub use client::{DownloadRoute, PredictionBackend, PredictionClient};
pub use context::{result_url, JobContext};
pub use models::{JobState, Ligand, PredictedLabel, PredictionJob, PredictionRequest, PredictionRow};
pub use poller::{JobSnapshot, JobWatch, PollHandle, PollMachine, Step};
pub use results::{download_results, render_table, ResultRetriever};
pub use status::{JobStatusResponse, PollOutcome};
pub use submit::{JobSubmitter, SubmissionReceipt, SubmitBody, SubmitResponse};
