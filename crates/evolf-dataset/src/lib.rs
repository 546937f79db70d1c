//! EvOlf dataset access.
//!
//! The EvOlf database pairs GPCRs with the ligands known to act on them.
//! This crate reads it through the backend REST API:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | paginated listing | `GET /dataset/` |
//! | row count | `GET /dataset/count` |
//! | entry detail | `GET /dataset/details/{id}/` |
//! | export one entry | `GET /dataset/export/{id}/` |
//! | export a selection | `POST /dataset/export` |
//! | whole dataset | `GET /dataset/download` |
//! | search | `GET /search/?q=` |
//!
//! # Example
//!
//! ```rust,no_run
//! use evolf_common::ApiConfig;
//! use evolf_dataset::{DatasetClient, DatasetQuery};
//!
//! #[tokio::main]
//! async fn main() -> evolf_common::Result<()> {
//!     let client = DatasetClient::new(&ApiConfig::default())?;
//!
//!     let page = client.fetch_page(&DatasetQuery::new().search("serotonin").limit(10)).await?;
//!     for entry in &page.entries {
//!         println!("{}: {} / {}", entry.evolf_id, entry.receptor, entry.ligand);
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod detail;
pub mod models;

pub use client::{DatasetClient, DetailSource};
pub use detail::DetailContext;
pub use models::{
    DatasetDetail, DatasetEntry, DatasetPage, DatasetQuery, FilterOptions, Pagination, SearchHit, SearchResponse,
    SortOrder, Statistics,
};
