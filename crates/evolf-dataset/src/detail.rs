//! Detail-view context: the record currently shown for one EvOlf id.

use std::sync::Arc;
use tracing::{debug, warn};

use evolf_common::{Result, ValidationError};

use crate::client::DetailSource;
use crate::models::DatasetDetail;

/// Owned by a detail view for as long as it is open. Loading the id that
/// is already loaded is served from memory.
pub struct DetailContext<S: DetailSource + ?Sized> {
    source: Arc<S>,
    evolf_id: Option<String>,
    record: Option<DatasetDetail>,
}

impl<S: DetailSource + ?Sized> DetailContext<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            evolf_id: None,
            record: None,
        }
    }

    pub fn evolf_id(&self) -> Option<&str> {
        self.evolf_id.as_deref()
    }

    pub fn record(&self) -> Option<&DatasetDetail> {
        self.record.as_ref()
    }

    /// Loads `evolf_id`. A failed load leaves no record behind.
    pub async fn load(&mut self, evolf_id: &str) -> Result<&DatasetDetail> {
        let evolf_id = evolf_id.trim();
        if evolf_id.is_empty() {
            return Err(ValidationError::EmptyEvolfId.into());
        }

        if self.evolf_id.as_deref() == Some(evolf_id) && self.record.is_some() {
            debug!("Entry {} already loaded", evolf_id);
        } else {
            self.evolf_id = Some(evolf_id.to_string());
            self.record = None;
            let detail = self.source.fetch_detail(evolf_id).await.map_err(|e| {
                warn!("Failed to load entry {}: {}", evolf_id, e);
                e
            })?;
            self.record = Some(detail);
        }

        // Always populated by this point.
        Ok(&*self.record.get_or_insert_with(DatasetDetail::default))
    }

    pub fn clear(&mut self) {
        self.evolf_id = None;
        self.record = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use evolf_common::EvolfError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DetailSource for CountingSource {
        async fn fetch_detail(&self, evolf_id: &str) -> Result<DatasetDetail> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if evolf_id == "missing" {
                return Err(EvolfError::NotFound {
                    message: format!("No record with EvOlf ID: {}", evolf_id),
                });
            }
            let mut detail = DatasetDetail::default();
            detail.evolf_id = evolf_id.to_string();
            detail.receptor = "HTR1A".into();
            Ok(detail)
        }
    }

    #[tokio::test]
    async fn test_same_id_loads_once() {
        let source = Arc::new(CountingSource::default());
        let mut ctx = DetailContext::new(Arc::clone(&source));

        assert_eq!(ctx.load("EvOlf01").await.unwrap().receptor, "HTR1A");
        ctx.load("EvOlf01").await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        ctx.load("EvOlf02").await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(ctx.evolf_id(), Some("EvOlf02"));
    }

    #[tokio::test]
    async fn test_failed_load_clears_record() {
        let source = Arc::new(CountingSource::default());
        let mut ctx = DetailContext::new(Arc::clone(&source));
        ctx.load("EvOlf01").await.unwrap();

        let err = ctx.load("missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(ctx.record().is_none());

        // Retrying after a failure goes back to the backend.
        let _ = ctx.load("missing").await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_blank_id_and_clear() {
        let source = Arc::new(CountingSource::default());
        let mut ctx = DetailContext::new(Arc::clone(&source));
        assert!(matches!(
            ctx.load("  ").await,
            Err(EvolfError::Validation(ValidationError::EmptyEvolfId))
        ));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        ctx.load("EvOlf01").await.unwrap();
        ctx.clear();
        assert!(ctx.record().is_none() && ctx.evolf_id().is_none());
        ctx.load("EvOlf01").await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
