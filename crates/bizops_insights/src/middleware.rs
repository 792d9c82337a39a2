//! Logging and request counting around any [`BizClient`].

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bizops_client::{BizClient, BizError, ProductItem, ReportQuery, ReportTable};
use tracing::debug;

#[derive(Clone)]
pub struct LoggingMiddleware<C: BizClient> {
    inner: Arc<C>,
}

impl<C: BizClient> LoggingMiddleware<C> {
    pub fn new(client: C) -> Self {
        Self {
            inner: Arc::new(client),
        }
    }

    async fn with_logging<F, Fut, T>(&self, operation: F, name: &'static str) -> Result<T, BizError>
    where
        F: FnOnce(Arc<C>) -> Fut,
        Fut: std::future::Future<Output = Result<T, BizError>>,
    {
        let start = Instant::now();
        debug!("Starting operation: {}", name);

        let result = operation(self.inner.clone()).await;

        let duration = start.elapsed();
        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(
            "bizops_report_requests_total",
            "operation" => name,
            "outcome" => outcome
        )
        .increment(1);
        match &result {
            Ok(_) => debug!("Operation completed: {} in {:?}", name, duration),
            Err(e) => debug!("Operation failed: {} in {:?} - error: {}", name, duration, e),
        }

        result
    }
}

#[async_trait]
impl<C: BizClient> BizClient for LoggingMiddleware<C> {
    async fn run_report(&self, query: &ReportQuery) -> Result<ReportTable, BizError> {
        debug!(source = %query.source, group_by = ?query.group_by, "run_report");
        self.with_logging(
            |client| async move { client.run_report(query).await },
            "run_report",
        )
        .await
    }

    async fn list_products(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ProductItem>, BizError> {
        self.with_logging(
            |client| async move { client.list_products(page, page_size).await },
            "list_products",
        )
        .await
    }
}
