use std::sync::Arc;
use std::time::Duration;

use bizops_client::{BizClient, ReportQuery, ReportTable};
use serde::Deserialize;

use crate::domains::activity::{DayBucket, build_day_buckets};
use crate::domains::catalog::Catalog;
use crate::domains::competitor::CompetitorPriceMap;
use crate::domains::estimator::{
    EstimateSummary, PriceEstimator, PriceQuery, estimate_competitor_prices,
};
use crate::domains::profit::{ProfitOptions, ProfitReport};
use crate::error::InsightsResult;
use crate::settings::InsightsSettings;

/// Identifiers of the per-product sales report, in the two naming conventions
/// the reporting endpoint may use.
pub mod sales_report {
    pub const SOURCE: &str = "sales";
    pub const SNAKE_GROUP_BY: [&str; 3] = ["product.id", "product.sku", "product.name"];
    pub const SNAKE_METRICS: [&str; 2] = ["sum_qty", "sum_total"];
    pub const CAMEL_GROUP_BY: [&str; 3] = ["productId", "productSku", "productName"];
    pub const CAMEL_METRICS: [&str; 2] = ["sumQty", "sumTotal"];
}

/// Optional `from`/`to` bounds, applied verbatim to every query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct DateRange {
    pub from: Option<String>,
    pub to: Option<String>,
}

impl DateRange {
    pub fn new(from: Option<String>, to: Option<String>) -> Self {
        Self { from, to }
    }

    fn apply(&self, query: ReportQuery) -> ReportQuery {
        query.range(self.from.clone(), self.to.clone())
    }
}

/// Run the sales report with snake_case identifiers and, if that yields no
/// rows, once more with camelCase identifiers.
///
/// Only a fully empty result triggers the second attempt; a non-empty result
/// with unexpected column names is returned as is.
pub async fn fetch_with_fallback(
    client: &dyn BizClient,
    range: &DateRange,
    limit: Option<u32>,
) -> InsightsResult<ReportTable> {
    let snake = range.apply(
        ReportQuery::new(sales_report::SOURCE)
            .group_by(sales_report::SNAKE_GROUP_BY)
            .metrics(sales_report::SNAKE_METRICS)
            .limit(limit),
    );
    let table = client.run_report(&snake).await?;
    tracing::debug!(rows = table.len(), "sales report (snake_case)");
    if !table.is_empty() {
        return Ok(table);
    }

    tracing::info!("sales report empty with snake_case identifiers, retrying with camelCase");
    metrics::counter!("bizops_report_fallback_total").increment(1);
    let camel = range.apply(
        ReportQuery::new(sales_report::SOURCE)
            .group_by(sales_report::CAMEL_GROUP_BY)
            .metrics(sales_report::CAMEL_METRICS)
            .limit(limit),
    );
    let table = client.run_report(&camel).await?;
    tracing::debug!(rows = table.len(), "sales report (camelCase)");
    Ok(table)
}

#[derive(Clone)]
pub struct ProfitService {
    client: Arc<dyn BizClient>,
    settings: InsightsSettings,
}

impl ProfitService {
    pub fn new(client: Arc<dyn BizClient>, settings: InsightsSettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &InsightsSettings {
        &self.settings
    }

    /// Options for a request, falling back to the configured percentage.
    pub fn options(&self, fallback_pct: Option<f64>) -> ProfitOptions {
        ProfitOptions::from_pct(fallback_pct.unwrap_or(self.settings.fallback_cost_pct))
    }

    pub async fn fetch_product_sales(
        &self,
        range: &DateRange,
        limit: Option<u32>,
    ) -> InsightsResult<ReportTable> {
        fetch_with_fallback(self.client.as_ref(), range, limit).await
    }

    pub async fn load_catalog(&self) -> InsightsResult<Catalog> {
        let items = self
            .client
            .list_all_products(self.settings.products_page_size)
            .await?;
        let catalog = Catalog::from_products(items);
        tracing::debug!(entries = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    /// Fetch sales and catalog concurrently and build the profit report.
    pub async fn analyze(
        &self,
        range: &DateRange,
        limit: Option<u32>,
        options: ProfitOptions,
        prices: Option<&CompetitorPriceMap>,
    ) -> InsightsResult<ProfitReport> {
        let (sales, catalog) =
            tokio::try_join!(self.fetch_product_sales(range, limit), self.load_catalog())?;
        Ok(ProfitReport::build(&sales, &catalog, options, prices))
    }

    /// Estimate competitor prices for every row of `report`.
    pub async fn estimate_prices(
        &self,
        report: &ProfitReport,
        remote: Option<&dyn PriceEstimator>,
        timeout: Duration,
    ) -> (CompetitorPriceMap, EstimateSummary) {
        let queries: Vec<PriceQuery> = report.rows.iter().map(PriceQuery::from_row).collect();
        estimate_competitor_prices(
            &queries,
            remote,
            self.settings.estimate_batch_size,
            timeout,
        )
        .await
    }
}

/// Report queries behind the day activity view.
pub mod activity_reports {
    use bizops_client::ReportQuery;

    pub fn inventory_movements() -> ReportQuery {
        ReportQuery::new("inventory_movements")
            .group_by(["day", "type"])
            .metrics(["count", "sum_qty"])
    }

    pub fn sales_summary() -> ReportQuery {
        ReportQuery::new("sales")
            .group_by(["day"])
            .metrics(["count", "sum_total"])
    }

    pub fn sales_detail() -> ReportQuery {
        ReportQuery::new("sales_items")
            .group_by(["day", "invoice", "customer", "product.name"])
            .metrics(["sum_qty", "sum_total"])
    }
}

#[derive(Clone)]
pub struct ActivityService {
    client: Arc<dyn BizClient>,
}

impl ActivityService {
    pub fn new(client: Arc<dyn BizClient>) -> Self {
        Self { client }
    }

    /// Issue the three activity reports concurrently and merge them by day.
    pub async fn day_activity(&self, range: &DateRange) -> InsightsResult<Vec<DayBucket>> {
        let inventory_q = range.apply(activity_reports::inventory_movements());
        let sales_q = range.apply(activity_reports::sales_summary());
        let detail_q = range.apply(activity_reports::sales_detail());

        let (inventory, sales, detail) = tokio::try_join!(
            self.client.run_report(&inventory_q),
            self.client.run_report(&sales_q),
            self.client.run_report(&detail_q),
        )?;
        tracing::debug!(
            inventory = inventory.len(),
            sales = sales.len(),
            detail = detail.len(),
            "activity reports fetched"
        );
        Ok(build_day_buckets(&inventory, &sales, &detail))
    }
}
