//! Profit, pricing and activity insights over a generic business reporting API.
//!
//! Report rows of unknown shape are normalized through [`domains::fields`],
//! reconciled against the product catalog, and aggregated into per-product
//! margins, competitor price gaps, portfolio KPIs and day-bucketed activity.

pub mod domains;
pub mod error;
pub mod middleware;
pub mod services;
pub mod settings;
pub mod state;

pub use domains::activity::{DayBucket, SaleDetail, SaleItem};
pub use domains::catalog::{Catalog, CatalogEntry};
pub use domains::competitor::{CompetitorPriceMap, ImportFormat, ImportSummary};
pub use domains::estimator::{
    DeterministicFallbackEstimator, EstimateSummary, PriceEstimator, RemoteEstimator,
};
pub use domains::profit::{CostBasis, PortfolioKpis, ProfitOptions, ProfitReport, ProfitRow};
pub use error::{InsightsError, InsightsResult};
pub use middleware::LoggingMiddleware;
pub use services::{ActivityService, DateRange, ProfitService};
pub use settings::InsightsSettings;
pub use state::CompetitorPriceStore;

/// Install the `tracing` subscriber used by both binaries.
///
/// The filter comes from `BIZOPS_LOG_LEVEL`, then `RUST_LOG`, default `info`.
pub fn init_tracing() -> String {
    let log_env = std::env::var("BIZOPS_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(log_env.clone())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_env_filter(env_filter)
        .init();
    log_env
}
