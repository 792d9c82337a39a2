use axum::debug_handler;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

use bizops_client::config::Config;
use bizops_client::http_client::ReqwestBizClient;
use bizops_client::{BizClient, BizError};
use bizops_insights::domains::competitor::{ImportFormat, import_prices};
use bizops_insights::{
    ActivityService, CompetitorPriceMap, CompetitorPriceStore, DateRange, DayBucket,
    EstimateSummary, ImportSummary, InsightsError, InsightsSettings, LoggingMiddleware,
    PriceEstimator, ProfitReport, ProfitService, RemoteEstimator,
};

struct AppState {
    profit: ProfitService,
    activity: ActivityService,
    prices: CompetitorPriceStore,
    estimator: Option<Arc<dyn PriceEstimator>>,
    llm_timeout: Duration,
    metrics: PrometheusHandle,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfitParams {
    from: Option<String>,
    to: Option<String>,
    fallback_pct: Option<f64>,
    limit: Option<u32>,
}

impl ProfitParams {
    fn range(&self) -> DateRange {
        DateRange::new(self.from.clone(), self.to.clone())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportResponse {
    #[serde(flatten)]
    summary: ImportSummary,
    total: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EstimateResponse {
    #[serde(flatten)]
    summary: EstimateSummary,
    total: usize,
}

#[debug_handler]
async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[debug_handler]
async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = state.metrics.render();
    ([("content-type", "text/plain; version=0.0.4")], body)
}

#[debug_handler]
async fn get_profit(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProfitParams>,
) -> Result<Json<ProfitReport>, (StatusCode, String)> {
    let prices = state.prices.snapshot().await;
    let options = state.profit.options(params.fallback_pct);
    state
        .profit
        .analyze(&params.range(), params.limit, options, Some(prices.as_ref()))
        .await
        .map(Json)
        .map_err(map_err)
}

#[debug_handler]
async fn get_activity(
    State(state): State<Arc<AppState>>,
    Query(range): Query<DateRange>,
) -> Result<Json<Vec<DayBucket>>, (StatusCode, String)> {
    state
        .activity
        .day_activity(&range)
        .await
        .map(Json)
        .map_err(map_err)
}

#[debug_handler]
async fn get_competitor_prices(State(state): State<Arc<AppState>>) -> Json<CompetitorPriceMap> {
    Json(CompetitorPriceMap::clone(&*state.prices.snapshot().await))
}

#[debug_handler]
async fn clear_competitor_prices(State(state): State<Arc<AppState>>) -> StatusCode {
    state.prices.clear().await;
    StatusCode::NO_CONTENT
}

#[debug_handler]
async fn import_competitor_prices(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ImportResponse>, (StatusCode, String)> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let format = ImportFormat::from_content_type(content_type).ok_or_else(|| {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!("expected a CSV or XLSX body, got content-type {content_type:?}"),
        )
    })?;

    let (map, summary) = import_prices(&body, format).map_err(map_err)?;
    let merged = state.prices.merge(map).await;
    Ok(Json(ImportResponse {
        summary,
        total: merged.len(),
    }))
}

#[debug_handler]
async fn estimate_competitor_prices(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProfitParams>,
) -> Result<Json<EstimateResponse>, (StatusCode, String)> {
    let options = state.profit.options(params.fallback_pct);
    let report = state
        .profit
        .analyze(&params.range(), params.limit, options, None)
        .await
        .map_err(map_err)?;
    let (map, summary) = state
        .profit
        .estimate_prices(&report, state.estimator.as_deref(), state.llm_timeout)
        .await;
    let merged = state.prices.merge(map).await;
    Ok(Json(EstimateResponse {
        summary,
        total: merged.len(),
    }))
}

fn map_err(e: InsightsError) -> (StatusCode, String) {
    let status = match &e {
        InsightsError::Api(BizError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
        InsightsError::Api(_) => StatusCode::BAD_GATEWAY,
        InsightsError::Import(_) => StatusCode::UNPROCESSABLE_ENTITY,
        InsightsError::Validation(_) => StatusCode::BAD_REQUEST,
        InsightsError::Estimation(_)
        | InsightsError::Serialization(_)
        | InsightsError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

fn app(state: Arc<AppState>, max_body_size: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/profit", get(get_profit))
        .route("/activity", get(get_activity))
        .route(
            "/competitor-prices",
            get(get_competitor_prices).delete(clear_competitor_prices),
        )
        .route("/competitor-prices/import", post(import_competitor_prices))
        .route(
            "/competitor-prices/estimate",
            post(estimate_competitor_prices),
        )
        .layer(axum::extract::DefaultBodyLimit::max(max_body_size))
        .with_state(state)
}


#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let log_env = bizops_insights::init_tracing();
    tracing::info!(%log_env, "bizops_insights:http: log filter");

    let builder = PrometheusBuilder::new();
    let handle = builder.install_recorder()?;

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration; aborting startup");
            std::process::exit(1);
        }
    };
    let settings = InsightsSettings::from_env()?;

    let client: Arc<dyn BizClient> =
        Arc::new(LoggingMiddleware::new(ReqwestBizClient::from_config(&config)));
    let estimator: Arc<dyn PriceEstimator> =
        Arc::new(RemoteEstimator::from_config(&config.llm));

    let state = Arc::new(AppState {
        profit: ProfitService::new(client.clone(), settings),
        activity: ActivityService::new(client),
        prices: CompetitorPriceStore::new(),
        estimator: Some(estimator),
        llm_timeout: config.llm.timeout,
        metrics: handle,
    });

    let max_body_size = std::env::var("MAX_HTTP_BODY_SIZE")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(10 * 1024 * 1024);

    let app = app(state, max_body_size);

    let addr: SocketAddr = std::env::var("ADDRESS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 3000)));
    info!(%addr, max_body_bytes = max_body_size, "starting HTTP server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to address {addr}: {e}");
            std::process::exit(1);
        }
    };

    let server = axum::serve(listener, app.into_make_service());
    if let Err(e) = server
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!("failed to listen for ctrl+c: {e}");
            }
        })
        .await
    {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }

    Ok(())
}
