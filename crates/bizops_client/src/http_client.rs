//! HTTP client implementation for the business backend.
//!
//! This module provides a reqwest-based implementation of the [`BizClient`](crate::BizClient) trait.

use crate::config::Config;
use crate::utils::normalize_report_date;
use crate::{BizClient, BizError, ProductItem, ReportQuery, ReportTable};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Client for the backend API using reqwest.
#[derive(Clone, Debug)]
pub struct ReqwestBizClient {
    base_url: String,
    api_token: Option<SecretString>,
    client: reqwest::Client,
}

impl ReqwestBizClient {
    /// Create a new client instance.
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the backend API (e.g., "http://localhost:5000/api")
    /// * `api_token` - Optional bearer token attached to every request
    pub fn new(base_url: &str, api_token: Option<SecretString>) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("reqwest client build should not fail");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            client,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.base_url, config.api_token.clone())
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    fn get_request(&self, url: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.get(url))
    }

    fn post_request(&self, url: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.post(url))
    }

    /// Execute a request and decode the JSON body, keeping a snippet of the
    /// body in the error when the payload does not match `T`.
    async fn execute_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, BizError> {
        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        let text = resp.text().await?;
        serde_json::from_str::<T>(&text).map_err(|e| {
            let body_snippet: String = text.chars().take(512).collect();
            BizError::Decode(format!("{e} - body: {body_snippet}"))
        })
    }

    /// Normalize `from`/`to` to `YYYY-MM-DD`, rejecting unparsable dates
    /// before they reach the backend.
    fn normalized_query(query: &ReportQuery) -> Result<ReportQuery, BizError> {
        let mut q = query.clone();
        for bound in [&mut q.from, &mut q.to] {
            if let Some(raw) = bound.take() {
                if raw.trim().is_empty() {
                    continue;
                }
                let date = normalize_report_date(&raw)
                    .ok_or_else(|| BizError::InvalidInput(format!("invalid report date: {raw}")))?;
                *bound = Some(date);
            }
        }
        Ok(q)
    }
}

/// Extract error information from a failed response.
pub(crate) async fn error_from_response(resp: reqwest::Response) -> BizError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let body_snippet: String = body.chars().take(256).collect();
    BizError::from_status(status, body_snippet)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProductsPayload {
    Paged {
        #[serde(default)]
        items: Vec<ProductItem>,
    },
    Bare(Vec<ProductItem>),
}

#[async_trait]
impl BizClient for ReqwestBizClient {
    async fn run_report(&self, query: &ReportQuery) -> Result<ReportTable, BizError> {
        let url = format!("{}/reports/run", self.base_url);
        let query = Self::normalized_query(query)?;
        tracing::debug!(
            source = %query.source,
            group_by = ?query.group_by,
            metrics = ?query.metrics,
            "running report"
        );
        metrics::counter!("bizops_api_requests_total", "endpoint" => "reports_run").increment(1);
        self.execute_json(self.post_request(&url).json(&query))
            .await
    }

    async fn list_products(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ProductItem>, BizError> {
        let url = format!("{}/products", self.base_url);
        let pairs = [("page", page.to_string()), ("pageSize", page_size.to_string())];
        metrics::counter!("bizops_api_requests_total", "endpoint" => "products").increment(1);
        let payload: ProductsPayload = self
            .execute_json(self.get_request(&url).query(&pairs))
            .await?;
        Ok(match payload {
            ProductsPayload::Paged { items } => items,
            ProductsPayload::Bare(items) => items,
        })
    }
}
