//! Competitor price estimation.
//!
//! Rows are sent to a [`PriceEstimator`] in fixed-size batches, one batch at a
//! time. A batch the remote model cannot answer (transport error, bad status,
//! malformed JSON, timeout) is answered by [`DeterministicFallbackEstimator`],
//! which also fills any item the model left out.

use std::time::Duration;

use async_trait::async_trait;
use bizops_client::config::LlmConfig;
use bizops_client::llm::{ChatMessage, OllamaClient, extract_json_object};
use serde::Serialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use super::catalog::{name_key, sku_key};
use super::coercion::{round2, to_num_opt};
use super::competitor::CompetitorPriceMap;
use super::profit::ProfitRow;
use crate::error::{InsightsError, InsightsResult};

/// One product to price. `key` is the competitor map key it will be stored under.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuery {
    pub key: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_price: Option<f64>,
}

impl PriceQuery {
    pub fn from_row(row: &ProfitRow) -> Self {
        let key = match row.sku.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(sku) => sku_key(sku),
            None => name_key(&row.name),
        };
        Self {
            key,
            name: row.name.clone(),
            sku: row.sku.clone(),
            my_price: row.my_price,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PriceEstimate {
    pub key: String,
    pub price: f64,
}

#[async_trait]
pub trait PriceEstimator: Send + Sync {
    /// Estimate prices for `batch`; `offset` is the global index of its first item.
    async fn estimate(
        &self,
        batch: &[PriceQuery],
        offset: usize,
    ) -> InsightsResult<Vec<PriceEstimate>>;

    fn name(&self) -> &'static str;
}

/// Seed-free synthetic prices derived from the row key and its global index.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeterministicFallbackEstimator;

impl DeterministicFallbackEstimator {
    pub const MIN_PRICE: f64 = 50.0;
    pub const DEFAULT_BASE: f64 = 400.0;

    /// Deviation in `[0.05, 0.18]` from SHA-256 of the key and index.
    pub fn deviation(key: &str, index: usize) -> f64 {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hasher.update((index as u64).to_le_bytes());
        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        0.05 + (u64::from_le_bytes(head) % 1301) as f64 / 10_000.0
    }

    pub fn price_for(&self, query: &PriceQuery, index: usize) -> f64 {
        let base = query
            .my_price
            .filter(|p| p.is_finite() && *p > 0.0)
            .unwrap_or(Self::DEFAULT_BASE);
        let pct = Self::deviation(&query.key, index);
        let factor = if index % 2 == 0 { 1.0 + pct } else { 1.0 - pct };
        round2((base * factor).max(Self::MIN_PRICE))
    }

    pub fn estimate_batch(&self, batch: &[PriceQuery], offset: usize) -> Vec<PriceEstimate> {
        batch
            .iter()
            .enumerate()
            .map(|(i, q)| PriceEstimate {
                key: q.key.clone(),
                price: self.price_for(q, offset + i),
            })
            .collect()
    }
}

#[async_trait]
impl PriceEstimator for DeterministicFallbackEstimator {
    async fn estimate(
        &self,
        batch: &[PriceQuery],
        offset: usize,
    ) -> InsightsResult<Vec<PriceEstimate>> {
        Ok(self.estimate_batch(batch, offset))
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}

const SYSTEM_PROMPT: &str = "You estimate current retail prices charged by competitors \
for the products you are given. Answer with a single JSON object and nothing else, \
shaped as {\"items\":[{\"key\":\"<key>\",\"price\":<number>}]}, one item per product, \
reusing each product's key verbatim.";

/// Asks a local chat model for competitor prices.
#[derive(Clone, Debug)]
pub struct RemoteEstimator {
    client: OllamaClient,
    temperature: f64,
    stream: bool,
}

impl RemoteEstimator {
    pub fn new(client: OllamaClient) -> Self {
        Self {
            client,
            temperature: 0.2,
            stream: false,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(OllamaClient::from_config(config)).with_streaming(config.stream)
    }

    /// Read the reply chunk by chunk as the model produces it.
    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    fn messages(batch: &[PriceQuery]) -> InsightsResult<Vec<ChatMessage>> {
        let products = serde_json::to_string(batch)?;
        Ok(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!("Products: {products}")),
        ])
    }
}

/// Pull `{items:[{key, price}]}` out of a free-text model reply, keeping only
/// keys that were asked for and prices that are positive.
pub fn parse_estimates(reply: &str, batch: &[PriceQuery]) -> InsightsResult<Vec<PriceEstimate>> {
    let object = extract_json_object(reply)
        .ok_or_else(|| InsightsError::Estimation("reply contains no JSON object".into()))?;
    let items = object
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| InsightsError::Estimation("reply has no items array".into()))?;

    Ok(items
        .iter()
        .filter_map(|item| {
            let key = item.get("key")?.as_str()?.trim();
            let price = item.get("price").and_then(to_num_opt)?;
            let asked = batch.iter().find(|q| q.key.eq_ignore_ascii_case(key))?;
            (price > 0.0).then(|| PriceEstimate {
                key: asked.key.clone(),
                price: round2(price),
            })
        })
        .collect())
}

#[async_trait]
impl PriceEstimator for RemoteEstimator {
    async fn estimate(
        &self,
        batch: &[PriceQuery],
        _offset: usize,
    ) -> InsightsResult<Vec<PriceEstimate>> {
        let messages = Self::messages(batch)?;
        let options = json!({ "temperature": self.temperature });
        let reply = if self.stream {
            self.client.chat_streamed(&messages, Some(&options)).await?
        } else {
            self.client.chat(&messages, Some(&options)).await?
        };
        parse_estimates(&reply, batch)
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateSummary {
    pub batches: usize,
    pub remote_batches: usize,
    pub fallback_batches: usize,
    /// Items the remote model answered.
    pub estimated: usize,
    /// Items priced by the deterministic fallback.
    pub filled: usize,
}

/// Price every query, `batch_size` at a time. Batches run sequentially, each
/// under its own `timeout`.
pub async fn estimate_competitor_prices(
    queries: &[PriceQuery],
    remote: Option<&dyn PriceEstimator>,
    batch_size: usize,
    timeout: Duration,
) -> (CompetitorPriceMap, EstimateSummary) {
    let fallback = DeterministicFallbackEstimator;
    let mut map = CompetitorPriceMap::new();
    let mut summary = EstimateSummary::default();

    for (chunk_index, batch) in queries.chunks(batch_size.max(1)).enumerate() {
        let offset = chunk_index * batch_size.max(1);
        summary.batches += 1;

        let answered = match remote {
            Some(estimator) => {
                match tokio::time::timeout(timeout, estimator.estimate(batch, offset)).await {
                    Ok(Ok(items)) => Some(items),
                    Ok(Err(err)) => {
                        tracing::warn!(
                            batch = chunk_index,
                            estimator = estimator.name(),
                            error = %err,
                            "price estimation failed, using fallback"
                        );
                        None
                    }
                    Err(_) => {
                        tracing::warn!(
                            batch = chunk_index,
                            estimator = estimator.name(),
                            timeout_ms = timeout.as_millis() as u64,
                            "price estimation timed out, using fallback"
                        );
                        None
                    }
                }
            }
            None => None,
        };

        let outcome = match &answered {
            Some(items) if items.len() >= batch.len() => "remote",
            Some(_) => "partial",
            None => "fallback",
        };
        metrics::counter!("bizops_llm_batches_total", "outcome" => outcome).increment(1);

        match answered {
            Some(items) => {
                summary.remote_batches += 1;
                for item in items {
                    summary.estimated += 1;
                    map.insert(item.key, item.price);
                }
            }
            None => summary.fallback_batches += 1,
        }

        for (i, query) in batch.iter().enumerate() {
            if map.get(&query.key).is_none() {
                map.insert(query.key.clone(), fallback.price_for(query, offset + i));
                summary.filled += 1;
            }
        }
    }

    tracing::info!(
        batches = summary.batches,
        fallback_batches = summary.fallback_batches,
        filled = summary.filled,
        "competitor price estimation finished"
    );
    (map, summary)
}
