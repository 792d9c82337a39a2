//! `BizClient` trait and the wire types of the business backend.
//!
//! The backend exposes a generic reporting endpoint (`POST /reports/run`) whose
//! column naming is chosen by the caller and is not guaranteed to be stable,
//! plus a paged product listing. The local LLM chat endpoint lives in [`llm`].

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub mod config;
pub mod http_client;
pub mod llm;
pub mod utils;

#[derive(Debug, Error)]
pub enum BizError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unauthorized: {0}")]
    Auth(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("api returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl BizError {
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => BizError::Auth(body),
            404 => BizError::NotFound(body),
            400 | 422 => BizError::InvalidInput(body),
            _ => BizError::Status { status, body },
        }
    }
}

/// Body of `POST /reports/run`.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    pub source: String,
    pub group_by: Vec<String>,
    pub metrics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl ReportQuery {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn metrics<I, S>(mut self, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metrics = metrics.into_iter().map(Into::into).collect();
        self
    }

    pub fn range(mut self, from: Option<String>, to: Option<String>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit;
        self
    }
}

/// Result of a report run. Rows are either positional arrays (parallel to
/// `columns`) or keyed objects; both shapes are kept raw.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ReportTable {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub columns: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub rows: Vec<serde_json::Value>,
}

impl ReportTable {
    pub fn new(columns: Vec<String>, rows: Vec<serde_json::Value>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// One product as listed by `GET /products`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ProductItem {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: i64,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    pub sku: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    pub name: Option<String>,
    #[serde(
        default,
        rename = "stdCost",
        alias = "std_cost",
        alias = "standardCost",
        deserialize_with = "deserialize_opt_number"
    )]
    pub std_cost: Option<f64>,
    #[serde(
        default,
        rename = "listPrice",
        alias = "list_price",
        deserialize_with = "deserialize_opt_number"
    )]
    pub list_price: Option<f64>,
}

fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value = serde_json::Value::deserialize(deserializer)?;
    match &value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .ok_or_else(|| D::Error::custom(format!("expected integer id, got {value}"))),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| D::Error::custom(format!("expected integer id, got {value}"))),
        other => Err(D::Error::custom(format!(
            "expected integer id, got {other}"
        ))),
    }
}

fn deserialize_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string().into()),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// Costs and prices arrive as numbers or numeric strings depending on the
/// serializer settings of the backend; anything unparsable is treated as absent.
fn deserialize_opt_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    let number = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number.filter(|f| f.is_finite()))
}

#[async_trait]
pub trait BizClient: Send + Sync + 'static {
    /// Run a report against `POST /reports/run`.
    async fn run_report(&self, query: &ReportQuery) -> Result<ReportTable, BizError>;

    /// Fetch one page of `GET /products` (pages start at 1).
    async fn list_products(&self, page: u32, page_size: u32)
    -> Result<Vec<ProductItem>, BizError>;

    /// Walk every page of the product listing until a short page.
    async fn list_all_products(&self, page_size: u32) -> Result<Vec<ProductItem>, BizError> {
        const MAX_PAGES: u32 = 500;
        let page_size = page_size.max(1);
        let mut all = Vec::new();
        for page in 1..=MAX_PAGES {
            let items = self.list_products(page, page_size).await?;
            let short = (items.len() as u32) < page_size;
            all.extend(items);
            if short {
                return Ok(all);
            }
        }
        tracing::warn!(pages = MAX_PAGES, "product listing truncated at page limit");
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn report_query_serializes_camel_case_and_skips_empty_range() {
        let q = ReportQuery::new("sales")
            .group_by(["product.id"])
            .metrics(["sum_qty"]);
        let v = serde_json::to_value(&q).unwrap();
        assert_eq!(
            v,
            json!({"source": "sales", "groupBy": ["product.id"], "metrics": ["sum_qty"]})
        );
    }

    #[test]
    fn report_table_tolerates_missing_and_null_fields() {
        let t: ReportTable = serde_json::from_value(json!({"rows": null})).unwrap();
        assert!(t.is_empty());
        assert!(t.columns.is_empty());
    }

    #[test]
    fn product_item_accepts_snake_case_and_string_numbers() {
        let p: ProductItem = serde_json::from_value(json!({
            "id": "7", "sku": "A-1", "name": "Apple", "std_cost": "2.5", "list_price": 5
        }))
        .unwrap();
        assert_eq!(p.id, 7);
        assert_eq!(p.std_cost, Some(2.5));
        assert_eq!(p.list_price, Some(5.0));
    }

    #[test]
    fn product_item_camel_case_and_blank_sku() {
        let p: ProductItem = serde_json::from_value(json!({
            "id": 3, "sku": "  ", "name": "Pear", "stdCost": null, "listPrice": "n/a"
        }))
        .unwrap();
        assert_eq!(p.sku, None);
        assert_eq!(p.std_cost, None);
        assert_eq!(p.list_price, None);
    }

    #[test]
    fn product_item_rejects_non_numeric_id() {
        let res: Result<ProductItem, _> = serde_json::from_value(json!({"id": {"x": 1}}));
        assert!(res.is_err());
    }

    #[test]
    fn from_status_maps_auth_and_not_found() {
        assert!(matches!(BizError::from_status(401, "x".into()), BizError::Auth(_)));
        assert!(matches!(BizError::from_status(404, "x".into()), BizError::NotFound(_)));
        assert!(matches!(
            BizError::from_status(500, "x".into()),
            BizError::Status { status: 500, .. }
        ));
    }
}
