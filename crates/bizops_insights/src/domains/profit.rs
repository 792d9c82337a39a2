//! Catalog reconciliation, margins, competitor price gaps and portfolio KPIs.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use bizops_client::ReportTable;
use serde::Serialize;

use super::catalog::{Catalog, dedup_key, id_key, name_key, sku_key};
use super::competitor::CompetitorPriceMap;
use super::fields::{Field, RowShape, rows_of};

pub const DEFAULT_FALLBACK_RATIO: f64 = 0.60;
const UNNAMED_PRODUCT: &str = "Producto";

/// Provenance of a row's cost.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CostBasis {
    Catalog,
    Fallback,
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitRow {
    pub key: String,
    pub name: String,
    pub sku: Option<String>,
    pub qty: f64,
    pub revenue: f64,
    pub unit_cost: Option<f64>,
    pub cost_basis: CostBasis,
    pub cost_total: f64,
    pub margin: f64,
    pub margin_pct: f64,
    pub my_price: Option<f64>,
    pub competitor_price: Option<f64>,
    pub price_gap_pct: Option<f64>,
}

impl ProfitRow {
    /// Margin used for ranking: price-gap economics when both prices are known.
    pub fn display_margin(&self) -> f64 {
        match (self.my_price, self.competitor_price) {
            (Some(mine), Some(theirs)) => mine - theirs,
            _ => self.margin,
        }
    }

    pub fn display_margin_pct(&self) -> f64 {
        match (self.my_price, self.competitor_price) {
            (Some(_), Some(_)) => self.price_gap_pct.unwrap_or(0.0),
            _ => self.margin_pct,
        }
    }

    /// Overwrite the competitor price and gap from `prices`.
    pub fn apply_competitor_price(&mut self, prices: &CompetitorPriceMap) {
        self.competitor_price = prices.lookup(self.sku.as_deref(), Some(&self.name));
        self.price_gap_pct = price_gap_pct(self.my_price, self.competitor_price);
    }

    pub fn has_activity(&self) -> bool {
        self.qty != 0.0 || self.revenue != 0.0
    }
}

/// `(mine - theirs) / mine * 100`, only when `mine > 0` and both are known.
pub fn price_gap_pct(my_price: Option<f64>, competitor_price: Option<f64>) -> Option<f64> {
    match (my_price, competitor_price) {
        (Some(mine), Some(theirs)) if mine > 0.0 && theirs.is_finite() => {
            Some((mine - theirs) * 100.0 / mine)
        }
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProfitOptions {
    /// Fraction of revenue assumed as cost when no catalog cost exists, in [0, 1].
    pub fallback_ratio: f64,
}

impl Default for ProfitOptions {
    fn default() -> Self {
        Self {
            fallback_ratio: DEFAULT_FALLBACK_RATIO,
        }
    }
}

impl ProfitOptions {
    /// Build from a user-facing percentage (`60` means 60 %).
    pub fn from_pct(pct: f64) -> Self {
        if !pct.is_finite() {
            return Self::default();
        }
        Self {
            fallback_ratio: (pct / 100.0).clamp(0.0, 1.0),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioKpis {
    pub revenue: f64,
    pub cost: f64,
    pub margin: f64,
    pub margin_pct: f64,
    pub profitable: usize,
    pub loss_leaders: usize,
    pub total_qty: f64,
    pub avg_unit_price: f64,
    pub avg_unit_cost: f64,
    pub avg_unit_margin: f64,
}

impl PortfolioKpis {
    pub fn from_rows(rows: &[ProfitRow]) -> Self {
        let revenue: f64 = rows.iter().map(|r| r.revenue).sum();
        let cost: f64 = rows.iter().map(|r| r.cost_total).sum();
        let total_qty: f64 = rows.iter().map(|r| r.qty).sum();
        let margin = revenue - cost;

        let (avg_unit_price, avg_unit_cost) = if total_qty != 0.0 {
            (revenue / total_qty, cost / total_qty)
        } else {
            (0.0, 0.0)
        };

        Self {
            revenue,
            cost,
            margin,
            margin_pct: if revenue > 0.0 {
                margin * 100.0 / revenue
            } else {
                0.0
            },
            profitable: rows.iter().filter(|r| r.margin > 0.0).count(),
            loss_leaders: rows.iter().filter(|r| r.margin < 0.0).count(),
            total_qty,
            avg_unit_price,
            avg_unit_cost,
            avg_unit_margin: avg_unit_price - avg_unit_cost,
        }
    }
}

/// How many rows got their cost from each source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuality {
    pub catalog: usize,
    pub fallback: usize,
    pub unknown: usize,
    pub zero_activity: usize,
}

impl DataQuality {
    pub fn from_rows(rows: &[ProfitRow]) -> Self {
        let mut quality = Self::default();
        for row in rows {
            match row.cost_basis {
                CostBasis::Catalog => quality.catalog += 1,
                CostBasis::Fallback => quality.fallback += 1,
                CostBasis::Unknown => quality.unknown += 1,
            }
            if !row.has_activity() {
                quality.zero_activity += 1;
            }
        }
        quality
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitReport {
    pub rows: Vec<ProfitRow>,
    pub kpis: PortfolioKpis,
    pub quality: DataQuality,
}

impl ProfitReport {
    pub fn build(
        table: &ReportTable,
        catalog: &Catalog,
        options: ProfitOptions,
        prices: Option<&CompetitorPriceMap>,
    ) -> Self {
        let mut rows = reconcile(table, catalog, options);
        if let Some(prices) = prices {
            for row in &mut rows {
                row.apply_competitor_price(prices);
            }
        }
        let report = Self::from_rows(rows);
        tracing::debug!(
            rows = report.rows.len(),
            catalog = report.quality.catalog,
            fallback = report.quality.fallback,
            unknown = report.quality.unknown,
            "profit report built"
        );
        report
    }

    pub fn from_rows(rows: Vec<ProfitRow>) -> Self {
        Self {
            kpis: PortfolioKpis::from_rows(&rows),
            quality: DataQuality::from_rows(&rows),
            rows,
        }
    }

    /// Recompute competitor prices and gaps for every row.
    pub fn apply_competitor_prices(&mut self, prices: &CompetitorPriceMap) {
        for row in &mut self.rows {
            row.apply_competitor_price(prices);
        }
    }

    /// Rows ordered by display margin, best first.
    pub fn ranked_by_display_margin(&self) -> Vec<&ProfitRow> {
        let mut ranked: Vec<&ProfitRow> = self.rows.iter().collect();
        ranked.sort_by(|a, b| {
            b.display_margin()
                .partial_cmp(&a.display_margin())
                .unwrap_or(Ordering::Equal)
        });
        ranked
    }

    pub fn unsold(&self) -> impl Iterator<Item = &ProfitRow> {
        self.rows.iter().filter(|r| !r.has_activity())
    }

    pub fn loss_leaders(&self) -> impl Iterator<Item = &ProfitRow> {
        self.rows.iter().filter(|r| r.margin < 0.0)
    }
}

struct Draft {
    key: String,
    name: String,
    sku: Option<String>,
    qty: f64,
    revenue: f64,
    unit_cost: Option<f64>,
    list_price: Option<f64>,
}

impl Draft {
    fn finish(self, options: ProfitOptions) -> ProfitRow {
        let (cost_basis, cost_total) = match self.unit_cost {
            Some(unit) => (CostBasis::Catalog, unit * self.qty),
            None if self.revenue > 0.0 => {
                (CostBasis::Fallback, self.revenue * options.fallback_ratio)
            }
            None => (CostBasis::Unknown, 0.0),
        };
        let margin = self.revenue - cost_total;
        let margin_pct = if self.revenue > 0.0 {
            margin * 100.0 / self.revenue
        } else {
            0.0
        };
        let my_price = self
            .list_price
            .or_else(|| (self.qty > 0.0).then(|| self.revenue / self.qty))
            .filter(|p| p.is_finite());

        ProfitRow {
            key: self.key,
            name: self.name,
            sku: self.sku,
            qty: self.qty,
            revenue: self.revenue,
            unit_cost: self.unit_cost,
            cost_basis,
            cost_total,
            margin,
            margin_pct,
            my_price,
            competitor_price: None,
            price_gap_pct: None,
        }
    }
}

fn product_id(row: &RowShape<'_>) -> Option<i64> {
    row.number_opt(Field::ProductId)
        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| f as i64)
}

/// Join sales rows against the catalog and append catalog products that never
/// sold. Rows resolving to the same key are merged.
pub fn reconcile(table: &ReportTable, catalog: &Catalog, options: ProfitOptions) -> Vec<ProfitRow> {
    let mut drafts: Vec<Draft> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();
    let mut seen_positions: HashSet<usize> = HashSet::new();
    let mut seen_ids: HashSet<i64> = HashSet::new();
    let mut seen_keys: HashSet<String> = HashSet::new();

    for row in rows_of(table) {
        let id = product_id(&row);
        let report_sku = row.text(Field::Sku);
        let report_name = row.text(Field::Name);
        let qty = row.number(Field::Qty);
        let revenue = row.number(Field::Total);

        let hit = catalog.lookup(id, report_sku.as_deref(), report_name.as_deref());
        let entry = hit.map(|(_, e)| e);
        if let Some((pos, e)) = hit {
            seen_positions.insert(pos);
            seen_ids.insert(e.id);
        }
        if let Some(id) = id {
            seen_ids.insert(id);
        }

        let sku = entry
            .and_then(|e| e.sku.clone())
            .or_else(|| report_sku.clone());
        let name = entry
            .map(|e| e.name.clone())
            .filter(|n| !n.is_empty())
            .or_else(|| report_name.clone())
            .or_else(|| id.map(|id| format!("#{id}")))
            .unwrap_or_else(|| UNNAMED_PRODUCT.to_string());
        seen_keys.insert(dedup_key(sku.as_deref(), &name));

        let key = entry
            .map(|e| id_key(e.id))
            .or_else(|| id.map(id_key))
            .or_else(|| report_sku.as_deref().map(sku_key))
            .or_else(|| report_name.as_deref().map(name_key))
            .unwrap_or_else(|| format!("row:{}", uuid::Uuid::new_v4()));

        match by_key.get(&key) {
            Some(&i) => {
                drafts[i].qty += qty;
                drafts[i].revenue += revenue;
            }
            None => {
                by_key.insert(key.clone(), drafts.len());
                drafts.push(Draft {
                    key,
                    name,
                    sku,
                    qty,
                    revenue,
                    unit_cost: entry.and_then(|e| e.standard_cost),
                    list_price: entry.and_then(|e| e.list_price),
                });
            }
        }
    }

    for (pos, entry) in catalog.entries().iter().enumerate() {
        let key = id_key(entry.id);
        if seen_positions.contains(&pos)
            || seen_ids.contains(&entry.id)
            || seen_keys.contains(&entry.dedup_key())
            || by_key.contains_key(&key)
        {
            continue;
        }
        seen_keys.insert(entry.dedup_key());
        by_key.insert(key.clone(), drafts.len());
        drafts.push(Draft {
            key,
            name: if entry.name.is_empty() {
                format!("#{}", entry.id)
            } else {
                entry.name.clone()
            },
            sku: entry.sku.clone(),
            qty: 0.0,
            revenue: 0.0,
            unit_cost: entry.standard_cost,
            list_price: entry.list_price,
        });
    }

    drafts.into_iter().map(|d| d.finish(options)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::catalog::CatalogEntry;
    use serde_json::json;

    fn entry(id: i64, sku: Option<&str>, name: &str, cost: Option<f64>, price: Option<f64>) -> CatalogEntry {
        CatalogEntry {
            id,
            sku: sku.map(str::to_string),
            name: name.to_string(),
            standard_cost: cost,
            list_price: price,
        }
    }

    fn keyed(rows: Vec<serde_json::Value>) -> ReportTable {
        ReportTable::new(vec![], rows)
    }

    #[test]
    fn margin_arithmetic_with_catalog_cost() {
        let catalog = Catalog::new(vec![entry(7, Some("W"), "Widget", Some(40.0), None)]);
        let table = keyed(vec![json!({"productId": 7, "sumQty": 10, "sumTotal": 1000})]);
        let rows = reconcile(&table, &catalog, ProfitOptions::default());
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.cost_basis, CostBasis::Catalog);
        assert_eq!(row.cost_total, 400.0);
        assert_eq!(row.margin, 600.0);
        assert_eq!(row.margin_pct, 60.0);
        assert_eq!(row.my_price, Some(100.0));
    }

    #[test]
    fn end_to_end_row_matches_catalog() {
        let catalog = Catalog::new(vec![entry(1, Some("A"), "Apple", Some(2.0), Some(5.0))]);
        let table = keyed(vec![json!({"productId": 1, "sumQty": 3, "sumTotal": 15})]);
        let report = ProfitReport::build(&table, &catalog, ProfitOptions::default(), None);
        let row = &report.rows[0];
        assert_eq!(row.key, "id:1");
        assert_eq!(row.name, "Apple");
        assert_eq!(row.qty, 3.0);
        assert_eq!(row.revenue, 15.0);
        assert_eq!(row.unit_cost, Some(2.0));
        assert_eq!(row.cost_total, 6.0);
        assert_eq!(row.margin, 9.0);
        assert_eq!(row.margin_pct, 60.0);
        assert_eq!(row.my_price, Some(5.0));
    }

    #[test]
    fn fallback_ratio_and_unknown_basis() {
        let table = keyed(vec![
            json!({"name": "Loose", "qty": 2, "total": 50}),
            json!({"name": "Free", "qty": 1, "total": 0}),
        ]);
        let rows = reconcile(&table, &Catalog::default(), ProfitOptions::from_pct(40.0));
        assert_eq!(rows[0].cost_basis, CostBasis::Fallback);
        assert_eq!(rows[0].cost_total, 20.0);
        assert_eq!(rows[0].margin, 30.0);
        assert_eq!(rows[0].key, "name:loose");
        assert_eq!(rows[1].cost_basis, CostBasis::Unknown);
        assert_eq!(rows[1].cost_total, 0.0);
        assert_eq!(rows[1].margin_pct, 0.0);
    }

    #[test]
    fn fallback_pct_is_clamped() {
        assert_eq!(ProfitOptions::from_pct(150.0).fallback_ratio, 1.0);
        assert_eq!(ProfitOptions::from_pct(-5.0).fallback_ratio, 0.0);
        assert_eq!(ProfitOptions::from_pct(f64::NAN).fallback_ratio, 0.6);
    }

    #[test]
    fn unsold_catalog_entries_appear_exactly_once() {
        let catalog = Catalog::new(vec![
            entry(1, Some("A"), "Apple", Some(2.0), Some(5.0)),
            entry(2, Some("B"), "Banana", Some(1.0), Some(2.0)),
            entry(3, None, "Cherry", None, Some(9.0)),
            entry(4, Some("D"), "Durian", None, None),
        ]);
        // Apple by id, Durian by sku only
        let table = keyed(vec![
            json!({"productId": 1, "sumQty": 1, "sumTotal": 5}),
            json!({"sku": "d", "sumQty": 2, "sumTotal": 8}),
        ]);
        let report = ProfitReport::build(&table, &catalog, ProfitOptions::default(), None);
        let keys: Vec<&str> = report.rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["id:1", "id:4", "id:2", "id:3"]);

        let unsold: Vec<&str> = report.unsold().map(|r| r.name.as_str()).collect();
        assert_eq!(unsold, vec!["Banana", "Cherry"]);
        let cherry = report.rows.iter().find(|r| r.key == "id:3").unwrap();
        assert_eq!(cherry.cost_basis, CostBasis::Unknown);
        assert_eq!(cherry.my_price, Some(9.0));
        assert_eq!(report.quality.zero_activity, 2);
    }

    #[test]
    fn sales_rows_with_same_key_are_merged() {
        let catalog = Catalog::new(vec![entry(1, Some("A"), "Apple", Some(2.0), None)]);
        let table = keyed(vec![
            json!({"productId": 1, "sumQty": 1, "sumTotal": 5}),
            json!({"sku": "A", "sumQty": 2, "sumTotal": 10}),
        ]);
        let rows = reconcile(&table, &catalog, ProfitOptions::default());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].qty, 3.0);
        assert_eq!(rows[0].revenue, 15.0);
        assert_eq!(rows[0].cost_total, 6.0);
    }

    #[test]
    fn display_name_falls_back_to_id_then_placeholder() {
        let table = keyed(vec![
            json!({"productId": 55, "sumQty": 1, "sumTotal": 3}),
            json!({"sumQty": 1, "sumTotal": 3}),
        ]);
        let rows = reconcile(&table, &Catalog::default(), ProfitOptions::default());
        assert_eq!(rows[0].name, "#55");
        assert_eq!(rows[1].name, "Producto");
        assert!(rows[1].key.starts_with("row:"));
    }

    #[test]
    fn price_gap_requires_positive_own_price() {
        assert_eq!(price_gap_pct(Some(100.0), Some(80.0)), Some(20.0));
        assert_eq!(price_gap_pct(None, Some(80.0)), None);
        assert_eq!(price_gap_pct(Some(0.0), Some(80.0)), None);
        assert_eq!(price_gap_pct(Some(100.0), None), None);
    }

    #[test]
    fn competitor_prices_drive_display_margin_and_recompute() {
        let catalog = Catalog::new(vec![
            entry(1, Some("A"), "Apple", Some(60.0), Some(100.0)),
            entry(2, Some("B"), "Banana", Some(1.0), Some(10.0)),
        ]);
        let table = keyed(vec![json!({"productId": 1, "sumQty": 1, "sumTotal": 100})]);
        let mut prices = CompetitorPriceMap::new();
        prices.insert_sku("a", 80.0);
        let mut report =
            ProfitReport::build(&table, &catalog, ProfitOptions::default(), Some(&prices));

        let apple = &report.rows[0];
        assert_eq!(apple.competitor_price, Some(80.0));
        assert_eq!(apple.price_gap_pct, Some(20.0));
        assert_eq!(apple.display_margin(), 20.0);
        assert_eq!(apple.display_margin_pct(), 20.0);
        assert_eq!(report.rows[1].display_margin(), 0.0);

        let mut updated = CompetitorPriceMap::new();
        updated.insert_name("banana", 8.0);
        report.apply_competitor_prices(&updated);
        assert_eq!(report.rows[0].competitor_price, None);
        assert_eq!(report.rows[0].display_margin(), 40.0);
        assert_eq!(report.rows[1].price_gap_pct, Some(20.0));

        let ranked: Vec<&str> = report
            .ranked_by_display_margin()
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(ranked, vec!["Apple", "Banana"]);
    }

    #[test]
    fn kpis_are_unit_weighted() {
        let catalog = Catalog::new(vec![
            entry(1, None, "One", Some(2.0), None),
            entry(2, None, "Two", Some(10.0), None),
        ]);
        let table = keyed(vec![
            json!({"productId": 1, "sumQty": 3, "sumTotal": 15}),
            json!({"productId": 2, "sumQty": 1, "sumTotal": 5}),
        ]);
        let report = ProfitReport::build(&table, &catalog, ProfitOptions::default(), None);
        let k = &report.kpis;
        assert_eq!(k.revenue, 20.0);
        assert_eq!(k.cost, 16.0);
        assert_eq!(k.margin, 4.0);
        assert_eq!(k.margin_pct, 20.0);
        assert_eq!((k.profitable, k.loss_leaders), (1, 1));
        assert_eq!(k.total_qty, 4.0);
        assert_eq!(k.avg_unit_price, 5.0);
        assert_eq!(k.avg_unit_cost, 4.0);
        assert_eq!(k.avg_unit_margin, 1.0);
        assert_eq!(report.loss_leaders().count(), 1);
    }

    #[test]
    fn kpis_without_quantity_are_zero() {
        let k = PortfolioKpis::from_rows(&[]);
        assert_eq!(k, PortfolioKpis::default());
    }

    #[test]
    fn cost_basis_serializes_lowercase() {
        assert_eq!(serde_json::to_value(CostBasis::Fallback).unwrap(), json!("fallback"));
    }
}
