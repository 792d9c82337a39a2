//! Day-bucketed inventory and sales activity.
//!
//! Three report tables (inventory movements, sales summary, sales detail) are
//! merged by ISO date. Buckets are rebuilt from scratch on every call.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use bizops_client::ReportTable;
use bizops_client::utils::normalize_report_date;
use serde::Serialize;
use serde_json::Value;

use super::fields::{Field, RowShape, rows_of};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayBucket {
    pub date: String,
    pub in_count: u64,
    pub in_qty: f64,
    pub out_count: u64,
    pub out_qty: f64,
    pub sales_count: u64,
    pub sales_total: f64,
    pub sales_details: Vec<SaleDetail>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleDetail {
    pub invoice: String,
    pub customer: Option<String>,
    pub total: f64,
    pub items: Vec<SaleItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SaleItem {
    pub name: String,
    pub qty: f64,
}

/// `YYYY-MM-DD` of a date, RFC 3339 or naive datetime cell.
pub fn normalize_day(value: &Value) -> Option<String> {
    value.as_str().and_then(normalize_report_date)
}

fn day_of(row: &RowShape<'_>) -> Option<String> {
    row.resolve(Field::Date).and_then(normalize_day)
}

/// Event count of an aggregated row; a row without a count is one event.
fn count_of(row: &RowShape<'_>) -> u64 {
    row.number_opt(Field::Count)
        .map(|c| c.max(0.0).round() as u64)
        .unwrap_or(1)
}

fn is_outbound(movement_type: Option<&str>) -> bool {
    movement_type.is_some_and(|t| t.trim().eq_ignore_ascii_case("out"))
}

fn bucket_for(buckets: &mut BTreeMap<String, DayBucket>, date: String) -> &mut DayBucket {
    buckets.entry(date.clone()).or_insert_with(|| DayBucket {
        date,
        ..DayBucket::default()
    })
}

#[derive(Default)]
struct DetailAcc {
    customer: Option<String>,
    total: f64,
    items: Vec<SaleItem>,
}

pub fn build_day_buckets(
    inventory: &ReportTable,
    sales: &ReportTable,
    detail: &ReportTable,
) -> Vec<DayBucket> {
    let mut buckets: BTreeMap<String, DayBucket> = BTreeMap::new();
    let mut details: BTreeMap<String, HashMap<String, DetailAcc>> = BTreeMap::new();
    let mut dropped = 0usize;

    for row in rows_of(inventory) {
        let Some(date) = day_of(&row) else {
            dropped += 1;
            continue;
        };
        let qty = row.number(Field::Qty);
        let count = count_of(&row);
        let b = bucket_for(&mut buckets, date);
        if is_outbound(row.text(Field::MovementType).as_deref()) {
            b.out_count += count;
            b.out_qty += qty;
        } else {
            b.in_count += count;
            b.in_qty += qty;
        }
    }

    for row in rows_of(sales) {
        let Some(date) = day_of(&row) else {
            dropped += 1;
            continue;
        };
        let total = row.number(Field::Total);
        let count = count_of(&row);
        let b = bucket_for(&mut buckets, date);
        b.sales_count += count;
        b.sales_total += total;
    }

    for row in rows_of(detail) {
        let (Some(date), Some(invoice)) = (day_of(&row), row.text(Field::Invoice)) else {
            dropped += 1;
            continue;
        };
        bucket_for(&mut buckets, date.clone());
        let acc = details.entry(date).or_default().entry(invoice).or_default();
        if acc.customer.is_none() {
            acc.customer = row.text(Field::Customer);
        }
        acc.total += row.number(Field::Total);
        if let Some(name) = row.text(Field::Name) {
            let qty = row.number(Field::Qty);
            match acc.items.iter_mut().find(|i| i.name == name) {
                Some(item) => item.qty += qty,
                None => acc.items.push(SaleItem { name, qty }),
            }
        }
    }

    for (date, invoices) in details {
        let Some(b) = buckets.get_mut(&date) else {
            continue;
        };
        let mut list: Vec<SaleDetail> = invoices
            .into_iter()
            .map(|(invoice, acc)| {
                let mut items = acc.items;
                items.sort_by(|a, b| b.qty.partial_cmp(&a.qty).unwrap_or(Ordering::Equal));
                SaleDetail {
                    invoice,
                    customer: acc.customer,
                    total: acc.total,
                    items,
                }
            })
            .collect();
        list.sort_by(|a, b| {
            b.total
                .partial_cmp(&a.total)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.invoice.cmp(&b.invoice))
        });
        b.sales_details = list;
    }

    if dropped > 0 {
        tracing::debug!(dropped, "activity rows without date or invoice dropped");
    }

    buckets.into_values().rev().collect()
}
