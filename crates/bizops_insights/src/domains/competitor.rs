//! Competitor price map and spreadsheet import.
//!
//! Prices are keyed `sku:<lowercased sku>` or `name:<lowercased name>`. The map
//! is session scoped: imports and estimations build a fresh map which is then
//! merged by overwrite, the last writer for a key winning.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Reader, Xlsx};
use serde::Serialize;
use serde_json::Value;

use super::catalog::{name_key, sku_key};
use super::coercion::to_num;
use crate::error::{InsightsError, InsightsResult};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CompetitorPriceMap {
    prices: HashMap<String, f64>,
}

impl CompetitorPriceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert under an already-built `sku:`/`name:` key.
    pub fn insert(&mut self, key: impl Into<String>, price: f64) {
        self.prices.insert(key.into(), price);
    }

    pub fn insert_sku(&mut self, sku: &str, price: f64) {
        self.insert(sku_key(sku), price);
    }

    pub fn insert_name(&mut self, name: &str, price: f64) {
        self.insert(name_key(name), price);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.prices.get(key).copied()
    }

    /// Resolve a product's competitor price by SKU key, then by name key.
    pub fn lookup(&self, sku: Option<&str>, name: Option<&str>) -> Option<f64> {
        let by_sku = sku
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| self.get(&sku_key(s)));
        by_sku.or_else(|| {
            name.filter(|n| !n.trim().is_empty())
                .and_then(|n| self.get(&name_key(n)))
        })
    }

    /// Overwrite-merge `other` into `self`; returns how many keys were written.
    pub fn merge(&mut self, other: CompetitorPriceMap) -> usize {
        let written = other.prices.len();
        self.prices.extend(other.prices);
        written
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.prices.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Header spellings accepted by the import, compared after [`normalize_header`].
pub mod headers {
    pub const SKU: &[&str] = &["sku", "code", "codigo", "ref", "reference", "barcode"];
    pub const NAME: &[&str] = &[
        "name",
        "nombre",
        "product",
        "producto",
        "product_name",
        "description",
        "descripcion",
    ];
    pub const PRICE: &[&str] = &[
        "price",
        "precio",
        "competitor_price",
        "competitorprice",
        "precio_competencia",
        "pvp",
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportFormat {
    Csv,
    Xlsx,
}

impl ImportFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "txt" => Some(ImportFormat::Csv),
            "xlsx" | "xlsm" => Some(ImportFormat::Xlsx),
            _ => None,
        }
    }

    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let ct = content_type.to_ascii_lowercase();
        if ct.contains("spreadsheetml") || ct.contains("excel") {
            Some(ImportFormat::Xlsx)
        } else if ct.contains("csv") || ct.starts_with("text/plain") {
            Some(ImportFormat::Csv)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

/// One sheet row keyed by normalized header.
type Record = HashMap<String, Value>;

pub fn normalize_header(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Import competitor prices from CSV or XLSX bytes.
pub fn import_prices(
    bytes: &[u8],
    format: ImportFormat,
) -> InsightsResult<(CompetitorPriceMap, ImportSummary)> {
    let records = match format {
        ImportFormat::Csv => read_csv_records(bytes)?,
        ImportFormat::Xlsx => read_xlsx_records(bytes)?,
    };
    let (map, summary) = prices_from_records(&records);
    tracing::info!(
        imported = summary.imported,
        skipped = summary.skipped,
        "competitor prices imported"
    );
    Ok((map, summary))
}

pub fn import_prices_file(path: &Path) -> InsightsResult<(CompetitorPriceMap, ImportSummary)> {
    let format = ImportFormat::from_path(path).ok_or_else(|| {
        InsightsError::Import(format!("unsupported file type: {}", path.display()))
    })?;
    let bytes = std::fs::read(path)?;
    import_prices(&bytes, format)
}

fn read_csv_records(bytes: &[u8]) -> InsightsResult<Vec<Record>> {
    let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    let delimiter = if first_line.contains(&b';') && !first_line.contains(&b',') {
        b';'
    } else {
        b','
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let header: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();
    let mut records = Vec::new();
    for result in reader.records() {
        let row = result?;
        let record = header
            .iter()
            .zip(row.iter())
            .map(|(h, cell)| (h.clone(), Value::String(cell.to_string())))
            .collect();
        records.push(record);
    }
    Ok(records)
}

fn read_xlsx_records(bytes: &[u8]) -> InsightsResult<Vec<Record>> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec()))?;
    let first_sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| InsightsError::Import("workbook contains no sheets".into()))?;
    let range = workbook.worksheet_range(&first_sheet)?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Vec::new());
    };
    let header: Vec<String> = header_row
        .iter()
        .map(|cell| normalize_header(&cell.to_string()))
        .collect();

    Ok(rows
        .map(|row| {
            header
                .iter()
                .zip(row.iter())
                .map(|(h, cell)| (h.clone(), cell_value(cell)))
                .collect()
        })
        .collect())
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Data::Int(i) => Value::from(*i),
        Data::Bool(b) => Value::Bool(*b),
        Data::Error(_) => Value::Null,
        Data::DateTime(dt) => serde_json::Number::from_f64(dt.as_f64())
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Data::DateTimeIso(s) => Value::String(s.clone()),
        Data::DurationIso(s) => Value::String(s.clone()),
    }
}

fn first_of<'a>(record: &'a Record, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|n| record.get(*n).filter(|v| !v.is_null()))
}

fn text_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Build a price map from header-keyed records.
///
/// Prices are coerced like report values, so a blank or unreadable price
/// imports as `0`. Rows without a SKU or a name, or with a non-finite price,
/// are skipped.
fn prices_from_records(records: &[Record]) -> (CompetitorPriceMap, ImportSummary) {
    let mut map = CompetitorPriceMap::new();
    let mut summary = ImportSummary::default();

    for record in records {
        let sku = text_of(first_of(record, headers::SKU));
        let name = text_of(first_of(record, headers::NAME));
        let price = Some(first_of(record, headers::PRICE).map(to_num).unwrap_or(0.0))
            .filter(|p| p.is_finite());

        match (price, sku.as_deref(), name.as_deref()) {
            (Some(price), sku, name) if sku.is_some() || name.is_some() => {
                if let Some(sku) = sku {
                    map.insert_sku(sku, price);
                }
                if let Some(name) = name {
                    map.insert_name(name, price);
                }
                summary.imported += 1;
            }
            _ => summary.skipped += 1,
        }
    }

    (map, summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_import_reads_aliased_headers_and_coerces_prices() {
        let csv = "Codigo,Nombre,Precio\nA-1,Apple,\"1.234,50\"\n,Banana,3.10\nC-3,Cherry,n/a\n,,9\n";
        let (map, summary) = import_prices(csv.as_bytes(), ImportFormat::Csv).unwrap();
        assert_eq!(summary, ImportSummary { imported: 3, skipped: 1 });
        assert_eq!(map.get("sku:a-1"), Some(1234.5));
        assert_eq!(map.get("name:apple"), Some(1234.5));
        assert_eq!(map.lookup(None, Some("BANANA")), Some(3.1));
        assert_eq!(map.lookup(Some("c-3"), Some("Cherry")), Some(0.0));
    }

    #[test]
    fn csv_import_detects_semicolons() {
        let csv = "sku;competitor price\nX9;12,75\n";
        let (map, summary) = import_prices(csv.as_bytes(), ImportFormat::Csv).unwrap();
        assert_eq!(summary.imported, 1);
        assert_eq!(map.get("sku:x9"), Some(12.75));
    }

    #[test]
    fn zero_and_blank_prices_import_as_zero() {
        let csv = "sku,price
Z,0
B,
";
        let (map, summary) = import_prices(csv.as_bytes(), ImportFormat::Csv).unwrap();
        assert_eq!(summary, ImportSummary { imported: 2, skipped: 0 });
        assert_eq!(map.get("sku:z"), Some(0.0));
        assert_eq!(map.get("sku:b"), Some(0.0));
    }

    #[test]
    fn own_cost_column_is_not_a_competitor_price() {
        let csv = "sku,cost
A,12
";
        let (map, summary) = import_prices(csv.as_bytes(), ImportFormat::Csv).unwrap();
        assert_eq!(summary.imported, 1);
        assert_eq!(map.get("sku:a"), Some(0.0));
    }

    #[test]
    fn lookup_prefers_sku_over_name() {
        let mut map = CompetitorPriceMap::new();
        map.insert_name("Apple", 4.0);
        map.insert_sku("A", 5.0);
        assert_eq!(map.lookup(Some("a"), Some("apple")), Some(5.0));
        assert_eq!(map.lookup(Some("zz"), Some("apple")), Some(4.0));
    }

    #[test]
    fn merge_overwrites_existing_keys() {
        let mut base = CompetitorPriceMap::new();
        base.insert_sku("A", 1.0);
        base.insert_sku("B", 2.0);
        let mut incoming = CompetitorPriceMap::new();
        incoming.insert_sku("A", 9.0);
        assert_eq!(base.merge(incoming), 1);
        assert_eq!(base.get("sku:a"), Some(9.0));
        assert_eq!(base.get("sku:b"), Some(2.0));
    }

    #[test]
    fn format_detection() {
        assert_eq!(
            ImportFormat::from_path(Path::new("prices.XLSX")),
            Some(ImportFormat::Xlsx)
        );
        assert_eq!(ImportFormat::from_path(Path::new("prices.pdf")), None);
        assert_eq!(
            ImportFormat::from_content_type("text/csv; charset=utf-8"),
            Some(ImportFormat::Csv)
        );
        assert_eq!(
            ImportFormat::from_content_type(
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            ),
            Some(ImportFormat::Xlsx)
        );
    }

    #[test]
    fn broken_xlsx_is_an_import_error() {
        let err = import_prices(b"definitely not a zip", ImportFormat::Xlsx).unwrap_err();
        assert!(matches!(err, InsightsError::Import(_)));
    }
}
