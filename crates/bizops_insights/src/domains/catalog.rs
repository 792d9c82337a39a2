//! Product catalog snapshot.
//!
//! Entries are indexed under `id:<id>`, `sku:<lowercased sku>` and
//! `name:<lowercased name>`; the last entry written under a key wins.

use std::collections::HashMap;

use bizops_client::ProductItem;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: i64,
    pub sku: Option<String>,
    pub name: String,
    pub standard_cost: Option<f64>,
    pub list_price: Option<f64>,
}

impl CatalogEntry {
    /// Key used to decide whether a catalog product already showed up in sales:
    /// `sku:` when the entry has a SKU, `name:` otherwise.
    pub fn dedup_key(&self) -> String {
        dedup_key(self.sku.as_deref(), &self.name)
    }
}

impl From<ProductItem> for CatalogEntry {
    fn from(item: ProductItem) -> Self {
        Self {
            id: item.id,
            sku: item.sku.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            name: item.name.map(|s| s.trim().to_string()).unwrap_or_default(),
            standard_cost: item.std_cost.filter(|c| c.is_finite()),
            list_price: item.list_price.filter(|p| p.is_finite()),
        }
    }
}

pub fn id_key(id: i64) -> String {
    format!("id:{id}")
}

pub fn sku_key(sku: &str) -> String {
    format!("sku:{}", sku.trim().to_lowercase())
}

pub fn name_key(name: &str) -> String {
    format!("name:{}", name.trim().to_lowercase())
}

pub fn dedup_key(sku: Option<&str>, name: &str) -> String {
    match sku.map(str::trim).filter(|s| !s.is_empty()) {
        Some(sku) => sku_key(sku),
        None => name_key(name),
    }
}

/// Immutable catalog snapshot, rebuilt on every load.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        let mut index = HashMap::with_capacity(entries.len() * 3);
        for (pos, entry) in entries.iter().enumerate() {
            index.insert(id_key(entry.id), pos);
            if let Some(sku) = entry.sku.as_deref().filter(|s| !s.trim().is_empty()) {
                index.insert(sku_key(sku), pos);
            }
            if !entry.name.trim().is_empty() {
                index.insert(name_key(&entry.name), pos);
            }
        }
        Self { entries, index }
    }

    pub fn from_products(items: Vec<ProductItem>) -> Self {
        Self::new(items.into_iter().map(CatalogEntry::from).collect())
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn by_id(&self, id: i64) -> Option<&CatalogEntry> {
        self.position(&id_key(id)).map(|i| &self.entries[i])
    }

    pub fn by_sku(&self, sku: &str) -> Option<&CatalogEntry> {
        self.position(&sku_key(sku)).map(|i| &self.entries[i])
    }

    pub fn by_name(&self, name: &str) -> Option<&CatalogEntry> {
        self.position(&name_key(name)).map(|i| &self.entries[i])
    }

    /// Look up by id, then SKU, then name; returns the entry's position too.
    pub fn lookup(
        &self,
        id: Option<i64>,
        sku: Option<&str>,
        name: Option<&str>,
    ) -> Option<(usize, &CatalogEntry)> {
        let id_hit = id.and_then(|id| self.position(&id_key(id)));
        let sku_hit = || {
            sku.filter(|s| !s.trim().is_empty())
                .and_then(|s| self.position(&sku_key(s)))
        };
        let name_hit = || {
            name.filter(|s| !s.trim().is_empty())
                .and_then(|s| self.position(&name_key(s)))
        };
        id_hit
            .or_else(sku_hit)
            .or_else(name_hit)
            .map(|i| (i, &self.entries[i]))
    }
}
