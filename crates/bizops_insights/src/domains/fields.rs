//! Schema-agnostic field resolution for report rows.
//!
//! The reporting endpoint answers with positional rows (parallel to a
//! `columns` list) or with keyed objects, and column names may be snake_case
//! (`sum_qty`, `product.id`) or camelCase (`sumQty`, `productId`). A logical
//! [`Field`] is located through ranked alias tables kept in [`aliases`]: the
//! first alias that matches wins, so specific aggregates are listed before
//! generic catch-alls.

use std::collections::HashMap;
use std::sync::LazyLock;

use bizops_client::ReportTable;
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use super::coercion::{to_num, to_num_opt};

/// Logical fields the pipeline knows how to locate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    ProductId,
    Sku,
    Name,
    Qty,
    Total,
    Date,
    MovementType,
    Count,
    Invoice,
    Customer,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::ProductId,
        Field::Sku,
        Field::Name,
        Field::Qty,
        Field::Total,
        Field::Date,
        Field::MovementType,
        Field::Count,
        Field::Invoice,
        Field::Customer,
    ];
}

/// Ranked alias patterns (case-insensitive).
///
/// `*_COLUMNS` are matched against the `columns` list of positional rows and
/// may end in a loose catch-all; `*_KEYS` are anchored and matched against
/// object keys. Order is precedence.
pub mod aliases {
    pub const PRODUCT_ID_COLUMNS: &[&str] = &[
        r"^product[._]?id$",
        r"^id[._]?product$",
        r"product[._]?id",
        r"^id$",
    ];
    pub const PRODUCT_ID_KEYS: &[&str] = &[r"^product[._]?id$", r"^id[._]?product$", r"^id$"];

    pub const SKU_COLUMNS: &[&str] = &[
        r"^product[._]?sku$",
        r"product[._]?sku",
        r"^sku$",
        r"^(code|codigo)$",
        r"sku",
    ];
    pub const SKU_KEYS: &[&str] = &[r"^product[._]?sku$", r"^sku$", r"^(code|codigo)$"];

    pub const NAME_COLUMNS: &[&str] = &[
        r"^product[._]?name$",
        r"product[._]?name",
        r"^name$",
        r"^(nombre|producto|descripcion|description)$",
    ];
    pub const NAME_KEYS: &[&str] = &[
        r"^product[._]?name$",
        r"^name$",
        r"^(nombre|producto|descripcion|description)$",
    ];

    pub const QTY_COLUMNS: &[&str] = &[
        r"sum[._]?qty",
        r"sum[._]?quantity",
        r"units[._]?sold",
        r"^qty$",
        r"^quantity$",
        r"^cantidad$",
        r"qty",
        r"quantity",
    ];
    pub const QTY_KEYS: &[&str] = &[
        r"^sum[._]?qty$",
        r"^sum[._]?quantity$",
        r"^units[._]?sold$",
        r"^qty$",
        r"^quantity$",
        r"^cantidad$",
    ];

    pub const TOTAL_COLUMNS: &[&str] = &[
        r"sum[._]?total",
        r"sum[._]?amount",
        r"^total$",
        r"^amount$",
        r"^revenue$",
        r"^sales$",
        r"^subtotal$",
        r"^gross$",
        r"total",
        r"amount",
    ];
    pub const TOTAL_KEYS: &[&str] = &[
        r"^sum[._]?total$",
        r"^sum[._]?amount$",
        r"^total$",
        r"^amount$",
        r"^revenue$",
        r"^sales$",
        r"^subtotal$",
        r"^gross$",
    ];

    pub const DATE_COLUMNS: &[&str] = &[
        r"^day$",
        r"^date$",
        r"^(fecha|dia)$",
        r"^created[._]?at$",
        r"date",
        r"day",
    ];
    pub const DATE_KEYS: &[&str] = &[r"^day$", r"^date$", r"^(fecha|dia)$", r"^created[._]?at$"];

    pub const MOVEMENT_TYPE_COLUMNS: &[&str] = &[
        r"^(movement|move)[._]?type$",
        r"^type$",
        r"^(tipo|kind|direction)$",
        r"type",
    ];
    pub const MOVEMENT_TYPE_KEYS: &[&str] = &[
        r"^(movement|move)[._]?type$",
        r"^type$",
        r"^(tipo|kind|direction)$",
    ];

    pub const COUNT_COLUMNS: &[&str] = &[
        r"^count$",
        r"^(cnt|num|n)$",
        r"^(movements|invoices|sales)[._]?count$",
        r"count",
    ];
    pub const COUNT_KEYS: &[&str] = &[
        r"^count$",
        r"^(cnt|num|n)$",
        r"^(movements|invoices|sales)[._]?count$",
    ];

    pub const INVOICE_COLUMNS: &[&str] = &[
        r"^invoice([._]?(id|no|number))?$",
        r"^(sale|order)[._]?(id|no|number)$",
        r"^(factura|folio)$",
        r"invoice",
    ];
    pub const INVOICE_KEYS: &[&str] = &[
        r"^invoice([._]?(id|no|number))?$",
        r"^(sale|order)[._]?(id|no|number)$",
        r"^(factura|folio)$",
    ];

    pub const CUSTOMER_COLUMNS: &[&str] = &[
        r"^customer[._]?name$",
        r"^customer$",
        r"^(client|cliente)([._]?(name|nombre))?$",
        r"customer",
    ];
    pub const CUSTOMER_KEYS: &[&str] = &[
        r"^customer[._]?name$",
        r"^customer$",
        r"^(client|cliente)([._]?(name|nombre))?$",
    ];
}

fn patterns_for(field: Field) -> (&'static [&'static str], &'static [&'static str]) {
    use aliases::*;
    match field {
        Field::ProductId => (PRODUCT_ID_COLUMNS, PRODUCT_ID_KEYS),
        Field::Sku => (SKU_COLUMNS, SKU_KEYS),
        Field::Name => (NAME_COLUMNS, NAME_KEYS),
        Field::Qty => (QTY_COLUMNS, QTY_KEYS),
        Field::Total => (TOTAL_COLUMNS, TOTAL_KEYS),
        Field::Date => (DATE_COLUMNS, DATE_KEYS),
        Field::MovementType => (MOVEMENT_TYPE_COLUMNS, MOVEMENT_TYPE_KEYS),
        Field::Count => (COUNT_COLUMNS, COUNT_KEYS),
        Field::Invoice => (INVOICE_COLUMNS, INVOICE_KEYS),
        Field::Customer => (CUSTOMER_COLUMNS, CUSTOMER_KEYS),
    }
}

struct CompiledAliases {
    columns: Vec<Regex>,
    keys: Vec<Regex>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .expect("alias patterns are static and valid")
        })
        .collect()
}

static COMPILED: LazyLock<HashMap<Field, CompiledAliases>> = LazyLock::new(|| {
    Field::ALL
        .iter()
        .map(|&field| {
            let (columns, keys) = patterns_for(field);
            (
                field,
                CompiledAliases {
                    columns: compile(columns),
                    keys: compile(keys),
                },
            )
        })
        .collect()
});

fn compiled(field: Field) -> &'static CompiledAliases {
    &COMPILED[&field]
}

/// Index of the column holding `field`, trying aliases in rank order.
pub fn column_index(columns: &[String], field: Field) -> Option<usize> {
    compiled(field)
        .columns
        .iter()
        .find_map(|re| columns.iter().position(|c| re.is_match(c.trim())))
}

/// A report row viewed through its shape.
#[derive(Clone, Copy, Debug)]
pub enum RowShape<'a> {
    Positional {
        columns: &'a [String],
        values: &'a [Value],
    },
    Keyed(&'a Map<String, Value>),
}

impl<'a> RowShape<'a> {
    /// Classify a raw row; scalars are not rows.
    pub fn of(columns: &'a [String], row: &'a Value) -> Option<Self> {
        match row {
            Value::Array(values) => Some(RowShape::Positional { columns, values }),
            Value::Object(map) => Some(RowShape::Keyed(map)),
            _ => None,
        }
    }

    /// Raw value of `field`, or `None` when it cannot be located.
    ///
    /// Keyed rows are searched on the row itself, then on a nested `product`
    /// object, then on a nested `metrics` object; the first non-null hit wins.
    pub fn resolve(&self, field: Field) -> Option<&'a Value> {
        match *self {
            RowShape::Positional { columns, values } => {
                column_index(columns, field).and_then(|i| values.get(i))
            }
            RowShape::Keyed(map) => {
                let keys = &compiled(field).keys;
                find_key(map, keys)
                    .or_else(|| nested(map, "product").and_then(|m| find_key(m, keys)))
                    .or_else(|| nested(map, "metrics").and_then(|m| find_key(m, keys)))
            }
        }
    }

    pub fn number(&self, field: Field) -> f64 {
        self.resolve(field).map(to_num).unwrap_or(0.0)
    }

    pub fn number_opt(&self, field: Field) -> Option<f64> {
        self.resolve(field).and_then(to_num_opt)
    }

    /// Trimmed, non-empty text of `field`; numbers are stringified.
    pub fn text(&self, field: Field) -> Option<String> {
        match self.resolve(field)? {
            Value::String(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

fn nested<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    map.get(key).and_then(Value::as_object)
}

fn find_key<'a>(map: &'a Map<String, Value>, keys: &[Regex]) -> Option<&'a Value> {
    keys.iter().find_map(|re| {
        map.iter()
            .find(|(k, v)| !v.is_null() && re.is_match(k))
            .map(|(_, v)| v)
    })
}

/// Iterate the rows of a table that have a usable shape.
pub fn rows_of(table: &ReportTable) -> impl Iterator<Item = RowShape<'_>> {
    table
        .rows
        .iter()
        .filter_map(|row| RowShape::of(&table.columns, row))
}
