//! Domain modules of the profit and activity pipeline.
//!
//! - [`coercion`]: numeric coercion of loosely formatted report values
//! - [`fields`]: schema-agnostic resolution of logical fields inside report rows
//! - [`catalog`]: product catalog snapshot and its lookup keys
//! - [`profit`]: catalog reconciliation, margins, price gaps and portfolio KPIs
//! - [`competitor`]: competitor price map and spreadsheet import
//! - [`estimator`]: LLM-backed competitor price estimation with a deterministic fallback
//! - [`activity`]: day-bucketed inventory and sales activity

pub mod activity;
pub mod catalog;
pub mod coercion;
pub mod competitor;
pub mod estimator;
pub mod fields;
pub mod profit;
