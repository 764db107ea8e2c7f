//! Incremental, validating ETL for a small sales domain.
//!
//! `flowstore` reads three CSV extracts (products, customers, sales), enriches
//! products with metadata from an external [`fetch::MetadataSource`], and loads
//! everything into a SQLite sink:
//! - Dimension tables (`products`, `customers`) are fully replaced every run.
//! - The `sales` fact table is append-only and gated by a date watermark, so
//!   re-running on unchanged input never duplicates facts.
//! - Derived `*_transformed` tables and their CSV snapshots are rebuilt from
//!   the persisted sales history.
//!
//! Each load is recorded in `etl_state` and each run in `pipeline_runs`.

pub mod artifacts;
pub mod catalog;
pub mod config;
pub mod enrich;
pub mod errors;
pub mod extract;
pub mod fetch;
pub mod load;
pub mod models;
pub mod pipeline;
pub mod transform;
pub mod validate;
pub mod watermark;

pub use pipeline::{Pipeline, RunReport, StepOutcome};
