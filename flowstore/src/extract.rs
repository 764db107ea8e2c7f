//! Reading source CSV files into typed rows.
//!
//! Cells are read as text and parsed here, so a garbage value in one row
//! never prevents the rest of the file from loading.

use crate::config::DatePolicy;
use crate::errors::{Result, StorageError};
use crate::models::{sentinel_date, RawCustomer, RawProduct, RawSale, SaleCandidate};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Reads every row of a headered CSV file. Rows that cannot be decoded at all
/// are skipped with a warning.
pub fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|err| StorageError::Extraction {
            source_name: path.display().to_string(),
            reason: err.to_string(),
        })?;

    let mut rows = Vec::new();
    for (idx, record) in reader.deserialize::<T>().enumerate() {
        match record {
            Ok(row) => rows.push(row),
            Err(err) => log::warn!(
                "Skipping undecodable row {} in {}: {}",
                idx + 1,
                path.display(),
                err
            ),
        }
    }
    log::info!("Extracted {} rows from {}.", rows.len(), path.display());
    Ok(rows)
}

pub fn read_products(path: &Path) -> Result<Vec<RawProduct>> {
    read_csv(path)
}

pub fn read_customers(path: &Path) -> Result<Vec<RawCustomer>> {
    read_csv(path)
}

pub fn read_sales(path: &Path) -> Result<Vec<RawSale>> {
    read_csv(path)
}

/// Parses an integer key. Accepts float renderings of whole numbers (`"12.0"`),
/// which dataframe writers emit for integer columns containing blanks.
pub fn parse_key(value: Option<&str>) -> Option<i64> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(key) = value.parse::<i64>() {
        return Some(key);
    }
    match value.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(&f) => {
            Some(f as i64)
        }
        _ => None,
    }
}

/// Parses a strict `YYYY-MM-DD` date; anything else is `None`.
pub fn parse_date(value: Option<&str>) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value?.trim(), DATE_FORMAT).ok()
}

/// Unparsable quantities become 0 so the validator's quantity repair applies.
pub fn parse_quantity(value: Option<&str>) -> i64 {
    parse_key(value).unwrap_or(0)
}

/// Types a raw sale. Returns `None` only when the row has no usable
/// `transaction_id`, since such a row can never be identified in the sink.
pub fn parse_sale(raw: &RawSale, policy: DatePolicy) -> Option<SaleCandidate> {
    let transaction_id = parse_key(raw.transaction_id.as_deref())?;
    let (transaction_date, date_repaired) =
        match (parse_date(raw.transaction_date.as_deref()), policy) {
            (Some(date), _) => (Some(date), false),
            (None, DatePolicy::Drop) => (None, false),
            (None, DatePolicy::Sentinel) => (Some(sentinel_date()), true),
        };
    Some(SaleCandidate {
        transaction_id,
        product_id: parse_key(raw.product_id.as_deref()),
        customer_id: parse_key(raw.customer_id.as_deref()),
        quantity: parse_quantity(raw.quantity.as_deref()),
        transaction_date,
        date_repaired,
    })
}

/// Sale candidates for one incremental run.
#[derive(Debug, Default)]
pub struct SaleExtract {
    pub candidates: Vec<SaleCandidate>,
    pub unidentifiable: usize,
    pub already_processed: usize,
    pub unparsed_dates: usize,
}

/// Keeps the sales newer than `watermark`.
///
/// Rows whose date could not be parsed bypass the watermark: under
/// `DatePolicy::Drop` the validator counts and drops them, under
/// `DatePolicy::Sentinel` they are loaded with the sentinel date.
pub fn filter_new_sales(
    raw: &[RawSale],
    watermark: Option<NaiveDate>,
    policy: DatePolicy,
) -> SaleExtract {
    let mut extract = SaleExtract::default();
    for row in raw {
        let Some(candidate) = parse_sale(row, policy) else {
            extract.unidentifiable += 1;
            continue;
        };
        if candidate.date_repaired {
            extract.unparsed_dates += 1;
            extract.candidates.push(candidate);
            continue;
        }
        match (candidate.transaction_date, watermark) {
            (None, _) => {
                extract.unparsed_dates += 1;
                extract.candidates.push(candidate);
            }
            (Some(date), Some(mark)) if date <= mark => extract.already_processed += 1,
            _ => extract.candidates.push(candidate),
        }
    }

    if extract.unidentifiable > 0 {
        log::warn!(
            "Ignored {} sales without a usable transaction_id.",
            extract.unidentifiable
        );
    }
    log::info!(
        "Watermark {:?}: {} new sale candidates, {} already processed, {} with unparsable dates.",
        watermark,
        extract.candidates.len(),
        extract.already_processed,
        extract.unparsed_dates
    );
    extract
}

/// Reads the sales file and applies the watermark filter in one step. The
/// watermark is a required argument so no code path can bypass it.
pub fn extract_sales(
    path: &Path,
    watermark: Option<NaiveDate>,
    policy: DatePolicy,
) -> Result<SaleExtract> {
    let raw = read_sales(path)?;
    Ok(filter_new_sales(&raw, watermark, policy))
}
