use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const VALID_CATEGORIES: [&str; 4] = ["Electronics", "Clothing", "Books", "Food"];
pub const OTHER_CATEGORY: &str = "Other";
pub const UNKNOWN: &str = "Unknown";
pub const INVALID_EMAIL: &str = "invalid@example.com";

pub const DEFAULT_DESCRIPTION: &str = "No description available";
pub const DEFAULT_RATING: f64 = 0.0;
pub const DEFAULT_AVAILABILITY: &str = "Unknown";

/// Date substituted for unparsable transaction dates under `DatePolicy::Sentinel`.
pub fn sentinel_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default()
}

// --- Raw source rows (CSV) ---
//
// Every cell is kept as text; blank cells deserialize to `None`.

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawProduct {
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub category: Option<String>,
    pub price: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawCustomer {
    pub customer_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawSale {
    pub transaction_id: Option<String>,
    pub product_id: Option<String>,
    pub customer_id: Option<String>,
    pub quantity: Option<String>,
    pub transaction_date: Option<String>,
}

// --- Dimension records ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub product_id: i64,
    pub product_name: String,
    pub category: String,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichedProduct {
    pub product_id: i64,
    pub product_name: String,
    pub category: String,
    pub price: f64,
    pub description: String,
    pub rating: f64,
    pub availability_status: String,
}

impl EnrichedProduct {
    pub fn with_defaults(product: Product) -> Self {
        Self {
            product_id: product.product_id,
            product_name: product.product_name,
            category: product.category,
            price: product.price,
            description: DEFAULT_DESCRIPTION.to_string(),
            rating: DEFAULT_RATING,
            availability_status: DEFAULT_AVAILABILITY.to_string(),
        }
    }

    pub fn with_metadata(product: Product, metadata: &MetadataRecord) -> Self {
        Self {
            description: metadata.description.clone(),
            rating: metadata.rating,
            availability_status: metadata.availability_status.clone(),
            ..Self::with_defaults(product)
        }
    }
}

/// Row of `products_transformed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductProfile {
    pub product_id: i64,
    pub product_name: String,
    pub category: String,
    pub price: f64,
    pub description: String,
    pub rating: f64,
    pub availability_status: String,
    pub popularity_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub customer_id: i64,
    pub name: String,
    pub email: String,
    pub country: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BuyerCategory {
    #[serde(rename = "Frequent Buyer")]
    Frequent,
    #[serde(rename = "Occasional Buyer")]
    Occasional,
    #[serde(rename = "Rare Buyer")]
    Rare,
}

impl BuyerCategory {
    pub fn from_transaction_count(count: usize) -> Self {
        match count {
            n if n > 10 => BuyerCategory::Frequent,
            5..=10 => BuyerCategory::Occasional,
            _ => BuyerCategory::Rare,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuyerCategory::Frequent => "Frequent Buyer",
            BuyerCategory::Occasional => "Occasional Buyer",
            BuyerCategory::Rare => "Rare Buyer",
        }
    }
}

impl fmt::Display for BuyerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row of `customers_transformed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerProfile {
    pub customer_id: i64,
    pub name: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: String,
    pub country: String,
    pub buyer_category: BuyerCategory,
}

// --- Fact records ---

/// A sale after type parsing, before validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleCandidate {
    pub transaction_id: i64,
    pub product_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub quantity: i64,
    pub transaction_date: Option<NaiveDate>,
    /// Set when `transaction_date` is the substituted sentinel, not a parsed date.
    #[serde(default)]
    pub date_repaired: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidatedSale {
    pub transaction_id: i64,
    pub product_id: i64,
    pub customer_id: i64,
    pub quantity: i64,
    pub transaction_date: NaiveDate,
    pub price: f64,
    pub revenue: f64,
    #[serde(default)]
    pub date_repaired: bool,
}

/// Row of the append-only `sales` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleRecord {
    pub transaction_id: i64,
    pub product_id: i64,
    pub customer_id: i64,
    pub quantity: i64,
    pub transaction_date: NaiveDate,
}

impl From<&ValidatedSale> for SaleRecord {
    fn from(sale: &ValidatedSale) -> Self {
        Self {
            transaction_id: sale.transaction_id,
            product_id: sale.product_id,
            customer_id: sale.customer_id,
            quantity: sale.quantity,
            transaction_date: sale.transaction_date,
        }
    }
}

impl From<SaleRecord> for SaleCandidate {
    fn from(record: SaleRecord) -> Self {
        Self {
            transaction_id: record.transaction_id,
            product_id: Some(record.product_id),
            customer_id: Some(record.customer_id),
            quantity: record.quantity,
            transaction_date: Some(record.transaction_date),
            date_repaired: false,
        }
    }
}

/// Row of `sales_transformed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleFact {
    pub transaction_id: i64,
    pub product_id: i64,
    pub customer_id: Option<i64>,
    pub quantity: i64,
    pub transaction_date: NaiveDate,
    pub price: f64,
    pub total_sales_value: f64,
    pub purchase_month: String,
}

// --- External metadata ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetadataRecord {
    pub id: String,
    pub product_id_api: String,
    pub description: String,
    pub rating: f64,
    pub availability_status: String,
}

// --- Catalog (SQLite) models ---

#[derive(Debug, Clone, Serialize)]
pub struct EtlStateEntry {
    pub table_name: String,
    pub time_processed: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Success,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Success => "SUCCESS",
            RunStatus::Partial => "PARTIAL",
            RunStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug)]
pub struct PipelineRun {
    pub run_id: String,
    pub started_at: i64, // Unix timestamp
    pub finished_at: Option<i64>,
    pub status: String,
    pub details: Option<String>, // JSON string
}
