//! Cleaning and derived-field computation for every entity.
//!
//! All functions here are pure: they take typed batches and return new ones
//! together with a small report of what was repaired or dropped.

use crate::extract::parse_key;
use crate::models::{
    BuyerCategory, Customer, CustomerProfile, EnrichedProduct, Product, ProductProfile,
    RawCustomer, RawProduct, SaleCandidate, SaleFact, SaleRecord, INVALID_EMAIL, OTHER_CATEGORY,
    UNKNOWN, VALID_CATEGORIES,
};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

// --- products ---

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ProductCleanReport {
    pub unidentifiable: usize,
    pub duplicate_ids: usize,
    pub missing_names: usize,
    pub other_categories: usize,
    pub repaired_prices: usize,
}

/// Lower-cases then capitalizes; anything outside the valid set is "Other".
pub fn normalize_category(raw: Option<&str>) -> String {
    let raw = raw.map(str::trim).unwrap_or_default();
    let mut chars = raw.chars();
    let normalized: String = match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    };
    if VALID_CATEGORIES.contains(&normalized.as_str()) {
        normalized
    } else {
        OTHER_CATEGORY.to_string()
    }
}

/// Absolute value of a parsed price; 0 when the text is not a finite number.
pub fn coerce_price(raw: Option<&str>) -> f64 {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|price| price.is_finite())
        .map(f64::abs)
        .unwrap_or(0.0)
}

pub fn clean_products(raw: &[RawProduct]) -> (Vec<Product>, ProductCleanReport) {
    let mut report = ProductCleanReport::default();
    let mut seen = HashSet::new();
    let mut products = Vec::with_capacity(raw.len());

    for row in raw {
        let Some(product_id) = parse_key(row.product_id.as_deref()) else {
            report.unidentifiable += 1;
            continue;
        };
        if !seen.insert(product_id) {
            report.duplicate_ids += 1;
            continue;
        }

        let product_name = match row.product_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                report.missing_names += 1;
                UNKNOWN.to_string()
            }
        };

        let category = normalize_category(row.category.as_deref());
        if category == OTHER_CATEGORY {
            report.other_categories += 1;
        }

        let price = coerce_price(row.price.as_deref());
        let parsed = row
            .price
            .as_deref()
            .and_then(|value| value.trim().parse::<f64>().ok());
        if parsed != Some(price) {
            report.repaired_prices += 1;
        }

        products.push(Product {
            product_id,
            product_name,
            category,
            price,
        });
    }

    log::info!(
        "Cleaned {} products: filled {} missing names with '{}', mapped {} categories to '{}', repaired {} prices.",
        products.len(),
        report.missing_names,
        UNKNOWN,
        report.other_categories,
        OTHER_CATEGORY,
        report.repaired_prices
    );
    if report.unidentifiable + report.duplicate_ids > 0 {
        log::warn!(
            "Dropped {} products without a usable id and {} duplicate ids.",
            report.unidentifiable,
            report.duplicate_ids
        );
    }
    (products, report)
}

/// Attaches `popularity_score = 100 * sold(product) / max(sold)`.
///
/// Scores are 0 for products that never sold and for every product when
/// nothing sold at all.
pub fn score_popularity(products: Vec<EnrichedProduct>, sales: &[SaleRecord]) -> Vec<ProductProfile> {
    let mut sold: HashMap<i64, i64> = HashMap::new();
    for sale in sales {
        *sold.entry(sale.product_id).or_default() += sale.quantity;
    }
    let max_sold = sold.values().copied().max().unwrap_or(0);
    log::info!("Max sales quantity: {}", max_sold);
    if max_sold <= 0 {
        log::warn!("Max sales quantity is 0. Setting all popularity scores to 0.");
    }

    products
        .into_iter()
        .map(|product| {
            let popularity_score = match sold.get(&product.product_id) {
                Some(&qty) if max_sold > 0 && qty > 0 => 100.0 * qty as f64 / max_sold as f64,
                _ => 0.0,
            };
            ProductProfile {
                product_id: product.product_id,
                product_name: product.product_name,
                category: product.category,
                price: product.price,
                description: product.description,
                rating: product.rating,
                availability_status: product.availability_status,
                popularity_score,
            }
        })
        .collect()
}

// --- sales ---

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SaleTransformReport {
    pub input_rows: usize,
    pub unresolved_price: usize,
    pub undated: usize,
    pub output_rows: usize,
}

/// Joins sales to product prices and derives `total_sales_value` and
/// `purchase_month`. Rows whose price cannot be resolved or whose date is
/// missing are excluded and counted.
pub fn transform_sales(
    sales: Vec<SaleCandidate>,
    product_prices: &HashMap<i64, f64>,
) -> (Vec<SaleFact>, SaleTransformReport) {
    let mut report = SaleTransformReport {
        input_rows: sales.len(),
        ..Default::default()
    };
    let mut facts = Vec::with_capacity(sales.len());

    for sale in sales {
        let resolved = sale
            .product_id
            .and_then(|id| product_prices.get(&id).map(|price| (id, *price)));
        let Some((product_id, price)) = resolved else {
            report.unresolved_price += 1;
            continue;
        };
        let Some(transaction_date) = sale.transaction_date else {
            report.undated += 1;
            continue;
        };

        facts.push(SaleFact {
            transaction_id: sale.transaction_id,
            product_id,
            customer_id: sale.customer_id,
            quantity: sale.quantity,
            transaction_date,
            price,
            total_sales_value: sale.quantity as f64 * price,
            purchase_month: transaction_date.format("%Y-%m").to_string(),
        });
    }

    report.output_rows = facts.len();
    if report.unresolved_price > 0 {
        log::warn!("{} sales rows have no resolvable price.", report.unresolved_price);
    }
    if report.undated > 0 {
        log::warn!("{} sales rows have no parsable date.", report.undated);
    }
    log::info!("Transformed sales: {} rows processed.", report.output_rows);
    (facts, report)
}

// --- customers ---

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerCleanReport {
    pub unidentifiable: usize,
    pub duplicate_ids: usize,
    pub missing_countries: usize,
    pub invalid_emails: usize,
}

pub fn is_valid_email(email: &str) -> bool {
    email.contains('@') && email.contains('.')
}

pub fn clean_customers(raw: &[RawCustomer]) -> (Vec<Customer>, CustomerCleanReport) {
    let mut report = CustomerCleanReport::default();
    let mut seen = HashSet::new();
    let mut customers = Vec::with_capacity(raw.len());

    for row in raw {
        let Some(customer_id) = parse_key(row.customer_id.as_deref()) else {
            report.unidentifiable += 1;
            continue;
        };
        if !seen.insert(customer_id) {
            report.duplicate_ids += 1;
            continue;
        }

        let country = match row.country.as_deref().map(str::trim) {
            Some(country) if !country.is_empty() => country.to_string(),
            _ => {
                report.missing_countries += 1;
                UNKNOWN.to_string()
            }
        };
        let email = match row.email.as_deref().map(str::trim) {
            Some(email) if is_valid_email(email) => email.to_string(),
            _ => {
                report.invalid_emails += 1;
                INVALID_EMAIL.to_string()
            }
        };
        let name = row
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN)
            .to_string();

        customers.push(Customer {
            customer_id,
            name,
            email,
            country,
        });
    }

    log::info!("Removed {} duplicate customer records.", report.duplicate_ids);
    log::info!(
        "Filled {} missing countries with '{}'.",
        report.missing_countries,
        UNKNOWN
    );
    log::info!(
        "Replaced {} invalid email addresses with '{}'.",
        report.invalid_emails,
        INVALID_EMAIL
    );
    (customers, report)
}

/// Splits on the first whitespace: everything after it is the surname.
pub fn split_name(name: &str) -> (String, Option<String>) {
    let name = name.trim();
    match name.split_once(char::is_whitespace) {
        Some((first, rest)) => {
            let rest = rest.trim_start();
            let last = (!rest.is_empty()).then(|| rest.to_string());
            (first.to_string(), last)
        }
        None => (name.to_string(), None),
    }
}

/// Derives name parts and buyer category, then deduplicates by email keeping
/// the highest `customer_id`. Output is ordered by `customer_id`.
///
/// Customers whose email was replaced by [`INVALID_EMAIL`] during cleaning
/// share that placeholder without sharing an identity, so they are exempt
/// from the email dedupe and all kept.
pub fn profile_customers(customers: Vec<Customer>, sales: &[SaleRecord]) -> Vec<CustomerProfile> {
    let mut transactions: HashMap<i64, usize> = HashMap::new();
    for sale in sales {
        *transactions.entry(sale.customer_id).or_default() += 1;
    }

    let mut by_email: HashMap<String, CustomerProfile> = HashMap::new();
    let mut unmatched = Vec::new();
    let input_rows = customers.len();

    for customer in customers {
        let (first_name, last_name) = split_name(&customer.name);
        let count = transactions.get(&customer.customer_id).copied().unwrap_or(0);
        let profile = CustomerProfile {
            customer_id: customer.customer_id,
            first_name,
            last_name,
            name: customer.name,
            email: customer.email,
            country: customer.country,
            buyer_category: BuyerCategory::from_transaction_count(count),
        };

        if profile.email == INVALID_EMAIL {
            unmatched.push(profile);
            continue;
        }
        match by_email.entry(profile.email.clone()) {
            Entry::Occupied(mut slot) => {
                if profile.customer_id > slot.get().customer_id {
                    slot.insert(profile);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(profile);
            }
        }
    }

    let mut profiles: Vec<CustomerProfile> = by_email.into_values().chain(unmatched).collect();
    profiles.sort_by_key(|p| p.customer_id);
    log::info!(
        "Transformed customers: {} rows processed ({} merged by email).",
        profiles.len(),
        input_rows - profiles.len()
    );
    profiles
}
