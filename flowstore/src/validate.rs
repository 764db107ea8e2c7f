use crate::models::{SaleCandidate, ValidatedSale};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Rejection and repair counts for one validation pass. Purely for
/// observability; no control flow depends on them.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub input_rows: usize,
    pub missing_product_id: usize,
    pub missing_customer_id: usize,
    pub missing_transaction_date: usize,
    /// Rows dropped for missing at least one critical field.
    pub dropped_missing_critical: usize,
    pub repaired_quantity: usize,
    pub unknown_product: usize,
    pub unknown_customer: usize,
    /// Rows dropped by the referential checks (a row failing both counts once).
    pub dropped_referential: usize,
    pub accepted: usize,
}

/// Validates a batch of sale candidates against the current dimension keys.
///
/// Rows missing a critical field are dropped, non-positive quantities are
/// repaired to 1, rows referencing an unknown product or customer are
/// dropped, and survivors get `price` and `revenue = quantity * price`.
pub fn validate_sales(
    candidates: Vec<SaleCandidate>,
    product_prices: &HashMap<i64, f64>,
    customer_keys: &HashSet<i64>,
) -> (Vec<ValidatedSale>, ValidationReport) {
    let mut report = ValidationReport {
        input_rows: candidates.len(),
        ..Default::default()
    };
    let mut accepted = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        report.missing_product_id += usize::from(candidate.product_id.is_none());
        report.missing_customer_id += usize::from(candidate.customer_id.is_none());
        report.missing_transaction_date += usize::from(candidate.transaction_date.is_none());

        let (Some(product_id), Some(customer_id), Some(transaction_date)) = (
            candidate.product_id,
            candidate.customer_id,
            candidate.transaction_date,
        ) else {
            report.dropped_missing_critical += 1;
            continue;
        };

        let quantity = if candidate.quantity <= 0 {
            report.repaired_quantity += 1;
            1
        } else {
            candidate.quantity
        };

        let price = product_prices.get(&product_id).copied();
        let customer_known = customer_keys.contains(&customer_id);
        report.unknown_product += usize::from(price.is_none());
        report.unknown_customer += usize::from(!customer_known);

        let Some(price) = price.filter(|_| customer_known) else {
            report.dropped_referential += 1;
            continue;
        };

        accepted.push(ValidatedSale {
            transaction_id: candidate.transaction_id,
            product_id,
            customer_id,
            quantity,
            transaction_date,
            price,
            revenue: quantity as f64 * price,
            date_repaired: candidate.date_repaired,
        });
    }

    report.accepted = accepted.len();
    log_report(&report);
    (accepted, report)
}

fn log_report(report: &ValidationReport) {
    log::info!("Missing product_id count: {}", report.missing_product_id);
    log::info!("Missing customer_id count: {}", report.missing_customer_id);
    log::info!(
        "Missing transaction_date count: {}",
        report.missing_transaction_date
    );
    if report.repaired_quantity > 0 {
        log::warn!(
            "Found {} invalid quantity values; repaired to 1.",
            report.repaired_quantity
        );
    }
    if report.unknown_product > 0 {
        log::warn!("Found {} sales with invalid product_id.", report.unknown_product);
    }
    if report.unknown_customer > 0 {
        log::warn!(
            "Found {} sales with invalid customer_id.",
            report.unknown_customer
        );
    }
    log::info!(
        "Sales validation completed: {} of {} rows accepted.",
        report.accepted,
        report.input_rows
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn candidate(
        id: i64,
        product: Option<i64>,
        customer: Option<i64>,
        quantity: i64,
        when: Option<NaiveDate>,
    ) -> SaleCandidate {
        SaleCandidate {
            transaction_id: id,
            product_id: product,
            customer_id: customer,
            quantity,
            transaction_date: when,
            date_repaired: false,
        }
    }

    fn dimensions() -> (HashMap<i64, f64>, HashSet<i64>) {
        let prices = HashMap::from([(1, 10.0), (2, 2.5)]);
        let customers = HashSet::from([10, 11]);
        (prices, customers)
    }

    #[test]
    fn test_drops_missing_critical_fields() {
        let (prices, customers) = dimensions();
        let d = Some(date(2024, 1, 1));
        let batch = vec![
            candidate(1, None, Some(10), 1, d),
            candidate(2, Some(1), None, 1, d),
            candidate(3, Some(1), Some(10), 1, None),
            candidate(4, Some(1), Some(10), 2, d),
        ];

        let (accepted, report) = validate_sales(batch, &prices, &customers);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].transaction_id, 4);
        assert_eq!(report.dropped_missing_critical, 3);
        assert_eq!(report.missing_product_id, 1);
        assert_eq!(report.missing_customer_id, 1);
        assert_eq!(report.missing_transaction_date, 1);
    }

    #[test]
    fn test_repairs_quantity_and_computes_revenue() {
        let (prices, customers) = dimensions();
        let d = Some(date(2024, 1, 1));
        let batch = vec![
            candidate(1, Some(1), Some(10), 0, d),
            candidate(2, Some(2), Some(11), -4, d),
            candidate(3, Some(2), Some(11), 4, d),
        ];

        let (accepted, report) = validate_sales(batch, &prices, &customers);
        assert_eq!(report.repaired_quantity, 2);
        assert!(accepted.iter().all(|s| s.quantity >= 1));
        assert_eq!(accepted[0].revenue, 10.0);
        assert_eq!(accepted[1].revenue, 2.5);
        assert_eq!(accepted[2].price, 2.5);
        assert_eq!(accepted[2].revenue, 10.0);
    }

    #[test]
    fn test_unknown_customer_drops_row_despite_quantity_repair() {
        let (prices, customers) = dimensions();
        let batch = vec![candidate(5, Some(1), Some(99), -3, None)];
        let (accepted, report) = validate_sales(batch, &prices, &customers);
        assert!(accepted.is_empty());
        assert_eq!(report.accepted, 0);

        let dated = vec![candidate(5, Some(1), Some(99), -3, Some(date(2024, 6, 1)))];
        let (accepted, report) = validate_sales(dated, &prices, &customers);
        assert!(accepted.is_empty());
        assert_eq!(report.unknown_customer, 1);
        assert_eq!(report.dropped_referential, 1);
    }

    #[test]
    fn test_referential_checks_are_independent() {
        let (prices, customers) = dimensions();
        let d = Some(date(2024, 1, 1));
        let batch = vec![
            candidate(1, Some(7), Some(10), 1, d),
            candidate(2, Some(1), Some(77), 1, d),
            candidate(3, Some(7), Some(77), 1, d),
            candidate(4, Some(2), Some(11), 1, d),
        ];

        let (accepted, report) = validate_sales(batch, &prices, &customers);
        assert_eq!(report.unknown_product, 2);
        assert_eq!(report.unknown_customer, 2);
        assert_eq!(report.dropped_referential, 3);
        assert_eq!(accepted.len(), 1);
        for sale in &accepted {
            assert!(prices.contains_key(&sale.product_id));
            assert!(customers.contains(&sale.customer_id));
        }
    }

    #[test]
    fn test_empty_dimensions_reject_everything() {
        let batch = vec![candidate(1, Some(1), Some(10), 1, Some(date(2024, 1, 1)))];
        let (accepted, report) = validate_sales(batch, &HashMap::new(), &HashSet::new());
        assert!(accepted.is_empty());
        assert_eq!(report.dropped_referential, 1);
    }
}
