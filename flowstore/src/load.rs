use crate::catalog::{record_etl_state, Catalog};
use crate::errors::Result;
use crate::models::{
    Customer, CustomerProfile, EnrichedProduct, ProductProfile, SaleFact, SaleRecord, ValidatedSale,
};
use crate::watermark::advance_watermark;
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use std::sync::Arc;

/// A record type with a fixed destination table in the sink.
pub trait Loadable {
    const TABLE_NAME: &'static str;
    fn columns() -> &'static [&'static str];
    fn to_row(&self) -> Vec<Value>;
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn date(value: NaiveDate) -> Value {
    Value::Text(value.format("%Y-%m-%d").to_string())
}

impl Loadable for EnrichedProduct {
    const TABLE_NAME: &'static str = "products";
    fn columns() -> &'static [&'static str] {
        &[
            "product_id",
            "product_name",
            "category",
            "price",
            "description",
            "rating",
            "availability_status",
        ]
    }
    fn to_row(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.product_id),
            text(&self.product_name),
            text(&self.category),
            Value::Real(self.price),
            text(&self.description),
            Value::Real(self.rating),
            text(&self.availability_status),
        ]
    }
}

impl Loadable for ProductProfile {
    const TABLE_NAME: &'static str = "products_transformed";
    fn columns() -> &'static [&'static str] {
        &[
            "product_id",
            "product_name",
            "category",
            "price",
            "description",
            "rating",
            "availability_status",
            "popularity_score",
        ]
    }
    fn to_row(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.product_id),
            text(&self.product_name),
            text(&self.category),
            Value::Real(self.price),
            text(&self.description),
            Value::Real(self.rating),
            text(&self.availability_status),
            Value::Real(self.popularity_score),
        ]
    }
}

impl Loadable for Customer {
    const TABLE_NAME: &'static str = "customers";
    fn columns() -> &'static [&'static str] {
        &["customer_id", "name", "email", "country"]
    }
    fn to_row(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.customer_id),
            text(&self.name),
            text(&self.email),
            text(&self.country),
        ]
    }
}

impl Loadable for CustomerProfile {
    const TABLE_NAME: &'static str = "customers_transformed";
    fn columns() -> &'static [&'static str] {
        &[
            "customer_id",
            "name",
            "first_name",
            "last_name",
            "email",
            "country",
            "buyer_category",
        ]
    }
    fn to_row(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.customer_id),
            text(&self.name),
            text(&self.first_name),
            self.last_name.as_deref().map_or(Value::Null, text),
            text(&self.email),
            text(&self.country),
            text(self.buyer_category.as_str()),
        ]
    }
}

impl Loadable for SaleRecord {
    const TABLE_NAME: &'static str = "sales";
    fn columns() -> &'static [&'static str] {
        &[
            "transaction_id",
            "product_id",
            "customer_id",
            "quantity",
            "transaction_date",
        ]
    }
    fn to_row(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.transaction_id),
            Value::Integer(self.product_id),
            Value::Integer(self.customer_id),
            Value::Integer(self.quantity),
            date(self.transaction_date),
        ]
    }
}

impl Loadable for SaleFact {
    const TABLE_NAME: &'static str = "sales_transformed";
    fn columns() -> &'static [&'static str] {
        &[
            "transaction_id",
            "product_id",
            "customer_id",
            "quantity",
            "transaction_date",
            "price",
            "total_sales_value",
            "purchase_month",
        ]
    }
    fn to_row(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.transaction_id),
            Value::Integer(self.product_id),
            self.customer_id.map_or(Value::Null, Value::Integer),
            Value::Integer(self.quantity),
            date(self.transaction_date),
            Value::Real(self.price),
            Value::Real(self.total_sales_value),
            text(&self.purchase_month),
        ]
    }
}

fn insert_sql<T: Loadable>(conflict_clause: &str) -> String {
    let columns = T::columns();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({}){}",
        T::TABLE_NAME,
        columns.join(", "),
        placeholders.join(", "),
        conflict_clause
    )
}

fn insert_rows<T: Loadable>(conn: &Connection, rows: &[T], conflict_clause: &str) -> Result<usize> {
    let mut stmt = conn.prepare(&insert_sql::<T>(conflict_clause))?;
    let mut inserted = 0;
    for row in rows {
        inserted += stmt.execute(params_from_iter(row.to_row()))?;
    }
    Ok(inserted)
}

/// Result of one sale append.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct AppendOutcome {
    pub inserted: usize,
    /// Rows whose `transaction_id` was already in the sink.
    pub skipped_existing: usize,
    /// Latest parsed date of the batch, which the watermark was advanced to.
    pub watermark: Option<NaiveDate>,
}

/// Writes entity batches to the sink. Every call is one transaction: it
/// either commits the whole batch or leaves the table as it was.
pub struct Loader {
    catalog: Arc<Catalog>,
}

impl Loader {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Supersedes the table's contents with `rows`.
    pub fn replace<T: Loadable>(&self, rows: &[T]) -> Result<usize> {
        let inserted = self.catalog.with_transaction(|tx| {
            tx.execute(&format!("DELETE FROM {}", T::TABLE_NAME), [])?;
            let inserted = insert_rows(tx, rows, "")?;
            record_etl_state(tx, T::TABLE_NAME)?;
            Ok(inserted)
        })?;
        log::info!("Loaded {} rows into table '{}'.", inserted, T::TABLE_NAME);
        Ok(inserted)
    }

    /// Appends validated sales and, in the same transaction, advances the
    /// watermark to the latest parsed `transaction_date` of the batch. Sentinel
    /// dates never move the watermark. An empty batch writes nothing and
    /// leaves the watermark untouched.
    pub fn append_sales(&self, batch: &[ValidatedSale]) -> Result<AppendOutcome> {
        if batch.is_empty() {
            log::info!("No new records to process.");
            return Ok(AppendOutcome::default());
        }
        let max_date = batch
            .iter()
            .filter(|sale| !sale.date_repaired)
            .map(|sale| sale.transaction_date)
            .max();
        let records: Vec<SaleRecord> = batch.iter().map(SaleRecord::from).collect();

        let outcome = self.catalog.with_transaction(|tx| {
            let inserted = insert_rows(
                tx,
                &records,
                " ON CONFLICT(transaction_id) DO NOTHING",
            )?;
            if let Some(max_date) = max_date {
                advance_watermark(tx, max_date)?;
            }
            record_etl_state(tx, SaleRecord::TABLE_NAME)?;
            Ok(AppendOutcome {
                inserted,
                skipped_existing: records.len() - inserted,
                watermark: max_date,
            })
        })?;

        if outcome.skipped_existing > 0 {
            log::warn!(
                "Skipped {} sales already present in the sink.",
                outcome.skipped_existing
            );
        }
        log::info!(
            "Inserted {} valid sales records into the database.",
            outcome.inserted
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StorageError;
    use crate::models::BuyerCategory;
    use crate::watermark::WatermarkStore;

    fn setup() -> (Arc<Catalog>, Loader, WatermarkStore) {
        let catalog = Arc::new(Catalog::open_in_memory().unwrap());
        catalog.initialize_schema().unwrap();
        let watermark = WatermarkStore::new(Arc::clone(&catalog));
        watermark.ensure_exists().unwrap();
        (Arc::clone(&catalog), Loader::new(catalog), watermark)
    }

    fn date_of(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn customer(id: i64) -> Customer {
        Customer {
            customer_id: id,
            name: format!("Customer {id}"),
            email: format!("c{id}@example.com"),
            country: "Kenya".into(),
        }
    }

    fn validated(id: i64, when: NaiveDate) -> ValidatedSale {
        ValidatedSale {
            transaction_id: id,
            product_id: 1,
            customer_id: 1,
            quantity: 2,
            transaction_date: when,
            price: 3.0,
            revenue: 6.0,
            date_repaired: false,
        }
    }

    fn dump_customers(catalog: &Catalog) -> Vec<(i64, String)> {
        let conn = catalog.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT customer_id, email FROM customers ORDER BY customer_id")
            .unwrap();
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        rows
    }

    #[test]
    fn test_insert_sql_shape() {
        assert_eq!(
            insert_sql::<Customer>(""),
            "INSERT INTO customers (customer_id, name, email, country) VALUES (?1, ?2, ?3, ?4)"
        );
    }

    #[test]
    fn test_replace_is_idempotent() {
        let (catalog, loader, _) = setup();
        let batch = vec![customer(1), customer(2)];

        loader.replace(&batch).unwrap();
        let once = dump_customers(&catalog);
        loader.replace(&batch).unwrap();
        let twice = dump_customers(&catalog);

        assert_eq!(once, twice);
        assert_eq!(catalog.count_rows("customers").unwrap(), 2);
    }

    #[test]
    fn test_replace_supersedes_previous_rows() {
        let (catalog, loader, _) = setup();
        loader.replace(&[customer(1), customer(2)]).unwrap();
        loader.replace(&[customer(3)]).unwrap();
        let ids: Vec<_> = dump_customers(&catalog).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn test_failed_replace_keeps_previous_contents() {
        let (catalog, loader, _) = setup();
        loader.replace(&[customer(1)]).unwrap();

        let err = loader.replace(&[customer(5), customer(5)]).unwrap_err();
        assert!(matches!(err, StorageError::SQLite(_)));
        let ids: Vec<_> = dump_customers(&catalog).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_append_advances_watermark_with_batch() {
        let (catalog, loader, watermark) = setup();
        let batch = vec![
            validated(1, date_of(2024, 5, 2)),
            validated(2, date_of(2024, 6, 1)),
        ];

        let outcome = loader.append_sales(&batch).unwrap();
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.watermark, Some(date_of(2024, 6, 1)));
        assert_eq!(watermark.get().unwrap(), Some(date_of(2024, 6, 1)));
        assert_eq!(catalog.count_rows("sales").unwrap(), 2);

        let history = catalog.sales_history().unwrap();
        assert_eq!(history[1].transaction_date, date_of(2024, 6, 1));
    }

    #[test]
    fn test_empty_append_is_a_no_op() {
        let (catalog, loader, watermark) = setup();
        let outcome = loader.append_sales(&[]).unwrap();
        assert_eq!(outcome, AppendOutcome::default());
        assert_eq!(watermark.get().unwrap(), None);
        assert!(catalog.list_etl_state().unwrap().is_empty());
    }

    #[test]
    fn test_regressing_append_rolls_back() {
        let (catalog, loader, watermark) = setup();
        watermark.advance(date_of(2024, 6, 1)).unwrap();

        let err = loader
            .append_sales(&[validated(9, date_of(2024, 1, 1))])
            .unwrap_err();
        assert!(matches!(err, StorageError::WatermarkRegression { .. }));
        assert_eq!(catalog.count_rows("sales").unwrap(), 0);
        assert_eq!(watermark.get().unwrap(), Some(date_of(2024, 6, 1)));
    }

    #[test]
    fn test_sentinel_dates_do_not_move_watermark() {
        let (catalog, loader, watermark) = setup();
        loader
            .append_sales(&[validated(1, date_of(2024, 6, 1))])
            .unwrap();

        let mut repaired = validated(2, date_of(2000, 1, 1));
        repaired.date_repaired = true;
        let outcome = loader.append_sales(&[repaired]).unwrap();

        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.watermark, None);
        assert_eq!(watermark.get().unwrap(), Some(date_of(2024, 6, 1)));
        assert_eq!(catalog.count_rows("sales").unwrap(), 2);
    }

    #[test]
    fn test_existing_transactions_are_skipped() {
        let (catalog, loader, _) = setup();
        loader
            .append_sales(&[validated(1, date_of(2024, 1, 1))])
            .unwrap();
        let outcome = loader
            .append_sales(&[
                validated(1, date_of(2024, 1, 2)),
                validated(2, date_of(2024, 1, 2)),
            ])
            .unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.skipped_existing, 1);
        assert_eq!(catalog.count_rows("sales").unwrap(), 2);
    }

    #[test]
    fn test_profile_rows_store_nullable_surname() {
        let (catalog, loader, _) = setup();
        let profile = CustomerProfile {
            customer_id: 1,
            name: "Cher".into(),
            first_name: "Cher".into(),
            last_name: None,
            email: "cher@example.com".into(),
            country: "USA".into(),
            buyer_category: BuyerCategory::Rare,
        };
        loader.replace(&[profile]).unwrap();

        let conn = catalog.lock().unwrap();
        let (last, category): (Option<String>, String) = conn
            .query_row(
                "SELECT last_name, buyer_category FROM customers_transformed",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(last, None);
        assert_eq!(category, "Rare Buyer");
    }
}
