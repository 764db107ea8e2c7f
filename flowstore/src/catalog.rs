use crate::config::PipelineConfig;
use crate::errors::{Result, StorageError};
use crate::models::{EtlStateEntry, PipelineRun, RunStatus, SaleRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// Tables owned by the pipeline; the only names accepted by [`Catalog::count_rows`].
pub const MANAGED_TABLES: [&str; 9] = [
    "products",
    "customers",
    "sales",
    "products_transformed",
    "customers_transformed",
    "sales_transformed",
    "etl_state",
    "etl_watermark",
    "pipeline_runs",
];

/// Handle to the destination store: dimension, fact and bookkeeping tables.
pub struct Catalog {
    conn: Arc<Mutex<Connection>>,
}

impl Catalog {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        if let Some(parent) = config.catalog_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&config.catalog_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Initialization("catalog connection lock poisoned".into()))
    }

    /// Runs `f` inside a single transaction; any error rolls the whole unit back.
    pub(crate) fn with_transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    pub fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS products (
                product_id INTEGER PRIMARY KEY,
                product_name TEXT NOT NULL,
                category TEXT NOT NULL,
                price REAL NOT NULL CHECK (price >= 0),
                description TEXT NOT NULL,
                rating REAL NOT NULL,
                availability_status TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS customers (
                customer_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                country TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS sales (
                transaction_id INTEGER PRIMARY KEY,
                product_id INTEGER NOT NULL,
                customer_id INTEGER NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity >= 1),
                transaction_date TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS products_transformed (
                product_id INTEGER PRIMARY KEY,
                product_name TEXT NOT NULL,
                category TEXT NOT NULL,
                price REAL NOT NULL,
                description TEXT NOT NULL,
                rating REAL NOT NULL,
                availability_status TEXT NOT NULL,
                popularity_score REAL NOT NULL
            );
            CREATE TABLE IF NOT EXISTS customers_transformed (
                customer_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                first_name TEXT NOT NULL,
                last_name TEXT,
                email TEXT NOT NULL,
                country TEXT NOT NULL,
                buyer_category TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS sales_transformed (
                transaction_id INTEGER PRIMARY KEY,
                product_id INTEGER NOT NULL,
                customer_id INTEGER,
                quantity INTEGER NOT NULL,
                transaction_date TEXT NOT NULL,
                price REAL NOT NULL,
                total_sales_value REAL NOT NULL,
                purchase_month TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS etl_state (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                table_name TEXT NOT NULL,
                time_processed TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS pipeline_runs (
                run_id TEXT PRIMARY KEY,
                started_at INTEGER NOT NULL,
                finished_at INTEGER,
                status TEXT NOT NULL,
                details TEXT
            );
            COMMIT;",
        )?;
        Ok(())
    }

    // --- dimension lookups used by sale validation ---

    pub fn product_prices(&self) -> Result<HashMap<i64, f64>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT product_id, price FROM products")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)))?;
        let mut prices = HashMap::new();
        for row in rows {
            let (id, price) = row?;
            prices.insert(id, price);
        }
        Ok(prices)
    }

    pub fn customer_keys(&self) -> Result<HashSet<i64>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT customer_id FROM customers")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(keys)
    }

    /// Every sale committed so far, ordered by `transaction_id`.
    pub fn sales_history(&self) -> Result<Vec<SaleRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT transaction_id, product_id, customer_id, quantity, transaction_date
             FROM sales ORDER BY transaction_id",
        )?;
        let records = stmt
            .query_map([], |row| {
                Ok(SaleRecord {
                    transaction_id: row.get(0)?,
                    product_id: row.get(1)?,
                    customer_id: row.get(2)?,
                    quantity: row.get(3)?,
                    transaction_date: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn count_rows(&self, table: &str) -> Result<i64> {
        if !MANAGED_TABLES.contains(&table) {
            return Err(StorageError::NotFound(format!("table '{table}'")));
        }
        let conn = self.lock()?;
        let count = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count)
    }

    // --- processing state ---

    pub fn list_etl_state(&self) -> Result<Vec<EtlStateEntry>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT table_name, time_processed FROM etl_state ORDER BY id")?;
        let entries = stmt
            .query_map([], |row| {
                Ok(EtlStateEntry {
                    table_name: row.get(0)?,
                    time_processed: row.get::<_, DateTime<Utc>>(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn create_run(&self, run_id: &str) -> Result<()> {
        let conn = self.lock()?;
        let started_at = Utc::now().timestamp();
        conn.execute(
            "INSERT INTO pipeline_runs (run_id, started_at, status) VALUES (?1, ?2, ?3)",
            params![run_id, started_at, RunStatus::Running.as_str()],
        )?;
        Ok(())
    }

    pub fn finish_run(&self, run_id: &str, status: RunStatus, details: &str) -> Result<()> {
        let conn = self.lock()?;
        let finished_at = Utc::now().timestamp();
        let updated = conn.execute(
            "UPDATE pipeline_runs SET status = ?1, details = ?2, finished_at = ?3 WHERE run_id = ?4",
            params![status.as_str(), details, finished_at, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!("pipeline run '{run_id}'")));
        }
        Ok(())
    }

    pub fn get_run(&self, run_id: &str) -> Result<Option<PipelineRun>> {
        let conn = self.lock()?;
        let run = conn
            .query_row(
                "SELECT run_id, started_at, finished_at, status, details FROM pipeline_runs WHERE run_id = ?1",
                params![run_id],
                |row| {
                    Ok(PipelineRun {
                        run_id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        status: row.get(3)?,
                        details: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(run)
    }
}

/// Appends a `(table_name, time_processed)` load event inside an open transaction.
pub(crate) fn record_etl_state(conn: &Connection, table_name: &str) -> Result<()> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO etl_state (table_name, time_processed) VALUES (?1, ?2)",
        params![table_name, now],
    )?;
    log::info!("ETL state updated for table '{}' at {}.", table_name, now);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use tempfile::tempdir;

    fn setup() -> (Catalog, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = PipelineConfig::new(dir.path());
        let catalog = Catalog::new(&config).unwrap();
        catalog.initialize_schema().unwrap();
        (catalog, dir)
    }

    #[test]
    fn test_schema_is_idempotent() {
        let (catalog, _dir) = setup();
        catalog.initialize_schema().unwrap();
        assert_eq!(catalog.count_rows("products").unwrap(), 0);
        assert_eq!(catalog.count_rows("sales").unwrap(), 0);
    }

    #[test]
    fn test_count_rows_rejects_unknown_tables() {
        let (catalog, _dir) = setup();
        let err = catalog.count_rows("sqlite_master; DROP TABLE sales").unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn test_run_log_lifecycle() {
        let (catalog, _dir) = setup();

        catalog.create_run("run-1").unwrap();
        let run = catalog.get_run("run-1").unwrap().unwrap();
        assert_eq!(run.status, "RUNNING");
        assert!(run.finished_at.is_none());

        catalog
            .finish_run("run-1", RunStatus::Partial, "{\"steps\":[]}")
            .unwrap();
        let run = catalog.get_run("run-1").unwrap().unwrap();
        assert_eq!(run.status, "PARTIAL");
        assert!(run.finished_at.is_some());
        assert_eq!(run.details.as_deref(), Some("{\"steps\":[]}"));

        assert!(catalog.get_run("missing").unwrap().is_none());
        assert!(catalog.finish_run("missing", RunStatus::Failed, "{}").is_err());
    }

    #[test]
    fn test_etl_state_records_in_order() {
        let (catalog, _dir) = setup();
        catalog
            .with_transaction(|tx| {
                record_etl_state(tx, "products")?;
                record_etl_state(tx, "sales")
            })
            .unwrap();

        let entries = catalog.list_etl_state().unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.table_name.as_str()).collect();
        assert_eq!(names, vec!["products", "sales"]);
    }

    #[test]
    fn test_failed_transaction_leaves_no_trace() {
        let (catalog, _dir) = setup();
        let result: Result<()> = catalog.with_transaction(|tx| {
            record_etl_state(tx, "products")?;
            Err(StorageError::Config("boom".into()))
        });
        assert!(result.is_err());
        assert!(catalog.list_etl_state().unwrap().is_empty());
    }
}
