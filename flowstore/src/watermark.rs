//! Singleton high-water mark for incremental sale loads.
//!
//! The watermark is the latest `transaction_date` whose sales have been
//! durably appended. It only ever moves forward: an attempt to store an
//! earlier date is reported as [`StorageError::WatermarkRegression`] and the
//! stored value is left as it was.

use crate::catalog::Catalog;
use crate::errors::{Result, StorageError};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;

pub const WATERMARK_TABLE: &str = "etl_watermark";

pub struct WatermarkStore {
    catalog: Arc<Catalog>,
}

impl WatermarkStore {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Creates the watermark table when missing. Safe to call on every run.
    pub fn ensure_exists(&self) -> Result<()> {
        let conn = self.catalog.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS etl_watermark (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                last_processed_date TEXT
            );",
        )?;
        log::info!("Watermark table '{}' created or already exists.", WATERMARK_TABLE);
        Ok(())
    }

    /// Returns the stored watermark, or `None` before the first successful load.
    pub fn get(&self) -> Result<Option<NaiveDate>> {
        let conn = self.catalog.lock()?;
        read_watermark(&conn)
    }

    /// Moves the watermark forward to `new_value`.
    pub fn advance(&self, new_value: NaiveDate) -> Result<()> {
        self.catalog
            .with_transaction(|tx| advance_watermark(tx, new_value))
    }
}

pub(crate) fn read_watermark(conn: &Connection) -> Result<Option<NaiveDate>> {
    let stored: Option<Option<NaiveDate>> = conn
        .query_row(
            "SELECT last_processed_date FROM etl_watermark WHERE id = 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(stored.flatten())
}

/// Compare-and-advance against the row visible to `conn`. Callers run this
/// inside the same transaction as the write it acknowledges.
pub(crate) fn advance_watermark(conn: &Connection, new_value: NaiveDate) -> Result<()> {
    if let Some(current) = read_watermark(conn)? {
        if new_value < current {
            log::error!(
                "Refusing to move watermark backwards from {} to {}.",
                current,
                new_value
            );
            return Err(StorageError::WatermarkRegression {
                current,
                attempted: new_value,
            });
        }
        if new_value == current {
            log::debug!("Watermark already at {}; nothing to advance.", current);
            return Ok(());
        }
    }

    conn.execute(
        "INSERT INTO etl_watermark (id, last_processed_date) VALUES (1, ?1)
         ON CONFLICT(id) DO UPDATE SET last_processed_date = excluded.last_processed_date",
        params![new_value],
    )?;
    log::info!("Updated last processed date to {}.", new_value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup() -> WatermarkStore {
        let catalog = Arc::new(Catalog::open_in_memory().unwrap());
        let store = WatermarkStore::new(catalog);
        store.ensure_exists().unwrap();
        store
    }

    #[test]
    fn test_absent_until_first_advance() {
        let store = setup();
        store.ensure_exists().unwrap();
        assert_eq!(store.get().unwrap(), None);

        store.advance(date(2024, 6, 1)).unwrap();
        assert_eq!(store.get().unwrap(), Some(date(2024, 6, 1)));
    }

    #[test]
    fn test_advance_is_monotonic() {
        let store = setup();
        store.advance(date(2024, 6, 1)).unwrap();
        store.advance(date(2024, 6, 1)).unwrap();
        store.advance(date(2024, 7, 15)).unwrap();

        let err = store.advance(date(2024, 7, 1)).unwrap_err();
        match err {
            StorageError::WatermarkRegression { current, attempted } => {
                assert_eq!(current, date(2024, 7, 15));
                assert_eq!(attempted, date(2024, 7, 1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.get().unwrap(), Some(date(2024, 7, 15)));
    }

    #[test]
    fn test_single_row_is_kept() {
        let store = setup();
        store.advance(date(2024, 1, 1)).unwrap();
        store.advance(date(2024, 2, 1)).unwrap();
        let conn = store.catalog.lock().unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM etl_watermark", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }
}
