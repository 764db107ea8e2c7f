use crate::errors::Result;
use serde::Serialize;
use std::path::PathBuf;

/// Directory of CSV snapshots written next to each transformed load.
pub struct Artifacts {
    dir: PathBuf,
}

impl Artifacts {
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Writes `<table_name>.csv`, replacing any previous snapshot.
    pub fn write_snapshot<T: Serialize>(&self, table_name: &str, rows: &[T]) -> Result<PathBuf> {
        let path = self.dir.join(format!("{table_name}.csv"));
        let mut writer = csv::Writer::from_path(&path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        log::info!("Wrote {} rows to {}.", rows.len(), path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BuyerCategory, CustomerProfile};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_snapshot() {
        let dir = tempdir().unwrap();
        let artifacts = Artifacts::new(dir.path().join("artifacts")).await.unwrap();

        let rows = vec![CustomerProfile {
            customer_id: 7,
            name: "Jean Claude Van Damme".into(),
            first_name: "Jean".into(),
            last_name: Some("Claude Van Damme".into()),
            email: "jcvd@example.com".into(),
            country: "Belgium".into(),
            buyer_category: BuyerCategory::Occasional,
        }];
        let path = artifacts
            .write_snapshot("customers_transformed", &rows)
            .unwrap();
        assert!(path.ends_with("customers_transformed.csv"));

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.starts_with(
            "customer_id,name,first_name,last_name,email,country,buyer_category"
        ));
        assert!(content.contains("Claude Van Damme"));
        assert!(content.contains("Occasional Buyer"));
    }
}
