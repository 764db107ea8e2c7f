use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How unparsable `transaction_date` values are handled during extraction.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DatePolicy {
    /// Leave the date empty; the validator drops the row.
    #[default]
    Drop,
    /// Substitute [`crate::models::sentinel_date`].
    Sentinel,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub catalog_path: PathBuf,
    pub artifacts_dir: PathBuf,
    #[serde(default)]
    pub date_policy: DatePolicy,
}

impl PipelineConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        Self {
            input_dir: base_path.join("input"),
            catalog_path: base_path.join("catalog.sqlite"),
            artifacts_dir: base_path.join("artifacts"),
            date_policy: DatePolicy::default(),
        }
    }

    pub fn with_input_dir(mut self, input_dir: impl Into<PathBuf>) -> Self {
        self.input_dir = input_dir.into();
        self
    }

    pub fn with_date_policy(mut self, policy: DatePolicy) -> Self {
        self.date_policy = policy;
        self
    }

    pub fn products_file(&self) -> PathBuf {
        self.input_dir.join("products.csv")
    }

    pub fn customers_file(&self) -> PathBuf {
        self.input_dir.join("customers.csv")
    }

    pub fn sales_file(&self) -> PathBuf {
        self.input_dir.join("sales.csv")
    }
}
