//! Orchestration of one pipeline run.
//!
//! Steps run sequentially: products, customers, incremental sales, then the
//! transformed snapshots. A failing step is logged and recorded in the
//! [`RunReport`]; the steps that do not depend on it still run. Retrying is
//! simply running the pipeline again: dimension loads replace their tables and
//! the sale append is gated by the watermark.

use crate::artifacts::Artifacts;
use crate::catalog::Catalog;
use crate::config::PipelineConfig;
use crate::errors::Result;
use crate::extract::{self, SaleExtract};
use crate::fetch::MetadataSource;
use crate::load::{AppendOutcome, Loadable, Loader};
use crate::models::{
    Customer, CustomerProfile, EnrichedProduct, ProductProfile, RunStatus, SaleCandidate, SaleFact,
};
use crate::transform::{self, CustomerCleanReport, ProductCleanReport, SaleTransformReport};
use crate::validate::{self, ValidationReport};
use crate::watermark::WatermarkStore;
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Loaded { rows: usize },
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: &'static str,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// Counts from the watermark-gated sale extraction.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractSummary {
    pub candidates: usize,
    pub unidentifiable: usize,
    pub already_processed: usize,
    pub unparsed_dates: usize,
}

impl From<&SaleExtract> for ExtractSummary {
    fn from(extract: &SaleExtract) -> Self {
        Self {
            candidates: extract.candidates.len(),
            unidentifiable: extract.unidentifiable,
            already_processed: extract.already_processed,
            unparsed_dates: extract.unparsed_dates,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub steps: Vec<StepReport>,
    pub metadata_records: usize,
    pub watermark_before: Option<NaiveDate>,
    pub watermark_after: Option<NaiveDate>,
    pub products: Option<ProductCleanReport>,
    pub customers: Option<CustomerCleanReport>,
    pub sales_extract: Option<ExtractSummary>,
    pub sales_validation: Option<ValidationReport>,
    pub sales_append: Option<AppendOutcome>,
    pub sales_transform: Option<SaleTransformReport>,
}

impl RunReport {
    pub fn status(&self) -> RunStatus {
        let failed = self
            .steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed { .. }))
            .count();
        match failed {
            0 => RunStatus::Success,
            n if n == self.steps.len() => RunStatus::Failed,
            _ => RunStatus::Partial,
        }
    }

    pub fn step(&self, name: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.step == name).map(|s| &s.outcome)
    }

    fn push(&mut self, step: &'static str, outcome: StepOutcome) {
        match &outcome {
            StepOutcome::Failed { error } => log::error!("Step '{}' failed: {}", step, error),
            StepOutcome::Skipped { reason } => log::warn!("Step '{}' skipped: {}", step, reason),
            StepOutcome::Loaded { rows } => log::info!("Step '{}' loaded {} rows.", step, rows),
        }
        self.steps.push(StepReport { step, outcome });
    }

    /// Records a step result and hands back the success value, if any.
    fn settle<T>(
        &mut self,
        step: &'static str,
        result: Result<(T, usize)>,
    ) -> Option<T> {
        match result {
            Ok((value, rows)) => {
                self.push(step, StepOutcome::Loaded { rows });
                Some(value)
            }
            Err(err) => {
                self.push(step, StepOutcome::Failed { error: err.to_string() });
                None
            }
        }
    }
}

/// Entry point of the ETL engine.
///
/// # Example
///
/// ```rust,no_run
/// use flowstore::{config::PipelineConfig, fetch::NullMetadataSource, Pipeline};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> flowstore::errors::Result<()> {
///     let config = PipelineConfig::new("./data");
///     let pipeline = Pipeline::new(config, Arc::new(NullMetadataSource)).await?;
///     let report = pipeline.run().await?;
///     println!("{:?}", report.status());
///     Ok(())
/// }
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    catalog: Arc<Catalog>,
    watermark: WatermarkStore,
    loader: Loader,
    artifacts: Artifacts,
    metadata: Arc<dyn MetadataSource>,
}

impl Pipeline {
    /// Opens the sink, provisions the managed tables and the artifacts directory.
    pub async fn new(config: PipelineConfig, metadata: Arc<dyn MetadataSource>) -> Result<Self> {
        let catalog = Arc::new(Catalog::new(&config)?);
        catalog.initialize_schema()?;

        let watermark = WatermarkStore::new(Arc::clone(&catalog));
        watermark.ensure_exists()?;

        let artifacts = Artifacts::new(&config.artifacts_dir).await?;
        let loader = Loader::new(Arc::clone(&catalog));

        Ok(Self {
            config,
            catalog,
            watermark,
            loader,
            artifacts,
            metadata,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn watermark(&self) -> &WatermarkStore {
        &self.watermark
    }

    /// Runs every step once. Step failures are reported in the returned
    /// [`RunReport`]; an `Err` means the run log itself could not be written.
    pub async fn run(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        self.catalog.create_run(&run_id)?;
        log::info!("ETL run {} started.", run_id);

        let mut report = RunReport {
            run_id: run_id.clone(),
            ..Default::default()
        };

        let products = self.products_step(&mut report).await;
        let products = report.settle("products", products);

        let customers = self.customers_step(&mut report);
        let customers = report.settle("customers", customers);

        self.sales_step(&mut report);

        match products {
            Some(products) => {
                let result = self.products_transformed_step(products);
                report.settle("products_transformed", result);
            }
            None => report.push(
                "products_transformed",
                StepOutcome::Skipped {
                    reason: "products were not loaded in this run".into(),
                },
            ),
        }

        let result = self.sales_transformed_step(&mut report);
        report.settle("sales_transformed", result);

        match customers {
            Some(customers) => {
                let result = self.customers_transformed_step(customers);
                report.settle("customers_transformed", result);
            }
            None => report.push(
                "customers_transformed",
                StepOutcome::Skipped {
                    reason: "customers were not loaded in this run".into(),
                },
            ),
        }

        let status = report.status();
        let details = serde_json::to_string(&report)?;
        self.catalog.finish_run(&run_id, status, &details)?;
        match status {
            RunStatus::Success => log::info!("ETL run {} completed successfully.", run_id),
            _ => log::error!("ETL run {} finished with status {}.", run_id, status.as_str()),
        }
        Ok(report)
    }

    async fn products_step(&self, report: &mut RunReport) -> Result<(Vec<EnrichedProduct>, usize)> {
        let raw = extract::read_products(&self.config.products_file())?;
        let (products, clean_report) = transform::clean_products(&raw);
        report.products = Some(clean_report);

        let metadata = self.metadata.fetch_metadata().await;
        log::info!(
            "Fetched {} metadata records from '{}'.",
            metadata.len(),
            self.metadata.name()
        );
        report.metadata_records = metadata.len();

        let enriched = crate::enrich::enrich_products(products, &metadata);
        let rows = self.loader.replace(&enriched)?;
        Ok((enriched, rows))
    }

    fn customers_step(&self, report: &mut RunReport) -> Result<(Vec<Customer>, usize)> {
        let raw = extract::read_customers(&self.config.customers_file())?;
        let (customers, clean_report) = transform::clean_customers(&raw);
        report.customers = Some(clean_report);
        let rows = self.loader.replace(&customers)?;
        Ok((customers, rows))
    }

    fn sales_step(&self, report: &mut RunReport) {
        let outcome = match self.append_new_sales(report) {
            Ok(Some(append)) => {
                let rows = append.inserted;
                report.sales_append = Some(append);
                StepOutcome::Loaded { rows }
            }
            Ok(None) => StepOutcome::Skipped {
                reason: "no dimension keys available to validate against".into(),
            },
            Err(err) => StepOutcome::Failed {
                error: err.to_string(),
            },
        };
        report.watermark_after = match self.watermark.get() {
            Ok(watermark) => watermark,
            Err(err) => {
                log::warn!("Could not read the watermark after the sales step: {}", err);
                None
            }
        };
        report.push("sales", outcome);
    }

    /// Extract (watermark first) → validate → append. `Ok(None)` when the
    /// dimensions are empty and validation would reject every row.
    fn append_new_sales(&self, report: &mut RunReport) -> Result<Option<AppendOutcome>> {
        let watermark = self.watermark.get()?;
        report.watermark_before = watermark;

        let extract =
            extract::extract_sales(&self.config.sales_file(), watermark, self.config.date_policy)?;
        report.sales_extract = Some(ExtractSummary::from(&extract));

        let prices = self.catalog.product_prices()?;
        let customer_keys = self.catalog.customer_keys()?;
        if prices.is_empty() || customer_keys.is_empty() {
            return Ok(None);
        }

        let (validated, validation) =
            validate::validate_sales(extract.candidates, &prices, &customer_keys);
        report.sales_validation = Some(validation);

        self.loader.append_sales(&validated).map(Some)
    }

    fn products_transformed_step(
        &self,
        products: Vec<EnrichedProduct>,
    ) -> Result<((), usize)> {
        let history = self.catalog.sales_history()?;
        let profiles = transform::score_popularity(products, &history);
        let rows = self.load_with_snapshot::<ProductProfile>(&profiles)?;
        Ok(((), rows))
    }

    fn sales_transformed_step(&self, report: &mut RunReport) -> Result<((), usize)> {
        let history: Vec<SaleCandidate> = self
            .catalog
            .sales_history()?
            .into_iter()
            .map(SaleCandidate::from)
            .collect();
        let prices = self.catalog.product_prices()?;
        let (facts, transform_report) = transform::transform_sales(history, &prices);
        report.sales_transform = Some(transform_report);
        let rows = self.load_with_snapshot::<SaleFact>(&facts)?;
        Ok(((), rows))
    }

    fn customers_transformed_step(&self, customers: Vec<Customer>) -> Result<((), usize)> {
        let history = self.catalog.sales_history()?;
        let profiles = transform::profile_customers(customers, &history);
        let rows = self.load_with_snapshot::<CustomerProfile>(&profiles)?;
        Ok(((), rows))
    }

    fn load_with_snapshot<T: Loadable + Serialize>(&self, rows: &[T]) -> Result<usize> {
        let loaded = self.loader.replace(rows)?;
        self.artifacts.write_snapshot(T::TABLE_NAME, rows)?;
        Ok(loaded)
    }
}
