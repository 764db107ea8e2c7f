use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use flowstore::{
    catalog::Catalog,
    config::{DatePolicy, PipelineConfig},
    fetch::{MetadataSource, NullMetadataSource},
    models::RunStatus,
    watermark::WatermarkStore,
    Pipeline, RunReport,
};
use metafetcher::{MetadataClient, MetadataClientConfig};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Runs the command line interface for the sales ETL.
pub async fn run_cli() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Some(Command::Run(args)) => {
            let report = run_pipeline(args).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.status() == RunStatus::Failed {
                anyhow::bail!("ETL run {} failed", report.run_id);
            }
        }
        Some(Command::Watermark(args)) => {
            let view = read_watermark(&args)?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        None => {
            println!("No subcommand provided. Use --help to see available commands.");
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Runs the ETL pipeline once
    Run(RunArgs),
    /// Prints the last processed sale date
    Watermark(StoreArgs),
}

#[derive(Args, Clone, Debug)]
pub struct StoreArgs {
    /// Base directory holding input/, catalog.sqlite and artifacts/
    #[arg(long, env = "FLOW_BASE_PATH")]
    pub base_path: PathBuf,
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Directory with products.csv, customers.csv and sales.csv (defaults to <base>/input)
    #[arg(long, env = "FLOW_INPUT_DIR")]
    pub input_dir: Option<PathBuf>,
    /// Product metadata endpoint; enrichment falls back to defaults when unset
    #[arg(long, env = "FLOW_METADATA_URL")]
    pub metadata_url: Option<String>,
    /// Maximum number of metadata pages to request
    #[arg(long, env = "FLOW_METADATA_MAX_PAGES", default_value_t = metafetcher::metadata_api::DEFAULT_MAX_PAGES)]
    pub max_pages: u32,
    /// Per-request metadata timeout in seconds
    #[arg(long, env = "FLOW_METADATA_TIMEOUT_SECS", default_value_t = 10)]
    pub timeout_secs: u64,
    /// What to do with sales whose transaction_date cannot be parsed
    #[arg(long, env = "FLOW_DATE_POLICY", value_enum, default_value_t = DatePolicyArg::Drop)]
    pub date_policy: DatePolicyArg,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatePolicyArg {
    Drop,
    Sentinel,
}

impl From<DatePolicyArg> for DatePolicy {
    fn from(value: DatePolicyArg) -> Self {
        match value {
            DatePolicyArg::Drop => DatePolicy::Drop,
            DatePolicyArg::Sentinel => DatePolicy::Sentinel,
        }
    }
}

impl RunArgs {
    fn pipeline_config(&self) -> PipelineConfig {
        let mut config =
            PipelineConfig::new(&self.store.base_path).with_date_policy(self.date_policy.into());
        if let Some(input_dir) = &self.input_dir {
            config = config.with_input_dir(input_dir);
        }
        config
    }

    fn metadata_source(&self) -> anyhow::Result<Arc<dyn MetadataSource>> {
        let Some(endpoint) = &self.metadata_url else {
            warn!("No metadata endpoint configured; products keep default enrichment values.");
            return Ok(Arc::new(NullMetadataSource));
        };
        let config = MetadataClientConfig::new(endpoint.clone())
            .with_max_pages(self.max_pages)
            .with_timeout(Duration::from_secs(self.timeout_secs));
        let client = MetadataClient::new(config).context("failed to build metadata client")?;
        Ok(Arc::new(client))
    }
}

/// Builds the pipeline from CLI arguments and runs it once.
pub async fn run_pipeline(args: RunArgs) -> anyhow::Result<RunReport> {
    let config = args.pipeline_config();
    let metadata = args.metadata_source()?;
    info!(
        base_path = %args.store.base_path.display(),
        input_dir = %config.input_dir.display(),
        source = metadata.name(),
        "starting ETL run"
    );

    let pipeline = Pipeline::new(config, metadata)
        .await
        .context("failed to initialize pipeline")?;
    let report = pipeline.run().await.context("failed to record ETL run")?;
    info!(
        run_id = %report.run_id,
        status = report.status().as_str(),
        "ETL run finished"
    );
    Ok(report)
}

#[derive(Debug, Serialize)]
pub struct WatermarkView {
    pub last_processed_date: Option<String>,
}

/// Reads the watermark. Never creates the catalog: a base path without one
/// reports no watermark.
pub fn read_watermark(args: &StoreArgs) -> anyhow::Result<WatermarkView> {
    let config = PipelineConfig::new(&args.base_path);
    if !config.catalog_path.is_file() {
        warn!(
            catalog = %config.catalog_path.display(),
            "catalog not found; no ETL run has completed here"
        );
        return Ok(WatermarkView {
            last_processed_date: None,
        });
    }
    let catalog = Arc::new(Catalog::new(&config).context("failed to open catalog")?);
    let store = WatermarkStore::new(catalog);
    let last_processed_date = store.get()?.map(|date| date.to_string());
    Ok(WatermarkView {
        last_processed_date,
    })
}

fn init_tracing() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}
