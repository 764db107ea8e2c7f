use std::path::Path;
use std::sync::Arc;

use flowstore::{
    Pipeline,
    config::PipelineConfig,
    fetch::{MetadataSource, NullMetadataSource},
};
use tempfile::TempDir;

pub const PRODUCTS_CSV: &str = "\
product_id,product_name,category,price
1,Laptop,electronics,999.99
2,T-Shirt,CLOTHING,-19.5
3,,Toys,abc
4,Novel,books,12
";

pub const CUSTOMERS_CSV: &str = "\
customer_id,name,email,country
10,Ada Lovelace,ada@example.com,UK
11,Jean Claude Van Damme,jcvd@example.com,
12,Bad Mail,not-an-email,France
";

pub const SALES_CSV: &str = "\
transaction_id,product_id,customer_id,quantity,transaction_date
100,1,10,2,2024-05-30
101,2,11,0,2024-05-31
102,4,99,-3,2024-05-31
103,9,10,1,2024-06-01
104,4,12,1,2024-06-01
105,1,10,1,not-a-date
";

#[allow(dead_code)]
pub struct TestContext {
    pub temp_dir: TempDir,
    pub config: PipelineConfig,
}

impl TestContext {
    pub fn input_dir(&self) -> &Path {
        &self.config.input_dir
    }

    pub fn write_input(&self, file_name: &str, content: &str) -> anyhow::Result<()> {
        std::fs::write(self.input_dir().join(file_name), content)?;
        Ok(())
    }

    #[allow(dead_code)]
    pub fn append_sales(&self, rows: &str) -> anyhow::Result<()> {
        let path = self.config.sales_file();
        let mut content = std::fs::read_to_string(&path)?;
        content.push_str(rows);
        std::fs::write(path, content)?;
        Ok(())
    }

    pub async fn pipeline(&self) -> anyhow::Result<Pipeline> {
        self.pipeline_with(Arc::new(NullMetadataSource)).await
    }

    #[allow(dead_code)]
    pub async fn pipeline_with(
        &self,
        metadata: Arc<dyn MetadataSource>,
    ) -> anyhow::Result<Pipeline> {
        Ok(Pipeline::new(self.config.clone(), metadata).await?)
    }
}

/// Temp workspace seeded with the three standard input files.
pub async fn init_test_context() -> anyhow::Result<TestContext> {
    let _ = env_logger::builder().is_test(true).try_init();

    let temp_dir = tempfile::tempdir()?;
    let config = PipelineConfig::new(temp_dir.path());
    tokio::fs::create_dir_all(&config.input_dir).await?;

    let ctx = TestContext { temp_dir, config };
    ctx.write_input("products.csv", PRODUCTS_CSV)?;
    ctx.write_input("customers.csv", CUSTOMERS_CSV)?;
    ctx.write_input("sales.csv", SALES_CSV)?;
    Ok(ctx)
}
