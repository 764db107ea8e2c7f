#[tokio::main]
async fn main() -> anyhow::Result<()> {
    flowctl::run_cli().await
}
