use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    taxonav_cli::main_entry().await
}
