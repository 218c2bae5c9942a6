use anyhow::Result;
use chat_relay::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
