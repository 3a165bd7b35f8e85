//! Certledger server entry point.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    certledger::server::run().await
}
