#[tokio::main]
async fn main() -> anyhow::Result<()> {
    explore_assistant_relay_lib::run().await?;
    Ok(())
}
