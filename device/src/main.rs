mod host;
mod registry;
mod update;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
