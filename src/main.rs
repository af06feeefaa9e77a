#[tokio::main]
async fn main() -> anyhow::Result<()> {
    taskhub_lib::run().await
}
