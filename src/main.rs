#[tokio::main]
async fn main() -> anyhow::Result<()> {
    milestone_auditor::service::run().await
}
