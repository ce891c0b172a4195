use neurovision::config::Configuration;
use neurovision::coordinator::CoordinatorBuilder;
use neurovision::error::AppError;
use tracing::Level;

fn init_logging() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    init_logging();

    let configuration = Configuration::load()?;
    let coordinator = CoordinatorBuilder::new(configuration).build()?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| AppError::Pipeline(format!("Failed to listen for shutdown signal: {e}")))?;

    coordinator.shutdown().await
}
