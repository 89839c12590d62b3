use statement_insights::config::AppConfig;
use statement_insights::server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,statement_insights=debug")),
        )
        .init();

    let config = AppConfig::from_env()?;
    server::serve(config).await?;

    Ok(())
}
