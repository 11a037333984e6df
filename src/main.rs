use callhub::{AppState, config::Config, hub::Hub};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(path) = &config.env_file {
        info!(path = %path.display(), "loaded environment file");
    }
    info!(debug = config.debug, "DEBUG mode is {}", if config.debug { "ON" } else { "OFF" });

    let state = AppState::new(Hub::new(config.hub_settings()));
    let (addr, server) = callhub::bind(&config.addr(), state).await?;
    info!(%addr, "server started");

    server.await??;
    Ok(())
}
