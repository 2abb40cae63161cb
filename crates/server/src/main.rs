use tracing::info;
use tracing_subscriber::EnvFilter;

use rulegate_server::{build_router, startup};

fn load_config() -> rulegate_core::Config {
    rulegate_core::config::load_dotenv();
    rulegate_core::Config::from_env()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    config.validate().map_err(anyhow::Error::msg)?;
    config.log_summary();

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = startup::build_app_state(config)?;
    let mut watchers = startup::spawn_watchers(&state)?;

    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        "rulegate listening on http://{} (admin API at {})",
        addr, state.config.admin.base_path
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for watcher in &mut watchers {
        watcher.close().await;
    }
    info!("rulegate stopped");
    Ok(())
}
