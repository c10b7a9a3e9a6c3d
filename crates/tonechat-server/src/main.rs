use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use tonechat_api::AppStateInner;
use tonechat_db::Database;
use tonechat_gateway::GroupRegistry;
use tonechat_sentiment::SentimentClient;
use tonechat_server::app;
use tonechat_server::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tonechat=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);
    let classifier = Arc::new(SentimentClient::new(&config.ai_base_url, config.ai_timeout)?);
    info!("Sentiment service at {}", config.ai_base_url);

    let state = AppStateInner::new(db, GroupRegistry::new(), classifier);
    let router = app::router(state, app::cors_layer(&config.cors_origins));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("tonechat listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("tonechat stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
