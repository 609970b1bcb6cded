use std::sync::Arc;

use anyhow::Context;

use kb_api::app::{build_app, services::AppServices};
use kb_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kb_observability::init();

    let config = ApiConfig::from_env().context("invalid configuration")?;
    let services = AppServices::from_config(&config)
        .await
        .context("failed to initialise storage")?;

    let app = build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
