//! ShopNest - storefront service

use anyhow::Result;
use std::sync::Arc;
use shopnest::config::Config;
use shopnest::http::{router, AppState};
use shopnest::notify::{LogNotifier, NatsNotifier, Notifier};
use shopnest::payment::SslCommerzGateway;
use shopnest::store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    shopnest::telemetry::init();

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let pg = PgStore::connect(url, config.database_max_connections).await?;
            pg.migrate().await?;
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let notifier: Arc<dyn Notifier> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsNotifier::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, order notifications will only be logged");
                Arc::new(LogNotifier)
            }
        },
        None => Arc::new(LogNotifier),
    };

    let gateway = Arc::new(SslCommerzGateway::new(&config.gateway)?);
    let state = AppState { store, gateway, notifier, gateway_config: Arc::new(config.gateway.clone()) };

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("🚀 ShopNest listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, router(state)).await?;
    Ok(())
}
