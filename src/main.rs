//! Storefront order service

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use storefront::api::{self, AppState};
use storefront::bus::EventBus;
use storefront::config::AppConfig;
use storefront::payments::Payments;
use storefront::services::{ServiceSettings, Services};
use storefront::store::{MemoryStore, PgStore, Store};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn open_store(cfg: &AppConfig) -> Result<Arc<dyn Store>> {
    Ok(match cfg.database_url.as_deref() {
        Some(url) => {
            let store = PgStore::connect(url, cfg.database_max_connections).await?;
            store.migrate().await?;
            info!("connected to Postgres");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set, using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cfg = AppConfig::load()?;
    init_tracing(cfg.log_json);

    let store = open_store(&cfg).await?;
    let bus = EventBus::connect(cfg.nats_url.as_deref()).await;
    let payments = Payments::from_config(&cfg)?;
    let services = Services::new(store, payments, bus, ServiceSettings::from_config(&cfg));

    if services.orders.spawn_expiry_sweep(Duration::from_secs(cfg.expiry_sweep_seconds)).is_none() {
        info!("reservation expiry disabled");
    }
    if cfg.admin_token.is_none() {
        warn!("ADMIN_TOKEN not set, admin routes are disabled");
    }

    let app = api::router(AppState::new(services, cfg.admin_token.clone()));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", cfg.port)).await?;
    info!(port = cfg.port, "storefront listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}
