//! HTTP server for the WhatsApp/CRM bridge.
//!
//! Receives gateway webhooks and CRM callbacks and hands them to the
//! [`SyncEngine`].

mod config;
mod error;
mod routes;
mod state;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use broadcaster::Broadcaster;
use crm_client::CrmClient;
use database::Database;
use gateway_client::GatewayClient;
use sync_engine::SyncEngine;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;
    init_tracing(config.json_logs);
    info!(addr = %config.addr, "Starting bridge web server");

    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;

    let gateway = Arc::new(GatewayClient::new()?);
    let crm = Arc::new(CrmClient::new(config.crm.clone())?);
    let engine = SyncEngine::new(db, gateway, crm, Broadcaster::new(), config.engine.clone());

    let app = routes::router()
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::new(engine));

    info!(addr = %config.addr, "Bridge web server listening");
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
