//! Route handlers for the bridge.

pub mod events;
pub mod health;
pub mod instances;
pub mod messages;
pub mod switcher;
pub mod webhooks;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        // Health checks
        .route("/health", get(health::health))
        .route("/health/gateway", get(health::gateway_health))
        // Upstream callbacks
        .route("/webhooks/gateway", post(webhooks::gateway_webhook))
        .route("/webhooks/crm-outbound", post(webhooks::crm_outbound))
        // CRM-side UI and automation
        .route("/api/messages", post(messages::message_action))
        .route(
            "/api/switcher",
            get(switcher::active_instance).post(switcher::switch_instance),
        )
        .route("/api/events", get(events::live_events))
        // Dashboard instance actions
        .route("/api/instances/:id/status", get(instances::status))
        .route("/api/instances/:id/connect", post(instances::connect))
        .route("/api/instances/:id/qrcode", get(instances::qr_code))
        .route("/api/instances/:id/disconnect", post(instances::disconnect))
        .route("/api/instances/:id/webhook", post(instances::webhook))
}
