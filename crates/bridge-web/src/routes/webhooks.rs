//! Upstream callbacks: gateway events and CRM outbound messages.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use sync_engine::{CrmOutboundMessage, WebhookOutcome};
use tracing::{debug, error};

use crate::error::Result;
use crate::state::AppState;

/// Gateway webhook.
///
/// Answers 200 for anything the engine classified, including drops. Only a
/// failed sync is a 500, so the gateway redelivers it.
pub async fn gateway_webhook(State(state): State<AppState>, body: Bytes) -> Response {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            debug!(error = %e, "Webhook body is not JSON");
            return Json(WebhookOutcome::ignored("invalid JSON").to_json()).into_response();
        }
    };

    match state.engine.process_webhook(&payload).await {
        Ok(outcome) => Json(outcome.to_json()).into_response(),
        Err(e) => {
            error!(error = %e, "Webhook processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Message typed in the CRM, to be relayed to WhatsApp.
pub async fn crm_outbound(
    State(state): State<AppState>,
    Json(message): Json<CrmOutboundMessage>,
) -> Result<Json<Value>> {
    let outcome = state.engine.relay_outbound(&message).await?;
    Ok(Json(outcome.to_json()))
}
