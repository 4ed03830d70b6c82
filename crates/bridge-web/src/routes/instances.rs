//! Dashboard actions on one gateway instance.
//!
//! The caller names its tenant in the `x-tenant-id` header and must own the
//! instance or be an admin.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use database::Instance;
use gateway_client::{ConnectOutcome, StatusReport};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, Result};
use crate::state::AppState;

pub const TENANT_HEADER: &str = "x-tenant-id";

async fn authorized(state: &AppState, headers: &HeaderMap, instance_id: &str) -> Result<Instance> {
    let tenant_id = headers
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::MissingTenant)?;
    Ok(state.engine.authorize_instance(tenant_id, instance_id).await?)
}

/// Poll the gateway and persist status, phone and avatar.
pub async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<StatusReport>> {
    let inst = authorized(&state, &headers, &id).await?;
    Ok(Json(state.engine.refresh_status(&inst).await?))
}

pub async fn connect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ConnectOutcome>> {
    let inst = authorized(&state, &headers, &id).await?;
    Ok(Json(state.engine.connect_instance(&inst).await?))
}

pub async fn qr_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let inst = authorized(&state, &headers, &id).await?;
    let qr_code = state.engine.instance_qr_code(&inst).await?;
    Ok(Json(json!({ "qrCode": qr_code })))
}

pub async fn disconnect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let inst = authorized(&state, &headers, &id).await?;
    state.engine.disconnect_instance(&inst).await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookSettings {
    pub url: Option<String>,
    pub ignore_groups: bool,
}

pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(settings): Json<WebhookSettings>,
) -> Result<Json<Value>> {
    let inst = authorized(&state, &headers, &id).await?;
    let url = state
        .engine
        .configure_webhook(&inst, settings.url.as_deref(), settings.ignore_groups)
        .await?;
    Ok(Json(json!({ "success": true, "webhookUrl": url })))
}
