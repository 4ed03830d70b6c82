//! Switcher preference endpoint.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use sync_engine::{SwitchOutcome, SwitchRequest};

use crate::error::{ApiError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveInstanceQuery {
    pub location_id: Option<String>,
    /// Stands in for `locationId` in embedded views.
    pub embed_token: Option<String>,
    pub contact_id: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveInstance {
    pub active_instance_id: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Instance currently preferred for a lead.
pub async fn active_instance(
    State(state): State<AppState>,
    Query(query): Query<ActiveInstanceQuery>,
) -> Result<Json<ActiveInstance>> {
    let switcher = state.engine.switcher();

    let location_id = match (non_empty(query.location_id), non_empty(query.embed_token)) {
        (Some(location_id), _) => location_id,
        (None, Some(embed_token)) => switcher.location_for_embed_token(&embed_token).await?,
        (None, None) => {
            return Err(ApiError::BadRequest(
                "locationId or embedToken is required".to_string(),
            ))
        }
    };

    let contact_id = non_empty(query.contact_id);
    let phone = non_empty(query.phone);
    if contact_id.is_none() && phone.is_none() {
        return Err(ApiError::BadRequest("contactId or phone is required".to_string()));
    }

    let active_instance_id = switcher
        .preferred_instance(&location_id, contact_id.as_deref(), phone.as_deref())
        .await?;
    Ok(Json(ActiveInstance { active_instance_id }))
}

/// Persist a switch made in the CRM-side UI.
pub async fn switch_instance(
    State(state): State<AppState>,
    Json(request): Json<SwitchRequest>,
) -> Result<Json<SwitchOutcome>> {
    let outcome = state.engine.switcher().switch_instance(&request).await?;
    Ok(Json(outcome))
}
