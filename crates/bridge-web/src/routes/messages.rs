//! Message-state endpoint for CRM-side actions.

use axum::extract::State;
use axum::Json;
use serde_json::Value;
use sync_engine::MessageAction;

use crate::error::Result;
use crate::state::AppState;

/// Run one `{action, ...}` request.
pub async fn message_action(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let action = MessageAction::from_value(body)?;
    let response = state.engine.apply_action(action).await?;
    Ok(Json(response))
}
