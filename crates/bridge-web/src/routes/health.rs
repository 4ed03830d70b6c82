//! Health check endpoints.

use axum::extract::{Query, State};
use axum::Json;
use gateway_client::HealthReport;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::state::AppState;

#[derive(Serialize)]
pub struct Health {
    pub status: String,
}

/// Health check endpoint.
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayHealthQuery {
    pub base_url: Option<String>,
}

/// Probe a gateway server, the default one unless `baseUrl` is given.
pub async fn gateway_health(
    State(state): State<AppState>,
    Query(query): Query<GatewayHealthQuery>,
) -> Result<Json<HealthReport>> {
    let report = state.engine.gateway_health(query.base_url.as_deref()).await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_health_ok() {
        let app = TestApp::new().await;
        let (status, body) = app.get("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_gateway_health_uses_default_url() {
        let app = TestApp::new().await;
        let (status, body) = app.get("/health/gateway").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["healthy"], json!(true));
        assert!(app.gateway.calls().contains(&mock_upstreams::GatewayCall::HealthCheck {
            base_url: "https://default.gateway".to_string(),
        }));
    }
}
