//! Router harness over recording fakes and an in-memory database.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use broadcaster::Broadcaster;
use crm_client::OAuthCredentials;
use database::{instance, location, tenant, Database, Instance, InstanceStatus, NewLocation, Tenant};
use gateway_client::{ConnectionState, StatusReport};
use mock_upstreams::{FakeCrm, FakeGateway};
use serde_json::Value;
use sync_engine::{EngineConfig, SyncEngine};
use tower::ServiceExt;

use crate::routes;
use crate::routes::instances::TENANT_HEADER;
use crate::state::AppState;

pub struct TestApp {
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    pub crm: Arc<FakeCrm>,
}

fn tenant_row(id: &str, role: &str) -> Tenant {
    Tenant {
        id: id.to_string(),
        name: format!("Tenant {id}"),
        role: role.to_string(),
        track_id: Some(format!("track-{id}")),
        gateway_base_url: Some("https://gateway.example".to_string()),
        gateway_admin_token: None,
        oauth_client_id: None,
        oauth_client_secret: None,
        language: "en".to_string(),
        created_at: 1,
    }
}

fn instance_row(id: &str, token: &str, created_at: i64) -> Instance {
    Instance {
        id: id.to_string(),
        tenant_id: "t1".to_string(),
        location_id: Some("L1".to_string()),
        name: format!("Line {id}"),
        gateway_token: token.to_string(),
        gateway_base_url: None,
        status: InstanceStatus::Connected,
        phone: Some("5511911112222".to_string()),
        avatar_url: None,
        assigned_user_id: None,
        webhook_url: None,
        ignore_groups: false,
        is_official: false,
        created_at,
    }
}

pub fn connected_status(phone: &str) -> StatusReport {
    StatusReport {
        state: ConnectionState::Connected,
        logged_in: true,
        jid: Some(format!("{phone}@s.whatsapp.net")),
        raw_status: Some("connected".to_string()),
        phone: Some(phone.to_string()),
        avatar_url: None,
    }
}

impl TestApp {
    /// Tenant `t1` owning location `L1` and instance `i1` (token `tok1`).
    pub async fn new() -> Self {
        Self::with(FakeGateway::new(), FakeCrm::new()).await
    }

    pub async fn with(gateway: FakeGateway, crm: FakeCrm) -> Self {
        let db = Database::connect_in_memory().await.unwrap();
        tenant::create_tenant(db.pool(), &tenant_row("t1", "member")).await.unwrap();
        location::upsert_location(
            db.pool(),
            &NewLocation {
                location_id: "L1".to_string(),
                tenant_id: "t1".to_string(),
                access_token: Some("access-L1".to_string()),
                refresh_token: Some("refresh-L1".to_string()),
                expires_at: Some(database::now_millis() / 1000 + 30 * 24 * 3600),
                embed_token: Some("embed-L1".to_string()),
                is_mirror: false,
            },
        )
        .await
        .unwrap();
        instance::create_instance(db.pool(), &instance_row("i1", "tok1", 1))
            .await
            .unwrap();

        let gateway = Arc::new(gateway);
        let crm = Arc::new(crm);
        let config = EngineConfig {
            gateway_default_url: Some("https://default.gateway".to_string()),
            public_webhook_url: Some("https://bridge.example/webhooks/gateway".to_string()),
            platform_credentials: Some(OAuthCredentials::new("platform-app", "platform-secret")),
            cleanup_sample_rate: 0.0,
            ..Default::default()
        };
        let engine = SyncEngine::new(db, gateway.clone(), crm.clone(), Broadcaster::new(), config);

        Self {
            state: AppState::new(engine),
            gateway,
            crm,
        }
    }

    pub async fn add_instance(&self, id: &str, token: &str) {
        instance::create_instance(self.state.engine.database().pool(), &instance_row(id, token, 2))
            .await
            .unwrap();
    }

    pub async fn add_tenant(&self, id: &str, role: &str) {
        tenant::create_tenant(self.state.engine.database().pool(), &tenant_row(id, role))
            .await
            .unwrap();
    }

    fn router(&self) -> Router {
        routes::router().with_state(self.state.clone())
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router().oneshot(request).await.unwrap()
    }

    async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.send(request).await;
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn get_response(&self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send_json(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn get_as(&self, uri: &str, tenant_id: &str) -> (StatusCode, Value) {
        let request = Request::get(uri)
            .header(TENANT_HEADER, tenant_id)
            .body(Body::empty())
            .unwrap();
        self.send_json(request).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send_json(request).await
    }

    pub async fn post_as(&self, uri: &str, body: Value, tenant_id: &str) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(TENANT_HEADER, tenant_id)
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send_json(request).await
    }

    pub async fn post_raw(&self, uri: &str, body: &'static str) -> (StatusCode, Value) {
        let request = Request::post(uri).body(Body::from(body)).unwrap();
        self.send_json(request).await
    }
}
