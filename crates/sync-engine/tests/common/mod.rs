#![allow(dead_code)]

use std::sync::Arc;

use broadcaster::Broadcaster;
use crm_client::OAuthCredentials;
use database::{
    instance, location, message_map, tenant, Database, Instance, InstanceStatus, MessageMapEntry,
    NewLocation, NewMessageMapEntry, Tenant,
};
use mock_upstreams::{FakeCrm, FakeGateway};
use serde_json::{json, Value};
use sync_engine::{EngineConfig, SyncEngine};

pub const TRACK_ID: &str = "agent-7";

pub struct Bridge {
    pub engine: SyncEngine,
    pub gateway: Arc<FakeGateway>,
    pub crm: Arc<FakeCrm>,
}

impl Bridge {
    /// Tenant `t1`, location `L1` and instance `i1` with gateway token `tok1`.
    pub async fn new() -> Self {
        Self::with(FakeGateway::new(), FakeCrm::new()).await
    }

    pub async fn with(gateway: FakeGateway, crm: FakeCrm) -> Self {
        let db = Database::connect_in_memory().await.unwrap();
        tenant::create_tenant(db.pool(), &tenant_row("t1")).await.unwrap();
        location::upsert_location(
            db.pool(),
            &NewLocation {
                location_id: "L1".to_string(),
                tenant_id: "t1".to_string(),
                access_token: Some("access-L1".to_string()),
                refresh_token: Some("refresh-L1".to_string()),
                expires_at: Some(chrono::Utc::now().timestamp() + 30 * 24 * 3600),
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
            engine,
            gateway,
            crm,
        }
    }

    pub fn db(&self) -> &Database {
        self.engine.database()
    }

    /// Add another connected instance on `L1`.
    pub async fn add_instance(&self, id: &str, token: &str, order: i64) {
        instance::create_instance(self.db().pool(), &instance_row(id, token, order))
            .await
            .unwrap();
    }

    pub async fn map_entry(&self, ghl_id: &str, gateway_id: &str, text: &str, timestamp: i64) {
        message_map::upsert_entry(
            self.db().pool(),
            &NewMessageMapEntry {
                ghl_message_id: ghl_id.to_string(),
                gateway_message_id: Some(gateway_id.to_string()),
                location_id: "L1".to_string(),
                contact_id: Some("contact-lead".to_string()),
                instance_id: Some("i1".to_string()),
                message_text: text.to_string(),
                message_type: "text".to_string(),
                from_me: true,
                original_timestamp: timestamp,
            },
        )
        .await
        .unwrap();
    }

    pub async fn entry(&self, ghl_id: &str) -> MessageMapEntry {
        message_map::get_by_ghl_id(self.db().pool(), ghl_id)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn entry_by_gateway_id(&self, gateway_id: &str) -> Option<MessageMapEntry> {
        message_map::get_by_gateway_id(self.db().pool(), gateway_id)
            .await
            .unwrap()
    }
}

pub fn tenant_row(id: &str) -> Tenant {
    Tenant {
        id: id.to_string(),
        name: "Acme".to_string(),
        role: "member".to_string(),
        track_id: Some(TRACK_ID.to_string()),
        gateway_base_url: Some("https://gateway.example".to_string()),
        gateway_admin_token: None,
        oauth_client_id: None,
        oauth_client_secret: None,
        language: "en".to_string(),
        created_at: 1,
    }
}

pub fn instance_row(id: &str, token: &str, order: i64) -> Instance {
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
        created_at: order,
    }
}

/// A text webhook from the lead `5511999998888`.
pub fn text_webhook(token: &str, message_id: &str, text: &str) -> Value {
    json!({
        "EventType": "messages",
        "token": token,
        "message": {
            "messageid": message_id,
            "fromMe": false,
            "content": text,
            "chatid": "5511999998888@s.whatsapp.net",
            "senderName": "Lead"
        }
    })
}

pub fn minutes_ago(minutes: i64) -> i64 {
    database::now_millis() - minutes * 60_000
}
