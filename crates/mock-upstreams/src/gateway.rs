//! Fake gateway - records calls and answers from configured state.

use std::sync::Mutex;

use async_trait::async_trait;
use gateway_client::{
    ConnectOutcome, ConnectionState, Gateway, GatewayConfig, GatewayError, HealthReport,
    SendTextRequest, SentMessage, StatusReport,
};
use serde_json::json;

use crate::lock;

/// One recorded gateway call. `token` is the instance token used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    FetchStatus { token: String },
    Connect { token: String },
    FetchQrCode { token: String },
    Disconnect { token: String },
    SetWebhook { token: String, url: String, ignore_groups: bool },
    DownloadMedia { token: String, message_id: String },
    SendText { token: String, request: SendTextRequest },
    EditMessage { token: String, message_id: String, text: String },
    React { token: String, jid: String, message_id: String, emoji: String },
    DeleteMessage { token: String, jid: String, message_id: String },
    HealthCheck { base_url: String },
}

#[derive(Debug)]
struct State {
    calls: Vec<GatewayCall>,
    status: StatusReport,
    qr_code: Option<String>,
    media_url: Option<String>,
    fail_sends: bool,
    fail_edits: bool,
    fail_reacts: bool,
    fail_deletes: bool,
    next_id: u64,
}

/// In-memory [`Gateway`].
#[derive(Debug)]
pub struct FakeGateway {
    state: Mutex<State>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeGateway {
    /// A connected gateway whose calls all succeed.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                calls: Vec::new(),
                status: StatusReport {
                    state: ConnectionState::Connected,
                    logged_in: true,
                    jid: Some("5511911112222@s.whatsapp.net".to_string()),
                    raw_status: Some("connected".to_string()),
                    phone: Some("5511911112222".to_string()),
                    avatar_url: None,
                },
                qr_code: None,
                media_url: None,
                fail_sends: false,
                fail_edits: false,
                fail_reacts: false,
                fail_deletes: false,
                next_id: 1,
            }),
        }
    }

    pub fn with_status(self, status: StatusReport) -> Self {
        lock(&self.state).status = status;
        self
    }

    pub fn with_qr_code(self, qr_code: impl Into<String>) -> Self {
        lock(&self.state).qr_code = Some(qr_code.into());
        self
    }

    /// Public URL returned by media downloads. Without one, downloads fail.
    pub fn with_media_url(self, url: impl Into<String>) -> Self {
        lock(&self.state).media_url = Some(url.into());
        self
    }

    pub fn failing_sends(self) -> Self {
        lock(&self.state).fail_sends = true;
        self
    }

    pub fn failing_edits(self) -> Self {
        lock(&self.state).fail_edits = true;
        self
    }

    pub fn failing_reacts(self) -> Self {
        lock(&self.state).fail_reacts = true;
        self
    }

    pub fn failing_deletes(self) -> Self {
        lock(&self.state).fail_deletes = true;
        self
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        lock(&self.state).calls.clone()
    }

    /// Requests passed to `send_text`.
    pub fn sent_texts(&self) -> Vec<SendTextRequest> {
        lock(&self.state)
            .calls
            .iter()
            .filter_map(|call| match call {
                GatewayCall::SendText { request, .. } => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: GatewayCall) {
        lock(&self.state).calls.push(call);
    }

    fn rejected(operation: &str) -> GatewayError {
        GatewayError::Status {
            status: 500,
            body: format!("{operation} rejected by fake gateway"),
        }
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn fetch_status(&self, config: &GatewayConfig) -> StatusReport {
        self.record(GatewayCall::FetchStatus {
            token: config.token.clone(),
        });
        lock(&self.state).status.clone()
    }

    async fn connect(&self, config: &GatewayConfig) -> Result<ConnectOutcome, GatewayError> {
        self.record(GatewayCall::Connect {
            token: config.token.clone(),
        });
        let state = lock(&self.state);
        Ok(ConnectOutcome {
            qr_code: state.qr_code.clone(),
            status: state.status.clone(),
        })
    }

    async fn fetch_qr_code(&self, config: &GatewayConfig) -> Result<String, GatewayError> {
        self.record(GatewayCall::FetchQrCode {
            token: config.token.clone(),
        });
        lock(&self.state)
            .qr_code
            .clone()
            .ok_or(GatewayError::QrUnavailable)
    }

    async fn disconnect(&self, config: &GatewayConfig) -> Result<(), GatewayError> {
        self.record(GatewayCall::Disconnect {
            token: config.token.clone(),
        });
        let mut state = lock(&self.state);
        state.status = StatusReport::unreachable();
        Ok(())
    }

    async fn set_webhook(
        &self,
        config: &GatewayConfig,
        url: &str,
        ignore_groups: bool,
    ) -> Result<(), GatewayError> {
        self.record(GatewayCall::SetWebhook {
            token: config.token.clone(),
            url: url.to_string(),
            ignore_groups,
        });
        Ok(())
    }

    async fn download_media(
        &self,
        config: &GatewayConfig,
        message_id: &str,
    ) -> Result<String, GatewayError> {
        self.record(GatewayCall::DownloadMedia {
            token: config.token.clone(),
            message_id: message_id.to_string(),
        });
        lock(&self.state)
            .media_url
            .clone()
            .ok_or_else(|| GatewayError::UnexpectedResponse("no media URL".to_string()))
    }

    async fn send_text(
        &self,
        config: &GatewayConfig,
        request: &SendTextRequest,
    ) -> Result<SentMessage, GatewayError> {
        self.record(GatewayCall::SendText {
            token: config.token.clone(),
            request: request.clone(),
        });
        let mut state = lock(&self.state);
        if state.fail_sends {
            return Err(Self::rejected("send"));
        }
        let id = format!("gw-out-{}", state.next_id);
        state.next_id += 1;
        Ok(SentMessage {
            message_id: Some(id.clone()),
            raw: json!({ "messageid": id }),
        })
    }

    async fn edit_message(
        &self,
        config: &GatewayConfig,
        message_id: &str,
        text: &str,
    ) -> Result<(), GatewayError> {
        self.record(GatewayCall::EditMessage {
            token: config.token.clone(),
            message_id: message_id.to_string(),
            text: text.to_string(),
        });
        if lock(&self.state).fail_edits {
            return Err(Self::rejected("edit"));
        }
        Ok(())
    }

    async fn react(
        &self,
        config: &GatewayConfig,
        jid: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), GatewayError> {
        self.record(GatewayCall::React {
            token: config.token.clone(),
            jid: jid.to_string(),
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
        });
        if lock(&self.state).fail_reacts {
            return Err(Self::rejected("react"));
        }
        Ok(())
    }

    async fn delete_message(
        &self,
        config: &GatewayConfig,
        jid: &str,
        message_id: &str,
    ) -> Result<(), GatewayError> {
        self.record(GatewayCall::DeleteMessage {
            token: config.token.clone(),
            jid: jid.to_string(),
            message_id: message_id.to_string(),
        });
        if lock(&self.state).fail_deletes {
            return Err(GatewayError::AllEndpointsFailed("fake delete failure".to_string()));
        }
        Ok(())
    }

    async fn health_check(&self, base_url: &str) -> HealthReport {
        self.record(GatewayCall::HealthCheck {
            base_url: base_url.to_string(),
        });
        HealthReport {
            healthy: true,
            status: Some(200),
            latency_ms: 1,
            error: None,
        }
    }
}
