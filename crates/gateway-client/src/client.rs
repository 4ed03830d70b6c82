//! WhatsApp gateway HTTP client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::alias::{first_bool, first_str};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::paths::{self, Endpoint};
use crate::types::{
    ConnectOutcome, ConnectionState, HealthReport, SendTextRequest, SentMessage, StatusReport,
};

/// Timeout of the health probe.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Operations the bridge needs from the WhatsApp gateway.
///
/// Every call takes the instance's [`GatewayConfig`] because each instance
/// may live on a different gateway server.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Poll the instance status. Never fails: unreachable means disconnected.
    async fn fetch_status(&self, config: &GatewayConfig) -> StatusReport;

    /// Start a session. Returns the QR code when the gateway sends it inline.
    async fn connect(&self, config: &GatewayConfig) -> Result<ConnectOutcome, GatewayError>;

    /// Obtain a renderable QR image URI.
    async fn fetch_qr_code(&self, config: &GatewayConfig) -> Result<String, GatewayError>;

    async fn disconnect(&self, config: &GatewayConfig) -> Result<(), GatewayError>;

    async fn set_webhook(
        &self,
        config: &GatewayConfig,
        url: &str,
        ignore_groups: bool,
    ) -> Result<(), GatewayError>;

    /// Exchange a message's encrypted media for a public, time-limited URL.
    async fn download_media(
        &self,
        config: &GatewayConfig,
        message_id: &str,
    ) -> Result<String, GatewayError>;

    async fn send_text(
        &self,
        config: &GatewayConfig,
        request: &SendTextRequest,
    ) -> Result<SentMessage, GatewayError>;

    async fn edit_message(
        &self,
        config: &GatewayConfig,
        message_id: &str,
        text: &str,
    ) -> Result<(), GatewayError>;

    async fn react(
        &self,
        config: &GatewayConfig,
        jid: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), GatewayError>;

    async fn delete_message(
        &self,
        config: &GatewayConfig,
        jid: &str,
        message_id: &str,
    ) -> Result<(), GatewayError>;

    /// Probe a gateway server. Never fails.
    async fn health_check(&self, base_url: &str) -> HealthReport;
}

/// reqwest-backed [`Gateway`].
#[derive(Clone)]
pub struct GatewayClient {
    http: Client,
}

impl GatewayClient {
    pub fn new() -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(GatewayError::Http)?;
        Ok(Self { http })
    }

    /// Use an existing HTTP client.
    pub fn with_http_client(http: Client) -> Self {
        Self { http }
    }

    async fn send(
        &self,
        config: &GatewayConfig,
        endpoint: &Endpoint,
        body: Option<&Value>,
    ) -> Result<Response, reqwest::Error> {
        let url = config.url(endpoint.path);
        debug!(method = %endpoint.method, %url, "Gateway request");

        let mut request = self
            .http
            .request(endpoint.method.clone(), &url)
            .header("token", &config.token)
            .header("Accept", "application/json");
        if let Some(admin) = &config.admin_token {
            request = request.header("admintoken", admin);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await
    }

    /// Send and require a 2xx answer.
    async fn call(
        &self,
        config: &GatewayConfig,
        endpoint: &Endpoint,
        body: Option<&Value>,
    ) -> Result<Value, GatewayError> {
        let response = self.send(config, endpoint, body).await?;
        let status = response.status();
        let value = read_body(response).await;
        if status.is_success() {
            Ok(value)
        } else {
            Err(GatewayError::Status {
                status: status.as_u16(),
                body: value.to_string(),
            })
        }
    }

    /// Try each endpoint/body pair until one answers 2xx.
    ///
    /// 404 and 405 mean "not this build" and move on silently. Other failures
    /// are remembered and reported if nothing succeeds.
    async fn probe(
        &self,
        config: &GatewayConfig,
        candidates: &[(&Endpoint, Option<&Value>)],
    ) -> Result<Value, GatewayError> {
        let mut last_error: Option<String> = None;

        for (endpoint, body) in candidates {
            match self.send(config, endpoint, *body).await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(read_body(response).await);
                    }
                    if status == StatusCode::NOT_FOUND || status == StatusCode::METHOD_NOT_ALLOWED
                    {
                        debug!(method = %endpoint.method, path = endpoint.path, %status, "Endpoint not supported");
                        continue;
                    }
                    let body = read_body(response).await;
                    last_error = Some(format!(
                        "{} {} returned {}: {}",
                        endpoint.method, endpoint.path, status, body
                    ));
                }
                Err(e) => {
                    last_error = Some(format!("{} {}: {}", endpoint.method, endpoint.path, e));
                }
            }
        }

        Err(GatewayError::AllEndpointsFailed(
            last_error.unwrap_or_else(|| "no endpoint accepted the request".to_string()),
        ))
    }

    /// Body of the first status endpoint that exists.
    async fn status_body(&self, config: &GatewayConfig) -> Result<Option<Value>, reqwest::Error> {
        for path in paths::STATUS_PATHS.iter().copied() {
            let endpoint = Endpoint {
                method: reqwest::Method::GET,
                path,
            };
            let response = self.send(config, &endpoint, None).await?;
            if response.status() == StatusCode::NOT_FOUND {
                continue;
            }
            return Ok(Some(read_body(response).await));
        }
        Ok(None)
    }
}

#[async_trait]
impl Gateway for GatewayClient {
    async fn fetch_status(&self, config: &GatewayConfig) -> StatusReport {
        match self.status_body(config).await {
            Ok(Some(body)) => map_status(&body),
            Ok(None) => {
                warn!(base_url = %config.base_url, "No status endpoint found");
                StatusReport::unreachable()
            }
            Err(e) => {
                warn!(base_url = %config.base_url, error = %e, "Status poll failed");
                StatusReport::unreachable()
            }
        }
    }

    async fn connect(&self, config: &GatewayConfig) -> Result<ConnectOutcome, GatewayError> {
        let body = self.call(config, &paths::CONNECT, Some(&json!({}))).await?;
        let qr_code = extract_qr(&body);
        info!(base_url = %config.base_url, has_qr = qr_code.is_some(), "Instance connect requested");
        Ok(ConnectOutcome {
            qr_code,
            status: map_status(&body),
        })
    }

    async fn fetch_qr_code(&self, config: &GatewayConfig) -> Result<String, GatewayError> {
        match self.connect(config).await {
            Ok(ConnectOutcome {
                qr_code: Some(qr), ..
            }) => return Ok(qr),
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Connect did not yield a QR code"),
        }

        if let Ok(Some(body)) = self.status_body(config).await {
            if let Some(qr) = extract_qr(&body) {
                return Ok(qr);
            }
        }

        for endpoint in paths::QR_ENDPOINTS {
            match self.call(config, endpoint, None).await {
                Ok(body) => {
                    if let Some(qr) = extract_qr(&body) {
                        return Ok(qr);
                    }
                }
                Err(e) => debug!(path = endpoint.path, error = %e, "QR endpoint failed"),
            }
        }

        Err(GatewayError::QrUnavailable)
    }

    async fn disconnect(&self, config: &GatewayConfig) -> Result<(), GatewayError> {
        let candidates: Vec<(&Endpoint, Option<&Value>)> = paths::DISCONNECT_ENDPOINTS
            .iter()
            .map(|endpoint| (endpoint, None))
            .collect();
        self.probe(config, &candidates).await?;
        info!(base_url = %config.base_url, "Instance disconnected");
        Ok(())
    }

    async fn set_webhook(
        &self,
        config: &GatewayConfig,
        url: &str,
        ignore_groups: bool,
    ) -> Result<(), GatewayError> {
        let exclude: Vec<&str> = if ignore_groups { vec!["isGroupYes"] } else { vec![] };
        let body = json!({
            "url": url,
            "enabled": true,
            "events": ["messages", "messages_update", "connection"],
            "excludeMessages": exclude,
            "ignoreGroups": ignore_groups,
        });
        let candidates: Vec<_> = paths::WEBHOOK_ENDPOINTS
            .iter()
            .map(|endpoint| (endpoint, Some(&body)))
            .collect();
        self.probe(config, &candidates).await?;
        info!(%url, ignore_groups, "Webhook registered");
        Ok(())
    }

    async fn download_media(
        &self,
        config: &GatewayConfig,
        message_id: &str,
    ) -> Result<String, GatewayError> {
        let body = json!({ "id": message_id, "return_link": true });
        let response = self
            .call(config, &paths::DOWNLOAD_MEDIA, Some(&body))
            .await?;
        first_str(&response, paths::MEDIA_URL_FIELDS).ok_or_else(|| {
            GatewayError::UnexpectedResponse(format!("no media URL for message {message_id}"))
        })
    }

    async fn send_text(
        &self,
        config: &GatewayConfig,
        request: &SendTextRequest,
    ) -> Result<SentMessage, GatewayError> {
        let body = serde_json::to_value(request)?;
        let raw = self.call(config, &paths::SEND_TEXT, Some(&body)).await?;
        let message_id = first_str(&raw, paths::MESSAGE_ID_FIELDS);
        debug!(number = %request.number, ?message_id, "Text sent");
        Ok(SentMessage { message_id, raw })
    }

    async fn edit_message(
        &self,
        config: &GatewayConfig,
        message_id: &str,
        text: &str,
    ) -> Result<(), GatewayError> {
        let body = json!({ "id": message_id, "text": text });
        self.call(config, &paths::EDIT_MESSAGE, Some(&body)).await?;
        Ok(())
    }

    async fn react(
        &self,
        config: &GatewayConfig,
        jid: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), GatewayError> {
        let primary = json!({ "number": jid, "text": emoji, "id": message_id });
        let fallback = json!({
            "number": jid_phone(jid),
            "text": emoji,
            "messageid": message_id,
        });

        match self.call(config, &paths::REACT, Some(&primary)).await {
            Ok(_) => Ok(()),
            Err(e) => {
                debug!(error = %e, "Primary react shape rejected, trying fallback");
                self.call(config, &paths::REACT, Some(&fallback)).await?;
                Ok(())
            }
        }
    }

    async fn delete_message(
        &self,
        config: &GatewayConfig,
        jid: &str,
        message_id: &str,
    ) -> Result<(), GatewayError> {
        let bodies = [
            json!({ "id": message_id }),
            json!({ "number": jid, "id": message_id }),
            json!({ "chatid": jid, "messageid": message_id }),
        ];
        let candidates: Vec<_> = paths::DELETE_ENDPOINTS
            .iter()
            .flat_map(|endpoint| bodies.iter().map(move |body| (endpoint, Some(body))))
            .collect();
        self.probe(config, &candidates).await?;
        Ok(())
    }

    async fn health_check(&self, base_url: &str) -> HealthReport {
        let url = format!("{}{}", base_url.trim_end_matches('/'), paths::HEALTH_PATH);
        let started = Instant::now();
        let result = self
            .http
            .get(&url)
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                let status = response.status();
                HealthReport {
                    healthy: !status.is_server_error(),
                    status: Some(status.as_u16()),
                    latency_ms,
                    error: None,
                }
            }
            Err(e) => HealthReport {
                healthy: false,
                status: None,
                latency_ms,
                error: Some(if e.is_timeout() {
                    "timed out".to_string()
                } else {
                    e.to_string()
                }),
            },
        }
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient").finish_non_exhaustive()
    }
}

/// Read a body as JSON, falling back to a JSON string for plain text.
async fn read_body(response: Response) -> Value {
    match response.text().await {
        Ok(text) if text.trim().is_empty() => Value::Null,
        Ok(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        Err(_) => Value::Null,
    }
}

/// Digits before the `@` or `:` of a JID.
fn jid_phone(jid: &str) -> String {
    jid.split(['@', ':'])
        .next()
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Map a loosely shaped status body to a [`StatusReport`].
pub fn map_status(body: &Value) -> StatusReport {
    let logged_in = first_bool(body, paths::LOGGED_IN_FIELDS).unwrap_or(false);
    let jid = first_str(body, paths::JID_FIELDS);
    let raw_status = first_str(body, paths::STATUS_FIELDS).map(|s| s.to_ascii_lowercase());
    let phone = first_str(body, paths::PHONE_FIELDS)
        .map(|p| jid_phone(&p))
        .and_then(non_empty)
        .or_else(|| jid.as_deref().map(jid_phone).and_then(non_empty));
    let avatar_url = first_str(body, paths::AVATAR_FIELDS);

    let status_is = |set: &[&str]| raw_status.as_deref().is_some_and(|s| set.contains(&s));

    let state = if logged_in || jid.is_some() || status_is(paths::CONNECTED_STATES) {
        if phone.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Connecting
        }
    } else if status_is(paths::CONNECTING_STATES) {
        ConnectionState::Connecting
    } else {
        ConnectionState::Disconnected
    };

    StatusReport {
        state,
        logged_in,
        jid,
        raw_status,
        phone,
        avatar_url,
    }
}

/// Find a QR payload and make it directly renderable.
pub fn extract_qr(body: &Value) -> Option<String> {
    let raw = match body {
        Value::String(s) => Some(s.as_str()),
        other => return first_str(other, paths::QR_FIELDS).map(|qr| normalize_qr(&qr)),
    };
    raw.map(str::trim)
        .filter(|qr| !qr.is_empty())
        .map(normalize_qr)
}

/// Wrap raw base64 in a PNG data URI. Data and http URIs pass through.
pub fn normalize_qr(raw: &str) -> String {
    if raw.starts_with("data:") || raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("data:image/png;base64,{raw}")
    }
}
