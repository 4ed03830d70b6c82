//! Endpoint and field-alias tables.
//!
//! Gateway deployments differ in URL layout and response shape. Every
//! candidate list is ordered: the first entry is the current layout, later
//! entries cover older builds. Supporting a new build means editing these
//! tables, not the client.

use reqwest::Method;

/// A candidate method/path pair.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub method: Method,
    pub path: &'static str,
}

const fn ep(method: Method, path: &'static str) -> Endpoint {
    Endpoint { method, path }
}

/// Status endpoints, probed until the first non-404 answer.
pub const STATUS_PATHS: &[&str] = &["/instance/status", "/status", "/instance/connectionState"];

/// Connect endpoint.
pub const CONNECT: Endpoint = ep(Method::POST, "/instance/connect");

/// Dedicated QR endpoints, tried after connect-then-probe.
pub const QR_ENDPOINTS: &[Endpoint] = &[
    ep(Method::GET, "/instance/qrcode"),
    ep(Method::GET, "/instance/qr"),
    ep(Method::GET, "/qrcode"),
];

/// Disconnect/logout variants across gateway builds.
pub const DISCONNECT_ENDPOINTS: &[Endpoint] = &[
    ep(Method::POST, "/instance/disconnect"),
    ep(Method::DELETE, "/instance/disconnect"),
    ep(Method::POST, "/instance/logout"),
    ep(Method::DELETE, "/instance/logout"),
    ep(Method::GET, "/instance/logout"),
];

/// Webhook registration variants.
pub const WEBHOOK_ENDPOINTS: &[Endpoint] = &[
    ep(Method::POST, "/webhook"),
    ep(Method::PUT, "/webhook"),
    ep(Method::POST, "/instance/webhook"),
];

/// Message delete/revoke variants.
pub const DELETE_ENDPOINTS: &[Endpoint] = &[
    ep(Method::POST, "/message/delete"),
    ep(Method::DELETE, "/message/delete"),
    ep(Method::POST, "/message/revoke"),
];

pub const DOWNLOAD_MEDIA: Endpoint = ep(Method::POST, "/message/download");
pub const SEND_TEXT: Endpoint = ep(Method::POST, "/send/text");
pub const EDIT_MESSAGE: Endpoint = ep(Method::POST, "/message/edit");
pub const REACT: Endpoint = ep(Method::POST, "/message/react");

/// Health endpoint, relative to the bare base URL.
pub const HEALTH_PATH: &str = "/status";

// Response field aliases.

pub const LOGGED_IN_FIELDS: &[&str] = &[
    "status.loggedIn",
    "loggedIn",
    "instance.loggedIn",
    "data.loggedIn",
    "status.logged_in",
];

pub const JID_FIELDS: &[&str] = &["status.jid", "jid", "instance.jid", "data.jid", "me.id"];

pub const STATUS_FIELDS: &[&str] = &[
    "instance.status",
    "status.status",
    "status",
    "state",
    "instance.state",
    "data.status",
    "connectionStatus",
];

pub const PHONE_FIELDS: &[&str] = &[
    "instance.owner",
    "owner",
    "phone",
    "instance.phone",
    "status.phone",
    "data.phone",
    "number",
];

pub const AVATAR_FIELDS: &[&str] = &[
    "instance.profilePicUrl",
    "profilePicUrl",
    "avatar",
    "instance.avatar",
    "picture",
    "data.profilePicUrl",
];

pub const QR_FIELDS: &[&str] = &[
    "instance.qrcode",
    "qrcode.base64",
    "qrcode",
    "qr",
    "base64",
    "data.qrcode",
    "data.qr",
];

pub const MEDIA_URL_FIELDS: &[&str] = &[
    "fileURL",
    "fileUrl",
    "url",
    "mediaUrl",
    "media_url",
    "data.fileURL",
    "data.url",
];

pub const MESSAGE_ID_FIELDS: &[&str] = &[
    "messageid",
    "messageId",
    "id",
    "key.id",
    "message.messageid",
    "message.id",
    "data.messageid",
    "data.id",
];

/// Status strings meaning the session is authenticated.
pub const CONNECTED_STATES: &[&str] = &["connected", "open", "authenticated"];

/// Status strings meaning the session is pairing.
pub const CONNECTING_STATES: &[&str] = &["connecting", "qr", "waiting", "pairing"];
