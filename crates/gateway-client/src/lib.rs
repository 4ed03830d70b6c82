//! WhatsApp gateway client library.
//!
//! This crate wraps the REST API of the WhatsApp gateway the bridge talks to.
//! It supports:
//!
//! - Polling instance status and mapping it to a tri-state connection state
//! - Connecting, fetching QR codes and disconnecting sessions
//! - Registering webhooks and exchanging media for public URLs
//! - Sending, editing, reacting to and deleting messages
//!
//! Gateway builds differ in URL layout and response shape, so most calls probe
//! an ordered list of candidate endpoints (see [`paths`]) and read responses
//! through ordered field aliases (see [`alias`]).
//!
//! # Example
//!
//! ```no_run
//! use gateway_client::{Gateway, GatewayClient, GatewayConfig, SendTextRequest};
//!
//! # async fn example() -> Result<(), gateway_client::GatewayError> {
//! let client = GatewayClient::new()?;
//! let config = GatewayConfig::new("https://gateway.example", "instance-token");
//!
//! let status = client.fetch_status(&config).await;
//! println!("state: {}", status.state.as_str());
//!
//! let sent = client
//!     .send_text(&config, &SendTextRequest::new("5511999998888", "Hello!"))
//!     .await?;
//! println!("gateway id: {:?}", sent.message_id);
//! # Ok(())
//! # }
//! ```

pub mod alias;
pub mod client;
pub mod config;
pub mod error;
pub mod paths;
pub mod types;

pub use client::{extract_qr, map_status, normalize_qr, Gateway, GatewayClient};
pub use config::{resolve_base_url, GatewayConfig};
pub use error::GatewayError;
pub use types::*;

/// WhatsApp domain for individual chats.
pub const USER_JID_SUFFIX: &str = "@s.whatsapp.net";

/// WhatsApp domain for group chats.
pub const GROUP_JID_SUFFIX: &str = "@g.us";

/// JID for a phone number.
pub fn user_jid(phone: &str) -> String {
    if phone.contains('@') {
        phone.to_string()
    } else {
        format!("{phone}{USER_JID_SUFFIX}")
    }
}
