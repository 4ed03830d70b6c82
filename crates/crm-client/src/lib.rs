//! CRM REST client library.
//!
//! Contacts, conversation messages, tags, assignment and the OAuth
//! refresh-token grant for the CRM side of the bridge. Calls that fail with
//! 429 or 5xx are retried with capped backoff (see [`retry`]).
//!
//! # Example
//!
//! ```no_run
//! use crm_client::{Crm, CrmClient, CrmConfig, CrmMessage};
//!
//! # async fn example() -> Result<(), crm_client::CrmError> {
//! let client = CrmClient::new(CrmConfig::from_env()?)?;
//!
//! let sent = client
//!     .send_inbound_message("bearer-token", &CrmMessage::text("contact-1", "Hi there"))
//!     .await?;
//! println!("CRM message id: {}", sent.message_id);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod retry;
pub mod types;

pub use client::{duplicate_contact_id, Crm, CrmClient};
pub use config::{CrmConfig, OAuthCredentials};
pub use error::{CrmError, Result};
pub use retry::RetryPolicy;
pub use types::*;
