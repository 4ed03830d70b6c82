//! Recording fakes of the bridge's upstream services.
//!
//! This crate provides in-memory implementations of the upstream traits:
//! - `FakeGateway` - implements `gateway_client::Gateway`
//! - `FakeCrm` - implements `crm_client::Crm`
//!
//! Both record every call so tests can assert on what the bridge sent, and
//! both can be told to fail specific operations.
//!
//! # Example
//!
//! ```rust
//! use crm_client::{Crm, CrmMessage};
//! use mock_upstreams::FakeCrm;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), crm_client::CrmError> {
//!     let crm = FakeCrm::new();
//!     let sent = crm
//!         .send_inbound_message("token", &CrmMessage::text("contact-1", "Hi"))
//!         .await?;
//!     assert_eq!(crm.inbound_messages().len(), 1);
//!     println!("stored as {}", sent.message_id);
//!     Ok(())
//! }
//! ```

mod crm;
mod gateway;

pub use crm::{CrmCall, FakeCrm};
pub use gateway::{FakeGateway, GatewayCall};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock that survives a panicking test thread.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
