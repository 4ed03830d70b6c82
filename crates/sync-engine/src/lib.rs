//! Message synchronization between the WhatsApp gateway and the CRM.
//!
//! This crate provides the [`SyncEngine`], which handles both directions of
//! the bridge:
//!
//! - Gateway webhooks are classified ([`classifier`]) and then synced into the
//!   CRM: new messages, reactions, edits and deletes
//! - CRM-side message actions (edit, react, delete, reply) are applied on
//!   WhatsApp through the gateway ([`mutator`])
//! - CRM-typed messages are relayed to WhatsApp ([`outbound`])
//!
//! # Architecture
//!
//! ```text
//! Gateway webhook                          CRM UI / automation
//!       ↓                                          ↓
//! ┌───────────────────────────────────────────────────────────┐
//! │                       SYNC ENGINE                          │
//! │                                                            │
//! │  classify → dedup claim → instance + OAuth → contact       │
//! │     → enrichment (best-effort) → media → CRM send → map    │
//! │                                                            │
//! │  action → map entry → resolver → gateway call → map/note   │
//! └───────────────────────────────────────────────────────────┘
//!       ↓                    ↓                     ↓
//!   CRM client        processed ledger        live events
//! ```
//!
//! Concurrency control is entirely in the database: every event that must
//! happen once claims a ledger key first (`<token>:<messageId>`,
//! `edit:<id>`, `delete:<id>`, `react:<id>:<emoji>:<actor>`, `ghl:<id>`).
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sync_engine::{EngineConfig, SyncEngine};
//!
//! let engine = SyncEngine::new(db, Arc::new(gateway), Arc::new(crm), broadcaster, EngineConfig::from_env());
//! let outcome = engine.process_webhook(&payload).await?;
//! println!("{}", outcome.to_json());
//! ```

pub mod classifier;
mod cleanup;
mod config;
mod engine;
mod error;
pub mod format;
mod inbound;
mod instances;
pub mod mutator;
pub mod outbound;
mod resolver;
mod switcher;
mod token;

pub use cleanup::CleanupReport;
pub use config::{EngineConfig, EDIT_WINDOW_MILLIS};
pub use engine::SyncEngine;
pub use error::{Result, SyncError};
pub use inbound::{message_dedup_key, Direction, MessageSource, WebhookOutcome};
pub use mutator::{MessageAction, MessageState, ReplyOutcome};
pub use outbound::{CrmOutboundMessage, RelayOutcome};
pub use resolver::InstanceResolver;
pub use switcher::{MatchStrategy, SwitchOutcome, SwitchRequest, SwitcherStore};
pub use token::{needs_refresh, TokenManager, REFRESH_MARGIN_SECS};
